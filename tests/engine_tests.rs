//! Engine orchestration tests against in-memory fakes (spec.md §8's six
//! concrete end-to-end scenarios). No database or broker required: the
//! Transaction Engine is generic over its collaborators, so these
//! exercise its real control flow without touching Postgres or Kafka.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use uuid::Uuid;

use txn_core::audit::{AuditEvent, AuditSink};
use txn_core::engine::{AuthorizedCaller, DepositRequest, ReversalRequest, TransactionEngine, TransferRequest};
use txn_core::error::{AppError, Result};
use txn_core::gateway::{AccountGateway, BalanceOpResult, BalanceOperation};
use txn_core::ledger::{InsertOutcome, LedgerStore, PagedResult, Pagination, TransactionFilter};
use txn_core::limits::{LimitDecision, LimitEvaluator};
use txn_core::models::{AccountSnapshot, AccountTier, Transaction, TransactionKind, TransactionStatus};

// ---------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------

#[derive(Default)]
struct FakeLedger {
    rows: Mutex<HashMap<Uuid, Transaction>>,
}

impl FakeLedger {
    fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for FakeLedger {
    async fn find_by_idempotent_key(
        &self,
        created_by: &str,
        kind: TransactionKind,
        normalised_key: &str,
    ) -> Result<Option<Transaction>> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .find(|t| {
                t.created_by == created_by
                    && t.kind == kind
                    && t.idempotency_key.as_deref() == Some(normalised_key)
            })
            .cloned())
    }

    async fn insert(&self, transaction: Transaction) -> Result<InsertOutcome> {
        let mut rows = self.rows.lock().await;
        if let Some(key) = &transaction.idempotency_key {
            let clash = rows.values().any(|t| {
                t.created_by == transaction.created_by
                    && t.kind == transaction.kind
                    && t.idempotency_key.as_deref() == Some(key.as_str())
            });
            if clash {
                return Ok(InsertOutcome::Conflict(
                    txn_core::error::UniqueConstraint::IdempotencyKey,
                ));
            }
        }
        rows.insert(transaction.transaction_id, transaction.clone());
        Ok(InsertOutcome::Inserted(transaction))
    }

    async fn update_status(
        &self,
        transaction_id: Uuid,
        new_status: TransactionStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .get_mut(&transaction_id)
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))?;
        if row.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "transaction {transaction_id} is already terminal"
            )));
        }
        row.status = new_status;
        row.processed_at = Some(processed_at);
        Ok(())
    }

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.rows.lock().await.get(&transaction_id).cloned())
    }

    async fn find_reversals_of(&self, original_id: Uuid) -> Result<Vec<Transaction>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|t| t.kind == TransactionKind::Reversal && t.original_transaction_id == Some(original_id))
            .cloned()
            .collect())
    }

    async fn is_reversed(&self, original_id: Uuid) -> Result<bool> {
        Ok(self.rows.lock().await.values().any(|t| {
            t.kind == TransactionKind::Reversal
                && t.original_transaction_id == Some(original_id)
                && matches!(t.status, TransactionStatus::Processing | TransactionStatus::Completed)
        }))
    }

    async fn find_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|t| t.status == TransactionStatus::Processing && t.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn sum_completed_amount(
        &self,
        account_id: Uuid,
        kind: TransactionKind,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|t| {
                (t.from_account_id == account_id || t.to_account_id == account_id)
                    && t.kind == kind
                    && t.status == TransactionStatus::Completed
                    && t.created_at >= since
            })
            .map(|t| t.amount)
            .sum())
    }

    async fn count_completed(&self, account_id: Uuid, kind: TransactionKind, since: DateTime<Utc>) -> Result<i64> {
        let rows = self.rows.lock().await;
        Ok(rows
            .values()
            .filter(|t| {
                (t.from_account_id == account_id || t.to_account_id == account_id)
                    && t.kind == kind
                    && t.status == TransactionStatus::Completed
                    && t.created_at >= since
            })
            .count() as i64)
    }

    async fn search(&self, filter: &TransactionFilter, page: Pagination) -> Result<PagedResult<Transaction>> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<Transaction> = rows
            .values()
            .filter(|t| {
                filter.account_id.map_or(true, |a| t.from_account_id == a || t.to_account_id == a)
                    && filter.kind.map_or(true, |k| t.kind == k)
                    && filter.status.map_or(true, |s| t.status == s)
                    && filter.created_by.as_deref().map_or(true, |c| t.created_by == c)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        Ok(PagedResult { items, total })
    }

    /// The fake holds its single mutex for the whole critical section,
    /// which is the in-memory equivalent of the row lock spec.md §4.5.3
    /// and §9 require: a concurrent second caller blocks on the same
    /// `await` until the first finishes, then observes `is_reversed`.
    async fn insert_reversal<F>(
        &self,
        original_id: Uuid,
        now: DateTime<Utc>,
        max_age: Duration,
        build_reversal: F,
    ) -> Result<Transaction>
    where
        F: Fn(&Transaction) -> Transaction + Send + Sync,
    {
        let mut rows = self.rows.lock().await;
        let original = rows
            .get(&original_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(original_id.to_string()))?;

        if original.status != TransactionStatus::Completed {
            return Err(AppError::InvalidState("original is not COMPLETED".to_string()));
        }
        if !original.kind.is_reversible() {
            return Err(AppError::InvalidState("cannot reverse a reversal".to_string()));
        }
        if now - original.created_at > max_age {
            return Err(AppError::InvalidState("original is outside the reversal window".to_string()));
        }
        let already_reversed = rows.values().any(|t| {
            t.kind == TransactionKind::Reversal
                && t.original_transaction_id == Some(original_id)
                && matches!(t.status, TransactionStatus::Processing | TransactionStatus::Completed)
        });
        if already_reversed {
            return Err(AppError::AlreadyReversed(original_id));
        }

        let reversal = build_reversal(&original);
        rows.insert(reversal.transaction_id, reversal.clone());
        Ok(reversal)
    }

    async fn complete_reversal(&self, reversal_id: Uuid, original_id: Uuid, processed_at: DateTime<Utc>) -> Result<()> {
        let mut rows = self.rows.lock().await;
        if let Some(r) = rows.get_mut(&reversal_id) {
            r.status = TransactionStatus::Completed;
            r.processed_at = Some(processed_at);
        }
        if let Some(o) = rows.get_mut(&original_id) {
            o.status = TransactionStatus::Reversed;
            o.processed_at = Some(processed_at);
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeGateway {
    accounts: Mutex<HashMap<Uuid, AccountSnapshot>>,
    calls: Mutex<Vec<BalanceOperation>>,
    fail_roles: Mutex<HashSet<String>>,
}

impl FakeGateway {
    fn new() -> Self {
        Self::default()
    }

    async fn seed(&self, snapshot: AccountSnapshot) {
        self.accounts.lock().await.insert(snapshot.account_id, snapshot);
    }

    async fn fail_role(&self, role: &str) {
        self.fail_roles.lock().await.insert(role.to_string());
    }

    async fn calls(&self) -> Vec<BalanceOperation> {
        self.calls.lock().await.clone()
    }
}

fn role_of(operation_id: &str) -> &str {
    operation_id.rsplit(':').next().unwrap_or("")
}

#[async_trait]
impl AccountGateway for FakeGateway {
    async fn get_account(&self, account_id: Uuid) -> Result<AccountSnapshot> {
        self.accounts
            .lock()
            .await
            .get(&account_id)
            .cloned()
            .ok_or_else(|| AppError::AccountNotFound(account_id.to_string()))
    }

    async fn apply_balance_operation(&self, op: BalanceOperation) -> Result<BalanceOpResult> {
        self.calls.lock().await.push(op.clone());
        if self.fail_roles.lock().await.contains(role_of(&op.operation_id)) {
            return Err(AppError::ServiceUnavailable("simulated gateway failure".to_string()));
        }
        Ok(BalanceOpResult {
            account_id: op.account_id,
            operation_id: op.operation_id.clone(),
            applied: true,
            new_balance: Decimal::ZERO,
            version: 1,
            idempotent_replay: false,
        })
    }
}

struct FakeLimits {
    decision: Mutex<LimitDecision>,
}

impl FakeLimits {
    fn allow() -> Self {
        Self {
            decision: Mutex::new(LimitDecision::Allow),
        }
    }

    fn deny(reason: &str) -> Self {
        Self {
            decision: Mutex::new(LimitDecision::Deny(reason.to_string())),
        }
    }
}

#[async_trait]
impl LimitEvaluator for FakeLimits {
    async fn evaluate(
        &self,
        _account_id: Uuid,
        _account_tier: AccountTier,
        _kind: TransactionKind,
        _amount: Decimal,
    ) -> Result<LimitDecision> {
        Ok(self.decision.lock().await.clone())
    }
}

#[derive(Default)]
struct CapturingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

#[async_trait]
impl AuditSink for CapturingAudit {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().await.push(event);
    }
}

fn checking_account(balance: Decimal) -> AccountSnapshot {
    AccountSnapshot {
        account_id: Uuid::new_v4(),
        balance,
        currency: "USD".to_string(),
        account_tier: AccountTier::Checking,
        available_credit: Decimal::ZERO,
        active: true,
    }
}

type Engine = TransactionEngine<FakeLedger, FakeGateway, FakeLimits, CapturingAudit>;

fn build_engine(gateway: Arc<FakeGateway>, limits: Arc<FakeLimits>) -> (Arc<Engine>, Arc<FakeLedger>) {
    let ledger = Arc::new(FakeLedger::new());
    let audit = Arc::new(CapturingAudit::default());
    let engine = Arc::new(TransactionEngine::new(ledger.clone(), gateway, limits, audit));
    (engine, ledger)
}

// ---------------------------------------------------------------------
// Scenario 1: happy transfer
// ---------------------------------------------------------------------

#[tokio::test]
async fn happy_transfer_debits_and_credits_exactly_once() {
    let gateway = Arc::new(FakeGateway::new());
    let mut a = checking_account(dec!(1000));
    let mut b = checking_account(dec!(500));
    a.currency = "USD".to_string();
    b.currency = "USD".to_string();
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    let (engine, _ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let tx = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(100),
            currency: "USD".to_string(),
            description: "rent".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect("transfer should succeed");

    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.amount, dec!(100));

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].account_id, a.account_id);
    assert_eq!(calls[0].signed_delta(), dec!(-100));
    assert_eq!(calls[1].account_id, b.account_id);
    assert_eq!(calls[1].signed_delta(), dec!(100));
}

// ---------------------------------------------------------------------
// Scenario 2: idempotent deposit under a concurrent race
// ---------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn idempotent_deposit_under_race_yields_one_effect() {
    let gateway = Arc::new(FakeGateway::new());
    let account = checking_account(dec!(0));
    gateway.seed(account.clone()).await;
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = engine.clone();
        let account_id = account.account_id;
        handles.push(tokio::spawn(async move {
            engine
                .deposit(DepositRequest {
                    account_id,
                    amount: dec!(200),
                    currency: "USD".to_string(),
                    description: "payroll".to_string(),
                    reference: None,
                    caller: "user-1".to_string(),
                    idempotency_key: Some("K1".to_string()),
                })
                .await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let tx = handle.await.unwrap().expect("every racer should get a successful response");
        ids.insert(tx.transaction_id);
    }
    assert_eq!(ids.len(), 1, "all five racers must observe the same winning transaction");

    let rows = ledger.rows.lock().await;
    let deposit_rows: Vec<_> = rows
        .values()
        .filter(|t| t.kind == TransactionKind::Deposit && t.idempotency_key.as_deref() == Some("K1"))
        .collect();
    assert_eq!(deposit_rows.len(), 1, "exactly one ledger row must exist for the key");
    drop(rows);

    let calls = gateway.calls().await;
    assert_eq!(calls.len(), 1, "the gateway must see exactly one credit");
    assert_eq!(calls[0].signed_delta(), dec!(200));
}

// ---------------------------------------------------------------------
// Scenario 3: transfer credit fails, compensation nets the debit to zero
// ---------------------------------------------------------------------

#[tokio::test]
async fn transfer_credit_failure_triggers_compensation() {
    let gateway = Arc::new(FakeGateway::new());
    let a = checking_account(dec!(1000));
    let b = checking_account(dec!(500));
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    gateway.fail_role("credit").await;
    let (engine, _ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let err = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(100),
            currency: "USD".to_string(),
            description: "rent".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("credit failure must surface");
    assert!(matches!(err, AppError::ServiceUnavailable(_)));

    let calls = gateway.calls().await;
    let from_account_net: Decimal = calls
        .iter()
        .filter(|op| op.account_id == a.account_id)
        .map(|op| op.signed_delta())
        .sum();
    assert_eq!(from_account_net, Decimal::ZERO, "debit + compensate must net to zero");

    let roles: Vec<&str> = calls.iter().map(|op| role_of(&op.operation_id)).collect();
    assert_eq!(roles, vec!["debit", "credit", "compensate"]);
}

#[tokio::test]
async fn transfer_double_failure_requires_manual_action() {
    let gateway = Arc::new(FakeGateway::new());
    let a = checking_account(dec!(1000));
    let b = checking_account(dec!(500));
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    gateway.fail_role("credit").await;
    gateway.fail_role("compensate").await;
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let err = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(100),
            currency: "USD".to_string(),
            description: "rent".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("double failure must surface");
    assert!(matches!(err, AppError::FailedRequiresManualAction(_)));

    let rows = ledger.rows.lock().await;
    let row = rows.values().next().expect("a row must have been inserted");
    assert_eq!(row.status, TransactionStatus::FailedRequiresManualAction);
}

// ---------------------------------------------------------------------
// Scenario 4: double reversal
// ---------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reversals_of_the_same_original_admit_exactly_one() {
    let gateway = Arc::new(FakeGateway::new());
    let a = checking_account(dec!(1000));
    let b = checking_account(dec!(500));
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let original = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(500),
            currency: "USD".to_string(),
            description: "big transfer".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect("seed transfer should succeed");
    assert_eq!(original.status, TransactionStatus::Completed);

    let mut handles = Vec::new();
    for i in 0..2 {
        let engine = engine.clone();
        let original_id = original.transaction_id;
        handles.push(tokio::spawn(async move {
            engine
                .reverse(ReversalRequest {
                    original_transaction_id: original_id,
                    reason: format!("duplicate attempt {i}"),
                    caller: "user-1".to_string(),
                    idempotency_key: None,
                })
                .await
        }));
    }

    let mut completed = 0;
    let mut already_reversed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(tx) => {
                assert_eq!(tx.status, TransactionStatus::Completed);
                completed += 1;
            }
            Err(AppError::AlreadyReversed(_)) => already_reversed += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(completed, 1, "exactly one reversal must complete");
    assert_eq!(already_reversed, 1, "the other must be told it was already reversed");

    let original_row = ledger.find_by_id(original.transaction_id).await.unwrap().unwrap();
    assert_eq!(original_row.status, TransactionStatus::Reversed);
}

// ---------------------------------------------------------------------
// Scenario 5: limit block
// ---------------------------------------------------------------------

#[tokio::test]
async fn limit_exceeded_blocks_before_any_ledger_or_gateway_side_effect() {
    let gateway = Arc::new(FakeGateway::new());
    let a = checking_account(dec!(10_000));
    let b = checking_account(dec!(500));
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::deny("per-operation cap exceeded")));

    let err = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(3000),
            currency: "USD".to_string(),
            description: "big one".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("limit should deny");
    assert!(matches!(err, AppError::LimitExceeded(_)));

    assert!(ledger.rows.lock().await.is_empty(), "no ledger row may be inserted");
    let calls = gateway.calls().await;
    assert!(calls.is_empty(), "the gateway must never be asked to move money");
}

// ---------------------------------------------------------------------
// Scenario 6: reversal too old
// ---------------------------------------------------------------------

#[tokio::test]
async fn reversal_outside_the_thirty_day_window_is_rejected() {
    let gateway = Arc::new(FakeGateway::new());
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let mut original = Transaction::new_processing(
        TransactionKind::Transfer,
        Uuid::new_v4(),
        Uuid::new_v4(),
        dec!(500),
        "USD".to_string(),
        "old transfer".to_string(),
        None,
        "user-1".to_string(),
        None,
        None,
    );
    original.created_at = Utc::now() - Duration::days(35);
    let original_id = original.transaction_id;
    ledger.insert(original).await.unwrap();
    ledger
        .update_status(original_id, TransactionStatus::Completed, Utc::now())
        .await
        .unwrap();

    let err = engine
        .reverse(ReversalRequest {
            original_transaction_id: original_id,
            reason: "too late".to_string(),
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("a 35-day-old transaction is outside the reversal window");
    assert!(matches!(err, AppError::InvalidState(_)));

    let row = ledger.find_by_id(original_id).await.unwrap().unwrap();
    assert_eq!(row.status, TransactionStatus::Completed, "the original must be untouched");
    assert!(ledger.find_reversals_of(original_id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------
// Additional coverage: withdrawal insufficient funds, account not found
// ---------------------------------------------------------------------

#[tokio::test]
async fn withdrawal_beyond_balance_is_rejected_without_a_gateway_call() {
    let gateway = Arc::new(FakeGateway::new());
    let account = checking_account(dec!(50));
    gateway.seed(account.clone()).await;
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let err = engine
        .withdraw(DepositRequest {
            account_id: account.account_id,
            amount: dec!(100),
            currency: "USD".to_string(),
            description: "atm".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("insufficient funds must be rejected");
    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert!(ledger.rows.lock().await.is_empty());
    assert!(gateway.calls().await.is_empty());
}

#[tokio::test]
async fn deposit_to_unknown_account_surfaces_account_not_found() {
    let gateway = Arc::new(FakeGateway::new());
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let err = engine
        .deposit(DepositRequest {
            account_id: Uuid::new_v4(),
            amount: dec!(10),
            currency: "USD".to_string(),
            description: "test".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("unknown account must be rejected");
    assert!(matches!(err, AppError::AccountNotFound(_)));
    assert!(ledger.rows.lock().await.is_empty());
}

#[tokio::test]
async fn transfer_rejects_same_account_and_external_sentinel() {
    let gateway = Arc::new(FakeGateway::new());
    let (engine, _ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));
    let same = Uuid::new_v4();

    let err = engine
        .transfer(TransferRequest {
            from_account_id: same,
            to_account_id: same,
            amount: dec!(10),
            currency: "USD".to_string(),
            description: "loop".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("self-transfer must be rejected");
    assert!(matches!(err, AppError::Validation(_)));

    let err = engine
        .transfer(TransferRequest {
            from_account_id: txn_core::models::EXTERNAL_ACCOUNT,
            to_account_id: Uuid::new_v4(),
            amount: dec!(10),
            currency: "USD".to_string(),
            description: "sentinel".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("EXTERNAL must be rejected as a transfer party");
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn cross_currency_transfer_is_rejected_as_validation_error() {
    let gateway = Arc::new(FakeGateway::new());
    let mut a = checking_account(dec!(1000));
    let mut b = checking_account(dec!(500));
    a.currency = "USD".to_string();
    b.currency = "EUR".to_string();
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    let (engine, ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let err = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(100),
            currency: "USD".to_string(),
            description: "fx".to_string(),
            reference: None,
            caller: "user-1".to_string(),
            idempotency_key: None,
        })
        .await
        .expect_err("cross-currency transfers are unsupported");
    assert!(matches!(err, AppError::Validation(_)));
    assert!(ledger.rows.lock().await.is_empty());
}

#[tokio::test]
async fn get_by_id_enforces_caller_ownership() {
    let gateway = Arc::new(FakeGateway::new());
    let a = checking_account(dec!(1000));
    let b = checking_account(dec!(500));
    gateway.seed(a.clone()).await;
    gateway.seed(b.clone()).await;
    let (engine, _ledger) = build_engine(gateway.clone(), Arc::new(FakeLimits::allow()));

    let tx = engine
        .transfer(TransferRequest {
            from_account_id: a.account_id,
            to_account_id: b.account_id,
            amount: dec!(10),
            currency: "USD".to_string(),
            description: "x".to_string(),
            reference: None,
            caller: "owner".to_string(),
            idempotency_key: None,
        })
        .await
        .unwrap();

    let owner = AuthorizedCaller::new("owner", false);
    assert!(engine.get_by_id(tx.transaction_id, &owner).await.is_ok());

    let stranger = AuthorizedCaller::new("stranger", false);
    assert!(matches!(
        engine.get_by_id(tx.transaction_id, &stranger).await,
        Err(AppError::NotFound(_))
    ));

    let admin = AuthorizedCaller::new("stranger", true);
    assert!(engine.get_by_id(tx.transaction_id, &admin).await.is_ok());
}
