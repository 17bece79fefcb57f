pub mod requests;

pub use requests::{
    AuthorizedCaller, DepositRequest, ReversalRequest, SearchRequest, TransferRequest,
    WithdrawalRequest,
};

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use tracing::{error, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink, Outcome};
use crate::error::{AppError, Result};
use crate::gateway::{AccountGateway, BalanceDirection, BalanceOperation};
use crate::ledger::{InsertOutcome, LedgerStore, PagedResult, Pagination, TransactionFilter};
use crate::limits::{LimitDecision, LimitEvaluator};
use crate::models::{
    AccountSnapshot, Transaction, TransactionKind, TransactionStatus, EXTERNAL_ACCOUNT,
};

const REVERSAL_WINDOW_DAYS: i64 = 30;

fn operation_id(transaction_id: Uuid, role: &str) -> String {
    format!("{transaction_id}:{role}")
}

fn validate_amount_and_currency(amount: Decimal, currency: &str) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(AppError::Validation("amount must be non-negative".to_string()));
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::Validation(format!(
            "currency '{currency}' is not a well-formed ISO-4217 code"
        )));
    }
    Ok(())
}

/// The orchestrator of spec.md §4.5: validates, pre-checks idempotency,
/// persists intent, drives the Account Gateway, compensates on failure,
/// and finalises ledger state. Generic over its four injected
/// collaborators (spec.md §9: "explicit capability values... No global
/// singletons") so tests can substitute in-memory fakes or `mockall`
/// doubles without a real database or network.
pub struct TransactionEngine<L, G, E, A>
where
    L: LedgerStore,
    G: AccountGateway,
    E: LimitEvaluator,
    A: AuditSink,
{
    ledger: Arc<L>,
    gateway: Arc<G>,
    limits: Arc<E>,
    audit: Arc<A>,
}

impl<L, G, E, A> TransactionEngine<L, G, E, A>
where
    L: LedgerStore,
    G: AccountGateway,
    E: LimitEvaluator,
    A: AuditSink,
{
    pub fn new(ledger: Arc<L>, gateway: Arc<G>, limits: Arc<E>, audit: Arc<A>) -> Self {
        Self {
            ledger,
            gateway,
            limits,
            audit,
        }
    }

    /// spec.md §4.5.1, DEPOSIT: credits `req.account_id` from the
    /// `EXTERNAL` sentinel.
    pub async fn deposit(&self, req: DepositRequest) -> Result<Transaction> {
        self.single_leg(TransactionKind::Deposit, req).await
    }

    /// spec.md §4.5.1, WITHDRAWAL: debits `req.account_id` to the
    /// `EXTERNAL` sentinel.
    pub async fn withdraw(&self, req: WithdrawalRequest) -> Result<Transaction> {
        self.single_leg(TransactionKind::Withdrawal, req).await
    }

    async fn single_leg(&self, kind: TransactionKind, req: DepositRequest) -> Result<Transaction> {
        validate_amount_and_currency(req.amount, &req.currency)?;

        let normalized_key = req
            .idempotency_key
            .as_deref()
            .map(Transaction::normalize_key);

        if let Some(key) = &normalized_key {
            if let Some(existing) = self
                .ledger
                .find_by_idempotent_key(&req.caller, kind, key)
                .await?
            {
                return Ok(existing);
            }
        }

        let snapshot = self.gateway.get_account(req.account_id).await?;
        if snapshot.currency != req.currency {
            return Err(AppError::Validation(format!(
                "account currency {} does not match request currency {}",
                snapshot.currency, req.currency
            )));
        }

        let decision = self
            .limits
            .evaluate(req.account_id, snapshot.account_tier, kind, req.amount)
            .await
            .unwrap_or_else(|err| {
                warn!(%err, "limit evaluator failed, denying fail-closed");
                LimitDecision::Deny("limit evaluator unavailable".to_string())
            });
        if let LimitDecision::Deny(reason) = decision {
            return Err(AppError::LimitExceeded(reason));
        }

        if kind == TransactionKind::Withdrawal && !snapshot.has_sufficient_funds(req.amount) {
            return Err(AppError::InsufficientFunds {
                requested: req.amount,
                available: snapshot.available_funds(),
            });
        }

        let (from_account_id, to_account_id) = match kind {
            TransactionKind::Deposit => (EXTERNAL_ACCOUNT, req.account_id),
            TransactionKind::Withdrawal => (req.account_id, EXTERNAL_ACCOUNT),
            _ => unreachable!("single_leg only handles deposit/withdrawal"),
        };

        let intent = Transaction::new_processing(
            kind,
            from_account_id,
            to_account_id,
            req.amount,
            req.currency.clone(),
            req.description.clone(),
            req.reference.clone(),
            req.caller.clone(),
            normalized_key.clone(),
            None,
        );

        let transaction = match self.ledger.insert(intent).await? {
            InsertOutcome::Inserted(tx) => tx,
            InsertOutcome::Conflict(_) => {
                // A concurrent caller won the race on the same idempotency
                // key between our pre-check and this insert; no Account
                // Gateway call has happened yet (spec.md §4.5.1 step 5).
                let key = normalized_key
                    .as_deref()
                    .expect("unique violation implies a non-null idempotency key");
                return self
                    .ledger
                    .find_by_idempotent_key(&req.caller, kind, key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "idempotency conflict reported but winning row not found"
                        ))
                    });
            }
        };

        self.audit
            .record(AuditEvent::new(
                transaction.transaction_id,
                transaction.transaction_id,
                &req.caller,
                kind,
                from_account_id,
                to_account_id,
                req.amount,
                TransactionStatus::Processing,
                Outcome::Initiated,
                None,
            ))
            .await;

        let direction = match kind {
            TransactionKind::Deposit => BalanceDirection::Credit,
            TransactionKind::Withdrawal => BalanceDirection::Debit,
            _ => unreachable!(),
        };
        let role = match kind {
            TransactionKind::Deposit => "credit",
            TransactionKind::Withdrawal => "debit",
            _ => unreachable!(),
        };

        let op = BalanceOperation {
            operation_id: operation_id(transaction.transaction_id, role),
            account_id: req.account_id,
            direction,
            amount: req.amount,
            currency: req.currency.clone(),
            reason: format!("{kind:?}").to_uppercase(),
            label: req.description.clone(),
            credit_balancing: kind == TransactionKind::Deposit,
        };

        match self.gateway.apply_balance_operation(op).await {
            Ok(_) => self.finalize(transaction, TransactionStatus::Completed, None).await,
            Err(err) => {
                self.finalize(transaction, TransactionStatus::Failed, Some(&err))
                    .await?;
                Err(err)
            }
        }
    }

    /// spec.md §4.5.2, TRANSFER.
    pub async fn transfer(&self, req: TransferRequest) -> Result<Transaction> {
        validate_amount_and_currency(req.amount, &req.currency)?;

        if req.from_account_id == req.to_account_id {
            return Err(AppError::Validation(
                "transfer source and destination must differ".to_string(),
            ));
        }
        if req.from_account_id == EXTERNAL_ACCOUNT || req.to_account_id == EXTERNAL_ACCOUNT {
            return Err(AppError::Validation(
                "transfer accounts must not be the EXTERNAL sentinel".to_string(),
            ));
        }

        let normalized_key = req
            .idempotency_key
            .as_deref()
            .map(Transaction::normalize_key);

        if let Some(key) = &normalized_key {
            if let Some(existing) = self
                .ledger
                .find_by_idempotent_key(&req.caller, TransactionKind::Transfer, key)
                .await?
            {
                return Ok(existing);
            }
        }

        let from_snapshot = self.gateway.get_account(req.from_account_id).await?;
        let to_snapshot = self.gateway.get_account(req.to_account_id).await?;

        self.require_same_currency(&from_snapshot, &to_snapshot, &req.currency)?;

        let decision = self
            .limits
            .evaluate(
                req.from_account_id,
                from_snapshot.account_tier,
                TransactionKind::Transfer,
                req.amount,
            )
            .await
            .unwrap_or_else(|err| {
                warn!(%err, "limit evaluator failed, denying fail-closed");
                LimitDecision::Deny("limit evaluator unavailable".to_string())
            });
        if let LimitDecision::Deny(reason) = decision {
            return Err(AppError::LimitExceeded(reason));
        }

        if !from_snapshot.has_sufficient_funds(req.amount) {
            return Err(AppError::InsufficientFunds {
                requested: req.amount,
                available: from_snapshot.available_funds(),
            });
        }

        let intent = Transaction::new_processing(
            TransactionKind::Transfer,
            req.from_account_id,
            req.to_account_id,
            req.amount,
            req.currency.clone(),
            req.description.clone(),
            req.reference.clone(),
            req.caller.clone(),
            normalized_key.clone(),
            None,
        );

        let transaction = match self.ledger.insert(intent).await? {
            InsertOutcome::Inserted(tx) => tx,
            InsertOutcome::Conflict(_) => {
                let key = normalized_key
                    .as_deref()
                    .expect("unique violation implies a non-null idempotency key");
                return self
                    .ledger
                    .find_by_idempotent_key(&req.caller, TransactionKind::Transfer, key)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(anyhow::anyhow!(
                            "idempotency conflict reported but winning row not found"
                        ))
                    });
            }
        };

        self.audit
            .record(AuditEvent::new(
                transaction.transaction_id,
                transaction.transaction_id,
                &req.caller,
                TransactionKind::Transfer,
                req.from_account_id,
                req.to_account_id,
                req.amount,
                TransactionStatus::Processing,
                Outcome::Initiated,
                None,
            ))
            .await;

        let debit = BalanceOperation {
            operation_id: operation_id(transaction.transaction_id, "debit"),
            account_id: req.from_account_id,
            direction: BalanceDirection::Debit,
            amount: req.amount,
            currency: req.currency.clone(),
            reason: "TRANSFER_DEBIT".to_string(),
            label: req.description.clone(),
            credit_balancing: false,
        };

        if let Err(err) = self.gateway.apply_balance_operation(debit).await {
            self.finalize(transaction, TransactionStatus::Failed, Some(&err))
                .await?;
            return Err(err);
        }

        let credit = BalanceOperation {
            operation_id: operation_id(transaction.transaction_id, "credit"),
            account_id: req.to_account_id,
            direction: BalanceDirection::Credit,
            amount: req.amount,
            currency: req.currency.clone(),
            reason: "TRANSFER_CREDIT".to_string(),
            label: req.description.clone(),
            credit_balancing: true,
        };

        match self.gateway.apply_balance_operation(credit).await {
            Ok(_) => self.finalize(transaction, TransactionStatus::Completed, None).await,
            Err(credit_err) => {
                let compensate = BalanceOperation {
                    operation_id: operation_id(transaction.transaction_id, "compensate"),
                    account_id: req.from_account_id,
                    direction: BalanceDirection::Credit,
                    amount: req.amount,
                    currency: req.currency.clone(),
                    reason: "TRANSFER_COMPENSATE".to_string(),
                    label: req.description.clone(),
                    credit_balancing: true,
                };

                match self.gateway.apply_balance_operation(compensate).await {
                    Ok(_) => {
                        self.finalize(transaction, TransactionStatus::Failed, Some(&credit_err))
                            .await?;
                        Err(credit_err)
                    }
                    Err(compensate_err) => {
                        error!(
                            transaction_id = %transaction.transaction_id,
                            %credit_err,
                            %compensate_err,
                            "transfer compensation failed, manual action required"
                        );
                        self.finalize(
                            transaction,
                            TransactionStatus::FailedRequiresManualAction,
                            Some(&compensate_err),
                        )
                        .await?;
                        Err(AppError::FailedRequiresManualAction(format!(
                            "credit failed ({credit_err}) and compensation failed ({compensate_err})"
                        )))
                    }
                }
            }
        }
    }

    /// spec.md §4.5.3, REVERSAL.
    pub async fn reverse(&self, req: ReversalRequest) -> Result<Transaction> {
        let normalized_key = req
            .idempotency_key
            .as_deref()
            .map(Transaction::normalize_key);

        if let Some(key) = &normalized_key {
            if let Some(existing) = self
                .ledger
                .find_by_idempotent_key(&req.caller, TransactionKind::Reversal, key)
                .await?
            {
                return Ok(existing);
            }
        }

        let original_id = req.original_transaction_id;
        let caller = req.caller.clone();
        let reason = req.reason.clone();
        let key_for_row = normalized_key.clone();
        let now = Utc::now();

        let reversal = self
            .ledger
            .insert_reversal(
                original_id,
                now,
                ChronoDuration::days(REVERSAL_WINDOW_DAYS),
                move |original| build_reversal(original, &caller, &reason, key_for_row.clone()),
            )
            .await?;

        self.audit
            .record(AuditEvent::new(
                reversal.transaction_id,
                reversal.transaction_id,
                &req.caller,
                TransactionKind::Reversal,
                reversal.from_account_id,
                reversal.to_account_id,
                reversal.amount,
                TransactionStatus::Processing,
                Outcome::Initiated,
                None,
            ))
            .await;

        let debit = BalanceOperation {
            operation_id: operation_id(reversal.transaction_id, "debit"),
            account_id: reversal.from_account_id,
            direction: BalanceDirection::Debit,
            amount: reversal.amount,
            currency: reversal.currency.clone(),
            reason: "REVERSAL_DEBIT".to_string(),
            label: reversal.description.clone(),
            credit_balancing: false,
        };

        let debit_result = if reversal.from_account_id == EXTERNAL_ACCOUNT {
            // Reversing a WITHDRAWAL: the debit leg is a no-op against the
            // sentinel, nothing to call the gateway for.
            Ok(())
        } else {
            self.gateway.apply_balance_operation(debit).await.map(|_| ())
        };

        if let Err(debit_err) = debit_result {
            self.finalize_reversal_failure(&reversal, &debit_err).await?;
            return Err(debit_err);
        }

        let credit = BalanceOperation {
            operation_id: operation_id(reversal.transaction_id, "credit"),
            account_id: reversal.to_account_id,
            direction: BalanceDirection::Credit,
            amount: reversal.amount,
            currency: reversal.currency.clone(),
            reason: "REVERSAL_CREDIT".to_string(),
            label: reversal.description.clone(),
            credit_balancing: true,
        };

        let credit_result = if reversal.to_account_id == EXTERNAL_ACCOUNT {
            Ok(())
        } else {
            self.gateway.apply_balance_operation(credit).await.map(|_| ())
        };

        match credit_result {
            Ok(()) => {
                self.ledger
                    .complete_reversal(reversal.transaction_id, original_id, Utc::now())
                    .await?;
                self.audit
                    .record(AuditEvent::new(
                        reversal.transaction_id,
                        reversal.transaction_id,
                        &req.caller,
                        TransactionKind::Reversal,
                        reversal.from_account_id,
                        reversal.to_account_id,
                        reversal.amount,
                        TransactionStatus::Completed,
                        Outcome::Reversed,
                        None,
                    ))
                    .await;
                Ok(Transaction {
                    status: TransactionStatus::Completed,
                    processed_at: Some(Utc::now()),
                    ..reversal
                })
            }
            Err(credit_err) => {
                if reversal.from_account_id != EXTERNAL_ACCOUNT {
                    let compensate = BalanceOperation {
                        operation_id: operation_id(reversal.transaction_id, "compensate"),
                        account_id: reversal.from_account_id,
                        direction: BalanceDirection::Credit,
                        amount: reversal.amount,
                        currency: reversal.currency.clone(),
                        reason: "REVERSAL_COMPENSATE".to_string(),
                        label: reversal.description.clone(),
                        credit_balancing: true,
                    };
                    if let Err(compensate_err) =
                        self.gateway.apply_balance_operation(compensate).await
                    {
                        error!(
                            transaction_id = %reversal.transaction_id,
                            %credit_err,
                            %compensate_err,
                            "reversal compensation failed"
                        );
                    }
                }
                self.finalize_reversal_failure(&reversal, &credit_err).await?;
                Err(credit_err)
            }
        }
    }

    /// spec.md §4.5.3 step 6: any gateway failure during reversal
    /// application leaves the reversal row FAILED_REQUIRES_MANUAL_ACTION
    /// and the original untouched (still COMPLETED, never REVERSED).
    async fn finalize_reversal_failure(&self, reversal: &Transaction, err: &AppError) -> Result<()> {
        self.ledger
            .update_status(
                reversal.transaction_id,
                TransactionStatus::FailedRequiresManualAction,
                Utc::now(),
            )
            .await?;
        self.audit
            .record(AuditEvent::new(
                reversal.transaction_id,
                reversal.transaction_id,
                &reversal.created_by,
                TransactionKind::Reversal,
                reversal.from_account_id,
                reversal.to_account_id,
                reversal.amount,
                TransactionStatus::FailedRequiresManualAction,
                Outcome::Failed,
                Some(err.reason_code()),
            ))
            .await;
        Ok(())
    }

    async fn finalize(
        &self,
        transaction: Transaction,
        status: TransactionStatus,
        err: Option<&AppError>,
    ) -> Result<Transaction> {
        let now = Utc::now();
        self.ledger
            .update_status(transaction.transaction_id, status, now)
            .await?;

        let outcome = match status {
            TransactionStatus::Completed => Outcome::Completed,
            _ => Outcome::Failed,
        };

        self.audit
            .record(AuditEvent::new(
                transaction.transaction_id,
                transaction.transaction_id,
                &transaction.created_by,
                transaction.kind,
                transaction.from_account_id,
                transaction.to_account_id,
                transaction.amount,
                status,
                outcome,
                err.map(|e| e.reason_code()),
            ))
            .await;

        Ok(Transaction {
            status,
            processed_at: Some(now),
            ..transaction
        })
    }

    fn require_same_currency(
        &self,
        from: &AccountSnapshot,
        to: &AccountSnapshot,
        requested: &str,
    ) -> Result<()> {
        if from.currency != requested || to.currency != requested || from.currency != to.currency {
            return Err(AppError::Validation(
                "cross-currency transfers are not supported".to_string(),
            ));
        }
        Ok(())
    }

    fn authorize(&self, owner: &str, authorized: &AuthorizedCaller) -> Result<()> {
        if authorized.elevated || owner == authorized.caller {
            Ok(())
        } else {
            Err(AppError::NotFound("transaction not found".to_string()))
        }
    }

    /// spec.md §4.5.5.
    pub async fn get_by_id(&self, transaction_id: Uuid, authorized: &AuthorizedCaller) -> Result<Transaction> {
        let transaction = self
            .ledger
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(transaction_id.to_string()))?;
        self.authorize(&transaction.created_by, authorized)?;
        Ok(transaction)
    }

    pub async fn get_by_caller(
        &self,
        authorized: &AuthorizedCaller,
        page: Pagination,
    ) -> Result<PagedResult<Transaction>> {
        let filter = TransactionFilter {
            created_by: Some(authorized.caller.clone()),
            ..Default::default()
        };
        self.ledger.search(&filter, page).await
    }

    pub async fn get_by_account(
        &self,
        account_id: Uuid,
        authorized: &AuthorizedCaller,
        page: Pagination,
    ) -> Result<PagedResult<Transaction>> {
        let filter = TransactionFilter {
            account_id: Some(account_id),
            created_by: if authorized.elevated {
                None
            } else {
                Some(authorized.caller.clone())
            },
            ..Default::default()
        };
        self.ledger.search(&filter, page).await
    }

    pub async fn search(&self, req: SearchRequest) -> Result<PagedResult<Transaction>> {
        let mut filter = req.filter;
        if !req.authorized.elevated {
            filter.created_by = Some(req.authorized.caller.clone());
        }
        self.ledger.search(&filter, req.page).await
    }
}

/// spec.md §4.5.3 step 4: "Compute reversal legs: for TRANSFER, swap
/// from/to; for DEPOSIT, debit the destination to EXTERNAL; for
/// WITHDRAWAL, credit the source from EXTERNAL." FEE follows the
/// WITHDRAWAL pattern (it debited the account) and INTEREST follows the
/// DEPOSIT pattern (it credited the account) - the spec doesn't name
/// these two explicitly, but the invariant in `TransactionKind::
/// is_reversible` admits them, so this is the only consistent reading.
fn build_reversal(
    original: &Transaction,
    caller: &str,
    reason: &str,
    idempotency_key: Option<String>,
) -> Transaction {
    let (from_account_id, to_account_id) = match original.kind {
        TransactionKind::Transfer => (original.to_account_id, original.from_account_id),
        TransactionKind::Deposit | TransactionKind::Interest => {
            (original.to_account_id, EXTERNAL_ACCOUNT)
        }
        TransactionKind::Withdrawal | TransactionKind::Fee => {
            (EXTERNAL_ACCOUNT, original.from_account_id)
        }
        TransactionKind::Reversal => unreachable!("insert_reversal rejects reversal-of-reversal"),
    };

    Transaction::new_processing(
        TransactionKind::Reversal,
        from_account_id,
        to_account_id,
        original.amount,
        original.currency.clone(),
        format!("reversal of {}: {}", original.transaction_id, reason),
        original.reference.clone(),
        caller.to_string(),
        idempotency_key,
        Some(original.transaction_id),
    )
}
