pub mod postgres;

pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Result, UniqueConstraint};
use crate::models::{Transaction, TransactionKind, TransactionStatus};

/// A single parametric filter accepted by `search` (spec.md §4.1: "a
/// single parametric query accepting account, kind, status, date
/// range, amount range, description substring, and reference").
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<Uuid>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub description_contains: Option<String>,
    pub reference: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }
    }
}

#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
}

/// Outcome of a raw `insert`: either the row landed, or one of the two
/// unique constraints fired (spec.md §4.1, §9: "a discriminated result
/// carrying either the saved row or a `UniqueViolation(constraintName)`
/// the Engine branches on").
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(Transaction),
    Conflict(UniqueConstraint),
}

/// Durable, strongly-consistent persistence for Transactions, with the
/// two unique constraints of spec.md §3 enforced at write time
/// (spec.md §4.1).
///
/// Implementations are not required to be `dyn`-safe: the Transaction
/// Engine is generic over this trait so the reversal path's generic
/// `build_reversal` closure stays a plain synchronous `Fn`, not a boxed
/// trait object.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_idempotent_key(
        &self,
        created_by: &str,
        kind: TransactionKind,
        normalised_key: &str,
    ) -> Result<Option<Transaction>>;

    async fn insert(&self, transaction: Transaction) -> Result<InsertOutcome>;

    async fn update_status(
        &self,
        transaction_id: Uuid,
        new_status: TransactionStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>>;

    async fn find_reversals_of(&self, original_id: Uuid) -> Result<Vec<Transaction>>;

    async fn is_reversed(&self, original_id: Uuid) -> Result<bool>;

    async fn find_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>>;

    /// Sum of COMPLETED transaction amounts for `account_id` of `kind`
    /// since `since` (spec.md §4.1, used by the Limit Evaluator).
    async fn sum_completed_amount(
        &self,
        account_id: Uuid,
        kind: TransactionKind,
        since: DateTime<Utc>,
    ) -> Result<Decimal>;

    /// Count of COMPLETED transactions for `account_id` of `kind` since
    /// `since` (spec.md §4.1).
    async fn count_completed(
        &self,
        account_id: Uuid,
        kind: TransactionKind,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    async fn search(
        &self,
        filter: &TransactionFilter,
        page: Pagination,
    ) -> Result<PagedResult<Transaction>>;

    /// Atomically performs the whole reversal eligibility-and-insert
    /// critical section (spec.md §4.5.3 steps 2–5):
    ///
    /// 1. Row-lock the original for the duration of this call.
    /// 2. Apply the eligibility gates (status, kind, age, not-already-
    ///    reversed) against the locked row.
    /// 3. Build the reversal row via `build_reversal` and insert it.
    ///
    /// `build_reversal` is a pure, synchronous transform (swap/derive
    /// from/to accounts) — it never performs IO, so holding it across
    /// the store's transaction is safe and keeps the row lock's
    /// lifetime exactly matching the design note in spec.md §9.
    async fn insert_reversal<F>(
        &self,
        original_id: Uuid,
        now: DateTime<Utc>,
        max_age: Duration,
        build_reversal: F,
    ) -> Result<Transaction>
    where
        F: Fn(&Transaction) -> Transaction + Send + Sync;

    /// Finalises a successful reversal: marks the reversal row COMPLETED
    /// and the original REVERSED in one store transaction (spec.md
    /// §4.5.3 step 7).
    async fn complete_reversal(
        &self,
        reversal_id: Uuid,
        original_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;
}
