use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sentinel account identifier used as the counter-party for deposits
/// (source) and withdrawals (destination). Reserved: never a real
/// account, per spec.md GLOSSARY.
pub const EXTERNAL_ACCOUNT: Uuid = Uuid::nil();

/// Kind of transaction the core can process (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    Reversal,
    Fee,
    Interest,
}

impl TransactionKind {
    /// Reversal rows never themselves admit a reversal (spec.md §4.5.3:
    /// "cannot reverse a reversal").
    pub fn is_reversible(&self) -> bool {
        !matches!(self, TransactionKind::Reversal)
    }
}

/// Lifecycle status of a transaction (spec.md §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
    FailedRequiresManualAction,
    Reversed,
}

impl TransactionStatus {
    /// Terminal states are absorbing (spec.md invariant 3 / §4.6).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Processing)
    }
}

/// The central ledger entity (spec.md §3). Never deleted; a reversal is
/// a new row, not a mutation of the original.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub transaction_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub reference: Option<String>,
    pub created_by: String,
    /// Normalised (trimmed + upper-cased) idempotency key; `None` when
    /// the caller didn't supply one. Together with `(created_by, kind)`
    /// this forms the idempotency unique constraint (spec.md §3).
    pub idempotency_key: Option<String>,
    /// Set only on REVERSAL rows (spec.md §3).
    pub original_transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new_processing(
        kind: TransactionKind,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        currency: String,
        description: String,
        reference: Option<String>,
        created_by: String,
        idempotency_key: Option<String>,
        original_transaction_id: Option<Uuid>,
    ) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            kind,
            status: TransactionStatus::Processing,
            from_account_id,
            to_account_id,
            amount,
            currency,
            description,
            reference,
            created_by,
            idempotency_key,
            original_transaction_id,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// Normalises a caller-supplied idempotency key: trim then
    /// upper-case (spec.md §4.5.1 step 1).
    pub fn normalize_key(raw: &str) -> String {
        raw.trim().to_uppercase()
    }

    pub fn is_reversal(&self) -> bool {
        self.kind == TransactionKind::Reversal
    }
}
