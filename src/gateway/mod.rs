pub mod circuit_breaker;
pub mod http;

pub use circuit_breaker::CircuitBreaker;
pub use http::HttpAccountGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::AccountSnapshot;

/// Direction of a balance movement sent to the Account Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceDirection {
    Debit,
    Credit,
}

/// A single balance movement request. `operation_id` is the idempotency
/// key the Account Service deduplicates on; the engine derives a
/// distinct suffix per leg of a transfer (`"<id>:debit"`,
/// `"<id>:credit"`, `"<id>:compensate"`) so each call is independently
/// retriable without double-applying.
#[derive(Debug, Clone)]
pub struct BalanceOperation {
    pub operation_id: String,
    pub account_id: Uuid,
    pub direction: BalanceDirection,
    pub amount: Decimal,
    pub currency: String,
    /// Categorised reason (e.g. `"DEPOSIT"`, `"TRANSFER_DEBIT"`,
    /// `"TRANSFER_COMPENSATE"`) forwarded to the Account Service for its
    /// own audit trail.
    pub reason: String,
    /// Free-form label, usually the caller-supplied description.
    pub label: String,
    /// When true, permits the remote to apply the delta without its
    /// own overflow/availability checks (spec.md §4.3: "used for the
    /// credit side of transfers, deposits, and credit-leg reversals").
    pub credit_balancing: bool,
}

impl BalanceOperation {
    pub fn signed_delta(&self) -> Decimal {
        match self.direction {
            BalanceDirection::Debit => -self.amount,
            BalanceDirection::Credit => self.amount,
        }
    }
}

/// Result of a balance mutation (spec.md §6: `{accountId, operationId,
/// applied, newBalance, version, status}`). Distinct from
/// [`AccountSnapshot`] because the Account Service's balance-operations
/// endpoint doesn't echo account tier/availability.
#[derive(Debug, Clone)]
pub struct BalanceOpResult {
    pub account_id: Uuid,
    pub operation_id: String,
    pub applied: bool,
    pub new_balance: Decimal,
    pub version: i64,
    /// True when this call observed a replay of a prior identical
    /// `operation_id` rather than a fresh application (spec.md §4.3:
    /// "replaying with the same operationId yields the same ... result").
    pub idempotent_replay: bool,
}

/// Client boundary to the externally-managed account system. This core
/// never stores or computes balances itself; every read and mutation
/// crosses this trait.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    async fn get_account(&self, account_id: Uuid) -> Result<AccountSnapshot>;

    async fn apply_balance_operation(&self, op: BalanceOperation) -> Result<BalanceOpResult>;
}
