pub mod postgres;

pub use postgres::PgLimitEvaluator;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AccountTier, TransactionKind};

/// Outcome of a limit check (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitDecision {
    Allow,
    Deny(String),
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allow)
    }
}

/// Reads ledger aggregates plus configured caps and returns allow/deny
/// (spec.md §4.2). Fails closed: any internal error must be mapped to
/// `Deny` by the caller, never silently treated as `Allow`.
#[async_trait]
pub trait LimitEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        account_id: Uuid,
        account_tier: AccountTier,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<LimitDecision>;
}
