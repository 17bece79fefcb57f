use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::TransactionKind;

/// Externally-managed account classification used purely as a limit
/// lookup key (spec.md §3: `TransactionLimit` is keyed `(accountType,
/// kind)`). The Account Service, not this core, is authoritative for
/// what an account's tier actually is; the Account Gateway's
/// `AccountSnapshot` carries it back on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_tier", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountTier {
    Checking,
    Savings,
    Credit,
    Business,
}

/// Cap configuration for a `(accountType, kind)` pair (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionLimit {
    pub account_tier: AccountTier,
    pub kind: TransactionKind,
    pub per_operation_cap: Option<Decimal>,
    pub daily_amount_cap: Option<Decimal>,
    pub monthly_amount_cap: Option<Decimal>,
    pub daily_count_cap: Option<i64>,
    pub monthly_count_cap: Option<i64>,
    pub active: bool,
}

impl TransactionLimit {
    pub fn new(account_tier: AccountTier, kind: TransactionKind) -> Self {
        Self {
            account_tier,
            kind,
            per_operation_cap: None,
            daily_amount_cap: None,
            monthly_amount_cap: None,
            daily_count_cap: None,
            monthly_count_cap: None,
            active: true,
        }
    }

    pub fn with_per_operation_cap(mut self, cap: Decimal) -> Self {
        self.per_operation_cap = Some(cap);
        self
    }

    pub fn with_daily_amount_cap(mut self, cap: Decimal) -> Self {
        self.daily_amount_cap = Some(cap);
        self
    }

    pub fn with_monthly_amount_cap(mut self, cap: Decimal) -> Self {
        self.monthly_amount_cap = Some(cap);
        self
    }

    pub fn with_daily_count_cap(mut self, cap: i64) -> Self {
        self.daily_count_cap = Some(cap);
        self
    }

    pub fn with_monthly_count_cap(mut self, cap: i64) -> Self {
        self.monthly_count_cap = Some(cap);
        self
    }
}
