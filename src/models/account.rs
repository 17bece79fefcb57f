use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AccountTier;

/// Read model returned by `AccountGateway::get_account` (spec.md §4.3,
/// §6). The Account Service owns account state; this core only ever
/// reads a snapshot of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub account_tier: AccountTier,
    pub available_credit: Decimal,
    pub active: bool,
}

impl AccountSnapshot {
    /// Funds available to withdraw/debit: plain balance for non-credit
    /// tiers, available credit for `Credit` (spec.md §4.5.1 step 4).
    pub fn available_funds(&self) -> Decimal {
        match self.account_tier {
            AccountTier::Credit => self.available_credit,
            _ => self.balance,
        }
    }

    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        self.available_funds() >= amount
    }
}
