use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::{Pagination, TransactionFilter};

/// Input to [`super::TransactionEngine::deposit`] / [`super::TransactionEngine::withdraw`]
/// (spec.md §4.5.1).
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub reference: Option<String>,
    pub caller: String,
    pub idempotency_key: Option<String>,
}

pub type WithdrawalRequest = DepositRequest;

/// Input to [`super::TransactionEngine::transfer`] (spec.md §4.5.2).
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub reference: Option<String>,
    pub caller: String,
    pub idempotency_key: Option<String>,
}

/// Input to [`super::TransactionEngine::reverse`] (spec.md §4.5.3).
#[derive(Debug, Clone)]
pub struct ReversalRequest {
    pub original_transaction_id: Uuid,
    pub reason: String,
    pub caller: String,
    pub idempotency_key: Option<String>,
}

/// Caller identity + authorization level threaded through every query
/// operation (spec.md §4.5.5: "the caller may only see rows where
/// created_by == caller or the caller holds an elevated role").
#[derive(Debug, Clone)]
pub struct AuthorizedCaller {
    pub caller: String,
    pub elevated: bool,
}

impl AuthorizedCaller {
    pub fn new(caller: impl Into<String>, elevated: bool) -> Self {
        Self {
            caller: caller.into(),
            elevated,
        }
    }
}

/// Input to [`super::TransactionEngine::search`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub filter: TransactionFilter,
    pub authorized: AuthorizedCaller,
    pub page: Pagination,
}
