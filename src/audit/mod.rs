pub mod kafka;

pub use kafka::KafkaAuditSink;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReasonCode;
use crate::models::{TransactionKind, TransactionStatus};

/// A single lifecycle event for a Transaction (spec.md §4.4): "timestamp,
/// correlation id, caller, kind, from/to/amount, status, outcome, and,
/// on failure, a categorised reason code."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub transaction_id: Uuid,
    pub caller: String,
    pub kind: TransactionKind,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub outcome: Outcome,
    pub reason_code: Option<ReasonCode>,
    /// True for COMPLETED / FAILED / FAILED_REQUIRES_MANUAL_ACTION /
    /// REVERSED; false for an intermediate PROCESSING event. The Audit
    /// Sink's overflow policy (spec.md §4.4) never drops a terminal
    /// event.
    pub terminal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Initiated,
    Completed,
    Failed,
    Reversed,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        correlation_id: Uuid,
        transaction_id: Uuid,
        caller: &str,
        kind: TransactionKind,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        status: TransactionStatus,
        outcome: Outcome,
        reason_code: Option<ReasonCode>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id,
            transaction_id,
            caller: caller.to_string(),
            kind,
            from_account_id,
            to_account_id,
            amount,
            status,
            outcome,
            reason_code,
            terminal: status.is_terminal(),
        }
    }
}

/// Append-only, one-way stream of [`AuditEvent`]s (spec.md §4.4, §9:
/// "Audit never calls back into the Engine"). Implementations must
/// never block the Engine's critical path: `record` returns
/// immediately, buffering internally.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// An `AuditSink` that discards everything; useful for tests and for a
/// deployment with no durable audit transport configured.
pub struct NullAuditSink;

#[async_trait::async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: AuditEvent) {}
}
