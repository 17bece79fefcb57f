use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::audit::{AuditEvent, AuditSink, Outcome};
use crate::config::SweeperSettings;
use crate::error::{ReasonCode, Result};
use crate::ledger::LedgerStore;
use crate::models::TransactionStatus;

/// Background job guarding against a crashed Engine invocation that
/// inserted a PROCESSING row and never reached a terminal status
/// (spec.md §4.5.4). Mirrors the teacher's `IdempotencyCleanupJob`
/// shape: an `Arc`-held dependency, a fixed interval, a `run_once`
/// method, and a `start` that hands back a `JoinHandle`.
pub struct Sweeper<L: LedgerStore, A: AuditSink> {
    ledger: Arc<L>,
    audit: Arc<A>,
    settings: SweeperSettings,
}

impl<L: LedgerStore + 'static, A: AuditSink + 'static> Sweeper<L, A> {
    pub fn new(ledger: Arc<L>, audit: Arc<A>, settings: SweeperSettings) -> Self {
        Self {
            ledger,
            audit,
            settings,
        }
    }

    /// Fails every transaction stuck in PROCESSING older than the
    /// configured cutoff (spec.md §4.5.4), recording `STUCK_TIMEOUT` on
    /// each. Returns the number swept, for tests and logging.
    pub async fn run_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.settings.stuck_after_seconds);
        let stuck = self.ledger.find_pending_older_than(cutoff).await?;

        let mut swept = 0;
        for transaction in stuck {
            let now = Utc::now();
            match self
                .ledger
                .update_status(transaction.transaction_id, TransactionStatus::Failed, now)
                .await
            {
                Ok(()) => {
                    swept += 1;
                    warn!(
                        transaction_id = %transaction.transaction_id,
                        "sweeper: marked stuck transaction FAILED"
                    );
                    self.audit
                        .record(AuditEvent::new(
                            transaction.transaction_id,
                            transaction.transaction_id,
                            &transaction.created_by,
                            transaction.kind,
                            transaction.from_account_id,
                            transaction.to_account_id,
                            transaction.amount,
                            TransactionStatus::Failed,
                            Outcome::Failed,
                            Some(ReasonCode::StuckTimeout),
                        ))
                        .await;
                }
                Err(err) => {
                    // Another request (or a concurrent sweeper tick) already
                    // moved this row out of PROCESSING; nothing to do.
                    warn!(transaction_id = %transaction.transaction_id, %err, "sweeper: skip, already terminal");
                }
            }
        }

        Ok(swept)
    }

    /// Spawns the periodic sweep loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(self.settings.interval_seconds));
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                match self.run_once().await {
                    Ok(0) => {}
                    Ok(n) => info!(count = n, "sweeper: swept stuck transactions"),
                    Err(err) => warn!(%err, "sweeper: run failed"),
                }
            }
        })
    }
}
