use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::limits::{LimitDecision, LimitEvaluator};
use crate::models::{AccountTier, TransactionKind, TransactionLimit};

/// PostgreSQL-backed Limit Evaluator (spec.md §4.2).
///
/// Day/month boundaries are computed calendar-local at `timezone`
/// (spec.md: "Day and month boundaries are calendar-local at the
/// service's configured time zone"), then converted back to UTC for
/// the ledger aggregate queries.
pub struct PgLimitEvaluator {
    pool: PgPool,
    timezone: Tz,
}

impl PgLimitEvaluator {
    pub fn new(pool: PgPool, timezone: Tz) -> Self {
        Self { pool, timezone }
    }

    fn day_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.timezone);
        let midnight = local.date_naive().and_hms_opt(0, 0, 0).unwrap();
        self.timezone
            .from_local_datetime(&midnight)
            .single()
            .unwrap_or(local)
            .with_timezone(&Utc)
    }

    fn month_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.timezone);
        let first_of_month = local
            .date_naive()
            .with_day(1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        self.timezone
            .from_local_datetime(&first_of_month)
            .single()
            .unwrap_or(local)
            .with_timezone(&Utc)
    }

    async fn find_limit(
        &self,
        account_tier: AccountTier,
        kind: TransactionKind,
    ) -> Result<Option<TransactionLimit>> {
        let row = sqlx::query_as::<_, TransactionLimit>(
            "SELECT account_tier, kind, per_operation_cap, daily_amount_cap, monthly_amount_cap, \
             daily_count_cap, monthly_count_cap, active \
             FROM transaction_limits WHERE account_tier = $1 AND kind = $2",
        )
        .bind(account_tier)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn sum_since(
        &self,
        account_id: Uuid,
        kind: TransactionKind,
        since: DateTime<Utc>,
    ) -> Result<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            "SELECT SUM(amount) FROM transactions \
             WHERE (from_account_id = $1 OR to_account_id = $1) \
             AND kind = $2 AND status = 'COMPLETED' AND created_at >= $3",
        )
        .bind(account_id)
        .bind(kind)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.unwrap_or(Decimal::ZERO))
    }

    async fn count_since(
        &self,
        account_id: Uuid,
        kind: TransactionKind,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transactions \
             WHERE (from_account_id = $1 OR to_account_id = $1) \
             AND kind = $2 AND status = 'COMPLETED' AND created_at >= $3",
        )
        .bind(account_id)
        .bind(kind)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl LimitEvaluator for PgLimitEvaluator {
    async fn evaluate(
        &self,
        account_id: Uuid,
        account_tier: AccountTier,
        kind: TransactionKind,
        amount: Decimal,
    ) -> Result<LimitDecision> {
        let Some(limit) = self.find_limit(account_tier, kind).await? else {
            return Ok(LimitDecision::Allow);
        };

        if !limit.active {
            return Ok(LimitDecision::Allow);
        }

        if let Some(cap) = limit.per_operation_cap {
            if amount > cap {
                return Ok(LimitDecision::Deny(format!(
                    "amount {amount} exceeds per-operation cap {cap}"
                )));
            }
        }

        let now = Utc::now();

        if let Some(cap) = limit.daily_amount_cap {
            let spent = self
                .sum_since(account_id, kind, self.day_start(now))
                .await?;
            if spent + amount > cap {
                return Ok(LimitDecision::Deny(format!(
                    "daily amount cap {cap} would be exceeded"
                )));
            }
        }

        if let Some(cap) = limit.daily_count_cap {
            let count = self
                .count_since(account_id, kind, self.day_start(now))
                .await?;
            if count >= cap {
                return Ok(LimitDecision::Deny(format!(
                    "daily count cap {cap} reached"
                )));
            }
        }

        if let Some(cap) = limit.monthly_amount_cap {
            let spent = self
                .sum_since(account_id, kind, self.month_start(now))
                .await?;
            if spent + amount > cap {
                return Ok(LimitDecision::Deny(format!(
                    "monthly amount cap {cap} would be exceeded"
                )));
            }
        }

        if let Some(cap) = limit.monthly_count_cap {
            let count = self
                .count_since(account_id, kind, self.month_start(now))
                .await?;
            if count >= cap {
                return Ok(LimitDecision::Deny(format!(
                    "monthly count cap {cap} reached"
                )));
            }
        }

        Ok(LimitDecision::Allow)
    }
}
