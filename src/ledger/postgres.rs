use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result, UniqueConstraint};
use crate::ledger::{InsertOutcome, LedgerStore, PagedResult, Pagination, TransactionFilter};
use crate::models::{Transaction, TransactionKind, TransactionStatus};

const COLUMNS: &str = "transaction_id, kind, status, from_account_id, to_account_id, amount, \
    currency, description, reference, created_by, idempotency_key, original_transaction_id, \
    created_at, processed_at";

/// PostgreSQL-backed Ledger Store (spec.md §4.1, §6).
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_by_idempotent_key(
        &self,
        created_by: &str,
        kind: TransactionKind,
        normalised_key: &str,
    ) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {COLUMNS} FROM transactions \
             WHERE created_by = $1 AND kind = $2 AND idempotency_key = $3"
        );
        let row = sqlx::query_as::<_, Transaction>(&query)
            .bind(created_by)
            .bind(kind)
            .bind(normalised_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert(&self, transaction: Transaction) -> Result<InsertOutcome> {
        let query = format!(
            "INSERT INTO transactions ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {COLUMNS}"
        );
        let result = sqlx::query_as::<_, Transaction>(&query)
            .bind(transaction.transaction_id)
            .bind(transaction.kind)
            .bind(transaction.status)
            .bind(transaction.from_account_id)
            .bind(transaction.to_account_id)
            .bind(transaction.amount)
            .bind(&transaction.currency)
            .bind(&transaction.description)
            .bind(&transaction.reference)
            .bind(&transaction.created_by)
            .bind(&transaction.idempotency_key)
            .bind(transaction.original_transaction_id)
            .bind(transaction.created_at)
            .bind(transaction.processed_at)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Inserted(row)),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                match db_err.constraint() {
                    Some("uk_transaction_idempotency_key") => {
                        Ok(InsertOutcome::Conflict(UniqueConstraint::IdempotencyKey))
                    }
                    Some("uk_reversal_per_original_transaction") => Ok(InsertOutcome::Conflict(
                        UniqueConstraint::ReversalPerOriginal,
                    )),
                    _ => Err(AppError::Database(sqlx::Error::Database(db_err))),
                }
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn update_status(
        &self,
        transaction_id: Uuid,
        new_status: TransactionStatus,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2, processed_at = $3 \
             WHERE transaction_id = $1 AND status = 'PROCESSING'",
        )
        .bind(transaction_id)
        .bind(new_status)
        .bind(processed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "transaction {transaction_id} is not in a PROCESSING state"
            )));
        }
        Ok(())
    }

    async fn find_by_id(&self, transaction_id: Uuid) -> Result<Option<Transaction>> {
        let query = format!("SELECT {COLUMNS} FROM transactions WHERE transaction_id = $1");
        let row = sqlx::query_as::<_, Transaction>(&query)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_reversals_of(&self, original_id: Uuid) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {COLUMNS} FROM transactions \
             WHERE original_transaction_id = $1 AND kind = 'REVERSAL' \
             ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, Transaction>(&query)
            .bind(original_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn is_reversed(&self, original_id: Uuid) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM transactions \
             WHERE original_transaction_id = $1 AND kind = 'REVERSAL' \
             AND status IN ('PROCESSING', 'COMPLETED'))",
        )
        .bind(original_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    async fn find_pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {COLUMNS} FROM transactions \
             WHERE status = 'PROCESSING' AND created_at < $1 \
             ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, Transaction>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn sum_completed_amount(
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

    async fn count_completed(
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

    async fn search(
        &self,
        filter: &TransactionFilter,
        page: Pagination,
    ) -> Result<PagedResult<Transaction>> {
        // A single parametric query; every predicate is `$n::type IS NULL OR ...`
        // so the database, not this process, applies the filter
        // (spec.md §4.1: "No in-memory filtering over unbounded result
        // sets is permitted").
        let query = format!(
            "SELECT {COLUMNS} FROM transactions \
             WHERE ($1::uuid IS NULL OR from_account_id = $1 OR to_account_id = $1) \
             AND ($2::transaction_kind IS NULL OR kind = $2) \
             AND ($3::transaction_status IS NULL OR status = $3) \
             AND ($4::timestamptz IS NULL OR created_at >= $4) \
             AND ($5::timestamptz IS NULL OR created_at < $5) \
             AND ($6::numeric IS NULL OR amount >= $6) \
             AND ($7::numeric IS NULL OR amount <= $7) \
             AND ($8::text IS NULL OR description ILIKE '%' || $8 || '%') \
             AND ($9::text IS NULL OR reference = $9) \
             AND ($10::text IS NULL OR created_by = $10) \
             ORDER BY created_at DESC \
             LIMIT $11 OFFSET $12"
        );
        let items = sqlx::query_as::<_, Transaction>(&query)
            .bind(filter.account_id)
            .bind(filter.kind)
            .bind(filter.status)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .bind(filter.min_amount)
            .bind(filter.max_amount)
            .bind(&filter.description_contains)
            .bind(&filter.reference)
            .bind(&filter.created_by)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let count_query = "SELECT COUNT(*) FROM transactions \
             WHERE ($1::uuid IS NULL OR from_account_id = $1 OR to_account_id = $1) \
             AND ($2::transaction_kind IS NULL OR kind = $2) \
             AND ($3::transaction_status IS NULL OR status = $3) \
             AND ($4::timestamptz IS NULL OR created_at >= $4) \
             AND ($5::timestamptz IS NULL OR created_at < $5) \
             AND ($6::numeric IS NULL OR amount >= $6) \
             AND ($7::numeric IS NULL OR amount <= $7) \
             AND ($8::text IS NULL OR description ILIKE '%' || $8 || '%') \
             AND ($9::text IS NULL OR reference = $9) \
             AND ($10::text IS NULL OR created_by = $10)";
        let total: (i64,) = sqlx::query_as(count_query)
            .bind(filter.account_id)
            .bind(filter.kind)
            .bind(filter.status)
            .bind(filter.created_after)
            .bind(filter.created_before)
            .bind(filter.min_amount)
            .bind(filter.max_amount)
            .bind(&filter.description_contains)
            .bind(&filter.reference)
            .bind(&filter.created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(PagedResult {
            items,
            total: total.0,
        })
    }

    async fn insert_reversal<F>(
        &self,
        original_id: Uuid,
        now: DateTime<Utc>,
        max_age: Duration,
        build_reversal: F,
    ) -> Result<Transaction>
    where
        F: Fn(&Transaction) -> Transaction + Send + Sync,
    {
        let mut tx = self.pool.begin().await?;

        let lock_query = format!("SELECT {COLUMNS} FROM transactions WHERE transaction_id = $1 FOR UPDATE");
        let original = sqlx::query_as::<_, Transaction>(&lock_query)
            .bind(original_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {original_id} not found")))?;

        if original.status != TransactionStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "transaction {original_id} is not COMPLETED"
            )));
        }
        if !original.kind.is_reversible() {
            return Err(AppError::InvalidState(
                "cannot reverse a reversal".to_string(),
            ));
        }
        if now - original.created_at > max_age {
            return Err(AppError::InvalidState(format!(
                "transaction {original_id} is older than the reversal window"
            )));
        }

        let already: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM transactions \
             WHERE original_transaction_id = $1 AND kind = 'REVERSAL' \
             AND status IN ('PROCESSING', 'COMPLETED'))",
        )
        .bind(original_id)
        .fetch_one(&mut *tx)
        .await?;
        if already.0 {
            return Err(AppError::AlreadyReversed(original_id));
        }

        let reversal = build_reversal(&original);

        let insert_query = format!(
            "INSERT INTO transactions ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Transaction>(&insert_query)
            .bind(reversal.transaction_id)
            .bind(reversal.kind)
            .bind(reversal.status)
            .bind(reversal.from_account_id)
            .bind(reversal.to_account_id)
            .bind(reversal.amount)
            .bind(&reversal.currency)
            .bind(&reversal.description)
            .bind(&reversal.reference)
            .bind(&reversal.created_by)
            .bind(&reversal.idempotency_key)
            .bind(reversal.original_transaction_id)
            .bind(reversal.created_at)
            .bind(reversal.processed_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err)
                    if db_err.code().as_deref() == Some("23505")
                        && db_err.constraint() == Some("uk_reversal_per_original_transaction") =>
                {
                    AppError::AlreadyReversed(original_id)
                }
                other => AppError::Database(other),
            })?;

        tx.commit().await?;
        Ok(inserted)
    }

    async fn complete_reversal(
        &self,
        reversal_id: Uuid,
        original_id: Uuid,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE transactions SET status = 'COMPLETED', processed_at = $2 \
             WHERE transaction_id = $1 AND status = 'PROCESSING'",
        )
        .bind(reversal_id)
        .bind(processed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE transactions SET status = 'REVERSED', processed_at = $2 \
             WHERE transaction_id = $1 AND status = 'COMPLETED'",
        )
        .bind(original_id)
        .bind(processed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
