//! Postgres-backed job store implementation.
//!
//! Persists job records in a `jobs` table and implements the claim
//! compare-and-set as a single conditional `UPDATE`, so mutual exclusion is
//! enforced by the database no matter how many scheduler instances poll the
//! same table.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | StoreError | Scenario |
//! |------------|------------|----------|
//! | Database (any code) | `Storage` | Constraint violation or backend failure |
//! | PoolClosed / Io / Tls | `Storage` | Store unavailable (transient) |
//! | ColumnDecode / Decode | `Corrupt` | A row does not match the expected schema |
//! | Other | `Storage` | Anything else |
//!
//! ## Thread Safety
//!
//! `PostgresJobStore` is `Send + Sync`; all operations go through the SQLx
//! connection pool.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use courseboard_core::JobId;

use super::r#trait::{JobStore, StoreError};
use crate::job::{JobOverview, JobRecord, JobType};

/// Postgres-backed durable job store.
///
/// The lock marker column (`locked_at`) is the sole coordination point; the
/// claim statement's `rows_affected` is the compare-and-set outcome.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `jobs` table and its indexes if they do not exist yet.
    ///
    /// The column set mirrors the shared collection schema the admin UI
    /// reads (`nextRunAt`, `lockedAt`, ... in their snake_case form).
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id               UUID PRIMARY KEY,
                name             TEXT NOT NULL,
                data             JSONB NOT NULL DEFAULT '{}'::jsonb,
                job_type         TEXT NOT NULL DEFAULT 'normal',
                priority         INTEGER NOT NULL DEFAULT 0,
                next_run_at      TIMESTAMPTZ,
                last_modified_by TEXT,
                locked_at        TIMESTAMPTZ,
                last_run_at      TIMESTAMPTZ,
                last_finished_at TIMESTAMPTZ,
                failed_at        TIMESTAMPTZ,
                fail_count       INTEGER NOT NULL DEFAULT 0,
                fail_reason      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_jobs_name ON jobs (name);
            CREATE INDEX IF NOT EXISTS idx_jobs_next_run_at ON jobs (next_run_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, job_name = %job.name), err)]
    async fn insert(&self, job: &JobRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, data, job_type, priority, next_run_at,
                last_modified_by, locked_at, last_run_at, last_finished_at,
                failed_at, fail_count, fail_reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.name)
        .bind(&job.data)
        .bind(job.job_type.as_str())
        .bind(job.priority)
        .bind(job.next_run_at)
        .bind(&job.last_modified_by)
        .bind(job.locked_at)
        .bind(job.last_run_at)
        .bind(job.last_finished_at)
        .bind(job.failed_at)
        .bind(job.fail_count as i32)
        .bind(&job.fail_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;
        row.map(|r| record_from_row(&r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let stale_before = now - lock_lifetime;
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE (next_run_at IS NULL OR next_run_at <= $1)
              AND (locked_at IS NULL OR locked_at <= $2)
              AND failed_at IS NULL
              AND last_finished_at IS NULL
            ORDER BY priority DESC, next_run_at ASC NULLS FIRST, id ASC
            LIMIT $3
            "#
        ))
        .bind(now)
        .bind(stale_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_due", e))?;

        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn claim(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
    ) -> Result<bool, StoreError> {
        let stale_before = now - lock_lifetime;
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET locked_at = $2, last_run_at = $2
            WHERE id = $1 AND (locked_at IS NULL OR locked_at <= $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn mark_success(&self, id: JobId, finished_at: DateTime<Utc>) -> Result<(), StoreError> {
        // Zero rows affected means the record was cancelled mid-flight; not
        // an error.
        sqlx::query(
            r#"
            UPDATE jobs
            SET locked_at = NULL,
                last_finished_at = $2,
                next_run_at = NULL,
                failed_at = NULL,
                fail_reason = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(finished_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_success", e))?;
        Ok(())
    }

    #[instrument(skip(self, reason), fields(job_id = %id), err)]
    async fn mark_failure(
        &self,
        id: JobId,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET locked_at = NULL,
                failed_at = $2,
                fail_reason = $3,
                fail_count = fail_count + 1
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(failed_at)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_failure", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn query(
        &self,
        name_filter: Option<&str>,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<JobRecord>, u64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%'
            "#,
        )
        .bind(name_filter)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("query", e))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM jobs
            WHERE $1::text IS NULL OR name ILIKE '%' || $1 || '%'
            ORDER BY next_run_at DESC NULLS LAST, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(name_filter)
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("query", e))?;

        let jobs = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((jobs, total as u64))
    }

    #[instrument(skip(self), err)]
    async fn overview(&self) -> Result<Vec<JobOverview>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT name, COUNT(*) AS total, COUNT(locked_at) AS running
            FROM jobs
            GROUP BY name
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("overview", e))?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name").map_err(decode_err)?;
                let total: i64 = row.try_get("total").map_err(decode_err)?;
                let running: i64 = row.try_get("running").map_err(decode_err)?;
                Ok(JobOverview {
                    name,
                    total: total as u64,
                    running: running as u64,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn delete_by_name(&self, name: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_by_name", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn delete_by_id(&self, id: JobId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_by_id", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        Ok(total as u64)
    }
}

const JOB_COLUMNS: &str = "id, name, data, job_type, priority, next_run_at, \
     last_modified_by, locked_at, last_run_at, last_finished_at, failed_at, \
     fail_count, fail_reason";

fn record_from_row(row: &PgRow) -> Result<JobRecord, StoreError> {
    let id: Uuid = row.try_get("id").map_err(decode_err)?;
    let job_type: String = row.try_get("job_type").map_err(decode_err)?;
    let job_type = JobType::parse(&job_type)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown job type '{job_type}'")))?;
    let fail_count: i32 = row.try_get("fail_count").map_err(decode_err)?;

    Ok(JobRecord {
        id: JobId::from_uuid(id),
        name: row.try_get("name").map_err(decode_err)?,
        data: row.try_get("data").map_err(decode_err)?,
        job_type,
        priority: row.try_get("priority").map_err(decode_err)?,
        next_run_at: row.try_get("next_run_at").map_err(decode_err)?,
        last_modified_by: row.try_get("last_modified_by").map_err(decode_err)?,
        locked_at: row.try_get("locked_at").map_err(decode_err)?,
        last_run_at: row.try_get("last_run_at").map_err(decode_err)?,
        last_finished_at: row.try_get("last_finished_at").map_err(decode_err)?,
        failed_at: row.try_get("failed_at").map_err(decode_err)?,
        fail_count: fail_count.max(0) as u32,
        fail_reason: row.try_get("fail_reason").map_err(decode_err)?,
    })
}

fn decode_err(err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("in {}: {}", operation, err))
        }
        sqlx::Error::Database(db_err) => {
            StoreError::storage(operation, db_err.message().to_string())
        }
        sqlx::Error::PoolClosed => StoreError::storage(operation, "connection pool closed"),
        _ => StoreError::storage(operation, err.to_string()),
    }
}
