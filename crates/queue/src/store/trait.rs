//! The job store contract.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use courseboard_core::JobId;

use crate::job::{JobOverview, JobRecord};

/// Shared handle to a job store implementation.
pub type SharedJobStore = Arc<dyn JobStore>;

/// Job store error.
///
/// Store unavailability is transient and surfaced to the caller; it is never
/// silently retried at this layer. A lost claim race is *not* an error; it
/// is `Ok(false)` from [`JobStore::claim`].
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store could not be reached or the operation failed.
    #[error("storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// A persisted row could not be decoded into a job record.
    #[error("corrupt job record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }
}

/// Durable persistence and atomic claim of job records.
///
/// The claim operation is the sole mutual-exclusion point between scheduler
/// instances sharing a store; its read-modify-write MUST be indivisible.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a fully-built record (the record carries its own fresh id).
    async fn insert(&self, job: &JobRecord) -> Result<(), StoreError>;

    /// Point read by id.
    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Due, unclaimed (or stale-locked) records, ordered by priority
    /// descending, then `next_run_at` ascending (nulls first), then id
    /// ascending. The ordering is deterministic so candidate selection is
    /// reproducible.
    async fn find_due(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Atomically set the lock marker, but only if it is currently unset or
    /// stale (older than `lock_lifetime`). Returns `false` when another
    /// instance already holds a fresh lock (a lost race, not an error).
    async fn claim(
        &self,
        id: JobId,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
    ) -> Result<bool, StoreError>;

    /// Clear the lock and retire the record as successfully finished.
    ///
    /// A missing record (cancelled while in flight) is a no-op.
    async fn mark_success(&self, id: JobId, finished_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Clear the lock and record the failure; increments the fail counter.
    ///
    /// A missing record (cancelled while in flight) is a no-op.
    async fn mark_failure(
        &self,
        id: JobId,
        failed_at: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), StoreError>;

    /// Paginated listing for the admin surface. `name_filter` is a
    /// case-insensitive substring match. Returns the page plus the total
    /// number of matching records, newest (`next_run_at` desc, id desc)
    /// first.
    async fn query(
        &self,
        name_filter: Option<&str>,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<JobRecord>, u64), StoreError>;

    /// Grouped per-name counts; `running` counts records holding a lock
    /// marker.
    async fn overview(&self) -> Result<Vec<JobOverview>, StoreError>;

    /// Delete all records with this exact name; returns the count removed.
    async fn delete_by_name(&self, name: &str) -> Result<u64, StoreError>;

    /// Delete one record by id; `false` if it did not exist.
    async fn delete_by_id(&self, id: JobId) -> Result<bool, StoreError>;

    /// Total number of records in the collection.
    async fn count(&self) -> Result<u64, StoreError>;
}
