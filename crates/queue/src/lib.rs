//! Durable background job queue with polling scheduler and admin operations.
//!
//! ## Design
//!
//! - Job records live in a shared durable collection; the lock marker on the
//!   record is the only cross-instance coordination point
//! - Claiming is compare-and-set: exactly one poller wins a due record
//! - Stale locks (older than the configured lock lifetime) are reclaimable,
//!   so a crashed worker never strands a job
//! - Failures are recorded on the record (`failedAt`, `failReason`,
//!   `failCount`) for operator visibility; retry re-enqueues a fresh record
//!
//! ## Components
//!
//! - `JobRecord`: the persisted unit of work with scheduling and outcome
//!   metadata
//! - `JobStore`: persistence and atomic claim (in-memory or Postgres)
//! - `JobRegistry`: name → async handler + per-name options
//! - `Scheduler`: fixed-interval poll loop driving bounded concurrent
//!   execution
//! - `JobAdmin`: operator operations (list, overview, enqueue, cancel, retry)

pub mod admin;
pub mod job;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use admin::{AdminError, CancelSelector, JobAdmin, ListParams};
pub use job::{JobOverview, JobRecord, JobState, JobType};
pub use registry::{JobDefinition, JobHandler, JobOptions, JobRegistry};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerHandle, SchedulerStats, NO_HANDLER_REASON};
pub use store::{InMemoryJobStore, JobStore, PostgresJobStore, SharedJobStore, StoreError};
