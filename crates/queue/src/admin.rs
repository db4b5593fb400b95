//! Operator-facing operations over the job store.
//!
//! Everything here assumes the caller identity was already validated
//! upstream; the HTTP layer rejects unauthenticated requests before these
//! are reached.

use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use courseboard_auth::CallerId;
use courseboard_core::JobId;

use crate::job::{JobOverview, JobRecord};
use crate::store::{JobStore, StoreError};

/// Default page size for listings, matching the dashboard's default.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Admin operation error.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Bad operator input; nothing was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store failed; surfaced to the operator as an internal error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Listing parameters for [`JobAdmin::list`].
#[derive(Debug, Clone)]
pub struct ListParams {
    /// Case-insensitive substring filter on the job name.
    pub name: Option<String>,
    pub limit: usize,
    pub skip: usize,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            name: None,
            limit: DEFAULT_LIST_LIMIT,
            skip: 0,
        }
    }
}

/// What to cancel: one record by id, or every record with a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelSelector {
    Id(JobId),
    Name(String),
}

impl CancelSelector {
    /// Build a selector from the raw query parameters; id wins when both are
    /// present (it is the more specific request).
    pub fn from_parts(id: Option<&str>, name: Option<&str>) -> Result<Self, AdminError> {
        if let Some(raw) = id.filter(|s| !s.trim().is_empty()) {
            let id = JobId::from_str(raw.trim())
                .map_err(|_| AdminError::Validation("invalid job id".to_string()))?;
            return Ok(CancelSelector::Id(id));
        }
        if let Some(name) = name.filter(|s| !s.trim().is_empty()) {
            return Ok(CancelSelector::Name(name.trim().to_string()));
        }
        Err(AdminError::Validation(
            "missing job information to delete (id or name)".to_string(),
        ))
    }
}

/// Admin control surface layered on a job store.
#[derive(Clone)]
pub struct JobAdmin {
    store: Arc<dyn JobStore>,
}

impl JobAdmin {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Page of records plus the total matching count.
    pub async fn list(&self, params: &ListParams) -> Result<(Vec<JobRecord>, u64), AdminError> {
        let filter = params
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        Ok(self.store.query(filter, params.limit, params.skip).await?)
    }

    /// Grouped per-name statistics.
    pub async fn overview(&self) -> Result<Vec<JobOverview>, AdminError> {
        Ok(self.store.overview().await?)
    }

    /// Insert a due-now record on behalf of an operator.
    pub async fn enqueue(
        &self,
        caller: &CallerId,
        name: &str,
        data: Option<serde_json::Value>,
    ) -> Result<JobRecord, AdminError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdminError::Validation("missing job name".to_string()));
        }

        let job = JobRecord::new(name, data.unwrap_or_else(|| serde_json::json!({})))
            .modified_by(caller.as_str());
        self.store.insert(&job).await?;
        info!(job_id = %job.id, job_name = %job.name, caller = %caller, "job pushed to queue");
        Ok(job)
    }

    /// Delete matching records; returns the count removed.
    ///
    /// A locked (running) record is removed from future consideration like
    /// any other; an already-dispatched handler invocation runs to
    /// completion.
    pub async fn cancel(&self, selector: CancelSelector) -> Result<u64, AdminError> {
        let removed = match &selector {
            CancelSelector::Id(id) => u64::from(self.store.delete_by_id(*id).await?),
            CancelSelector::Name(name) => self.store.delete_by_name(name).await?,
        };
        info!(?selector, removed, "cancelled job(s)");
        Ok(removed)
    }

    /// Re-enqueue a failed record: insert a fresh due-now record with the
    /// same name/payload, then best-effort delete the original.
    ///
    /// By the time deletion runs the retry has already succeeded, so a
    /// deletion failure is logged and swallowed.
    pub async fn retry(
        &self,
        caller: &CallerId,
        name: &str,
        data: Option<serde_json::Value>,
        failed_id: JobId,
    ) -> Result<JobRecord, AdminError> {
        let job = self.enqueue(caller, name, data).await?;

        match self.store.delete_by_id(failed_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(job_id = %failed_id, "failed record to clean up after retry was already gone")
            }
            Err(e) => {
                warn!(job_id = %failed_id, error = %e, "failed to delete old job during retry")
            }
        }

        Ok(job)
    }
}
