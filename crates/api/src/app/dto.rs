//! Request DTOs for the admin endpoints.

use serde::Deserialize;

/// Query parameters for `GET /jobs`.
#[derive(Debug, Deserialize)]
pub struct JobsListQuery {
    /// Case-insensitive substring filter on the job name.
    pub name: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    /// When true, return per-name statistics instead of a job page.
    pub overview: Option<bool>,
}

/// Body for `POST /jobs`.
///
/// `retryJobId` turns the enqueue into a retry: the new record is created
/// first, then the old failed record is deleted best-effort.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobRequest {
    pub name: Option<String>,
    pub data: Option<serde_json::Value>,
    pub retry_job_id: Option<String>,
}

/// Query parameters for `DELETE /jobs`.
#[derive(Debug, Deserialize)]
pub struct DeleteJobsQuery {
    pub id: Option<String>,
    pub name: Option<String>,
}
