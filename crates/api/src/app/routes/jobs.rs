//! Admin job queue endpoints: list/overview, manual enqueue, cancel, retry.

use std::str::FromStr;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::json;

use courseboard_core::JobId;
use courseboard_queue::{admin::DEFAULT_LIST_LIMIT, CancelSelector, JobAdmin, ListParams};

use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_jobs).post(enqueue_job).delete(delete_jobs))
}

/// GET /jobs: page of records (with total) or, with `overview=true`,
/// grouped per-name statistics.
pub async fn list_jobs(
    Extension(admin): Extension<JobAdmin>,
    Query(query): Query<dto::JobsListQuery>,
) -> axum::response::Response {
    if query.overview.unwrap_or(false) {
        return match admin.overview().await {
            Ok(stats) => errors::api_response(
                StatusCode::OK,
                Some("Successfully retrieved job statistics".to_string()),
                Some(json!(stats)),
            ),
            Err(e) => errors::admin_error_to_response(e),
        };
    }

    let params = ListParams {
        name: query.name,
        limit: query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        skip: query.skip.unwrap_or(0),
    };
    match admin.list(&params).await {
        Ok((jobs, total)) => errors::api_response(
            StatusCode::OK,
            Some("Successfully retrieved the list of jobs".to_string()),
            Some(json!({ "jobs": jobs, "total": total })),
        ),
        Err(e) => errors::admin_error_to_response(e),
    }
}

/// POST /jobs: enqueue a due-now record; with `retryJobId`, re-enqueue a
/// failed record and clean the original up.
pub async fn enqueue_job(
    Extension(admin): Extension<JobAdmin>,
    Extension(ctx): Extension<CallerContext>,
    Json(body): Json<dto::EnqueueJobRequest>,
) -> axum::response::Response {
    let name = body.name.unwrap_or_default();

    let result = match body.retry_job_id.as_deref() {
        Some(raw) => {
            let failed_id = match JobId::from_str(raw) {
                Ok(id) => id,
                Err(_) => {
                    return errors::api_response(
                        StatusCode::BAD_REQUEST,
                        Some("invalid retryJobId".to_string()),
                        None,
                    )
                }
            };
            admin.retry(ctx.caller(), &name, body.data, failed_id).await
        }
        None => admin.enqueue(ctx.caller(), &name, body.data).await,
    };

    match result {
        Ok(job) => errors::api_response(
            StatusCode::CREATED,
            Some(format!("Job {} has been pushed to the queue", job.name)),
            Some(json!(job)),
        ),
        Err(e) => errors::admin_error_to_response(e),
    }
}

/// DELETE /jobs: cancel and remove records by `id` or `name`.
pub async fn delete_jobs(
    Extension(admin): Extension<JobAdmin>,
    Query(query): Query<dto::DeleteJobsQuery>,
) -> axum::response::Response {
    let selector = match CancelSelector::from_parts(query.id.as_deref(), query.name.as_deref()) {
        Ok(selector) => selector,
        Err(e) => return errors::admin_error_to_response(e),
    };

    match admin.cancel(selector).await {
        Ok(num_removed) => errors::api_response(
            StatusCode::OK,
            Some(format!("Successfully deleted {num_removed} job(s)")),
            Some(json!({ "numRemoved": num_removed })),
        ),
        Err(e) => errors::admin_error_to_response(e),
    }
}
