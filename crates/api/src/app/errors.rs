use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use courseboard_queue::AdminError;

/// Structured envelope every admin endpoint responds with:
/// `{code, message, data?}`.
pub fn api_response(
    status: StatusCode,
    message: Option<String>,
    data: Option<serde_json::Value>,
) -> axum::response::Response {
    let message = message.unwrap_or_else(|| default_message(status));
    let mut body = json!({
        "code": status.as_u16(),
        "message": message,
    });
    if let Some(data) = data {
        body["data"] = data;
    }
    (status, axum::Json(body)).into_response()
}

/// Default message per RESTful status code conventions.
fn default_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("Unknown Status")
        .to_string()
}

pub fn admin_error_to_response(err: AdminError) -> axum::response::Response {
    match err {
        AdminError::Validation(msg) => api_response(StatusCode::BAD_REQUEST, Some(msg), None),
        AdminError::Store(e) => {
            api_response(StatusCode::INTERNAL_SERVER_ERROR, Some(e.to_string()), None)
        }
    }
}
