use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use courseboard_auth::CallerId;

use crate::app::errors;
use crate::context::CallerContext;

/// Header carrying the pre-validated user id from the upstream auth check.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Require a caller identity on every admin request.
///
/// Credentials were verified upstream; all this layer does is refuse
/// requests that arrive without an identity. No operation is attempted for
/// them.
pub async fn auth_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_caller(req.headers()) {
        Ok(caller) => {
            req.extensions_mut().insert(CallerContext::new(caller));
            next.run(req).await
        }
        Err(_) => errors::api_response(StatusCode::UNAUTHORIZED, None, None),
    }
}

fn extract_caller(headers: &HeaderMap) -> Result<CallerId, courseboard_auth::AuthError> {
    let raw = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    CallerId::parse(raw)
}
