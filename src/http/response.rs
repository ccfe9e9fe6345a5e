//! Response helpers for handlers and the error policy.
//!
//! Security headers are never set here; the pipeline applies them to
//! whatever response comes out.

use axum::http::header::{ALLOW, LOCATION};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};

/// HTML body with a status.
pub fn html(status: StatusCode, body: impl Into<String>) -> Response {
    (status, Html(body.into())).into_response()
}

/// Redirect. POST/PUT/PATCH/DELETE handlers get 303 so the browser follows
/// with a GET; everything else gets 302.
pub fn redirect(method: &Method, location: &str) -> Response {
    let status = if matches!(*method, Method::GET | Method::HEAD) {
        StatusCode::FOUND
    } else {
        StatusCode::SEE_OTHER
    };
    match HeaderValue::from_str(location) {
        Ok(value) => (status, [(LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::warn!(location, "Refusing redirect to invalid location");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 405 listing the methods a route accepts.
pub fn method_not_allowed(allowed: &[Method]) -> Response {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut response = html(StatusCode::METHOD_NOT_ALLOWED, "");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}
