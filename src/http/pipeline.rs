//! The request pipeline.
//!
//! # Responsibilities
//! - Screen, dispatch and finish every inbound request
//! - Route every failure through the one [`ErrorPolicy`] boundary
//! - Attach security headers and the session cookie to whatever comes out
//!
//! # Data Flow
//! ```text
//! Request
//!     → 1. public file / compiled asset? → serve, skip to 8
//!     → 2. read body (limit → 413)
//!     → 3. query + form parameters
//!     → 4. session from cookie (empty on any verification failure)
//!     → 5. CSRF check (state-changing methods) ──────────────┐
//!     → 6. dispatch key → registry (root falls back to index) ┤ Failure
//!     → 7. handler ───────────────────────────────────────────┤
//!     → session cookie if changed or due for rotation          ↓
//!     → 8. security headers   ←──────────────────────── ErrorPolicy
//!     → 9. access log + metrics
//! ```
//!
//! # Design Decisions
//! - Nothing reaches a handler before the CSRF check has passed
//! - A panicking handler becomes a 500 through the same boundary
//! - The session is only written back after a handler succeeded
//! - Headers are applied last so error responses carry them too

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::header::{InvalidHeaderValue, CONTENT_TYPE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Request};
use axum::response::Response;
use futures_util::FutureExt;
use thiserror::Error;

use crate::config::AppConfig;
use crate::errors::{ErrorMode, ErrorPolicy, Failure, RequestSummary};
use crate::http::assets::StaticAssets;
use crate::http::error::{HandlerError, HandlerResult};
use crate::http::request::{parse_cookies, Params, RequestContext};
use crate::observability::metrics;
use crate::observability::{DiagnosticEvent, DiagnosticSink};
use crate::routing::{dispatch_key, RouteRegistry, SharedHandler};
use crate::security::session::unix_now;
use crate::security::{CsrfGuard, SecurityHeaderPolicy, SessionError, SessionStore};
use crate::view::{Locals, Renderer};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no session secret configured")]
    MissingSecret,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("invalid security header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

/// The view rendered for the root when nothing is registered under `""`.
fn index_view(ctx: &mut RequestContext) -> HandlerResult {
    ctx.view("index", Locals::new())
}

/// One pipeline per process, shared by all requests.
pub struct RequestPipeline {
    config: Arc<AppConfig>,
    assets: StaticAssets,
    headers: SecurityHeaderPolicy,
    sessions: SessionStore,
    csrf: Arc<CsrfGuard>,
    registry: Arc<RouteRegistry>,
    index: SharedHandler,
    renderer: Arc<dyn Renderer>,
    errors: ErrorPolicy,
    sink: Arc<dyn DiagnosticSink>,
}

impl RequestPipeline {
    pub fn new(
        config: Arc<AppConfig>,
        registry: Arc<RouteRegistry>,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<Self, PipelineError> {
        let secret = config
            .session_secret
            .as_ref()
            .ok_or(PipelineError::MissingSecret)?;
        let sessions = SessionStore::new(secret, config.session.clone())?;
        let headers = SecurityHeaderPolicy::from_config(&config.security)?;
        let errors = ErrorPolicy::new(
            ErrorMode::for_environment(config.environment),
            renderer.clone(),
            sink.clone(),
        );

        Ok(Self {
            assets: StaticAssets::new(&config.assets),
            headers,
            sessions,
            csrf: Arc::new(CsrfGuard::new(config.csrf.clone())),
            registry,
            index: Arc::new(index_view),
            renderer,
            errors,
            sink,
            config,
        })
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn security_headers(&self) -> &SecurityHeaderPolicy {
        &self.headers
    }

    pub fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.errors.mode()
    }

    /// Run one request through the pipeline. Never fails.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        // 1. Static short-circuit
        let (mut response, outcome) = match self.assets.serve(&method, &path).await {
            Some(response) => (response, "asset"),
            None => self.dispatch(parts, body).await,
        };

        // 2. Headers on everything
        self.headers.apply(response.headers_mut());

        // 3. Access log
        self.sink.record(&DiagnosticEvent::Request {
            method: &method,
            path: &path,
            status: response.status(),
            elapsed: start.elapsed(),
        });
        metrics::record_request(method.as_str(), response.status().as_u16(), outcome, start);
        response
    }

    async fn dispatch(&self, parts: Parts, body: Body) -> (Response, &'static str) {
        let Parts {
            method,
            uri,
            headers,
            ..
        } = parts;
        let path = uri.path();

        // 1. Body
        let bytes = match to_bytes(body, self.config.security.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(path, error = %e, "Failed to read request body");
                let summary = RequestSummary {
                    method: &method,
                    path,
                    headers: &headers,
                    params: None,
                };
                return self.fail(Failure::PayloadTooLarge, &summary);
            }
        };

        // 2. Parameters and session
        let params = parameters(uri.query(), &headers, &bytes);
        let cookies = parse_cookies(&headers);
        let session = self
            .sessions
            .load(cookies.get(self.sessions.cookie_name()).map(String::as_str));

        // 3. CSRF, before anything handler-specific
        let form_token = params.get(self.csrf.field_name());
        if let Err(reason) = self.csrf.validate(&method, &headers, form_token, &session) {
            let reason_text = reason.to_string();
            self.sink.record(&DiagnosticEvent::CsrfRejected {
                method: &method,
                path,
                reason: &reason_text,
            });
            metrics::record_csrf_rejection();
            let summary = RequestSummary {
                method: &method,
                path,
                headers: &headers,
                params: Some(&params),
            };
            return self.fail(Failure::InvalidToken(reason), &summary);
        }

        // 4. Resolve
        let key = dispatch_key(path);
        let handler = match self.registry.resolve(key) {
            Some(handler) => handler,
            None if key.is_empty() => self.index.clone(),
            None => {
                let summary = RequestSummary {
                    method: &method,
                    path,
                    headers: &headers,
                    params: Some(&params),
                };
                return self.fail(Failure::NotFound, &summary);
            }
        };

        // 5. Handler
        let mut ctx = RequestContext::new(
            method.clone(),
            path,
            key,
            headers,
            params,
            session,
            self.renderer.clone(),
            self.csrf.clone(),
        );
        // A panic is a handler failure like any other.
        let result = match AssertUnwindSafe(handler.call(&mut ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HandlerError::from_panic(payload)),
        };
        let mut response = match result {
            Ok(response) => response,
            Err(error) => {
                let summary = RequestSummary {
                    method: &method,
                    path,
                    headers: ctx.headers(),
                    params: Some(ctx.params()),
                };
                return self.fail(Failure::from(error), &summary);
            }
        };

        // 6. Session cookie
        let session = ctx.take_session();
        let now = unix_now();
        if self.sessions.needs_save(&session, now) {
            let cookie = self
                .sessions
                .save_at(&session, now)
                .map_err(HandlerError::from)
                .and_then(|value| {
                    HeaderValue::from_str(&self.sessions.set_cookie(&value))
                        .map_err(HandlerError::from)
                });
            match cookie {
                Ok(cookie) => {
                    response.headers_mut().append(SET_COOKIE, cookie);
                }
                Err(error) => {
                    let summary = RequestSummary {
                        method: &method,
                        path,
                        headers: ctx.headers(),
                        params: Some(ctx.params()),
                    };
                    return self.fail(Failure::Handler(error), &summary);
                }
            }
        }

        (response, "ok")
    }

    fn fail(&self, failure: Failure, summary: &RequestSummary<'_>) -> (Response, &'static str) {
        let outcome = failure.outcome();
        (self.errors.respond(failure, summary), outcome)
    }
}

/// Query parameters, then urlencoded form fields (which win on conflict).
fn parameters(query: Option<&str>, headers: &axum::http::HeaderMap, body: &Bytes) -> Params {
    let mut params = Params::parse(query.unwrap_or_default().as_bytes());
    let is_form = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE));
    if is_form {
        params.extend_urlencoded(body);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::observability::NullSink;
    use crate::view::LayoutRenderer;
    use axum::http::{HeaderMap, Method, StatusCode};

    fn pipeline(environment: Environment) -> RequestPipeline {
        let config = AppConfig::for_environment(environment, "k".repeat(64));
        RequestPipeline::new(
            Arc::new(config),
            Arc::new(RouteRegistry::new()),
            Arc::new(LayoutRenderer::new()),
            Arc::new(NullSink),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_secret_rejected() {
        let config = AppConfig::default();
        let result = RequestPipeline::new(
            Arc::new(config),
            Arc::new(RouteRegistry::new()),
            Arc::new(LayoutRenderer::new()),
            Arc::new(NullSink),
        );
        assert!(matches!(result, Err(PipelineError::MissingSecret)));
    }

    #[test]
    fn test_error_mode_follows_environment() {
        assert_eq!(pipeline(Environment::Development).error_mode(), ErrorMode::Development);
        assert_eq!(pipeline(Environment::Production).error_mode(), ErrorMode::Production);
    }

    #[test]
    fn test_form_body_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        let params = parameters(Some("a=1&b=2"), &headers, &Bytes::from_static(b"b=3"));
        assert_eq!(params.get("a"), Some("1"));
        assert_eq!(params.get("b"), Some("3"));

        let params = parameters(Some("a=1"), &HeaderMap::new(), &Bytes::from_static(b"b=3"));
        assert_eq!(params.get("b"), None);
    }

    #[tokio::test]
    async fn test_root_falls_back_to_index() {
        let response = pipeline(Environment::Test)
            .handle(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let mut config = AppConfig::for_environment(Environment::Test, "k".repeat(64));
        config.security.max_body_size = 8;
        let pipeline = RequestPipeline::new(
            Arc::new(config),
            Arc::new(RouteRegistry::new()),
            Arc::new(LayoutRenderer::new()),
            Arc::new(NullSink),
        )
        .unwrap();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .body(Body::from("x".repeat(64)))
            .unwrap();
        let response = pipeline.handle(request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()["x-frame-options"], "deny");
    }
}
