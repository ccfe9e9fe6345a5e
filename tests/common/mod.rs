//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use app_server::config::{AppConfig, Environment};
use app_server::lifecycle::Application;
use app_server::observability::{DiagnosticEvent, DiagnosticSink};
use app_server::security::Session;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Config for `environment` with everything pointed into `root`.
pub fn test_config(environment: Environment, root: &Path) -> AppConfig {
    let mut config = AppConfig::for_environment(environment, SECRET);
    config.routes.dir = root.join("routes");
    config.routes.hot_reload = false;
    config.views.dir = root.join("views");
    config.assets.public_dir = root.join("public");
    config.assets.assets_dir = root.join("assets");
    config
}

/// What a [`MemorySink`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Request { path: String, status: u16 },
    HandlerFailure { type_name: String, message: String },
    CsrfRejected { path: String },
    RouteReloaded { key: String, removed: bool },
}

/// Sink that keeps every event in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Recorded>>,
}

impl MemorySink {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: &DiagnosticEvent<'_>) {
        let recorded = match *event {
            DiagnosticEvent::Request { path, status, .. } => Recorded::Request {
                path: path.to_string(),
                status: status.as_u16(),
            },
            DiagnosticEvent::HandlerFailure {
                type_name, message, ..
            } => Recorded::HandlerFailure {
                type_name: type_name.to_string(),
                message: message.to_string(),
            },
            DiagnosticEvent::CsrfRejected { path, .. } => Recorded::CsrfRejected {
                path: path.to_string(),
            },
            DiagnosticEvent::RouteReloaded { key, removed } => Recorded::RouteReloaded {
                key: key.to_string(),
                removed,
            },
        };
        self.events.lock().unwrap().push(recorded);
    }
}

pub fn memory_sink() -> Arc<MemorySink> {
    Arc::new(MemorySink::default())
}

/// A response, read to the end.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    /// `name=value` of the session cookie set by this response, if any.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

/// POST an urlencoded form.
pub fn post_form(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(form.to_string())).unwrap()
}

/// A signed session cookie carrying an anti-forgery token, and that token.
pub fn csrf_session(app: &Application) -> (String, String) {
    let pipeline = app.pipeline();
    let mut session = Session::new();
    let token = pipeline.csrf().token_for(&mut session);
    let value = pipeline.sessions().save(&session).unwrap();
    (format!("{}={}", pipeline.sessions().cookie_name(), value), token)
}
