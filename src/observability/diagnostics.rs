//! Diagnostic sink: the logging capability handed to the pipeline.
//!
//! The pipeline never logs directly. It records [`DiagnosticEvent`]s on a
//! sink chosen once at startup: [`TracingSink`] everywhere except the test
//! environment, where [`QuietSink`] drops the access log. Failures are
//! logged in every environment.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::config::Environment;

/// Something worth recording about a request.
#[derive(Debug, Clone, Copy)]
pub enum DiagnosticEvent<'a> {
    /// Access log line, one per completed request.
    Request {
        method: &'a Method,
        path: &'a str,
        status: StatusCode,
        elapsed: Duration,
    },
    /// Unexpected failure raised by a handler. Always carries full detail.
    HandlerFailure {
        method: &'a Method,
        path: &'a str,
        type_name: &'a str,
        message: &'a str,
        backtrace: &'a str,
    },
    /// State-changing request rejected for a missing or wrong token.
    CsrfRejected {
        method: &'a Method,
        path: &'a str,
        reason: &'a str,
    },
    /// A handler unit was (re)registered or removed.
    RouteReloaded { key: &'a str, removed: bool },
}

/// Logging capability interface.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: &DiagnosticEvent<'_>);
}

/// Sink backed by `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: &DiagnosticEvent<'_>) {
        match *event {
            DiagnosticEvent::Request {
                method,
                path,
                status,
                elapsed,
            } => {
                tracing::info!(
                    method = %method,
                    path = %path,
                    status = status.as_u16(),
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "request completed"
                );
            }
            DiagnosticEvent::HandlerFailure {
                method,
                path,
                type_name,
                message,
                backtrace,
            } => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    error_type = type_name,
                    error_message = message,
                    "{type_name}: {message}\n{backtrace}"
                );
            }
            DiagnosticEvent::CsrfRejected {
                method,
                path,
                reason,
            } => {
                tracing::warn!(method = %method, path = %path, reason, "CSRF check failed");
            }
            DiagnosticEvent::RouteReloaded { key, removed } => {
                tracing::info!(key, removed, "Route unit reloaded");
            }
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _event: &DiagnosticEvent<'_>) {}
}

/// Tracing without the access log.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietSink;

impl QuietSink {
    pub fn forwards(event: &DiagnosticEvent<'_>) -> bool {
        !matches!(event, DiagnosticEvent::Request { .. })
    }
}

impl DiagnosticSink for QuietSink {
    fn record(&self, event: &DiagnosticEvent<'_>) {
        if Self::forwards(event) {
            TracingSink.record(event);
        }
    }
}

/// Pick the sink for a deployment environment.
pub fn sink_for(environment: Environment) -> Arc<dyn DiagnosticSink> {
    match environment {
        Environment::Test => Arc::new(QuietSink),
        Environment::Development | Environment::Production => Arc::new(TracingSink),
    }
}
