//! Failure → response conversion.
//!
//! # Responsibilities
//! - Turn every pipeline failure into a rendered response with the right status
//! - Log handler failures in full, in every mode
//! - Decide what the client sees: diagnostics in development, nothing in production
//!
//! # Design Decisions
//! - Mode is fixed at construction from the deployment environment
//! - Never fails: if the layout cannot be rendered, a fixed page is used

use std::sync::Arc;

use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use serde_json::Value;

use crate::config::Environment;
use crate::http::error::{HandlerError, ParameterError};
use crate::http::request::Params;
use crate::http::response::html;
use crate::observability::{DiagnosticEvent, DiagnosticSink};
use crate::security::csrf::InvalidToken;
use crate::view::{escape_html, Locals, Renderer, CONTENT, TITLE};

use super::page::development_page;

const INVALID_TOKEN_CONTENT: &str = "<p>An invalid security token was submitted with this request, \
and this request could not be processed.</p>";

/// Which error presentation the process uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorMode {
    Development,
    Production,
}

impl ErrorMode {
    /// Only development shows diagnostics; test behaves like production.
    pub fn for_environment(environment: Environment) -> Self {
        if environment.is_development() {
            ErrorMode::Development
        } else {
            ErrorMode::Production
        }
    }
}

/// Everything that can stop a request from producing its normal response.
#[derive(Debug)]
pub enum Failure {
    InvalidToken(InvalidToken),
    NotFound,
    PayloadTooLarge,
    Parameter(ParameterError),
    Handler(HandlerError),
}

impl Failure {
    /// Label for the request metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            Failure::InvalidToken(_) => "csrf_rejected",
            Failure::NotFound => "not_found",
            Failure::PayloadTooLarge => "payload_too_large",
            Failure::Parameter(_) => "parameter_error",
            Failure::Handler(_) => "handler_error",
        }
    }
}

impl From<HandlerError> for Failure {
    fn from(error: HandlerError) -> Self {
        match error.as_parameter_error() {
            Some(parameter) => Failure::Parameter(parameter.clone()),
            None => Failure::Handler(error),
        }
    }
}

impl From<InvalidToken> for Failure {
    fn from(reason: InvalidToken) -> Self {
        Failure::InvalidToken(reason)
    }
}

/// The request a failure happened in, for logs and the diagnostic page.
#[derive(Debug, Clone, Copy)]
pub struct RequestSummary<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub params: Option<&'a Params>,
}

/// Two-mode failure strategy.
pub struct ErrorPolicy {
    mode: ErrorMode,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ErrorPolicy {
    pub fn new(mode: ErrorMode, renderer: Arc<dyn Renderer>, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            mode,
            renderer,
            sink,
        }
    }

    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    pub fn respond(&self, failure: Failure, request: &RequestSummary<'_>) -> Response {
        match failure {
            Failure::InvalidToken(_) => self.page(
                StatusCode::BAD_REQUEST,
                "Invalid Security Token",
                INVALID_TOKEN_CONTENT,
            ),
            Failure::NotFound => self.page(StatusCode::NOT_FOUND, "File Not Found", ""),
            Failure::PayloadTooLarge => {
                self.page(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", "")
            }
            Failure::Parameter(error) => {
                tracing::debug!(path = %request.path, error = %error, "Rejected request parameter");
                let content = match self.mode {
                    ErrorMode::Development => format!("<p>{}</p>", escape_html(&error.to_string())),
                    ErrorMode::Production => String::new(),
                };
                self.page(StatusCode::BAD_REQUEST, "Invalid Parameter", &content)
            }
            Failure::Handler(error) => self.handler_failure(&error, request),
        }
    }

    fn handler_failure(&self, error: &HandlerError, request: &RequestSummary<'_>) -> Response {
        // 1. Always logged in full
        let message = error.to_string();
        let backtrace = error.backtrace().to_string();
        self.sink.record(&DiagnosticEvent::HandlerFailure {
            method: request.method,
            path: request.path,
            type_name: error.type_name(),
            message: &message,
            backtrace: &backtrace,
        });

        // 2. Client view depends on mode
        match self.mode {
            ErrorMode::Development => html(
                StatusCode::INTERNAL_SERVER_ERROR,
                development_page(error, request),
            ),
            ErrorMode::Production => {
                self.page(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", "")
            }
        }
    }

    fn page(&self, status: StatusCode, title: &str, content: &str) -> Response {
        let mut locals = Locals::new();
        locals.insert(TITLE.to_string(), Value::String(title.to_string()));
        locals.insert(CONTENT.to_string(), Value::String(content.to_string()));

        let body = match self.renderer.render("error", &locals) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, title, "Failed to render error page. Using fallback.");
                fallback_page(title, content)
            }
        };
        html(status, body)
    }
}

fn fallback_page(title: &str, content: &str) -> String {
    let title = escape_html(title);
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
         </head>\n<body>\n<h1>{title}</h1>\n{content}\n</body>\n</html>\n"
    )
}
