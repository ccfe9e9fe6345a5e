//! Request pipeline for a small server-rendered web application.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server (axum: request ID, deadline, trace span)
//!                          │
//!                          ▼
//!                    http::pipeline ──▶ http::assets (public files, compiled assets)
//!                          │
//!                          ├──▶ security::session (signed cookie → Session)
//!                          ├──▶ security::csrf (state-changing methods)
//!                          ├──▶ routing::registry (dispatch key → handler)
//!                          ├──▶ handler (RequestContext, view::Renderer)
//!                          ├──▶ errors::policy (every failure, dev / prod)
//!                          └──▶ security::headers (every response)
//!     Client Response
//!     ◀──────────────
//!
//!     Cross-cutting: config (loaded once, immutable), observability
//!     (tracing, diagnostics sink, metrics), lifecycle (startup, signals)
//! ```

pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;
pub mod view;

pub use config::{AppConfig, Environment};
pub use http::{AppServer, HandlerError, HandlerResult, RequestContext, RequestPipeline};
pub use lifecycle::{Application, Shutdown, Startup};
pub use routing::{Handler, RouteRegistry};
