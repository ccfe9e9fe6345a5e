//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages produce:
//!     → diagnostics.rs (access log, failures, CSRF rejections, reloads)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → logging.rs (tracing subscriber: pretty / compact / JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - The sink is chosen once at startup; the test environment gets a no-op sink
//! - Failures are always logged in full, whatever the client is shown
//! - Request ID flows through spans via tower-http

pub mod diagnostics;
pub mod logging;
pub mod metrics;

pub use diagnostics::{sink_for, DiagnosticEvent, DiagnosticSink, NullSink, QuietSink, TracingSink};
