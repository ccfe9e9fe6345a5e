//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, request ID, deadline, trace span)
//!     → pipeline.rs (assets, body, session, CSRF, dispatch, errors, headers)
//!         → assets.rs (public files, compiled assets)
//!         → request.rs (RequestContext handed to the handler)
//!         → error.rs (what handlers may fail with)
//!         → response.rs (helpers for building responses)
//!     → Send to client
//! ```

pub mod assets;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use error::{HandlerError, HandlerResult, ParameterError};
pub use pipeline::{PipelineError, RequestPipeline};
pub use request::{Params, RequestContext, TypedParams};
pub use server::AppServer;
