//! Error presentation subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline short-circuit (CSRF, no route, body too large)
//! Handler Err(HandlerError) ──→ Failure ──→ policy.rs
//!     → log (handler failures only, always in full)
//!     → development: page.rs diagnostic page
//!     → production: generic titled page
//! ```

pub mod page;
pub mod policy;

pub use policy::{ErrorMode, ErrorPolicy, Failure, RequestSummary};
