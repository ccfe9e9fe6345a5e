//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → session.rs (verify cookie → Session, empty on any failure)
//!     → csrf.rs (state-changing methods must carry the session token)
//!     → Pass to routing
//!
//! Outgoing response:
//!     → headers.rs (fixed header set + CSP on every response)
//!     → session.rs (re-sign cookie if modified or due for rotation)
//! ```
//!
//! # Design Decisions
//! - Fail open on sessions (empty), fail closed on CSRF (reject)
//! - No server-side session storage: nothing shared between requests

pub mod csrf;
pub mod headers;
pub mod session;

pub use csrf::{CsrfGuard, InvalidToken};
pub use headers::{ContentSecurityPolicy, CspSource, SecurityHeaderPolicy};
pub use session::{Session, SessionError, SessionStore};
