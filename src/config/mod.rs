//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → APP_ENV / APP_SESSION_SECRET overlay
//!     → validation.rs (semantic checks, secret provisioning)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is read once before serving; nothing reads the environment at request time
//! - All fields have defaults to allow minimal configs
//! - A missing secret outside development is a startup failure, never a request failure

pub mod loader;
pub mod schema;
pub mod secret;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, Environment};
pub use secret::Secret;
