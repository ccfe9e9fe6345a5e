//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → key.rs (strip leading/trailing slashes → dispatch key)
//!     → registry.rs (exact lookup)
//!     → Return: handler, or no match (pipeline answers 404)
//!
//! Discovery (at startup):
//!     routes directory
//!     → discovery.rs (walk, derive unit keys, load units)
//!     → registry.rs (publish all units at once)
//!
//! Hot reload (development only):
//!     file change → watcher.rs → registry.reload(path)
//!     → re-register, or remove the key of a deleted unit
//! ```
//!
//! # Design Decisions
//! - One handler per key; re-registering replaces
//! - Readers see the old map or the new one, never a partial update
//! - Production freezes the registry after discovery

pub mod discovery;
pub mod handler;
pub mod key;
pub mod registry;
pub mod watcher;

pub use discovery::{DiscoveryError, HandlerUnit, RouteSource, UnitLoader, ViewUnitLoader};
pub use handler::{Handler, SharedHandler};
pub use key::dispatch_key;
pub use registry::{RegistryError, ReloadOutcome, RouteRegistry};
pub use watcher::{RouteWatcher, WatchHandle};
