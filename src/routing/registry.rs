//! Route registry: dispatch key → handler.
//!
//! # Responsibilities
//! - Store handlers by dispatch key
//! - Resolve a key to its handler, or report no match
//! - Discover handler units from a routes directory and reload single units
//!
//! # Design Decisions
//! - Copy-on-write map behind `ArcSwap`: readers never lock and never see a
//!   half-applied change; every write publishes a whole new map
//! - One writer at a time (mutex held across clone → modify → store)
//! - Frozen registries (production) reject every write
//! - Exact-match lookup only

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::routing::discovery::{DiscoveryError, RouteSource};
use crate::routing::handler::{Handler, SharedHandler};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("route registry is frozen")]
    Frozen,

    #[error("no route source has been discovered")]
    NoSource,

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Result of reloading one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Unit (re)loaded and registered under this key.
    Registered(String),
    /// Unit's source is gone; its key was removed.
    Removed(String),
    /// Path is not a unit of the discovered source.
    Ignored,
}

#[derive(Default)]
struct WriterState {
    source: Option<RouteSource>,
    /// Unit path → key it registered, as of its last load.
    units: HashMap<PathBuf, String>,
}

/// Registry of route handlers.
pub struct RouteRegistry {
    routes: ArcSwap<HashMap<String, SharedHandler>>,
    writer: Mutex<WriterState>,
    frozen: AtomicBool,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self {
            routes: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(WriterState::default()),
            frozen: AtomicBool::new(false),
        }
    }

    fn write(&self) -> Result<MutexGuard<'_, WriterState>, RegistryError> {
        let guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if self.frozen.load(Ordering::Acquire) {
            return Err(RegistryError::Frozen);
        }
        Ok(guard)
    }

    fn publish<F>(&self, change: F)
    where
        F: FnOnce(&mut HashMap<String, SharedHandler>),
    {
        let mut next = HashMap::clone(&self.routes.load());
        change(&mut next);
        self.routes.store(Arc::new(next));
    }

    /// Insert or replace the handler for `key`.
    pub fn register<H>(&self, key: impl Into<String>, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        self.register_shared(key, Arc::new(handler))
    }

    pub fn register_shared(
        &self,
        key: impl Into<String>,
        handler: SharedHandler,
    ) -> Result<(), RegistryError> {
        let _writer = self.write()?;
        let key = key.into();
        self.publish(|routes| {
            routes.insert(key, handler);
        });
        Ok(())
    }

    /// Remove the handler for `key`. Returns whether one was registered.
    pub fn remove(&self, key: &str) -> Result<bool, RegistryError> {
        let _writer = self.write()?;
        if !self.routes.load().contains_key(key) {
            return Ok(false);
        }
        self.publish(|routes| {
            routes.remove(key);
        });
        Ok(true)
    }

    /// Handler for `key`, or `None` when nothing matches.
    pub fn resolve(&self, key: &str) -> Option<SharedHandler> {
        self.routes.load().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.routes.load().contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.routes.load().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.load().is_empty()
    }

    /// Load every unit in `source` and register it. All units are loaded
    /// before anything is published, so a bad unit leaves the registry as it
    /// was. The source is kept for later [`reload`](Self::reload) calls.
    pub fn discover(&self, source: RouteSource) -> Result<usize, RegistryError> {
        let mut writer = self.write()?;

        let mut loaded = Vec::new();
        for unit in source.units()? {
            let handler = source.load(&unit)?;
            loaded.push((unit, handler));
        }

        let count = loaded.len();
        let mut units = HashMap::new();
        self.publish(|routes| {
            for (unit, handler) in loaded {
                tracing::debug!(key = %unit.key, path = %unit.path.display(), "Registered handler unit");
                units.insert(unit.path, unit.key.clone());
                routes.insert(unit.key, handler);
            }
        });

        tracing::info!(dir = %source.dir().display(), units = count, "Discovered handler units");
        writer.source = Some(source);
        writer.units = units;
        Ok(count)
    }

    /// Re-run discovery for the unit at `path` (absolute, or relative to the
    /// routes directory). A unit whose file is gone loses its key.
    pub fn reload(&self, path: &Path) -> Result<ReloadOutcome, RegistryError> {
        let mut writer = self.write()?;
        let source = writer.source.clone().ok_or(RegistryError::NoSource)?;

        let Some(unit) = source.unit_for(path) else {
            return Ok(ReloadOutcome::Ignored);
        };

        if unit.path.is_file() {
            // Another live unit already owns this key.
            let owner = writer
                .units
                .iter()
                .find(|(path, key)| **key == unit.key && **path != unit.path && path.is_file());
            if let Some((first, _)) = owner {
                return Err(DiscoveryError::DuplicateKey {
                    key: unit.key,
                    first: first.clone(),
                    second: unit.path,
                }
                .into());
            }

            let handler = source.load(&unit)?;
            let key = unit.key.clone();
            self.publish(|routes| {
                routes.insert(key, handler);
            });
            writer.units.insert(unit.path, unit.key.clone());
            return Ok(ReloadOutcome::Registered(unit.key));
        }

        match writer.units.remove(&unit.path) {
            Some(key) => {
                self.publish(|routes| {
                    routes.remove(&key);
                });
                Ok(ReloadOutcome::Removed(key))
            }
            None => Ok(ReloadOutcome::Ignored),
        }
    }

    /// Make the registry immutable. Irreversible.
    pub fn freeze(&self) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
