//! Routes directory watcher for hot reload.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::observability::{DiagnosticEvent, DiagnosticSink};
use crate::routing::registry::{ReloadOutcome, RouteRegistry};

/// Watches the routes directory and reloads units as they change.
pub struct RouteWatcher {
    dir: PathBuf,
    registry: Arc<RouteRegistry>,
    sink: Arc<dyn DiagnosticSink>,
}

/// Keeps the watch alive. Dropping it stops reloading.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl RouteWatcher {
    pub fn new(
        dir: impl Into<PathBuf>,
        registry: Arc<RouteRegistry>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            dir: dir.into(),
            registry,
            sink,
        }
    }

    /// Start watching. Must be called inside a tokio runtime.
    pub fn run(self) -> Result<WatchHandle, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove() {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&self.dir, RecursiveMode::Recursive)?;
        tracing::info!(dir = ?self.dir, "Route watcher started");

        let registry = self.registry;
        let sink = self.sink;
        let task = tokio::spawn(async move {
            while let Some(path) = rx.recv().await {
                match registry.reload(&path) {
                    Ok(ReloadOutcome::Registered(key)) => {
                        sink.record(&DiagnosticEvent::RouteReloaded { key: &key, removed: false });
                        metrics::record_route_reload("registered");
                    }
                    Ok(ReloadOutcome::Removed(key)) => {
                        sink.record(&DiagnosticEvent::RouteReloaded { key: &key, removed: true });
                        metrics::record_route_reload("removed");
                    }
                    Ok(ReloadOutcome::Ignored) => {}
                    Err(e) => {
                        tracing::error!(path = ?path, error = %e, "Failed to reload handler unit. Keeping current handler.");
                        metrics::record_route_reload("error");
                    }
                }
            }
        });

        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }
}
