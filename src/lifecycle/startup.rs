//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the renderer, registry, sink and pipeline from a loaded config
//! - Discover handler units, register code handlers
//! - Freeze the registry in production, start the watcher in development
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{AppConfig, Environment};
use crate::http::pipeline::{PipelineError, RequestPipeline};
use crate::http::server::AppServer;
use crate::observability::{sink_for, DiagnosticSink};
use crate::routing::{
    Handler, RegistryError, RouteRegistry, RouteSource, RouteWatcher, SharedHandler,
    ViewUnitLoader, WatchHandle,
};
use crate::view::{LayoutRenderer, Renderer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("route discovery failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("pipeline setup failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("failed to watch routes directory: {0}")]
    Watch(#[from] notify::Error),
}

/// Builder for a ready-to-serve [`Application`].
pub struct Startup {
    config: AppConfig,
    handlers: Vec<(String, SharedHandler)>,
    renderer: Option<Arc<dyn Renderer>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Startup {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            renderer: None,
            sink: None,
        }
    }

    /// Register a code handler. Applied after discovery, before any freeze.
    pub fn handler<H>(mut self, key: impl Into<String>, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        let handler: SharedHandler = Arc::new(handler);
        self.handlers.push((key.into(), handler));
        self
    }

    /// Replace the default [`LayoutRenderer`].
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Replace the sink chosen from the environment.
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build everything. Starting the watcher needs a tokio runtime.
    pub fn build(self) -> Result<Application, StartupError> {
        let config = Arc::new(self.config);
        let environment = config.environment;

        // 1. Renderer
        let renderer: Arc<dyn Renderer> = match self.renderer {
            Some(renderer) => renderer,
            None => {
                let layout = LayoutRenderer::new().with_dir(&config.views.dir);
                if environment == Environment::Production {
                    Arc::new(layout.cached())
                } else {
                    Arc::new(layout)
                }
            }
        };
        let sink = self.sink.unwrap_or_else(|| sink_for(environment));

        // 2. Routes
        let registry = Arc::new(RouteRegistry::new());
        let routes_dir = &config.routes.dir;
        let discovered = routes_dir.is_dir();
        if discovered {
            registry.discover(RouteSource::new(routes_dir, Arc::new(ViewUnitLoader)))?;
        } else {
            tracing::info!(dir = %routes_dir.display(), "Routes directory not found, skipping discovery");
        }
        for (key, handler) in self.handlers {
            registry.register_shared(key, handler)?;
        }

        // 3. Production routes never change after startup
        if environment == Environment::Production {
            registry.freeze();
        }

        // 4. Pipeline
        let pipeline = Arc::new(RequestPipeline::new(
            config.clone(),
            registry.clone(),
            renderer,
            sink.clone(),
        )?);

        // 5. Hot reload
        let watch = if environment.is_development() && config.routes.hot_reload && discovered {
            Some(RouteWatcher::new(routes_dir, registry.clone(), sink).run()?)
        } else {
            None
        };

        tracing::info!(
            environment = %environment,
            routes = registry.len(),
            frozen = registry.is_frozen(),
            hot_reload = watch.is_some(),
            "Application ready"
        );

        Ok(Application {
            config,
            pipeline,
            _watch: watch,
        })
    }
}

/// A configured pipeline plus whatever keeps it up to date.
pub struct Application {
    config: Arc<AppConfig>,
    pipeline: Arc<RequestPipeline>,
    _watch: Option<WatchHandle>,
}

impl Application {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    pub fn registry(&self) -> &Arc<RouteRegistry> {
        self.pipeline.registry()
    }

    /// Router with all middleware, for driving requests without a socket.
    pub fn router(&self) -> Router {
        AppServer::new(&self.config, self.pipeline.clone()).router()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = AppServer::new(&self.config, self.pipeline.clone());
        server.run(listener, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::HandlerResult;
    use crate::http::request::RequestContext;
    use crate::http::response::html;
    use axum::http::StatusCode;

    fn config(environment: Environment, routes: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::for_environment(environment, "z".repeat(64));
        config.routes.dir = routes.to_path_buf();
        config.routes.hot_reload = false;
        config
    }

    #[test]
    fn test_production_registry_frozen() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("about.toml"), "").unwrap();

        let app = Startup::new(config(Environment::Production, dir.path()))
            .handler("ping", |_ctx: &mut RequestContext| -> HandlerResult {
                Ok(html(StatusCode::OK, "pong"))
            })
            .build()
            .unwrap();

        assert_eq!(app.registry().keys(), vec!["about", "ping"]);
        assert!(app.registry().is_frozen());
    }

    #[test]
    fn test_development_registry_mutable() {
        let dir = tempfile::tempdir().unwrap();
        let app = Startup::new(config(Environment::Development, &dir.path().join("missing")))
            .build()
            .unwrap();
        assert!(app.registry().is_empty());
        assert!(!app.registry().is_frozen());
    }

    #[test]
    fn test_bad_unit_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.toml"), "methods = 3").unwrap();
        let result = Startup::new(config(Environment::Test, dir.path())).build();
        assert!(matches!(result, Err(StartupError::Registry(_))));
    }
}
