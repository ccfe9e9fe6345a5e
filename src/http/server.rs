//! HTTP server setup.
//!
//! # Responsibilities
//! - Wrap the pipeline in an axum `Router` (fallback: every path, every method)
//! - Wire up middleware (request deadline, request ID, tracing)
//! - Stamp security headers outside the deadline so a 408 carries them too
//! - Serve on a listener until the shutdown future resolves

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::map_response_with_state;
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::http::pipeline::RequestPipeline;

/// HTTP front end for the request pipeline.
pub struct AppServer {
    router: Router,
}

impl AppServer {
    pub fn new(config: &AppConfig, pipeline: Arc<RequestPipeline>) -> Self {
        Self {
            router: Self::build_router(config, pipeline),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, pipeline: Arc<RequestPipeline>) -> Router {
        Router::new()
            .fallback(pipeline_handler)
            .with_state(pipeline.clone())
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(map_response_with_state(pipeline, security_headers))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn pipeline_handler(
    State(pipeline): State<Arc<RequestPipeline>>,
    request: Request<Body>,
) -> Response {
    pipeline.handle(request).await
}

/// Responses produced by the middleware itself never pass the pipeline.
async fn security_headers(
    State(pipeline): State<Arc<RequestPipeline>>,
    mut response: Response,
) -> Response {
    pipeline.security_headers().apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::observability::NullSink;
    use crate::routing::RouteRegistry;
    use crate::view::LayoutRenderer;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server() -> AppServer {
        let config = Arc::new(AppConfig::for_environment(Environment::Test, "s".repeat(64)));
        let pipeline = RequestPipeline::new(
            config.clone(),
            Arc::new(RouteRegistry::new()),
            Arc::new(LayoutRenderer::new()),
            Arc::new(NullSink),
        )
        .unwrap();
        AppServer::new(&config, Arc::new(pipeline))
    }

    #[tokio::test]
    async fn test_request_id_is_set_and_propagated() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_incoming_request_id_kept() {
        let request = Request::builder()
            .uri("/")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = server().router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    struct Slow;

    impl crate::routing::Handler for Slow {
        fn call<'a>(
            &'a self,
            _ctx: &'a mut crate::http::RequestContext,
        ) -> futures_util::future::BoxFuture<'a, crate::http::HandlerResult> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Response::new(Body::empty()))
            })
        }
    }

    #[tokio::test]
    async fn test_timeout_response_carries_security_headers() {
        let mut config = AppConfig::for_environment(Environment::Production, "s".repeat(64));
        config.timeouts.request_secs = 1;
        let config = Arc::new(config);
        let registry = Arc::new(RouteRegistry::new());
        registry.register("slow", Slow).unwrap();
        let pipeline = RequestPipeline::new(
            config.clone(),
            registry,
            Arc::new(LayoutRenderer::new()),
            Arc::new(NullSink),
        )
        .unwrap();

        let response = AppServer::new(&config, Arc::new(pipeline))
            .router()
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers()["x-frame-options"], "deny");
        assert_eq!(response.headers().get_all("content-security-policy").iter().count(), 1);
    }
}
