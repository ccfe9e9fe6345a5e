//! The handler interface.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::error::HandlerResult;
use crate::http::request::RequestContext;

/// A route handler: request in, response or failure out.
///
/// Plain closures `Fn(&mut RequestContext) -> HandlerResult` are handlers.
/// Handlers that need to await (data access, remote calls) implement the
/// trait directly and return a boxed future.
pub trait Handler: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: Fn(&mut RequestContext) -> HandlerResult + Send + Sync,
{
    fn call<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move { self(ctx) })
    }
}

/// Handler as stored in the registry.
pub type SharedHandler = Arc<dyn Handler>;
