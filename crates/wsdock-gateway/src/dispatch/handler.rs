//! Handler and middleware traits.
//!
//! A middleware wraps the next handler into a new handler, so a route is a
//! single composed `BoxHandler` built once at registration time.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use wsdock_core::error::Result;

use crate::context::Context;

#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, ctx: Context) -> Result<()>;
}

pub type BoxHandler = Arc<dyn Handler>;

pub trait Middleware: Send + Sync + 'static {
    fn wrap(&self, next: BoxHandler) -> BoxHandler;
}

pub type BoxMiddleware = Arc<dyn Middleware>;

struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<()> {
        (self.f)(ctx).await
    }
}

/// Lift an async fn into a handler.
pub fn handler_fn<F, Fut>(f: F) -> BoxHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(HandlerFn { f })
}

struct MiddlewareFn<F> {
    f: Arc<F>,
}

struct Wrapped<F> {
    f: Arc<F>,
    next: BoxHandler,
}

impl<F, Fut> Middleware for MiddlewareFn<F>
where
    F: Fn(Context, BoxHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn wrap(&self, next: BoxHandler) -> BoxHandler {
        Arc::new(Wrapped {
            f: Arc::clone(&self.f),
            next,
        })
    }
}

#[async_trait]
impl<F, Fut> Handler for Wrapped<F>
where
    F: Fn(Context, BoxHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: Context) -> Result<()> {
        (self.f)(ctx, Arc::clone(&self.next)).await
    }
}

/// Lift an async fn `(ctx, next)` into a middleware. Calling `next.call(ctx)`
/// continues the chain; returning without it short-circuits.
pub fn middleware_fn<F, Fut>(f: F) -> BoxMiddleware
where
    F: Fn(Context, BoxHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(MiddlewareFn { f: Arc::new(f) })
}

/// Wrap `handler` so that `chain[0]` runs outermost.
pub fn compose(chain: &[BoxMiddleware], handler: BoxHandler) -> BoxHandler {
    chain.iter().rev().fold(handler, |next, mw| mw.wrap(next))
}

/// Per-action tracing: outcome and latency of every dispatched message.
pub fn trace_actions() -> BoxMiddleware {
    middleware_fn(|ctx: Context, next: BoxHandler| async move {
        let action = ctx.action().to_owned();
        let request_id = ctx.request_id().to_owned();
        let started = Instant::now();

        let res = next.call(ctx).await;

        let elapsed_us = started.elapsed().as_micros() as u64;
        match &res {
            Ok(()) => debug!(%action, %request_id, elapsed_us, "action handled"),
            Err(e) => warn!(%action, %request_id, elapsed_us, error = %e, "action failed"),
        }
        res
    })
}
