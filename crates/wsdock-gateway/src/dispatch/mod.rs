//! Action routing.
//!
//! Re-exports the dispatcher and the handler/middleware seams so services
//! can depend on this module directly.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::Dispatcher;
pub use handler::{compose, handler_fn, middleware_fn, trace_actions, BoxHandler, BoxMiddleware, Handler, Middleware};
