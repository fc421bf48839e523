//! wsDock gateway library entry.
//!
//! This crate wires the transport, dispatcher, connection registry and
//! built-in services into a cohesive gateway stack. It is intended to be
//! consumed by the binary (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod realtime;
pub mod router;
pub mod services;
pub mod transport;

pub use context::{Context, RequestInfo};
pub use dispatch::{handler_fn, middleware_fn, BoxHandler, BoxMiddleware, Dispatcher, Handler, Middleware};
pub use realtime::{ConnEvent, ConnEventKind, ConnEventListener, ConnRegistry, Delivery};
pub use transport::{Connection, Server};
