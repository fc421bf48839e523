//! Transport layer (WebSocket).
//!
//! Exposes the accept loop, the HTTP upgrade handler and the per-connection
//! frame I/O that sits under the dispatcher.

pub mod connection;
mod deadline;
pub mod handshake;
pub mod server;
pub mod tls;
pub mod ws;

pub use connection::{Connection, ConnectionOptions};
pub use server::Server;
