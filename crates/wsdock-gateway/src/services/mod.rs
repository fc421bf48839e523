//! Built-in actions.

pub mod chat;
pub mod conn;
pub mod echo;
pub mod presence;

use std::sync::Arc;

use wsdock_core::error::Result;

use crate::dispatch::handler_fn;
use crate::transport::Server;

pub use presence::PresenceLog;

/// Register the built-in actions and the presence log listener.
pub fn register_builtin(server: &mut Server) -> Result<()> {
    server
        .register("echo", handler_fn(echo::echo), vec![])
        .register("chat.send", handler_fn(chat::send), vec![])
        .register("conn.info", handler_fn(conn::conn_info), vec![]);

    server
        .registry()
        .event_bus()
        .subscribe("presence_log", Arc::new(PresenceLog))
}
