use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use wsdock_core::error::{Result, WsDockError};
use wsdock_core::protocol::{parse_envelope, Envelope, Message, Reply};

use super::handler::{compose, BoxHandler, BoxMiddleware};
use crate::context::Context;

/// Action table. Routes are composed with their middleware chain at
/// registration; dispatch is a single map lookup.
#[derive(Default)]
pub struct Dispatcher {
    routes: HashMap<String, BoxHandler>,
    global: Vec<BoxMiddleware>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware applied to every route registered after this call.
    pub fn use_middleware(&mut self, mw: BoxMiddleware) {
        self.global.push(mw);
    }

    /// Bind `action`. Global middleware runs first (in registration order),
    /// then `route_mw`, then the handler. Re-registering replaces the route.
    pub fn register(&mut self, action: impl Into<String>, handler: BoxHandler, route_mw: Vec<BoxMiddleware>) {
        let action = action.into();
        let chain: Vec<BoxMiddleware> = self.global.iter().cloned().chain(route_mw).collect();
        if self.routes.insert(action.clone(), compose(&chain, handler)).is_some() {
            warn!(%action, "route replaced");
        }
    }

    pub fn contains(&self, action: &str) -> bool {
        self.routes.contains_key(action)
    }

    pub fn actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Decode one inbound message into an envelope.
    pub fn parse_message(msg: &Message) -> Result<Envelope> {
        parse_envelope(msg.as_text()?)
    }

    /// Run the route bound to `ctx.action()`.
    ///
    /// Unknown actions and handler errors are answered on the connection
    /// before the error is returned to the caller.
    pub async fn dispatch(&self, ctx: Context) -> Result<()> {
        let Some(handler) = self.routes.get(ctx.action()).cloned() else {
            let action = ctx.action().to_owned();
            if let Err(e) = ctx.reply(Reply::unknown_action()).await {
                debug!(%action, error = %e, "unknown action reply not delivered");
            }
            return Err(WsDockError::UnknownAction(action));
        };

        let conn = Arc::clone(ctx.conn());
        let request_id = ctx.request_id().to_owned();

        let res = handler.call(ctx).await;
        if let Err(e) = &res {
            if let Ok(reply) = Reply::from_error(e).with_request_id(&request_id).to_json() {
                if let Err(we) = conn.write_message(&reply).await {
                    debug!(error = %we, "error reply not delivered");
                }
            }
        }
        res
    }
}
