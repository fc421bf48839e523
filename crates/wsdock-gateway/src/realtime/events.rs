//! Connection lifecycle events.
//!
//! Every listener owns an unbounded queue drained by its own task, so
//! `publish` never waits on a listener and events reach each listener in
//! publish order. A listener that panics loses that one event; its queue
//! keeps draining.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use wsdock_core::error::{Result, WsDockError};

use super::registry::ConnInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnEventKind {
    Online,
    Offline,
}

impl ConnEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnEventKind::Online => "websocket.conn.online",
            ConnEventKind::Offline => "websocket.conn.offline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnEvent {
    pub kind: ConnEventKind,
    pub info: Arc<ConnInfo>,
    pub triggered_at: DateTime<Utc>,
    /// Set on `Offline` only.
    pub close_reason: Option<String>,
}

impl ConnEvent {
    pub fn online(info: Arc<ConnInfo>) -> Self {
        Self {
            kind: ConnEventKind::Online,
            info,
            triggered_at: Utc::now(),
            close_reason: None,
        }
    }

    pub fn offline(info: Arc<ConnInfo>, reason: impl Into<String>) -> Self {
        Self {
            kind: ConnEventKind::Offline,
            info,
            triggered_at: Utc::now(),
            close_reason: Some(reason.into()),
        }
    }

    pub fn conn_id(&self) -> &str {
        self.info.conn_id()
    }
}

#[async_trait]
pub trait ConnEventListener: Send + Sync + 'static {
    async fn on_conn_event(&self, event: ConnEvent);
}

#[derive(Default)]
pub struct ConnEventBus {
    listeners: DashMap<String, mpsc::UnboundedSender<ConnEvent>>,
}

impl ConnEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `id`, replacing any listener already there.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn subscribe(&self, id: impl Into<String>, listener: Arc<dyn ConnEventListener>) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            WsDockError::Internal("event listeners require a running tokio runtime".into())
        })?;

        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(pump(id.clone(), listener, rx));

        if self.listeners.insert(id.clone(), tx).is_some() {
            debug!(listener = %id, "conn event listener replaced");
        }
        Ok(())
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn publish(&self, event: ConnEvent) {
        for entry in self.listeners.iter() {
            if entry.value().send(event.clone()).is_err() {
                warn!(listener = %entry.key(), kind = event.kind.as_str(), "conn event listener queue closed");
            }
        }
    }
}

async fn pump(
    id: String,
    listener: Arc<dyn ConnEventListener>,
    mut rx: mpsc::UnboundedReceiver<ConnEvent>,
) {
    while let Some(event) = rx.recv().await {
        let kind = event.kind;
        let conn_id = event.conn_id().to_owned();
        let l = Arc::clone(&listener);
        if let Err(e) = tokio::spawn(async move { l.on_conn_event(event).await }).await {
            error!(listener = %id, kind = kind.as_str(), conn_id = %conn_id, error = %e, "conn event listener failed");
        }
    }
    debug!(listener = %id, "conn event listener stopped");
}
