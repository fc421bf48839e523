//! Live connection registry.
//!
//! - `conn_id -> ConnInfo` (uuid v4 ids, unique for the process lifetime)
//! - every insert publishes `Online`, every successful remove publishes `Offline`
//! - map guards are never held across an `.await`

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use wsdock_core::error::{Result, WsDockError};

use super::events::{ConnEvent, ConnEventBus};
use crate::transport::connection::Connection;

pub struct ConnInfo {
    conn_id: String,
    client_ip: String,
    created_at: DateTime<Utc>,
    conn: Arc<Connection>,
    attrs: DashMap<String, Value>,
}

impl fmt::Debug for ConnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnInfo")
            .field("conn_id", &self.conn_id)
            .field("client_ip", &self.client_ip)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl ConnInfo {
    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.attrs.get(key).map(|v| v.value().clone())
    }

    pub fn set_attr(&self, key: impl Into<String>, value: Value) {
        self.attrs.insert(key.into(), value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub conn_id: String,
    pub error: String,
}

/// Outcome of a fan-out send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: Vec<DeliveryFailure>,
}

impl Delivery {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, conn_id: &str, error: impl fmt::Display) {
        warn!(conn_id = %conn_id, error = %error, "message delivery failed");
        self.failed.push(DeliveryFailure {
            conn_id: conn_id.to_owned(),
            error: error.to_string(),
        });
    }
}

#[derive(Default)]
pub struct ConnRegistry {
    conns: DashMap<String, Arc<ConnInfo>>,
    events: ConnEventBus,
}

impl ConnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_bus(&self) -> &ConnEventBus {
        &self.events
    }

    /// Register a live connection and return its id.
    pub fn add_conn(&self, conn: Arc<Connection>, client_ip: impl Into<String>) -> String {
        let conn_id = Uuid::new_v4().to_string();
        let info = Arc::new(ConnInfo {
            conn_id: conn_id.clone(),
            client_ip: client_ip.into(),
            created_at: Utc::now(),
            conn,
            attrs: DashMap::new(),
        });

        // Publish while the entry guard is held so a racing remove cannot
        // emit Offline ahead of Online.
        let entry = self
            .conns
            .entry(conn_id.clone())
            .or_insert_with(|| Arc::clone(&info));
        self.events.publish(ConnEvent::online(Arc::clone(&info)));
        drop(entry);

        info!(conn_id = %conn_id, client_ip = %info.client_ip(), total = self.conns.len(), "ws connection online");
        conn_id
    }

    /// Unregister and close a connection. Returns false if it was already gone.
    pub async fn remove_conn(&self, conn_id: &str, reason: &str) -> bool {
        let Some((_, info)) = self.conns.remove(conn_id) else {
            return false;
        };
        info!(conn_id = %conn_id, client_ip = %info.client_ip(), reason = %reason, total = self.conns.len(), "ws connection offline");
        self.events.publish(ConnEvent::offline(Arc::clone(&info), reason));
        info.conn().close().await;
        true
    }

    pub async fn close_conn_by_conn_id(&self, conn_id: &str, reason: &str) -> Result<()> {
        if self.remove_conn(conn_id, reason).await {
            Ok(())
        } else {
            Err(WsDockError::NotFound(format!("connection {conn_id}")))
        }
    }

    pub fn get_conn_info(&self, conn_id: &str) -> Option<Arc<ConnInfo>> {
        self.conns.get(conn_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_conn_by_conn_id(&self, conn_id: &str) -> Option<Arc<Connection>> {
        self.conns.get(conn_id).map(|r| Arc::clone(r.value().conn()))
    }

    pub fn conn_count(&self) -> usize {
        self.conns.len()
    }

    pub fn conn_ids(&self) -> Vec<String> {
        self.conns.iter().map(|e| e.key().clone()).collect()
    }

    /// No-op when the connection is gone.
    pub fn set_conn_attr(&self, conn_id: &str, key: impl Into<String>, value: Value) {
        if let Some(info) = self.get_conn_info(conn_id) {
            info.set_attr(key, value);
        }
    }

    pub fn get_conn_attr(&self, conn_id: &str, key: &str) -> Option<Value> {
        self.get_conn_info(conn_id)?.attr(key)
    }

    pub async fn send_to_conn_id(&self, conn_id: &str, message: &str) -> Result<()> {
        let info = self
            .get_conn_info(conn_id)
            .ok_or_else(|| WsDockError::NotFound(format!("connection {conn_id}")))?;
        info.conn().write_message(message).await
    }

    /// Send to each listed id. Unknown ids and failed writes are reported,
    /// they never stop delivery to the rest.
    pub async fn multicast<S: AsRef<str>>(&self, conn_ids: &[S], message: &str) -> Delivery {
        let mut report = Delivery::default();
        let mut targets = Vec::with_capacity(conn_ids.len());
        for id in conn_ids {
            let id = id.as_ref();
            match self.get_conn_info(id) {
                Some(info) => targets.push(info),
                None => report.fail(id, "connection not found"),
            }
        }
        fan_out(targets, message, report).await
    }

    pub async fn broadcast(&self, message: &str) -> Delivery {
        let targets: Vec<Arc<ConnInfo>> = self.conns.iter().map(|e| Arc::clone(e.value())).collect();
        fan_out(targets, message, Delivery::default()).await
    }
}

async fn fan_out(targets: Vec<Arc<ConnInfo>>, message: &str, mut report: Delivery) -> Delivery {
    let mut sends: FuturesUnordered<_> = targets
        .into_iter()
        .map(|info| async move {
            let res = info.conn().write_message(message).await;
            (info, res)
        })
        .collect();

    while let Some((info, res)) = sends.next().await {
        match res {
            Ok(()) => report.delivered += 1,
            Err(e) => report.fail(info.conn_id(), e),
        }
    }
    report
}
