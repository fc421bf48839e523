//! Per-message handler context.
//!
//! A `Context` is built for every inbound envelope and handed by value down
//! the middleware chain. It carries the envelope, the originating connection,
//! the handshake request and a scratch map for middleware-to-handler values.

pub mod request;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use serde_json::Value;

use wsdock_core::error::{Result, WsDockError};
use wsdock_core::protocol::{Envelope, Reply};

use crate::realtime::ConnRegistry;
use crate::transport::connection::Connection;

pub use request::RequestInfo;

pub struct Context {
    conn: Arc<Connection>,
    conn_id: String,
    action: String,
    request_id: String,
    data: Option<Box<RawValue>>,
    request: Arc<RequestInfo>,
    registry: Arc<ConnRegistry>,
    params: HashMap<String, String>,
}

impl Context {
    pub fn new(
        conn: Arc<Connection>,
        conn_id: impl Into<String>,
        env: Envelope,
        request: Arc<RequestInfo>,
        registry: Arc<ConnRegistry>,
    ) -> Self {
        Self {
            conn,
            conn_id: conn_id.into(),
            action: env.action,
            request_id: env.request_id,
            data: env.data,
            request,
            registry,
            params: HashMap::new(),
        }
    }

    pub fn conn(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn registry(&self) -> &Arc<ConnRegistry> {
        &self.registry
    }

    /// Raw JSON of `data`, untouched since decode.
    pub fn data_raw(&self) -> Option<&str> {
        self.data.as_deref().map(RawValue::get)
    }

    /// Deserialize `data`. A missing payload binds as `{}`.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = self.data_raw().unwrap_or("{}");
        serde_json::from_str(raw).map_err(|e| WsDockError::BadRequest(format!("invalid data: {e}")))
    }

    /// Context params shadow the handshake query string.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.param(key).or_else(|| self.request.query(key))
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.request.header(key)
    }

    /// Method of the handshake request.
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn client_ip(&self) -> String {
        self.request.client_ip()
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn set_attr(&self, key: impl Into<String>, value: Value) {
        self.registry.set_conn_attr(&self.conn_id, key, value);
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.registry.get_conn_attr(&self.conn_id, key)
    }

    /// Write a reply tagged with this message's `request_id`.
    pub async fn reply(&self, reply: Reply) -> Result<()> {
        let body = reply.with_request_id(&self.request_id).to_json()?;
        self.conn.write_message(&body).await
    }

    pub async fn success(&self, data: Value) -> Result<()> {
        self.reply(Reply::success(data)).await
    }

    pub async fn error(&self, code: u16, msg: impl Into<String>) -> Result<()> {
        self.reply(Reply::error(code, msg)).await
    }

    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.conn.write_message(text).await
    }
}
