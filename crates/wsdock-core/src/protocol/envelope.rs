//! Application envelope (JSON inside text messages).
//!
//! The core stores `data` as `RawValue` so handlers decide how (and whether)
//! to parse it.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

use crate::error::{Result, WsDockError};

/// Inbound envelope: `{"action": .., "request_id": .., "data": ..}`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Handler key; required and non-empty.
    pub action: String,
    /// Opaque correlation token echoed back in replies.
    #[serde(default)]
    pub request_id: String,
    /// Optional payload, stored as raw JSON (lazy parsing).
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

/// Parse and validate an envelope from a text message.
pub fn parse_envelope(raw: &str) -> Result<Envelope> {
    let env: Envelope = serde_json::from_str(raw)
        .map_err(|e| WsDockError::BadRequest(format!("invalid envelope json: {e}")))?;
    if env.action.is_empty() {
        return Err(WsDockError::BadRequest("envelope action is empty".into()));
    }
    Ok(env)
}

/// Engine reply: `{"code": int, "msg": string, "data": any}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub code: u16,
    pub msg: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Reply {
    pub fn success(data: Value) -> Self {
        Self {
            code: 200,
            msg: "success".into(),
            data,
            request_id: None,
        }
    }

    pub fn error(code: u16, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: Value::Null,
            request_id: None,
        }
    }

    /// Reply sent when an inbound message cannot be parsed.
    pub fn bad_message() -> Self {
        Self::error(400, "bad message")
    }

    /// Reply sent when no handler is registered for the action.
    pub fn unknown_action() -> Self {
        Self::error(404, "unknown action")
    }

    /// Reply derived from a handler error.
    pub fn from_error(err: &WsDockError) -> Self {
        Self::error(err.client_code().status(), err.to_string())
    }

    /// Attach the correlation token; empty tokens are not echoed.
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        if !request_id.is_empty() {
            self.request_id = Some(request_id.to_owned());
        }
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| WsDockError::Internal(format!("reply encode failed: {e}")))
    }
}
