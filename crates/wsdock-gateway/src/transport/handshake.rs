//! Upgrade request validation (RFC6455 §4.2).
//!
//! Checks run in a fixed order and the first failure wins:
//! `Upgrade`, `Connection`, `Sec-WebSocket-Version`, `Origin`,
//! `Sec-WebSocket-Key`. Nothing is taken over from the HTTP layer until all
//! of them pass.

use axum::http::{header, HeaderMap};
use base64::Engine;
use sha1::{Digest, Sha1};

use wsdock_core::error::{Result, WsDockError};

/// The WebSocket magic GUID appended to the client key.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Wildcard origin: any (or no) `Origin` is accepted.
pub const ANY_ORIGIN: &str = "*";

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Validate the upgrade headers and return the `Sec-WebSocket-Accept` value.
pub fn validate_upgrade(headers: &HeaderMap, allowed_origin: &str) -> Result<String> {
    let upgrade = header_str(headers, header::UPGRADE).unwrap_or_default();
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(WsDockError::Handshake(
            "invalid upgrade header (expected 'websocket')".into(),
        ));
    }

    let connection = header_str(headers, header::CONNECTION).unwrap_or_default();
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(WsDockError::Handshake(
            "invalid connection header (expected 'Upgrade')".into(),
        ));
    }

    if header_str(headers, header::SEC_WEBSOCKET_VERSION) != Some("13") {
        return Err(WsDockError::Handshake(
            "unsupported websocket version (only 13 is supported)".into(),
        ));
    }

    // Non-browser clients send no Origin; only a mismatching one is refused.
    if allowed_origin != ANY_ORIGIN {
        if let Some(origin) = header_str(headers, header::ORIGIN) {
            if !origin.is_empty() && origin != allowed_origin {
                return Err(WsDockError::NotAllowed(format!("origin '{origin}' not allowed")));
            }
        }
    }

    let key = header_str(headers, header::SEC_WEBSOCKET_KEY).unwrap_or_default();
    if key.is_empty() {
        return Err(WsDockError::Handshake(
            "missing 'Sec-WebSocket-Key' header".into(),
        ));
    }

    Ok(compute_accept_key(key))
}

/// `base64(sha1(key ++ GUID))`.
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}
