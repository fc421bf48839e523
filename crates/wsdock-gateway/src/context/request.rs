use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::{HeaderMap, Method, Uri};

/// Read-only view of the handshake request, kept for the connection's lifetime.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
}

impl RequestInfo {
    pub fn from_parts(method: &Method, uri: &Uri, headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        Self {
            method: method.clone(),
            path: uri.path().to_owned(),
            query,
            headers: headers.clone(),
            peer,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// `X-Real-IP`, then the first `X-Forwarded-For` hop, then the peer address.
    pub fn client_ip(&self) -> String {
        if let Some(ip) = self.header("x-real-ip").map(str::trim).filter(|s| !s.is_empty()) {
            return ip.to_owned();
        }
        if let Some(first) = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return first.to_owned();
        }
        self.peer
            .map(|p| p.ip().to_string())
            .unwrap_or_else(|| "unknown".to_owned())
    }
}
