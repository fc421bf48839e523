use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use wsdock_core::error::{Result, WsDockError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub log: LogSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(WsDockError::UnsupportedVersion);
        }

        self.gateway.validate()?; // Verify the scope of value

        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            log: LogSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upgrade path.
    #[serde(default = "default_path")]
    pub path: String,

    /// Allowed `Origin`; `*` accepts any.
    #[serde(default = "default_origin")]
    pub origin: String,

    #[serde(default = "default_io_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_io_timeout_ms")]
    pub write_timeout_ms: u64,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long shutdown waits for workers before closing them.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    #[serde(default)]
    pub tls: Option<TlsSection>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            origin: default_origin(),
            read_timeout_ms: default_io_timeout_ms(),
            write_timeout_ms: default_io_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_message_size: default_max_message_size(),
            max_connections: default_max_connections(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            tls: None,
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if !self.path.starts_with('/') {
            return Err(WsDockError::BadRequest("gateway.path must start with '/'".into()));
        }
        if matches!(self.path.as_str(), "/healthz" | "/readyz") {
            return Err(WsDockError::BadRequest(
                "gateway.path collides with an operational endpoint".into(),
            ));
        }
        if self.origin.is_empty() {
            return Err(WsDockError::BadRequest(
                "gateway.origin must not be empty (use \"*\" to allow any)".into(),
            ));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(WsDockError::BadRequest(
                "gateway.read_timeout_ms and write_timeout_ms must be positive".into(),
            ));
        }
        if !(1..=60_000).contains(&self.handshake_timeout_ms) {
            return Err(WsDockError::BadRequest(
                "gateway.handshake_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(WsDockError::BadRequest(
                "gateway.max_message_size must be positive".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(WsDockError::BadRequest(
                "gateway.max_connections must be positive".into(),
            ));
        }
        if let Some(tls) = &self.tls {
            if tls.cert_file.is_empty() || tls.key_file.is_empty() {
                return Err(WsDockError::BadRequest(
                    "gateway.tls requires cert_file and key_file".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            WsDockError::BadRequest(format!("gateway.listen must be a valid SocketAddr: {e}"))
        })
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_path() -> String {
    "/ws".into()
}
fn default_origin() -> String {
    "*".into()
}
fn default_io_timeout_ms() -> u64 {
    60_000
}
fn default_handshake_timeout_ms() -> u64 {
    3_000
}
fn default_max_message_size() -> usize {
    1024 * 1024
}
fn default_max_connections() -> usize {
    1000
}
fn default_shutdown_timeout_ms() -> u64 {
    10_000
}

/// WSS listener material (PEM files).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_log_filter() -> String {
    "info".into()
}
