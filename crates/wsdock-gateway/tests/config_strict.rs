#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use wsdock_gateway::config;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
gateway:
  listen: "0.0.0.0:8080"
  max_conections: 10 # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str("version: 1\n").expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.path, "/ws");
    assert_eq!(cfg.gateway.origin, "*");
    assert_eq!(cfg.gateway.max_message_size, 1024 * 1024);
    assert_eq!(cfg.gateway.read_timeout(), Duration::from_secs(60));
    assert!(cfg.gateway.tls.is_none());
    assert_eq!(cfg.log.filter, "info");
}

#[test]
fn full_config_round_trips_values() {
    let ok = r#"
version: 1
gateway:
  listen: "127.0.0.1:9001"
  path: "/socket"
  origin: "https://app.example.com"
  read_timeout_ms: 1500
  write_timeout_ms: 2500
  handshake_timeout_ms: 500
  max_message_size: 4096
  max_connections: 2
  shutdown_timeout_ms: 100
  tls:
    cert_file: "cert.pem"
    key_file: "key.pem"
log:
  filter: "wsdock_gateway=debug"
  json: true
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    let gw = &cfg.gateway;
    assert_eq!(gw.listen_addr().unwrap().port(), 9001);
    assert_eq!(gw.path, "/socket");
    assert_eq!(gw.read_timeout(), Duration::from_millis(1500));
    assert_eq!(gw.write_timeout(), Duration::from_millis(2500));
    assert_eq!(gw.handshake_timeout(), Duration::from_millis(500));
    assert_eq!(gw.shutdown_timeout(), Duration::from_millis(100));
    assert_eq!(gw.max_connections, 2);
    assert_eq!(gw.tls.as_ref().unwrap().key_file, "key.pem");
    assert!(cfg.log.json);
}

#[test]
fn unsupported_version_rejected() {
    let err = config::load_from_str("version: 2\n").expect_err("must fail");
    assert!(matches!(err, wsdock_core::WsDockError::UnsupportedVersion));
}

#[test]
fn out_of_range_values_rejected() {
    for bad in [
        "version: 1\ngateway:\n  listen: \"not an addr\"\n",
        "version: 1\ngateway:\n  path: \"ws\"\n",
        "version: 1\ngateway:\n  path: \"/healthz\"\n",
        "version: 1\ngateway:\n  origin: \"\"\n",
        "version: 1\ngateway:\n  read_timeout_ms: 0\n",
        "version: 1\ngateway:\n  handshake_timeout_ms: 0\n",
        "version: 1\ngateway:\n  max_message_size: 0\n",
        "version: 1\ngateway:\n  max_connections: 0\n",
        "version: 1\ngateway:\n  tls:\n    cert_file: \"\"\n    key_file: \"k.pem\"\n",
    ] {
        let err = config::load_from_str(bad).expect_err(bad);
        assert_eq!(err.client_code().as_str(), "BAD_REQUEST", "{bad}");
    }
}

#[test]
fn missing_file_is_an_error() {
    assert!(config::load_from_file("/nonexistent/wsdock.yaml").is_err());
}
