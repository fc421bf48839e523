//! WSS listener material.
//!
//! Certificates and the private key are read once at startup; any failure
//! aborts startup instead of serving plain traffic.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use wsdock_core::error::{Result, WsDockError};

use crate::config::TlsSection;

pub fn load_acceptor(tls: &TlsSection) -> Result<TlsAcceptor> {
    let certs = load_certs(&tls.cert_file)?;
    let key = load_key(&tls.key_file)?;

    let cfg = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| WsDockError::Tls(format!("invalid cert/key pair: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(cfg)))
}

fn open(path: &str) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| WsDockError::Tls(format!("open {path}: {e}")))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| WsDockError::Tls(format!("parse {path}: {e}")))?;
    if certs.is_empty() {
        return Err(WsDockError::Tls(format!("no certificate found in {path}")));
    }
    Ok(certs)
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| WsDockError::Tls(format!("parse {path}: {e}")))?
        .ok_or_else(|| WsDockError::Tls(format!("no private key found in {path}")))
}
