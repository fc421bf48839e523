//! WebSocket upgrade handler and per-connection worker.
//!
//! Responsibilities:
//! - Admission (connection limit, draining) before any header work
//! - Handshake validation, then take the raw stream over from hyper
//! - Register the connection, run its read/dispatch loop, unregister on exit

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info_span, warn, Instrument};

use wsdock_core::error::WsDockError;
use wsdock_core::protocol::{close_code, Reply};

use crate::app_state::{AppState, ConnSlot};
use crate::context::{Context, RequestInfo};
use crate::dispatch::Dispatcher;
use crate::transport::connection::{Connection, ConnectionOptions};
use crate::transport::handshake;

// --------------------
// Responses
// --------------------
fn reject(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, msg.into()).into_response()
}

fn switching_protocols(accept: &str) -> Response {
    axum::http::Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(Body::empty())
        .unwrap_or_else(|e| {
            error!(error = %e, "failed to build upgrade response");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "upgrade failed")
        })
}

/// Offline reason recorded for a worker that stopped on `err`.
pub fn close_reason(err: &WsDockError) -> String {
    match err {
        WsDockError::ClientClosed | WsDockError::ConnectionClosed => "normal closure".into(),
        WsDockError::PayloadTooLarge => "size exceeded".into(),
        other => other.to_string(),
    }
}

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(State(app): State<AppState>, mut req: Request) -> Response {
    if app.is_draining() {
        return reject(StatusCode::SERVICE_UNAVAILABLE, "server shutting down");
    }

    let slot = match app.try_admit() {
        Ok(slot) => slot,
        Err(e) => {
            warn!(active = app.active_connections(), error = %e, "connection rejected");
            return reject(StatusCode::SERVICE_UNAVAILABLE, "too many connections");
        }
    };

    let gw = &app.cfg().gateway;
    let accept = match handshake::validate_upgrade(req.headers(), &gw.origin) {
        Ok(accept) => accept,
        Err(e) => {
            debug!(error = %e, "handshake rejected");
            let (status, reason) = match e {
                WsDockError::NotAllowed(r) => (StatusCode::FORBIDDEN, r),
                WsDockError::Handshake(r) => (StatusCode::BAD_REQUEST, r),
                other => (StatusCode::BAD_REQUEST, other.to_string()),
            };
            return reject(status, format!("handshake failed: {reason}"));
        }
    };

    let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
        error!("request carries no upgrade handle");
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "hijack unsupported");
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let request = Arc::new(RequestInfo::from_parts(req.method(), req.uri(), req.headers(), peer));
    let upgrade_timeout = gw.handshake_timeout();

    // hyper completes the upgrade only after the 101 below is flushed.
    tokio::spawn(async move {
        match tokio::time::timeout(upgrade_timeout, on_upgrade).await {
            Ok(Ok(upgraded)) => run_connection(app, TokioIo::new(upgraded), request, slot).await,
            Ok(Err(e)) => warn!(error = %e, "upgrade failed"),
            Err(_) => warn!("upgrade timeout"),
        }
    });

    switching_protocols(&accept)
}

// --------------------
// Worker
// --------------------
pub async fn run_connection<S>(app: AppState, stream: S, request: Arc<RequestInfo>, slot: ConnSlot)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let opts = ConnectionOptions::from_config(&app.cfg().gateway);
    let conn = Arc::new(Connection::new(stream, request.peer_addr(), opts));
    let client_ip = request.client_ip();

    let registry = app.registry();
    let conn_id = registry.add_conn(Arc::clone(&conn), client_ip.clone());
    let span = info_span!("ws_conn", conn_id = %conn_id, client_ip = %client_ip);

    // Checked after registering: a connection added after the shutdown sweep
    // took its snapshot still sees the flag here.
    if app.is_draining() {
        async {
            debug!("server draining, closing new connection");
            if let Err(e) = conn.send_close(close_code::GOING_AWAY, "server shutdown").await {
                debug!(error = %e, "shutdown close frame not delivered");
            }
            registry.remove_conn(&conn_id, "server shutdown").await;
        }
        .instrument(span)
        .await;
        conn.close().await;
        drop(slot);
        return;
    }

    let reason = message_loop(&app, &conn, &conn_id, &request)
        .instrument(span.clone())
        .await;

    registry.remove_conn(&conn_id, &reason).instrument(span).await;
    conn.close().await;
    drop(slot);
}

async fn message_loop(app: &AppState, conn: &Arc<Connection>, conn_id: &str, request: &Arc<RequestInfo>) -> String {
    let dispatcher = app.dispatcher();
    let registry = app.registry();

    loop {
        let msg = match conn.read_message().await {
            Ok(msg) => msg,
            Err(e) => {
                match &e {
                    WsDockError::ClientClosed | WsDockError::ConnectionClosed => debug!(error = %e, "ws read finished"),
                    _ => warn!(error = %e, "ws read failed"),
                }
                return close_reason(&e);
            }
        };

        let env = match Dispatcher::parse_message(&msg) {
            Ok(env) => env,
            Err(e) => {
                debug!(error = %e, len = msg.len(), "ws message rejected");
                if let Ok(body) = Reply::bad_message().to_json() {
                    if let Err(we) = conn.write_message(&body).await {
                        debug!(error = %we, "bad message reply not delivered");
                    }
                }
                continue;
            }
        };

        let ctx = Context::new(Arc::clone(conn), conn_id, env, Arc::clone(request), Arc::clone(&registry));
        if let Err(e) = dispatcher.dispatch(ctx).await {
            debug!(error = %e, "dispatch returned error");
        }
    }
}
