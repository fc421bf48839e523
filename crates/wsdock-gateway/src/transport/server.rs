//! Listener, accept loop and graceful shutdown.
//!
//! Each accepted socket gets its own task: optional TLS, then an HTTP/1
//! connection with upgrades enabled, routed through the axum router. The
//! TLS handshake and the first request head share one handshake deadline,
//! counted from accept; a head that misses it gets a 504.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use wsdock_core::error::{Result, WsDockError};
use wsdock_core::protocol::close_code;

use crate::app_state::AppState;
use crate::config::GatewayConfig;
use crate::dispatch::{BoxHandler, BoxMiddleware, Dispatcher};
use crate::realtime::ConnRegistry;
use crate::router::build_router;
use crate::transport::deadline::{HeadDeadline, HeadSeen};
use crate::transport::tls;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const FORCED_CLOSE_GRACE: Duration = Duration::from_secs(1);
// hyper's header timer only backs up keep-alive requests after the first.
const HEADER_TIMER_SLACK: Duration = Duration::from_secs(1);

pub struct Server {
    cfg: GatewayConfig,
    dispatcher: Dispatcher,
    registry: Arc<ConnRegistry>,
}

impl Server {
    pub fn new(cfg: GatewayConfig) -> Self {
        Self {
            cfg,
            dispatcher: Dispatcher::new(),
            registry: Arc::new(ConnRegistry::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.cfg
    }

    /// Connection registry shared with every worker; valid before `run`.
    pub fn registry(&self) -> Arc<ConnRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn use_middleware(&mut self, mw: BoxMiddleware) -> &mut Self {
        self.dispatcher.use_middleware(mw);
        self
    }

    pub fn register(&mut self, action: impl Into<String>, handler: BoxHandler, route_mw: Vec<BoxMiddleware>) -> &mut Self {
        self.dispatcher.register(action, handler, route_mw);
        self
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.cfg.gateway.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsDockError::Internal(format!("failed to bind {addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves, then drain.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let tls = match &self.cfg.gateway.tls {
            Some(t) => Some(tls::load_acceptor(t)?),
            None => None,
        };

        let hs_timeout = self.cfg.gateway.handshake_timeout();
        let grace = self.cfg.gateway.shutdown_timeout();
        let state = AppState::new(self.cfg, self.dispatcher, self.registry);
        let app = build_router(state.clone());

        let local = listener.local_addr()?;
        let dispatcher = state.dispatcher();
        info!(
            %local,
            path = %state.cfg().gateway.path,
            tls = tls.is_some(),
            actions = ?dispatcher.actions(),
            "wsdock gateway listening"
        );

        let mut sockets = JoinSet::new();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let deadline = Instant::now() + hs_timeout;
                        sockets.spawn(serve_socket(stream, peer, app.clone(), tls.clone(), deadline, hs_timeout));
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
                Some(_) = sockets.join_next(), if !sockets.is_empty() => {}
                _ = &mut shutdown => break,
            }
        }

        drop(listener);
        state.set_draining(true);
        info!(active = state.active_connections(), "shutdown: draining connections");

        if !state.wait_idle(grace).await {
            let registry = state.registry();
            let ids = registry.conn_ids();
            warn!(remaining = ids.len(), "shutdown timeout reached, closing remaining connections");
            for id in ids {
                if let Some(conn) = registry.get_conn_by_conn_id(&id) {
                    if let Err(e) = conn.send_close(close_code::GOING_AWAY, "server shutdown").await {
                        debug!(conn_id = %id, error = %e, "shutdown close frame not delivered");
                    }
                }
                registry.remove_conn(&id, "server shutdown").await;
            }
        }

        // pending handshakes and keep-alive HTTP connections
        sockets.shutdown().await;
        if !state.wait_idle(FORCED_CLOSE_GRACE).await {
            warn!(active = state.active_connections(), "connections still active after shutdown");
        }

        info!("wsdock gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn serve_socket(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    tls: Option<TlsAcceptor>,
    deadline: Instant,
    hs_timeout: Duration,
) {
    match tls {
        Some(acceptor) => match timeout_at(deadline, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => serve_http(stream, peer, app, deadline, hs_timeout).await,
            Ok(Err(e)) => debug!(%peer, error = %e, "tls handshake failed"),
            Err(_) => debug!(%peer, "tls handshake timeout"),
        },
        None => serve_http(stream, peer, app, deadline, hs_timeout).await,
    }
}

async fn serve_http<S>(stream: S, peer: SocketAddr, app: Router, deadline: Instant, hs_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let seen = HeadSeen::default();
    let io = HeadDeadline::new(stream, deadline, seen.clone());

    let svc = service_fn(move |mut req: Request<Incoming>| {
        seen.mark();
        req.extensions_mut().insert(ConnectInfo(peer));
        app.clone().oneshot(req.map(Body::new))
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(hs_timeout + HEADER_TIMER_SLACK)
        .serve_connection(TokioIo::new(io), svc)
        .with_upgrades();

    if let Err(e) = conn.await {
        debug!(%peer, error = %e, "http connection ended with error");
    }
}
