//! Shared application state for the wsDock gateway.
//!
//! Holds the frozen config, the action table, the connection registry and
//! the admission counters used by the upgrade handler and shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep, Instant};

use wsdock_core::error::{Result, WsDockError};

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::realtime::ConnRegistry;

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ConnRegistry>,
    active: AtomicUsize,
    draining: AtomicBool,
    released: Notify,
}

impl AppState {
    pub fn new(cfg: GatewayConfig, dispatcher: Dispatcher, registry: Arc<ConnRegistry>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                dispatcher: Arc::new(dispatcher),
                registry,
                active: AtomicUsize::new(0),
                draining: AtomicBool::new(false),
                released: Notify::new(),
            }),
        }
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    pub fn registry(&self) -> Arc<ConnRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Connections admitted and not yet finished (including mid-handshake).
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Acquire)
    }

    pub fn set_draining(&self, draining: bool) {
        self.inner.draining.store(draining, Ordering::Release);
    }

    /// Reserve a connection slot, or fail when the limit is reached.
    pub fn try_admit(&self) -> Result<ConnSlot> {
        let max = self.inner.cfg.gateway.max_connections;
        let n = self.inner.active.fetch_add(1, Ordering::AcqRel) + 1;
        if n > max {
            self.inner.active.fetch_sub(1, Ordering::AcqRel);
            return Err(WsDockError::TooManyConnections);
        }
        Ok(ConnSlot { state: self.clone() })
    }

    /// Wait until every slot is released. Returns false if `limit` elapsed first.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            if self.active_connections() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::select! {
                _ = self.inner.released.notified() => {}
                _ = sleep(IDLE_POLL.min(deadline - now)) => {}
            }
        }
    }
}

/// Admission slot; releasing it is tied to drop.
pub struct ConnSlot {
    state: AppState,
}

impl Drop for ConnSlot {
    fn drop(&mut self) {
        self.state.inner.active.fetch_sub(1, Ordering::AcqRel);
        self.state.inner.released.notify_waiters();
    }
}
