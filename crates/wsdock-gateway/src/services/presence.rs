use async_trait::async_trait;
use tracing::info;

use crate::realtime::{ConnEvent, ConnEventKind, ConnEventListener};

/// Logs every lifecycle transition.
#[derive(Debug, Default)]
pub struct PresenceLog;

#[async_trait]
impl ConnEventListener for PresenceLog {
    async fn on_conn_event(&self, event: ConnEvent) {
        match event.kind {
            ConnEventKind::Online => info!(
                event = event.kind.as_str(),
                conn_id = %event.conn_id(),
                client_ip = %event.info.client_ip(),
                "presence"
            ),
            ConnEventKind::Offline => info!(
                event = event.kind.as_str(),
                conn_id = %event.conn_id(),
                reason = event.close_reason.as_deref().unwrap_or(""),
                online_for_ms = (event.triggered_at - event.info.created_at()).num_milliseconds(),
                "presence"
            ),
        }
    }
}
