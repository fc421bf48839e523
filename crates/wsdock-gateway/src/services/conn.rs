use serde_json::json;

use wsdock_core::error::{Result, WsDockError};

use crate::context::Context;

/// `conn.info`: describe the calling connection.
pub async fn conn_info(ctx: Context) -> Result<()> {
    let info = ctx
        .registry()
        .get_conn_info(ctx.conn_id())
        .ok_or_else(|| WsDockError::NotFound(format!("connection {}", ctx.conn_id())))?;

    ctx.success(json!({
        "conn_id": info.conn_id(),
        "client_ip": info.client_ip(),
        "connected_at": info.created_at().to_rfc3339(),
        "online": ctx.registry().conn_count(),
    }))
    .await
}
