use serde::Deserialize;
use serde_json::json;

use wsdock_core::error::{Result, WsDockError};

use crate::context::Context;

#[derive(Debug, Deserialize)]
struct SendReq {
    msg: String,
}

/// `chat.send`: fan `{msg}` out to every live connection, sender included.
pub async fn send(ctx: Context) -> Result<()> {
    let req: SendReq = ctx.bind_json()?;
    if req.msg.is_empty() {
        return Err(WsDockError::BadRequest("chat.send requires msg".into()));
    }

    let out = json!({
        "action": "chat.msg",
        "data": { "from": ctx.conn_id(), "msg": req.msg },
    })
    .to_string();

    let report = ctx.registry().broadcast(&out).await;
    ctx.success(json!({
        "delivered": report.delivered,
        "failed": report.failed.len(),
    }))
    .await
}
