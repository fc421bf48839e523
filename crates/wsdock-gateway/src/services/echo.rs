use serde_json::Value;

use wsdock_core::error::Result;

use crate::context::Context;

/// `echo`: reply with the request's `data` unchanged.
pub async fn echo(ctx: Context) -> Result<()> {
    let data: Value = ctx.bind_json()?;
    ctx.success(data).await
}
