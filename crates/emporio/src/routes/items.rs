//! Item endpoints.

use emporio_core::AppError;
use emporio_server::{HandlerContext, HandlerResult};
use serde_json::{json, Value};

/// `GET /items`.
pub async fn list_items(ctx: HandlerContext) -> HandlerResult<Value> {
    tracing::debug!(user = ?ctx.claims().map(emporio_core::Claims::log_id), "listing items");
    Ok(json!({
        "items": [],
        "request_id": ctx.request_id().to_string(),
    }))
}

/// `GET /items/{item_id}`.
pub async fn get_item(ctx: HandlerContext) -> HandlerResult<Value> {
    let item_id: i64 = ctx.parse_param("item_id")?;
    Ok(json!({
        "item_id": item_id,
        "request_id": ctx.request_id().to_string(),
    }))
}

/// `GET /items/{item_id}/details`. Details are not stored yet, so this
/// always fails server-side.
pub async fn get_item_details(ctx: HandlerContext) -> HandlerResult<Value> {
    let item_id: i64 = ctx.parse_param("item_id")?;
    Err(AppError::internal(format!(
        "details lookup for item {item_id} is not available"
    )))
}
