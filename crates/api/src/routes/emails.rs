/// `/emails` read surface plus outbound send/reply, both honoring the
/// `Idempotency-Key` header per SPEC_FULL §6.
use crate::context::ApiContext;
use crate::error::ApiError;
use crate::routes::common::{Pagination, principal};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use postbox_core::models::{EmailRecord, ReplyRequest, SendRequest, SentMessage};
use postbox_core::services::thread::ThreadMessage;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<EmailRecord>>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let records = ctx.store.list_email_records(owner, page.limit(), page.offset()).await?;
    Ok(Json(records))
}

async fn owned_email(ctx: &ApiContext, owner: postbox_core::models::UserId, id: Uuid) -> Result<EmailRecord, ApiError> {
    let record = ctx
        .store
        .get_email_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("email not found".to_string()))?;
    if record.owner_user != owner {
        return Err(ApiError::NotFound("email not found".to_string()));
    }
    Ok(record)
}

pub async fn get(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<EmailRecord>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    Ok(Json(owned_email(&ctx, owner, id).await?))
}

pub async fn mark_read(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<EmailRecord>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    owned_email(&ctx, owner, id).await?;
    ctx.store.mark_email_read(id).await?;
    owned_email(&ctx, owner, id).await.map(Json)
}

#[derive(Debug, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadEntry {
    Inbound(EmailRecord),
    Outbound(SentMessage),
}

pub async fn thread(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<Vec<ThreadEntry>>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    owned_email(&ctx, owner, id).await?;
    let messages = ctx.thread_builder.build(owner, id).await?;
    let entries = messages
        .into_iter()
        .map(|m| match m {
            ThreadMessage::Inbound(r) => ThreadEntry::Inbound(r),
            ThreadMessage::Outbound(m) => ThreadEntry::Outbound(m),
        })
        .collect();
    Ok(Json(entries))
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers.get("Idempotency-Key").and_then(|v| v.to_str().ok()).map(str::to_string)
}

pub async fn send(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(mut req): Json<SendRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    if req.idempotency_key.is_none() {
        req.idempotency_key = idempotency_key(&headers);
    }
    let message = ctx.sender.send(owner, &req).await?;
    Ok(Json(message))
}

pub async fn reply(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(mut req): Json<ReplyRequest>,
) -> Result<Json<SentMessage>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    owned_email(&ctx, owner, id).await?;
    if req.idempotency_key.is_none() {
        req.idempotency_key = idempotency_key(&headers);
    }
    let message = ctx.sender.reply(owner, id, &req).await?;
    Ok(Json(message))
}
