/// `/endpoints` CRUD plus `/endpoints/{id}/test` webhook test-delivery.
use crate::context::ApiContext;
use crate::error::ApiError;
use crate::routes::common::{Pagination, principal};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use postbox_core::models::{DeliveryAttempt, Endpoint, EndpointConfig, EndpointId};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Endpoint>>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let endpoints = ctx.store.list_endpoints(owner).await?;
    Ok(Json(page.apply(endpoints)))
}

#[derive(Debug, Deserialize)]
pub struct CreateEndpointRequest {
    pub name: String,
    #[serde(flatten)]
    pub config: EndpointConfig,
}

pub async fn create(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(req): Json<CreateEndpointRequest>,
) -> Result<Json<Endpoint>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    req.config.validate()?;

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("endpoint name must not be empty".to_string()));
    }
    if ctx.store.list_endpoints(owner).await?.iter().any(|e| e.name.eq_ignore_ascii_case(&name)) {
        return Err(ApiError::Conflict(format!("endpoint {name} already exists")));
    }

    let endpoint = Endpoint {
        id: EndpointId(Uuid::new_v4()),
        name,
        owner_user: owner,
        config: req.config,
        is_active: true,
        total_deliveries: 0,
        successful_deliveries: 0,
        failed_deliveries: 0,
        last_used: None,
        created_at: chrono::Utc::now(),
    };
    ctx.store.create_endpoint(&endpoint).await?;
    Ok(Json(endpoint))
}

async fn owned_endpoint(ctx: &ApiContext, owner: postbox_core::models::UserId, id: Uuid) -> Result<Endpoint, ApiError> {
    let endpoint = ctx
        .store
        .get_endpoint(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("endpoint not found".to_string()))?;
    if endpoint.owner_user != owner {
        return Err(ApiError::NotFound("endpoint not found".to_string()));
    }
    Ok(endpoint)
}

pub async fn get(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<Endpoint>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    Ok(Json(owned_endpoint(&ctx, owner, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateEndpointRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub config: Option<EndpointConfig>,
}

pub async fn update(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEndpointRequest>,
) -> Result<Json<Endpoint>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let mut endpoint = owned_endpoint(&ctx, owner, id).await?;

    if let Some(name) = req.name {
        endpoint.name = name;
    }
    if let Some(is_active) = req.is_active {
        endpoint.is_active = is_active;
    }
    if let Some(config) = req.config {
        config.validate()?;
        endpoint.config = config;
    }

    ctx.store.update_endpoint(&endpoint).await?;
    Ok(Json(endpoint))
}

pub async fn delete(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    owned_endpoint(&ctx, owner, id).await?;
    ctx.store.delete_endpoint(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Sends a synthetic `EmailRecord` through the endpoint's real dispatch
/// path (webhook POST, or an email/email_group forward send) so the caller
/// can confirm connectivity before relying on it for live mail.
pub async fn test(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryAttempt>, ApiError> {
    use postbox_core::models::{AddressGroup, EmailAddress, EmailRecord, EmailRecordId, EmailStatus, IngestionEventId, ParsedEmail};

    let owner = principal(&ctx, &headers).await?;
    let endpoint = owned_endpoint(&ctx, owner, id).await?;

    let record = EmailRecord {
        id: EmailRecordId(Uuid::new_v4()),
        ingestion_event_id: IngestionEventId(Uuid::new_v4()),
        message_id: format!("test-{}@postbox.dev", Uuid::new_v4()),
        from: "test@postbox.dev".to_string(),
        to: vec!["test-recipient@postbox.dev".to_string()],
        recipient: "test-recipient@postbox.dev".to_string(),
        subject: Some("Postbox test delivery".to_string()),
        status: EmailStatus::Received,
        is_read: false,
        read_at: None,
        owner_user: owner,
        received_at: chrono::Utc::now(),
        processed_at: None,
        parsed: Some(ParsedEmail {
            from: AddressGroup::single(EmailAddress::new("test@postbox.dev")),
            to: AddressGroup::single(EmailAddress::new("test-recipient@postbox.dev")),
            cc: AddressGroup::default(),
            bcc: AddressGroup::default(),
            reply_to: None,
            text_body: Some("This is a test delivery triggered from the Postbox dashboard.".to_string()),
            html_body: None,
            raw_body: None,
            attachments: Vec::new(),
            headers: Default::default(),
            message_id: None,
            in_reply_to: None,
            references: Vec::new(),
            date: Some(chrono::Utc::now()),
            priority: None,
            parse_success: true,
            parse_error: None,
        }),
    };

    let attempt = match &endpoint.config {
        EndpointConfig::Webhook { .. } => ctx.webhook_executor().deliver(&record, &endpoint).await,
        EndpointConfig::Email { forward_to } => ctx.forward_executor().forward(&record, &endpoint, &[forward_to.clone()]).await,
        EndpointConfig::EmailGroup { emails, .. } => ctx.forward_executor().forward(&record, &endpoint, emails).await,
    };

    Ok(Json(attempt))
}
