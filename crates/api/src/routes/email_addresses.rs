/// `/email-addresses` CRUD.
use crate::context::ApiContext;
use crate::error::ApiError;
use crate::routes::common::{Pagination, principal};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use postbox_core::models::{DomainId, EmailAddressId, EmailAddressRecord, EndpointId};
use postbox_core::utils::validation::validate_email_address;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

pub async fn list(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<EmailAddressRecord>>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let addresses = ctx.store.list_email_addresses_for_owner(owner).await?;
    Ok(Json(page.apply(addresses)))
}

#[derive(Debug, Deserialize)]
pub struct CreateEmailAddressRequest {
    pub address: String,
    pub domain_id: Uuid,
    pub endpoint_id: Option<Uuid>,
}

pub async fn create(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(req): Json<CreateEmailAddressRequest>,
) -> Result<Json<EmailAddressRecord>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let address = req.address.trim().to_lowercase();
    validate_email_address(&address).map_err(ApiError::BadRequest)?;

    let domain = ctx
        .store
        .get_domain(req.domain_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("domain not found".to_string()))?;
    if domain.owner_user != owner {
        return Err(ApiError::NotFound("domain not found".to_string()));
    }
    if !address.ends_with(&format!("@{}", domain.name)) {
        return Err(ApiError::BadRequest("address does not belong to the given domain".to_string()));
    }

    if ctx.store.find_active_email_address(&address).await?.is_some() {
        return Err(ApiError::Conflict(format!("{address} is already registered")));
    }

    if let Some(endpoint_id) = req.endpoint_id {
        let endpoint = ctx
            .store
            .get_endpoint(endpoint_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("endpoint not found".to_string()))?;
        if endpoint.owner_user != owner {
            return Err(ApiError::NotFound("endpoint not found".to_string()));
        }
    }

    let record = EmailAddressRecord {
        id: EmailAddressId(Uuid::new_v4()),
        address,
        domain_id: DomainId(domain.id.0),
        endpoint_id: req.endpoint_id.map(EndpointId),
        legacy_webhook_id: None,
        is_active: true,
        is_receipt_rule_configured: false,
        receipt_rule_name: None,
        owner_user: owner,
        created_at: chrono::Utc::now(),
    };
    ctx.store.create_email_address(&record).await?;

    let addresses = vec![record.address.clone()];
    if let Err(err) = ctx.receipt_rules.enable_individual(&domain.name, &addresses).await {
        tracing::warn!(address = %record.address, error = %err, "receipt rule provisioning failed for new address");
    } else {
        ctx.store.set_receipt_rule_info(record.id.0, Some(format!("{}-individual", domain.name)), true).await?;
    }

    Ok(Json(ctx.store.get_email_address(record.id.0).await?.unwrap_or(record)))
}

async fn owned_address(ctx: &ApiContext, owner: postbox_core::models::UserId, id: Uuid) -> Result<EmailAddressRecord, ApiError> {
    let record = ctx
        .store
        .get_email_address(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("email address not found".to_string()))?;
    if record.owner_user != owner {
        return Err(ApiError::NotFound("email address not found".to_string()));
    }
    Ok(record)
}

pub async fn get(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<EmailAddressRecord>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    Ok(Json(owned_address(&ctx, owner, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmailAddressRequest {
    pub endpoint_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

pub async fn update(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEmailAddressRequest>,
) -> Result<Json<EmailAddressRecord>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let mut record = owned_address(&ctx, owner, id).await?;

    if let Some(endpoint_id) = req.endpoint_id {
        let endpoint = ctx
            .store
            .get_endpoint(endpoint_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("endpoint not found".to_string()))?;
        if endpoint.owner_user != owner {
            return Err(ApiError::NotFound("endpoint not found".to_string()));
        }
        record.endpoint_id = Some(EndpointId(endpoint_id));
    }
    if let Some(is_active) = req.is_active {
        record.is_active = is_active;
    }

    ctx.store.update_email_address(&record).await?;
    Ok(Json(record))
}

pub async fn delete(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    owned_address(&ctx, owner, id).await?;
    ctx.store.delete_email_address(id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
