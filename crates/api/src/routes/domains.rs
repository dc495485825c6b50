/// `/domains` and `/domains/{id}/catch-all`, `/domains/{id}/dns-records`.
/// Modeled on `crates/mailflow-api/src/api/*` handler style: thin Axum
/// handlers delegating to `Store`/`ReceiptRuleManager`, errors via `?`.
use crate::context::ApiContext;
use crate::error::ApiError;
use crate::routes::common::{Pagination, principal};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use postbox_core::models::{Domain, DomainId, DomainStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    pub name: String,
}

pub async fn list(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Domain>>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let domains = ctx.store.list_domains(owner).await?;
    Ok(Json(page.apply(domains)))
}

pub async fn create(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(req): Json<CreateDomainRequest>,
) -> Result<Json<Domain>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let name = req.name.trim().to_lowercase();
    if name.is_empty() || !name.contains('.') {
        return Err(ApiError::BadRequest("domain name is not valid".to_string()));
    }
    if ctx.store.find_domain_by_name(&name).await?.is_some() {
        return Err(ApiError::Conflict(format!("domain {name} is already registered")));
    }

    let domain = Domain {
        id: DomainId(Uuid::new_v4()),
        name,
        owner_user: owner,
        status: DomainStatus::Pending,
        can_receive: false,
        has_mx: false,
        catch_all_endpoint_id: None,
        catch_all_rule_name: None,
        is_catch_all_enabled: false,
        created_at: chrono::Utc::now(),
    };
    ctx.store.create_domain(&domain).await?;
    Ok(Json(domain))
}

async fn owned_domain(ctx: &ApiContext, owner: postbox_core::models::UserId, id: Uuid) -> Result<Domain, ApiError> {
    let domain = ctx
        .store
        .get_domain(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("domain not found".to_string()))?;
    if domain.owner_user != owner {
        return Err(ApiError::NotFound("domain not found".to_string()));
    }
    Ok(domain)
}

pub async fn get(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<Domain>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    Ok(Json(owned_domain(&ctx, owner, id).await?))
}

#[derive(Debug, Serialize)]
pub struct CatchAllResponse {
    pub enabled: bool,
    pub endpoint_id: Option<Uuid>,
    pub warning: Option<String>,
}

pub async fn get_catch_all(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<CatchAllResponse>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let domain = owned_domain(&ctx, owner, id).await?;
    Ok(Json(CatchAllResponse {
        enabled: domain.is_catch_all_enabled,
        endpoint_id: domain.catch_all_endpoint_id,
        warning: None,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetCatchAllRequest {
    pub endpoint_id: Uuid,
}

pub async fn put_catch_all(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<SetCatchAllRequest>,
) -> Result<Json<CatchAllResponse>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let domain = owned_domain(&ctx, owner, id).await?;

    let endpoint = ctx
        .store
        .get_endpoint(req.endpoint_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("endpoint not found".to_string()))?;
    if endpoint.owner_user != owner {
        return Err(ApiError::NotFound("endpoint not found".to_string()));
    }
    if !endpoint.is_active {
        return Err(ApiError::BadRequest("endpoint is not active".to_string()));
    }

    let (rule_name, warning) = match ctx.receipt_rules.enable_catch_all(&domain.name).await {
        Ok(result) => (Some(result.rule_name), None),
        Err(err) => (None, Some(err.to_string())),
    };

    ctx.store
        .set_domain_catch_all(domain.id.0, Some(endpoint.id.0), rule_name.clone())
        .await?;

    Ok(Json(CatchAllResponse {
        enabled: true,
        endpoint_id: Some(endpoint.id.0),
        warning,
    }))
}

pub async fn delete_catch_all(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<CatchAllResponse>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let domain = owned_domain(&ctx, owner, id).await?;

    let remaining_addresses = ctx.store.list_email_addresses_for_domain(domain.id.0).await?;
    let remaining = remaining_addresses.iter().map(|a| a.address.clone()).collect::<Vec<_>>();

    let warning = match ctx.receipt_rules.disable_catch_all(&domain.name, &remaining).await {
        Ok(()) => {
            let rule_name = format!("{}-individual", domain.name);
            for address in &remaining_addresses {
                ctx.store.set_receipt_rule_info(address.id.0, Some(rule_name.clone()), true).await?;
            }
            None
        }
        Err(err) => Some(err.to_string()),
    };

    ctx.store.set_domain_catch_all(domain.id.0, None, None).await?;

    Ok(Json(CatchAllResponse {
        enabled: false,
        endpoint_id: None,
        warning,
    }))
}

#[derive(Debug, Serialize)]
pub struct DnsRecord {
    pub record_type: String,
    pub name: String,
    pub value: String,
    pub priority: Option<u16>,
}

#[derive(Debug, Serialize)]
pub struct DnsRecordsResponse {
    pub domain: String,
    pub records: Vec<DnsRecord>,
}

/// Returns the records the caller must add at their registrar. Provisioning
/// itself is out of scope (SPEC_FULL §1) — this only describes what's
/// required for `can_receive`/`has_mx` to eventually flip true.
pub async fn dns_records(
    State(ctx): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DnsRecordsResponse>, ApiError> {
    let owner = principal(&ctx, &headers).await?;
    let domain = owned_domain(&ctx, owner, id).await?;

    let mx_target = format!("inbound-smtp.{}.amazonaws.com", ctx.config.aws_region);
    let records = vec![
        DnsRecord {
            record_type: "MX".to_string(),
            name: domain.name.clone(),
            value: format!("10 {mx_target}"),
            priority: Some(10),
        },
        DnsRecord {
            record_type: "TXT".to_string(),
            name: format!("_postbox-verify.{}", domain.name),
            value: format!("postbox-domain-verification={}", domain.id.0),
            priority: None,
        },
    ];

    Ok(Json(DnsRecordsResponse {
        domain: domain.name,
        records,
    }))
}
