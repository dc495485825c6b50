/// Shared route helpers: principal resolution from the `Authorization`
/// header and the pagination query shape used across every list endpoint.
use crate::auth;
use crate::context::ApiContext;
use crate::error::ApiError;
use axum::http::HeaderMap;
use postbox_core::models::UserId;
use serde::Deserialize;

pub async fn principal(ctx: &ApiContext, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let auth_header = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    auth::resolve_principal(ctx, auth_header).await
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Clamps `limit` to `1..=100` (default 50) per SPEC_FULL §6.
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    /// Applies the clamp in-process for stores whose list methods don't take
    /// limit/offset themselves (paginating an already-fetched `Vec`).
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset() as usize;
        let limit = self.limit() as usize;
        items.into_iter().skip(offset).take(limit).collect()
    }
}
