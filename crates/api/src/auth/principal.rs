/// Resolves the authenticated principal for the public API surface: either
/// a validated JWT (`sub` claim, a user id) or an `Authorization: Bearer
/// {api_key}` looked up against `Store::find_api_key_by_hash`. Separate
/// from `/ingest`, which is authenticated by a single shared service key
/// rather than a per-user principal.
use crate::context::ApiContext;
use crate::error::ApiError;
use postbox_core::models::UserId;
use sha2::{Digest, Sha256};

fn hash_api_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

fn extract_bearer(auth_header: Option<&str>) -> Result<&str, ApiError> {
    let header = auth_header.ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthorized("Authorization header must use Bearer scheme".to_string()))
}

/// Looks like a JWT if it has the three dot-separated segments; anything
/// else is treated as an opaque API key.
fn looks_like_jwt(token: &str) -> bool {
    token.splitn(4, '.').count() == 3
}

pub async fn resolve_principal(ctx: &ApiContext, auth_header: Option<&str>) -> Result<UserId, ApiError> {
    let token = extract_bearer(auth_header)?;

    if looks_like_jwt(token) {
        let claims = ctx.jwt_validator.validate(token, "").map_err(ApiError::Unauthorized)?;
        let id = uuid::Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized("JWT subject is not a valid user id".to_string()))?;
        return Ok(UserId(id));
    }

    let hash = hash_api_key(token);
    let key = ctx
        .store
        .find_api_key_by_hash(&hash)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::Unauthorized("invalid API key".to_string()))?;

    if !key.is_active() {
        return Err(ApiError::Unauthorized("API key has been revoked".to_string()));
    }

    ctx.store.touch_api_key(key.id.0).await.map_err(ApiError::from)?;
    Ok(key.owner_user)
}

/// Constant-time-ish comparison for the `/ingest` shared secret: folds both
/// sides through a fixed number of byte comparisons regardless of where a
/// mismatch occurs, rather than short-circuiting on the first differing byte.
pub fn verify_service_key(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (a, b) in presented.bytes().zip(expected.bytes()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_requires_scheme() {
        assert!(extract_bearer(Some("Token abc")).is_err());
        assert_eq!(extract_bearer(Some("Bearer abc")).unwrap(), "abc");
    }

    #[test]
    fn test_looks_like_jwt() {
        assert!(looks_like_jwt("aaa.bbb.ccc"));
        assert!(!looks_like_jwt("pb_live_abcdef"));
    }

    #[test]
    fn test_verify_service_key() {
        assert!(verify_service_key("secret123", "secret123"));
        assert!(!verify_service_key("secret123", "secret124"));
        assert!(!verify_service_key("short", "longersecret"));
    }
}
