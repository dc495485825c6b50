/// Entitlement/quota gate, consumed as a feature-check + usage-track
/// interface per SPEC_FULL §4.4. Trait/prod/mock shape grounded on
/// `services::rate_limiter.rs`'s `RateLimiter`/`DynamoDbRateLimiter`/
/// `MockRateLimiter` pattern, moved from DynamoDB atomic counters to an HTTP
/// entitlement service.
use crate::error::CoreError;
use crate::models::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    InboundTriggers,
    EmailsSent,
}

impl Feature {
    fn as_str(&self) -> &'static str {
        match self {
            Self::InboundTriggers => "inbound_triggers",
            Self::EmailsSent => "emails_sent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl QuotaDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Checks entitlement for `feature` and, if allowed and not unlimited,
    /// tracks one unit of usage. `system` users are always allowed and
    /// never tracked. Entitlement failures never silently allow — they
    /// surface as a denial carrying an error string.
    async fn check_and_track(&self, user: UserId, feature: Feature) -> QuotaDecision;
}

#[derive(Debug, serde::Deserialize)]
struct EntitlementCheckResponse {
    allowed: bool,
    unlimited: bool,
}

pub struct HttpQuotaGate {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpQuotaGate {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    async fn query(&self, user: UserId, feature: Feature) -> Result<EntitlementCheckResponse, CoreError> {
        let response = self
            .client
            .get(format!("{}/v1/entitlements/check", self.base_url))
            .bearer_auth(&self.api_key)
            .query(&[("user", user.0.to_string()), ("feature", feature.as_str().to_string())])
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| CoreError::QuotaExceeded(format!("entitlement check failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::QuotaExceeded(format!(
                "entitlement service returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CoreError::QuotaExceeded(format!("malformed entitlement response: {e}")))
    }

    async fn track(&self, user: UserId, feature: Feature) -> Result<(), CoreError> {
        let response = self
            .client
            .post(format!("{}/v1/entitlements/track", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "user": user.0, "feature": feature.as_str(), "delta": 1 }))
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| CoreError::QuotaExceeded(format!("entitlement tracking failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::QuotaExceeded(format!(
                "entitlement tracking returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaGate for HttpQuotaGate {
    async fn check_and_track(&self, user: UserId, feature: Feature) -> QuotaDecision {
        if user.is_system() {
            return QuotaDecision::allow();
        }

        let check = match self.query(user, feature).await {
            Ok(c) => c,
            Err(e) => return QuotaDecision::deny(e.to_string()),
        };

        if !check.allowed {
            return QuotaDecision::deny("entitlement denied");
        }

        if !check.unlimited {
            if let Err(e) = self.track(user, feature).await {
                return QuotaDecision::deny(e.to_string());
            }
        }

        QuotaDecision::allow()
    }
}

/// In-memory mock, mirroring `MockRateLimiter`'s `allow_all`/`deny_all`
/// construction for tests.
pub struct InMemoryQuotaGate {
    allow: bool,
    pub tracked: Mutex<HashMap<(UserId, &'static str), u32>>,
}

impl InMemoryQuotaGate {
    pub fn allow_all() -> Self {
        Self {
            allow: true,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub fn deny_all() -> Self {
        Self {
            allow: false,
            tracked: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl QuotaGate for InMemoryQuotaGate {
    async fn check_and_track(&self, user: UserId, feature: Feature) -> QuotaDecision {
        if user.is_system() {
            return QuotaDecision::allow();
        }
        if !self.allow {
            return QuotaDecision::deny("mock quota gate configured to deny");
        }
        *self.tracked.lock().unwrap().entry((user, feature.as_str())).or_insert(0) += 1;
        QuotaDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_user_always_allowed_and_untracked() {
        let gate = InMemoryQuotaGate::deny_all();
        let decision = gate.check_and_track(UserId::SYSTEM, Feature::InboundTriggers).await;
        assert!(decision.allowed);
        assert!(gate.tracked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deny_all_blocks_normal_user() {
        let gate = InMemoryQuotaGate::deny_all();
        let user = UserId(uuid::Uuid::new_v4());
        let decision = gate.check_and_track(user, Feature::EmailsSent).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_allow_all_tracks_usage() {
        let gate = InMemoryQuotaGate::allow_all();
        let user = UserId(uuid::Uuid::new_v4());
        gate.check_and_track(user, Feature::InboundTriggers).await;
        gate.check_and_track(user, Feature::InboundTriggers).await;
        assert_eq!(*gate.tracked.lock().unwrap().get(&(user, "inbound_triggers")).unwrap(), 2);
    }
}
