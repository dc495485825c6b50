/// Recipient-to-endpoint resolution, the `Store`-backed replacement for the
/// predecessor's static app-name routing table.
use crate::error::CoreError;
use crate::models::EndpointConfig;
use crate::routing::rules::{RouteDestination, extract_domain};
use crate::services::Store;
use std::sync::Arc;

pub struct EndpointResolver {
    store: Arc<dyn Store>,
}

impl EndpointResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Selection order per SPEC_FULL §4.5:
    /// 1. an active `EmailAddress` matching `recipient` exactly:
    ///    - if it has an `endpoint_id` and the endpoint is active, dispatch
    ///      there;
    ///    - else if it has a legacy `webhook_id` and that endpoint is active
    ///      and still webhook-typed, dispatch as webhook;
    /// 2. else the recipient's `Domain`, if catch-all is enabled and its
    ///    endpoint is active;
    /// 3. else `RouteDestination::None` — not an error.
    pub async fn resolve(&self, recipient: &str) -> Result<RouteDestination, CoreError> {
        if let Some(address) = self.store.find_active_email_address(recipient).await? {
            if let Some(endpoint_id) = address.endpoint_id {
                if let Some(endpoint) = self.store.get_endpoint(endpoint_id.0).await? {
                    if endpoint.is_active {
                        return Ok(Self::to_destination(endpoint));
                    }
                }
            } else if let Some(webhook_id) = address.legacy_webhook_id {
                if let Some(endpoint) = self.store.get_endpoint(webhook_id.0).await? {
                    if endpoint.is_active && matches!(endpoint.config, EndpointConfig::Webhook { .. }) {
                        return Ok(RouteDestination::Webhook(endpoint));
                    }
                }
            }
        }

        let Some(domain_name) = extract_domain(recipient) else {
            return Ok(RouteDestination::None);
        };
        let Some(domain) = self.store.find_domain_by_name(&domain_name).await? else {
            return Ok(RouteDestination::None);
        };

        if domain.is_catch_all_enabled {
            if let Some(endpoint_id) = domain.catch_all_endpoint_id {
                if let Some(endpoint) = self.store.get_endpoint(endpoint_id).await? {
                    if endpoint.is_active {
                        return Ok(Self::to_destination(endpoint));
                    }
                }
            }
        }

        Ok(RouteDestination::None)
    }

    fn to_destination(endpoint: crate::models::Endpoint) -> RouteDestination {
        match &endpoint.config {
            EndpointConfig::Webhook { .. } => RouteDestination::Webhook(endpoint),
            EndpointConfig::Email { forward_to } => {
                let targets = vec![forward_to.clone()];
                RouteDestination::Forward { endpoint, targets }
            }
            EndpointConfig::EmailGroup { emails, .. } => {
                let targets = emails.clone();
                RouteDestination::Forward { endpoint, targets }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::services::InMemoryStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn webhook_endpoint() -> Endpoint {
        Endpoint {
            id: EndpointId(Uuid::new_v4()),
            name: "hook".to_string(),
            owner_user: UserId::SYSTEM,
            config: EndpointConfig::Webhook {
                url: "https://example.com/hook".to_string(),
                secret: None,
                headers: HashMap::new(),
                timeout_s: 30,
                retry_attempts: 0,
            },
            is_active: true,
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_used: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_resolve_exact_address_match() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = webhook_endpoint();
        store.create_endpoint(&endpoint).await.unwrap();

        let domain = Domain {
            id: DomainId(Uuid::new_v4()),
            name: "acme.com".to_string(),
            owner_user: UserId::SYSTEM,
            status: DomainStatus::Verified,
            can_receive: true,
            has_mx: true,
            catch_all_endpoint_id: None,
            catch_all_rule_name: None,
            is_catch_all_enabled: false,
            created_at: chrono::Utc::now(),
        };
        store.create_domain(&domain).await.unwrap();

        store
            .create_email_address(&EmailAddressRecord {
                id: EmailAddressId(Uuid::new_v4()),
                address: "sales@acme.com".to_string(),
                domain_id: domain.id,
                endpoint_id: Some(endpoint.id),
                legacy_webhook_id: None,
                is_active: true,
                is_receipt_rule_configured: true,
                receipt_rule_name: None,
                owner_user: UserId::SYSTEM,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let resolver = EndpointResolver::new(store);
        let dest = resolver.resolve("sales@acme.com").await.unwrap();
        assert!(matches!(dest, RouteDestination::Webhook(_)));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_legacy_webhook_id() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = webhook_endpoint();
        store.create_endpoint(&endpoint).await.unwrap();

        let domain = Domain {
            id: DomainId(Uuid::new_v4()),
            name: "acme.com".to_string(),
            owner_user: UserId::SYSTEM,
            status: DomainStatus::Verified,
            can_receive: true,
            has_mx: true,
            catch_all_endpoint_id: None,
            catch_all_rule_name: None,
            is_catch_all_enabled: false,
            created_at: chrono::Utc::now(),
        };
        store.create_domain(&domain).await.unwrap();

        store
            .create_email_address(&EmailAddressRecord {
                id: EmailAddressId(Uuid::new_v4()),
                address: "legacy@acme.com".to_string(),
                domain_id: domain.id,
                endpoint_id: None,
                legacy_webhook_id: Some(endpoint.id),
                is_active: true,
                is_receipt_rule_configured: true,
                receipt_rule_name: None,
                owner_user: UserId::SYSTEM,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let resolver = EndpointResolver::new(store);
        let dest = resolver.resolve("legacy@acme.com").await.unwrap();
        assert!(matches!(dest, RouteDestination::Webhook(_)));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_catch_all() {
        let store = Arc::new(InMemoryStore::new());
        let endpoint = webhook_endpoint();
        store.create_endpoint(&endpoint).await.unwrap();

        let mut domain = Domain {
            id: DomainId(Uuid::new_v4()),
            name: "acme.com".to_string(),
            owner_user: UserId::SYSTEM,
            status: DomainStatus::Verified,
            can_receive: true,
            has_mx: true,
            catch_all_endpoint_id: None,
            catch_all_rule_name: None,
            is_catch_all_enabled: false,
            created_at: chrono::Utc::now(),
        };
        domain.set_catch_all(Some(endpoint.id.0));
        store.create_domain(&domain).await.unwrap();

        let resolver = EndpointResolver::new(store);
        let dest = resolver.resolve("random@acme.com").await.unwrap();
        assert!(matches!(dest, RouteDestination::Webhook(_)));
    }

    #[tokio::test]
    async fn test_resolve_none_when_nothing_matches() {
        let store = Arc::new(InMemoryStore::new());
        let resolver = EndpointResolver::new(store);
        let dest = resolver.resolve("nobody@unknown.com").await.unwrap();
        assert!(matches!(dest, RouteDestination::None));
    }
}
