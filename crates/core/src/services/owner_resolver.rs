/// Recipient-to-owner resolution, SPEC_FULL §4.3. Grounded on
/// `services::security.rs`'s validator-struct shape (a thin wrapper over
/// configuration/store lookups with a single decision method).
use crate::models::UserId;
use crate::routing::rules::extract_domain;
use crate::services::Store;
use std::sync::Arc;

pub struct OwnerResolver {
    store: Arc<dyn Store>,
}

impl OwnerResolver {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolves `address` to its owning user. Falls back to the `system`
    /// sentinel when the address is malformed or its domain is unowned;
    /// `system` recipients skip quota and routing downstream.
    pub async fn resolve(&self, address: &str) -> UserId {
        let Some(domain_name) = extract_domain(address) else {
            return UserId::SYSTEM;
        };

        match self.store.find_domain_by_name(&domain_name).await {
            Ok(Some(domain)) => {
                if !domain.can_receive {
                    tracing::warn!(domain = %domain_name, "resolved owner for a domain that cannot receive mail");
                }
                domain.owner_user
            }
            Ok(None) => UserId::SYSTEM,
            Err(err) => {
                tracing::warn!(domain = %domain_name, error = %err, "owner lookup failed, falling back to system");
                UserId::SYSTEM
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use crate::services::InMemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_resolve_known_domain() {
        let store = Arc::new(InMemoryStore::new());
        let owner = UserId(Uuid::new_v4());
        store
            .create_domain(&Domain {
                id: DomainId(Uuid::new_v4()),
                name: "acme.com".to_string(),
                owner_user: owner,
                status: DomainStatus::Verified,
                can_receive: true,
                has_mx: true,
                catch_all_endpoint_id: None,
                catch_all_rule_name: None,
                is_catch_all_enabled: false,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let resolver = OwnerResolver::new(store);
        assert_eq!(resolver.resolve("sales@acme.com").await, owner);
    }

    #[tokio::test]
    async fn test_resolve_unknown_domain_is_system() {
        let store = Arc::new(InMemoryStore::new());
        let resolver = OwnerResolver::new(store);
        assert_eq!(resolver.resolve("nobody@unknown.com").await, UserId::SYSTEM);
    }

    #[tokio::test]
    async fn test_resolve_malformed_address_is_system() {
        let store = Arc::new(InMemoryStore::new());
        let resolver = OwnerResolver::new(store);
        assert_eq!(resolver.resolve("not-an-email").await, UserId::SYSTEM);
    }
}
