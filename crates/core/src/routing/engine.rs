/// Ties recipient resolution to endpoint dispatch and persists the result.
/// `WebhookExecutor`/`ForwardExecutor` only build and return a
/// `DeliveryAttempt`; this is the single place that writes it and the
/// endpoint's aggregate stats back to the `Store`, so every dispatch path
/// (webhook, email, email_group) updates them identically, per SPEC_FULL
/// §4.6/§4.7.
use crate::error::CoreError;
use crate::models::EmailRecord;
use crate::routing::resolver::EndpointResolver;
use crate::routing::rules::RouteDestination;
use crate::services::{ForwardExecutor, Store, WebhookExecutor};
use std::sync::Arc;

pub struct RoutingEngine {
    resolver: EndpointResolver,
    store: Arc<dyn Store>,
    webhook: Arc<dyn WebhookExecutor>,
    forward: Arc<dyn ForwardExecutor>,
}

impl RoutingEngine {
    pub fn new(
        store: Arc<dyn Store>,
        webhook: Arc<dyn WebhookExecutor>,
        forward: Arc<dyn ForwardExecutor>,
    ) -> Self {
        Self {
            resolver: EndpointResolver::new(store.clone()),
            store,
            webhook,
            forward,
        }
    }

    /// Routes and, if a destination was found, delivers and persists one
    /// `EmailRecord` to its recipient's endpoint. Returns `Ok(None)` for
    /// `RouteDestination::None` (no delivery attempted, not an error).
    pub async fn route_and_dispatch(&self, record: &EmailRecord) -> Result<Option<crate::models::DeliveryAttempt>, CoreError> {
        let destination = self.resolver.resolve(&record.recipient).await?;

        let attempt = match destination {
            RouteDestination::None => return Ok(None),
            RouteDestination::Webhook(endpoint) => {
                let attempt = self.webhook.deliver(record, &endpoint).await;
                self.persist(&attempt).await?;
                attempt
            }
            RouteDestination::Forward { endpoint, targets } => {
                let attempt = self.forward.forward(record, &endpoint, &targets).await;
                self.persist(&attempt).await?;
                attempt
            }
        };

        Ok(Some(attempt))
    }

    async fn persist(&self, attempt: &crate::models::DeliveryAttempt) -> Result<(), CoreError> {
        let success = matches!(attempt.status, crate::models::DeliveryStatus::Success);
        self.store.insert_delivery_attempt(attempt).await?;
        self.store.record_delivery_stats(attempt.endpoint_id.0, success).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::composer::LettreEmailComposer;
    use crate::models::*;
    use crate::services::mailer::InMemoryMailer;
    use crate::services::{HttpWebhookExecutor, InMemoryStore, MailerForwardExecutor};
    use uuid::Uuid;

    fn sample_record(recipient: &str) -> EmailRecord {
        EmailRecord {
            id: EmailRecordId(Uuid::new_v4()),
            ingestion_event_id: IngestionEventId(Uuid::new_v4()),
            message_id: "abc@origin".to_string(),
            from: "alice@example.com".to_string(),
            to: vec![recipient.to_string()],
            recipient: recipient.to_string(),
            subject: Some("Hi".to_string()),
            status: EmailStatus::Received,
            is_read: false,
            read_at: None,
            owner_user: UserId::SYSTEM,
            received_at: chrono::Utc::now(),
            processed_at: None,
            parsed: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_to_forward_endpoint_updates_stats() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(InMemoryMailer::new());
        let composer = Arc::new(LettreEmailComposer::new());
        let webhook: Arc<dyn WebhookExecutor> = Arc::new(HttpWebhookExecutor::new());
        let forward: Arc<dyn ForwardExecutor> = Arc::new(MailerForwardExecutor::new(
            mailer,
            composer,
            "forwarder@postbox.dev".to_string(),
        ));

        let endpoint = Endpoint {
            id: EndpointId(Uuid::new_v4()),
            name: "fwd".to_string(),
            owner_user: UserId::SYSTEM,
            config: EndpointConfig::Email {
                forward_to: "dest@example.com".to_string(),
            },
            is_active: true,
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_used: None,
            created_at: chrono::Utc::now(),
        };
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
                address: "inbox@acme.com".to_string(),
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

        let engine = RoutingEngine::new(store.clone(), webhook, forward);
        let record = sample_record("inbox@acme.com");
        let attempt = engine.route_and_dispatch(&record).await.unwrap();
        assert!(attempt.is_some());

        let updated = store.get_endpoint(endpoint.id.0).await.unwrap().unwrap();
        assert_eq!(updated.total_deliveries, 1);
        assert_eq!(updated.successful_deliveries, 1);
    }

    #[tokio::test]
    async fn test_dispatch_none_when_unrouted() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(InMemoryMailer::new());
        let composer = Arc::new(LettreEmailComposer::new());
        let webhook: Arc<dyn WebhookExecutor> = Arc::new(HttpWebhookExecutor::new());
        let forward: Arc<dyn ForwardExecutor> =
            Arc::new(MailerForwardExecutor::new(mailer, composer, "forwarder@postbox.dev".to_string()));

        let engine = RoutingEngine::new(store, webhook, forward);
        let record = sample_record("nobody@unknown.com");
        let attempt = engine.route_and_dispatch(&record).await.unwrap();
        assert!(attempt.is_none());
    }
}
