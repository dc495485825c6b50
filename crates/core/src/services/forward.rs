/// Forward-to-email/email_group endpoint dispatch target from the Router.
/// Rewrites the inbound message for resend and dispatches through the
/// cloud mailer's raw-send API, grounded on `EmailComposer`'s raw-MIME
/// assembly (already shared with the outbound `Sender`) and on
/// `services::ses.rs`'s send-call shape.
use crate::email::composer::{ComposeAttachment, ComposeInput, EmailComposer};
use crate::models::*;
use crate::services::mailer::Mailer;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait ForwardExecutor: Send + Sync {
    /// Forwards one email to `targets`, returning a single `DeliveryAttempt`
    /// covering the whole recipient list per SPEC_FULL §4.7 (a partial
    /// failure within a group still yields one `failed` attempt).
    async fn forward(&self, record: &EmailRecord, endpoint: &Endpoint, targets: &[String]) -> DeliveryAttempt;
}

pub struct MailerForwardExecutor {
    mailer: Arc<dyn Mailer>,
    composer: Arc<dyn EmailComposer>,
    forwarder_sender_address: String,
}

impl MailerForwardExecutor {
    pub fn new(mailer: Arc<dyn Mailer>, composer: Arc<dyn EmailComposer>, forwarder_sender_address: String) -> Self {
        Self {
            mailer,
            composer,
            forwarder_sender_address,
        }
    }

    /// Builds the rewritten message per SPEC_FULL §4.7. Attachments are never
    /// carried: `ParsedAttachment` only records metadata (filename, content
    /// type, size), not the decoded bytes, so there is nothing in this
    /// model's parsed representation to re-attach. `include_attachments` is
    /// therefore always effectively `false` here.
    fn build_compose_input(&self, record: &EmailRecord, targets: &[String]) -> ComposeInput {
        let parsed = record.parsed.as_ref();
        let original = parsed.and_then(|p| p.from.first());

        let display_name = original
            .and_then(|a| a.name.clone())
            .unwrap_or_else(|| record.from.clone());

        let from = EmailAddress {
            address: self.forwarder_sender_address.clone(),
            name: Some(display_name),
        };

        let reply_to = original.cloned().unwrap_or_else(|| EmailAddress::new(record.from.clone()));

        ComposeInput {
            from: Some(from),
            to: targets.iter().map(|t| EmailAddress::new(t.clone())).collect(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: vec![reply_to],
            subject: record.subject.clone().unwrap_or_default(),
            text_body: parsed.and_then(|p| p.text_body.clone()),
            html_body: parsed.and_then(|p| p.html_body.clone()),
            headers: std::collections::HashMap::new(),
            attachments: Vec::<ComposeAttachment>::new(),
            in_reply_to: parsed.and_then(|p| p.in_reply_to.clone()),
            references: parsed.map(|p| p.references.clone()).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ForwardExecutor for MailerForwardExecutor {
    async fn forward(&self, record: &EmailRecord, endpoint: &Endpoint, targets: &[String]) -> DeliveryAttempt {
        let now = chrono::Utc::now();
        let start = std::time::Instant::now();

        if targets.is_empty() {
            return DeliveryAttempt {
                id: DeliveryAttemptId(Uuid::new_v4()),
                email_id: record.id,
                endpoint_id: endpoint.id,
                target: String::new(),
                payload: serde_json::Value::Null,
                status: DeliveryStatus::Failed,
                attempts: 1,
                response_code: None,
                response_body: None,
                latency_ms: 0,
                error: Some("forward endpoint has no recipients configured".to_string()),
                last_attempt_at: now,
            };
        }

        let compose_input = self.build_compose_input(record, targets);
        let target = targets.join(", ");

        let raw_email = match self.composer.compose(&compose_input).await {
            Ok(bytes) => bytes,
            Err(err) => {
                return DeliveryAttempt {
                    id: DeliveryAttemptId(Uuid::new_v4()),
                    email_id: record.id,
                    endpoint_id: endpoint.id,
                    target,
                    payload: serde_json::Value::Null,
                    status: DeliveryStatus::Failed,
                    attempts: 1,
                    response_code: None,
                    response_body: None,
                    latency_ms: start.elapsed().as_millis() as u64,
                    error: Some(format!("failed to compose forwarded message: {err}")),
                    last_attempt_at: chrono::Utc::now(),
                };
            }
        };

        // Deliveries within one endpoint go out sequentially, preserving
        // per-recipient ordering the way a single ingestion's webhook calls
        // do (SPEC_FULL §5).
        let mut failures = Vec::new();
        for target_addr in targets {
            let to = std::slice::from_ref(target_addr);
            if let Err(err) = self
                .mailer
                .send_raw_email(&raw_email, &self.forwarder_sender_address, to)
                .await
            {
                failures.push(format!("{target_addr}: {err}"));
            }
        }

        let latency_ms = start.elapsed().as_millis() as u64;
        let success = failures.is_empty();

        let attempt = DeliveryAttempt {
            id: DeliveryAttemptId(Uuid::new_v4()),
            email_id: record.id,
            endpoint_id: endpoint.id,
            target,
            payload: serde_json::json!({ "to": targets }),
            status: if success { DeliveryStatus::Success } else { DeliveryStatus::Failed },
            attempts: 1,
            response_code: None,
            response_body: None,
            latency_ms,
            error: if success { None } else { Some(failures.join("; ")) },
            last_attempt_at: chrono::Utc::now(),
        };

        tracing::info!(
            endpoint_id = %endpoint.id.0,
            status = ?attempt.status,
            recipients = targets.len(),
            "forward delivery attempt complete"
        );

        attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::composer::LettreEmailComposer;
    use crate::services::mailer::InMemoryMailer;
    use std::collections::HashMap;

    fn sample_record() -> EmailRecord {
        EmailRecord {
            id: EmailRecordId(Uuid::new_v4()),
            ingestion_event_id: IngestionEventId(Uuid::new_v4()),
            message_id: "abc@origin".to_string(),
            from: "Alice <alice@example.com>".to_string(),
            to: vec!["inbox@acme.postbox.dev".to_string()],
            recipient: "inbox@acme.postbox.dev".to_string(),
            subject: Some("Hello".to_string()),
            status: EmailStatus::Received,
            is_read: false,
            read_at: None,
            owner_user: UserId::SYSTEM,
            received_at: chrono::Utc::now(),
            processed_at: None,
            parsed: Some(ParsedEmail {
                from: AddressGroup::single(EmailAddress {
                    address: "alice@example.com".to_string(),
                    name: Some("Alice".to_string()),
                }),
                to: AddressGroup::default(),
                cc: AddressGroup::default(),
                bcc: AddressGroup::default(),
                reply_to: None,
                text_body: Some("hi there".to_string()),
                html_body: None,
                raw_body: None,
                attachments: Vec::new(),
                headers: HashMap::new(),
                message_id: Some("abc@origin".to_string()),
                in_reply_to: None,
                references: Vec::new(),
                date: None,
                priority: None,
                parse_success: true,
                parse_error: None,
            }),
        }
    }

    fn sample_endpoint(config: EndpointConfig) -> Endpoint {
        Endpoint {
            id: EndpointId(Uuid::new_v4()),
            name: "fwd".to_string(),
            owner_user: UserId::SYSTEM,
            config,
            is_active: true,
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_used: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_forward_rewrites_from_and_preserves_reply_to() {
        let mailer = Arc::new(InMemoryMailer::new());
        let composer = Arc::new(LettreEmailComposer::new());
        let executor = MailerForwardExecutor::new(mailer.clone(), composer, "forwarder@postbox.dev".to_string());

        let record = sample_record();
        let endpoint = sample_endpoint(EndpointConfig::Email {
            forward_to: "dest@example.com".to_string(),
        });

        let attempt = executor
            .forward(&record, &endpoint, &["dest@example.com".to_string()])
            .await;

        assert!(matches!(attempt.status, DeliveryStatus::Success));
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "forwarder@postbox.dev");
        assert_eq!(sent[0].1, vec!["dest@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_forward_with_no_targets_fails_without_sending() {
        let mailer = Arc::new(InMemoryMailer::new());
        let composer = Arc::new(LettreEmailComposer::new());
        let executor = MailerForwardExecutor::new(mailer.clone(), composer, "forwarder@postbox.dev".to_string());

        let record = sample_record();
        let endpoint = sample_endpoint(EndpointConfig::EmailGroup {
            emails: vec![],
            no_duplicates: false,
        });

        let attempt = executor.forward(&record, &endpoint, &[]).await;
        assert!(matches!(attempt.status, DeliveryStatus::Failed));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
