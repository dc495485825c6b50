/// Turns one mailer callback into persisted `IngestionEvent`/`EmailRecord`
/// rows and, for recipients that clear quota and the blocklist, a routed
/// delivery. Grounded on the per-record/per-recipient processing loop of
/// `src/handlers/inbound.rs`'s `process_record`, generalized from SQS
/// fan-out to direct routing + delivery. Authentication (step 1 of
/// SPEC_FULL §4.1 — the bearer token compare) is an HTTP concern and lives
/// in the API layer, not here.
use crate::email::parser::EmailParser;
use crate::models::*;
use crate::routing::RoutingEngine;
use crate::services::blocklist::BlocklistChecker;
use crate::services::mailer::Mailer;
use crate::services::owner_resolver::OwnerResolver;
use crate::services::quota::{Feature, QuotaGate};
use crate::services::store::Store;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub owner: UserId,
    pub quota_allowed: bool,
    pub blocked: bool,
    pub email_record_id: Option<Uuid>,
    pub delivery_attempted: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordOutcome {
    pub message_id: String,
    pub ingestion_event_id: Uuid,
    pub recipients: Vec<RecipientOutcome>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct IngestResult {
    pub records: Vec<RecordOutcome>,
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    owner_resolver: OwnerResolver,
    quota: Arc<dyn QuotaGate>,
    blocklist: BlocklistChecker,
    parser: Arc<dyn EmailParser>,
    mailer: Arc<dyn Mailer>,
    routing: Arc<RoutingEngine>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        quota: Arc<dyn QuotaGate>,
        parser: Arc<dyn EmailParser>,
        mailer: Arc<dyn Mailer>,
        routing: Arc<RoutingEngine>,
    ) -> Self {
        Self {
            owner_resolver: OwnerResolver::new(store.clone()),
            blocklist: BlocklistChecker::new(store.clone()),
            store,
            quota,
            parser,
            mailer,
            routing,
        }
    }

    /// Processes every record in the callback. Per-record and per-recipient
    /// failures are captured in the returned outcomes, never propagated —
    /// the caller always has a complete `IngestResult` to report back to
    /// the mailer with HTTP 200, suppressing its at-least-once retries.
    pub async fn ingest(&self, callback: &IngestionCallback) -> IngestResult {
        let mut records = Vec::with_capacity(callback.processed_records.len());
        for record in &callback.processed_records {
            records.push(self.ingest_record(record).await);
        }
        IngestResult { records }
    }

    async fn ingest_record(&self, record: &ProcessedRecord) -> RecordOutcome {
        let event_id = IngestionEventId(Uuid::new_v4());
        let receipt = &record.ses.receipt;
        let mail = &record.ses.mail;

        let event = IngestionEvent {
            id: event_id,
            message_id: mail.message_id.clone(),
            source: mail.source.clone(),
            destination: mail.destination.clone(),
            recipients: receipt.recipients.clone(),
            spf_verdict: receipt.spf_verdict.as_ref().map(|v| v.status.clone()),
            dkim_verdict: receipt.dkim_verdict.as_ref().map(|v| v.status.clone()),
            dmarc_verdict: receipt.dmarc_verdict.as_ref().map(|v| v.status.clone()),
            spam_verdict: receipt.spam_verdict.as_ref().map(|v| v.status.clone()),
            virus_verdict: receipt.virus_verdict.as_ref().map(|v| v.status.clone()),
            bucket: record.s3_location.as_ref().map(|l| l.bucket.clone()),
            object_key: record.s3_location.as_ref().map(|l| l.key.clone()),
            raw_content: None,
            received_at: chrono::Utc::now(),
        };

        if let Err(err) = self.store.insert_ingestion_event(&event).await {
            tracing::error!(message_id = %mail.message_id, error = %err, "failed to persist ingestion event");
            return RecordOutcome {
                message_id: mail.message_id.clone(),
                ingestion_event_id: event_id.0,
                recipients: Vec::new(),
            };
        }

        let raw_content = self.fetch_raw_content(record).await;
        let subject = mail.common_headers.as_ref().and_then(|h| h.subject.clone());

        let mut recipients = Vec::with_capacity(receipt.recipients.len());
        for recipient in &receipt.recipients {
            recipients.push(
                self.ingest_recipient(event_id, &mail.message_id, &mail.source, recipient, subject.clone(), raw_content.as_deref())
                    .await,
            );
        }

        RecordOutcome {
            message_id: mail.message_id.clone(),
            ingestion_event_id: event_id.0,
            recipients,
        }
    }

    async fn fetch_raw_content(&self, record: &ProcessedRecord) -> Option<Vec<u8>> {
        use base64::Engine;
        if let Some(inline) = &record.email_content {
            return base64::engine::general_purpose::STANDARD.decode(inline).ok();
        }
        let location = record.s3_location.as_ref()?;
        match self.mailer.fetch_object(&location.bucket, &location.key).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                tracing::warn!(bucket = %location.bucket, key = %location.key, error = %err, "failed to fetch raw email object");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest_recipient(
        &self,
        event_id: IngestionEventId,
        message_id: &str,
        source: &str,
        recipient: &str,
        subject: Option<String>,
        raw_content: Option<&[u8]>,
    ) -> RecipientOutcome {
        let owner = self.owner_resolver.resolve(recipient).await;

        let quota_allowed = if owner.is_system() {
            true
        } else {
            self.quota.check_and_track(owner, Feature::InboundTriggers).await.allowed
        };
        if !quota_allowed {
            return RecipientOutcome {
                recipient: recipient.to_string(),
                owner,
                quota_allowed: false,
                blocked: false,
                email_record_id: None,
                delivery_attempted: false,
                error: Some("quota denied".to_string()),
            };
        }

        let blocked = !owner.is_system() && self.blocklist.is_blocked(owner, source).await;

        let parsed = match raw_content {
            Some(bytes) => Some(self.parser.parse(bytes).await),
            None => None,
        };

        let record_id = EmailRecordId(Uuid::new_v4());
        let email_record = EmailRecord {
            id: record_id,
            ingestion_event_id: event_id,
            message_id: message_id.to_string(),
            from: source.to_string(),
            to: vec![recipient.to_string()],
            recipient: recipient.to_string(),
            subject,
            status: if blocked { EmailStatus::Blocked } else { EmailStatus::Received },
            is_read: false,
            read_at: None,
            owner_user: owner,
            received_at: chrono::Utc::now(),
            processed_at: None,
            parsed: parsed.clone(),
        };

        if let Err(err) = self.store.insert_email_record(&email_record).await {
            return RecipientOutcome {
                recipient: recipient.to_string(),
                owner,
                quota_allowed,
                blocked,
                email_record_id: None,
                delivery_attempted: false,
                error: Some(format!("failed to persist email record: {err}")),
            };
        }

        if let Some(parsed) = &parsed {
            if let Err(err) = self.store.insert_parsed_email(record_id.0, parsed).await {
                tracing::warn!(email_id = %record_id.0, error = %err, "failed to persist parsed email");
            }
        }

        let mut delivery_attempted = false;
        let mut error = None;
        if !blocked {
            match self.routing.route_and_dispatch(&email_record).await {
                Ok(Some(_)) => delivery_attempted = true,
                Ok(None) => {}
                Err(err) => error = Some(format!("routing failed: {err}")),
            }
        }

        RecipientOutcome {
            recipient: recipient.to_string(),
            owner,
            quota_allowed,
            blocked,
            email_record_id: Some(record_id.0),
            delivery_attempted,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::composer::LettreEmailComposer;
    use crate::email::parser::MailParserEmailParser;
    use crate::services::mailer::InMemoryMailer;
    use crate::services::quota::InMemoryQuotaGate;
    use crate::services::{HttpWebhookExecutor, InMemoryStore, MailerForwardExecutor};

    fn sample_callback() -> IngestionCallback {
        IngestionCallback {
            callback_type: "ses_event_with_content".to_string(),
            timestamp: "2026-07-26T12:00:00.000Z".to_string(),
            context: IngestionCallbackContext {
                function_name: "ingest".to_string(),
                function_version: "1".to_string(),
                request_id: "req-1".to_string(),
            },
            processed_records: vec![ProcessedRecord {
                event_source: "aws:ses".to_string(),
                event_version: "1.0".to_string(),
                ses: SesPayload {
                    mail: MailerMail {
                        timestamp: "2026-07-26T12:00:00.000Z".to_string(),
                        message_id: "msg-1".to_string(),
                        source: "sender@example.com".to_string(),
                        destination: vec!["inbox@acme.com".to_string()],
                        common_headers: Some(CommonHeaders {
                            from: vec!["sender@example.com".to_string()],
                            to: vec!["inbox@acme.com".to_string()],
                            subject: Some("Hello".to_string()),
                            date: None,
                            message_id: Some("msg-1".to_string()),
                        }),
                    },
                    receipt: MailerReceipt {
                        timestamp: "2026-07-26T12:00:00.000Z".to_string(),
                        processing_time_ms: 10,
                        recipients: vec!["inbox@acme.com".to_string()],
                        spf_verdict: Some(Verdict { status: "PASS".to_string() }),
                        dkim_verdict: Some(Verdict { status: "PASS".to_string() }),
                        dmarc_verdict: None,
                        spam_verdict: Some(Verdict { status: "PASS".to_string() }),
                        virus_verdict: Some(Verdict { status: "PASS".to_string() }),
                        action: MailerAction {
                            action_type: "S3".to_string(),
                            bucket: Some("raw-emails".to_string()),
                            key: Some("msg-1".to_string()),
                        },
                    },
                },
                email_content: None,
                s3_location: None,
                s3_error: None,
            }],
        }
    }

    fn ingestor() -> Ingestor {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let quota: Arc<dyn QuotaGate> = Arc::new(InMemoryQuotaGate::allow_all());
        let parser: Arc<dyn EmailParser> = Arc::new(MailParserEmailParser::new());
        let mailer: Arc<dyn Mailer> = Arc::new(InMemoryMailer::new());
        let composer = Arc::new(LettreEmailComposer::new());
        let webhook = Arc::new(HttpWebhookExecutor::new());
        let forward = Arc::new(MailerForwardExecutor::new(mailer.clone(), composer, "forwarder@postbox.dev".to_string()));
        let routing = Arc::new(RoutingEngine::new(store.clone(), webhook, forward));
        Ingestor::new(store, quota, parser, mailer, routing)
    }

    #[tokio::test]
    async fn test_ingest_with_no_raw_content_persists_unrouted_record() {
        let ingestor = ingestor();
        let result = ingestor.ingest(&sample_callback()).await;

        assert_eq!(result.records.len(), 1);
        let record = &result.records[0];
        assert_eq!(record.message_id, "msg-1");
        assert_eq!(record.recipients.len(), 1);
        let recipient = &record.recipients[0];
        assert!(recipient.quota_allowed);
        assert!(!recipient.blocked);
        assert!(recipient.email_record_id.is_some());
        assert!(!recipient.delivery_attempted);
    }

    #[tokio::test]
    async fn test_ingest_denies_quota_and_skips_persistence_of_delivery() {
        // Recipient's domain must be owned for quota to apply at all — an
        // unowned domain resolves to `system`, which always bypasses quota
        // per SPEC_FULL §4.3.
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store
            .create_domain(&Domain {
                id: DomainId(Uuid::new_v4()),
                name: "acme.com".to_string(),
                owner_user: UserId(Uuid::new_v4()),
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

        let quota: Arc<dyn QuotaGate> = Arc::new(InMemoryQuotaGate::deny_all());
        let parser: Arc<dyn EmailParser> = Arc::new(MailParserEmailParser::new());
        let mailer: Arc<dyn Mailer> = Arc::new(InMemoryMailer::new());
        let composer = Arc::new(LettreEmailComposer::new());
        let webhook = Arc::new(HttpWebhookExecutor::new());
        let forward = Arc::new(MailerForwardExecutor::new(mailer.clone(), composer, "forwarder@postbox.dev".to_string()));
        let routing = Arc::new(RoutingEngine::new(store.clone(), webhook, forward));
        let ingestor = Ingestor::new(store, quota, parser, mailer, routing);

        let result = ingestor.ingest(&sample_callback()).await;
        let recipient = &result.records[0].recipients[0];
        assert!(!recipient.quota_allowed);
        assert!(recipient.email_record_id.is_none());
    }
}
