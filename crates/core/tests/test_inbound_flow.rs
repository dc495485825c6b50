/// Inbound email flow integration tests: ingestion callback in, webhook
/// delivery out, over a real HTTP boundary via `wiremock` rather than a
/// trait mock. Mirrors the teacher's `tests/test_inbound_flow.rs` INT-style
/// naming, scoped to this system's webhook/forward dispatch instead of SQS
/// fan-out.
use base64::Engine;
use postbox_core::email::parser::MailParserEmailParser;
use postbox_core::models::*;
use postbox_core::routing::RoutingEngine;
use postbox_core::services::mailer::InMemoryMailer;
use postbox_core::services::quota::InMemoryQuotaGate;
use postbox_core::services::{HttpWebhookExecutor, Ingestor, InMemoryStore, MailerForwardExecutor, Store};
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn raw_message(subject: &str) -> String {
    format!(
        "From: sender@example.com\r\nTo: inbox@acme.com\r\nSubject: {subject}\r\n\r\nHello from the other side."
    )
}

fn callback_for(recipient: &str, raw: &str) -> IngestionCallback {
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
                    destination: vec![recipient.to_string()],
                    common_headers: Some(CommonHeaders {
                        from: vec!["sender@example.com".to_string()],
                        to: vec![recipient.to_string()],
                        subject: Some("Hello".to_string()),
                        date: None,
                        message_id: Some("msg-1".to_string()),
                    }),
                },
                receipt: MailerReceipt {
                    timestamp: "2026-07-26T12:00:00.000Z".to_string(),
                    processing_time_ms: 10,
                    recipients: vec![recipient.to_string()],
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
            email_content: Some(base64::engine::general_purpose::STANDARD.encode(raw)),
            s3_location: None,
            s3_error: None,
        }],
    }
}

/// INT-001: an inbound message to an address bound to a webhook endpoint is
/// parsed, persisted, and delivered to the real HTTP endpoint with a signed
/// `X-Webhook-Signature` header; the delivery attempt and endpoint stats are
/// both recorded as successful.
#[tokio::test]
async fn test_ingest_delivers_to_webhook_over_http() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header_exists("X-Webhook-Signature"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
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

    let endpoint = Endpoint {
        id: EndpointId(Uuid::new_v4()),
        name: "hook".to_string(),
        owner_user: UserId::SYSTEM,
        config: EndpointConfig::Webhook {
            url: format!("{}/hook", mock_server.uri()),
            secret: Some("topsecret".to_string()),
            headers: Default::default(),
            timeout_s: 5,
            retry_attempts: 0,
        },
        is_active: true,
        total_deliveries: 0,
        successful_deliveries: 0,
        failed_deliveries: 0,
        last_used: None,
        created_at: chrono::Utc::now(),
    };
    store.create_endpoint(&endpoint).await.unwrap();

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

    let quota = Arc::new(InMemoryQuotaGate::allow_all());
    let parser = Arc::new(MailParserEmailParser::new());
    let mailer = Arc::new(InMemoryMailer::new());
    let composer = Arc::new(postbox_core::email::composer::LettreEmailComposer::new());
    let webhook = Arc::new(HttpWebhookExecutor::new());
    let forward = Arc::new(MailerForwardExecutor::new(mailer.clone(), composer, "forwarder@postbox.dev".to_string()));
    let routing = Arc::new(RoutingEngine::new(store.clone(), webhook, forward));
    let ingestor = Ingestor::new(store.clone(), quota, parser, mailer, routing);

    let callback = callback_for("inbox@acme.com", &raw_message("Integration test"));
    let result = ingestor.ingest(&callback).await;

    let recipient = &result.records[0].recipients[0];
    assert!(recipient.delivery_attempted);
    assert!(recipient.error.is_none());

    let updated = store.get_endpoint(endpoint.id.0).await.unwrap().unwrap();
    assert_eq!(updated.total_deliveries, 1);
    assert_eq!(updated.successful_deliveries, 1);
}

/// INT-002: a message to an unbound recipient with no domain catch-all is
/// persisted but never dispatched.
#[tokio::test]
async fn test_ingest_unrouted_recipient_persists_without_dispatch() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let quota = Arc::new(InMemoryQuotaGate::allow_all());
    let parser = Arc::new(MailParserEmailParser::new());
    let mailer = Arc::new(InMemoryMailer::new());
    let composer = Arc::new(postbox_core::email::composer::LettreEmailComposer::new());
    let webhook = Arc::new(HttpWebhookExecutor::new());
    let forward = Arc::new(MailerForwardExecutor::new(mailer.clone(), composer, "forwarder@postbox.dev".to_string()));
    let routing = Arc::new(RoutingEngine::new(store.clone(), webhook, forward));
    let ingestor = Ingestor::new(store.clone(), quota, parser, mailer, routing);

    let callback = callback_for("nobody@unknown.com", &raw_message("Orphan"));
    let result = ingestor.ingest(&callback).await;

    let recipient = &result.records[0].recipients[0];
    assert!(recipient.email_record_id.is_some());
    assert!(!recipient.delivery_attempted);

    let record = store
        .get_email_record(recipient.email_record_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(record.status, EmailStatus::Received));
}
