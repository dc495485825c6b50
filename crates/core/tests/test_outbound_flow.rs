/// Outbound email flow integration tests: `Sender` against an
/// `InMemoryMailer`/`InMemoryStore` pair, covering the send→compose→dispatch
/// path end to end rather than one module at a time. Mirrors the teacher's
/// `tests/test_outbound_flow.rs` INT-style naming.
use postbox_core::email::composer::LettreEmailComposer;
use postbox_core::models::*;
use postbox_core::services::mailer::InMemoryMailer;
use postbox_core::services::quota::InMemoryQuotaGate;
use postbox_core::services::{InMemoryStore, Sender, Store};
use std::sync::Arc;
use uuid::Uuid;

async fn sender_for(owner: UserId) -> (Sender, Arc<dyn Store>, Arc<InMemoryMailer>) {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
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

    let mailer = Arc::new(InMemoryMailer::new());
    let composer = Arc::new(LettreEmailComposer::new());
    let quota: Arc<dyn postbox_core::services::QuotaGate> = Arc::new(InMemoryQuotaGate::allow_all());
    let sender = Sender::new(store.clone(), mailer.clone(), composer, quota, "agent@postbox.dev".to_string());
    (sender, store, mailer)
}

fn base64_attachment(filename: &str, content_type: &str, bytes: &[u8]) -> OutboundAttachment {
    use base64::Engine;
    OutboundAttachment {
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        content_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
    }
}

/// INT-009: a send with an attachment composes a multipart MIME message and
/// reaches the mailer, and the persisted `SentMessage` reflects success.
#[tokio::test]
async fn test_send_with_attachment_reaches_mailer() {
    let owner = UserId(Uuid::new_v4());
    let (sender, store, mailer) = sender_for(owner).await;

    let request = SendRequest {
        from: "sales@acme.com".to_string(),
        to: vec!["dest@example.com".to_string()],
        cc: Vec::new(),
        bcc: Vec::new(),
        reply_to: Vec::new(),
        subject: "Invoice".to_string(),
        text: Some("see attached".to_string()),
        html: None,
        headers: Default::default(),
        attachments: vec![base64_attachment("invoice.pdf", "application/pdf", b"%PDF-1.4 fake")],
        tags: Vec::new(),
        idempotency_key: None,
    };

    let sent = sender.send(owner, &request).await.unwrap();
    assert!(matches!(sent.status, SentStatus::Sent));
    assert_eq!(mailer.sent.lock().unwrap().len(), 1);

    let stored = store.find_sent_message_by_idempotency_key(owner, "missing").await.unwrap();
    assert!(stored.is_none());
}

/// INT-010: replying to an inbound email quotes the original body and
/// carries `In-Reply-To`/`References` threading headers through to the
/// composed message.
#[tokio::test]
async fn test_reply_quotes_original_and_threads() {
    let owner = UserId(Uuid::new_v4());
    let (sender, store, _mailer) = sender_for(owner).await;

    let email_id = Uuid::new_v4();
    store
        .insert_email_record(&EmailRecord {
            id: EmailRecordId(email_id),
            ingestion_event_id: IngestionEventId(Uuid::new_v4()),
            message_id: "<orig@example.com>".to_string(),
            from: "customer@example.com".to_string(),
            to: vec!["inbox@acme.com".to_string()],
            recipient: "inbox@acme.com".to_string(),
            subject: Some("Question".to_string()),
            status: EmailStatus::Received,
            is_read: false,
            read_at: None,
            owner_user: owner,
            received_at: chrono::Utc::now(),
            processed_at: None,
            parsed: Some(ParsedEmail {
                from: AddressGroup::default(),
                to: AddressGroup::default(),
                cc: AddressGroup::default(),
                bcc: AddressGroup::default(),
                reply_to: None,
                text_body: Some("original body".to_string()),
                html_body: None,
                raw_body: None,
                attachments: Vec::new(),
                headers: Default::default(),
                message_id: Some("orig@example.com".to_string()),
                in_reply_to: None,
                references: Vec::new(),
                date: None,
                priority: None,
                parse_success: true,
                parse_error: None,
            }),
        })
        .await
        .unwrap();

    let request = ReplyRequest {
        to: Vec::new(),
        text: Some("here's my answer".to_string()),
        html: None,
        include_original: true,
        attachments: Vec::new(),
        idempotency_key: None,
    };

    let reply = sender.reply(owner, email_id, &request).await.unwrap();
    assert_eq!(reply.subject, "Re: Question");
    assert!(reply.text_body.as_deref().unwrap().contains("> original body"));
    assert_eq!(reply.in_reply_to_email_id, Some(email_id));
}
