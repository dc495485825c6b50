/// `POST /ingest`: the mailer's callback. Authenticated by a single shared
/// `SERVICE_API_KEY`, never by a per-user principal. Always returns 200 —
/// per-record/per-recipient outcomes travel in the body, per SPEC_FULL §7.
use crate::auth::verify_service_key;
use crate::context::ApiContext;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use postbox_core::models::IngestionCallback;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct RejectedRecipient {
    pub recipient: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub processed: usize,
    pub rejected: usize,
    pub emails: Vec<uuid::Uuid>,
    pub rejected_recipients: Vec<RejectedRecipient>,
}

pub async fn callback(State(ctx): State<Arc<ApiContext>>, headers: HeaderMap, Json(body): Json<IngestionCallback>) -> Json<IngestResponse> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = matches!(presented, Some(token) if verify_service_key(token, &ctx.config.service_api_key));
    if !authorized {
        tracing::warn!("ingestion callback rejected: invalid or missing service key");
        return Json(IngestResponse {
            success: false,
            processed: 0,
            rejected: 0,
            emails: Vec::new(),
            rejected_recipients: Vec::new(),
        });
    }

    let result = ctx.ingestor.ingest(&body).await;

    let mut emails = Vec::new();
    let mut rejected_recipients = Vec::new();
    for record in &result.records {
        for recipient in &record.recipients {
            match (&recipient.email_record_id, &recipient.error, recipient.blocked, recipient.quota_allowed) {
                (Some(id), None, false, true) => emails.push(*id),
                _ => {
                    let reason = recipient
                        .error
                        .clone()
                        .unwrap_or_else(|| if recipient.blocked { "blocklisted".to_string() } else { "quota exceeded".to_string() });
                    rejected_recipients.push(RejectedRecipient {
                        recipient: recipient.recipient.clone(),
                        reason,
                    });
                }
            }
        }
    }

    Json(IngestResponse {
        success: true,
        processed: emails.len(),
        rejected: rejected_recipients.len(),
        emails,
        rejected_recipients,
    })
}
