/// Outbound send/reply model
use super::address::EmailAddress;
use super::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SentMessageId(pub Uuid);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "sent_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SentStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentMessage {
    pub id: SentMessageId,
    pub from: EmailAddress,
    pub from_domain: String,
    pub to: Vec<EmailAddress>,
    #[serde(default)]
    pub cc: Vec<EmailAddress>,
    #[serde(default)]
    pub bcc: Vec<EmailAddress>,
    #[serde(default)]
    pub reply_to: Vec<EmailAddress>,
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: SentStatus,
    pub message_id: String,
    pub provider_message_id: Option<String>,
    pub failure_reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub owner_user: UserId,
    pub in_reply_to_email_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub sent_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Inbound-facing request shape for `POST /emails` and `POST /emails/{id}/reply`.
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub from: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Vec<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<OutboundAttachment>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRequest {
    pub text: Option<String>,
    pub html: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_true")]
    pub include_original: bool,
    #[serde(default)]
    pub attachments: Vec<OutboundAttachment>,
    pub idempotency_key: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundAttachment {
    pub filename: String,
    pub content_type: String,
    /// Base64-encoded content, matching how the public API accepts inline
    /// attachment bytes in a JSON request body.
    pub content_base64: String,
}
