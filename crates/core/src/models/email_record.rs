/// Per-recipient materialization of an ingestion event
use super::ingestion_event::IngestionEventId;
use super::parsed_email::ParsedEmail;
use super::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EmailRecordId(pub Uuid);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "email_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    Received,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: EmailRecordId,
    pub ingestion_event_id: IngestionEventId,
    pub message_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub recipient: String,
    pub subject: Option<String>,
    pub status: EmailStatus,
    pub is_read: bool,
    pub read_at: Option<chrono::DateTime<chrono::Utc>>,
    pub owner_user: UserId,
    pub received_at: chrono::DateTime<chrono::Utc>,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Populated by a join against the `parsed_emails` table; absent when the
    /// record was never successfully parsed or parsing is fetched lazily.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedEmail>,
}
