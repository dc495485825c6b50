/// Per-endpoint dispatch outcome
use super::email_record::EmailRecordId;
use super::endpoint::EndpointId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeliveryAttemptId(pub Uuid);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub id: DeliveryAttemptId,
    pub email_id: EmailRecordId,
    pub endpoint_id: EndpointId,
    pub target: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub response_code: Option<u16>,
    pub response_body: Option<String>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub last_attempt_at: chrono::DateTime<chrono::Utc>,
}
