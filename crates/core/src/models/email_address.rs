/// Per-address routing configuration
use super::domain::DomainId;
use super::endpoint::EndpointId;
use super::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EmailAddressId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddressRecord {
    pub id: EmailAddressId,
    pub address: String,
    pub domain_id: DomainId,
    pub endpoint_id: Option<EndpointId>,
    /// Legacy direct-webhook binding, superseded by `endpoint_id` but still
    /// read by routing for addresses migrated from the old webhook-only
    /// model. At most one of the two is set.
    pub legacy_webhook_id: Option<EndpointId>,
    pub is_active: bool,
    pub is_receipt_rule_configured: bool,
    pub receipt_rule_name: Option<String>,
    pub owner_user: UserId,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
