/// Sending/receiving domain model
use super::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DomainId(pub Uuid);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "domain_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Pending,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: DomainId,
    pub name: String,
    pub owner_user: UserId,
    pub status: DomainStatus,
    pub can_receive: bool,
    pub has_mx: bool,
    pub catch_all_endpoint_id: Option<Uuid>,
    pub catch_all_rule_name: Option<String>,
    pub is_catch_all_enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Domain {
    /// Invariant from SPEC_FULL §3: `is_catch_all_enabled` iff
    /// `catch_all_endpoint_id` is set. Callers constructing/updating a
    /// `Domain` should route through this rather than setting the two
    /// fields independently.
    pub fn set_catch_all(&mut self, endpoint_id: Option<Uuid>) {
        self.is_catch_all_enabled = endpoint_id.is_some();
        self.catch_all_endpoint_id = endpoint_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Domain {
        Domain {
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
        }
    }

    #[test]
    fn test_set_catch_all_invariant() {
        let mut d = sample();
        let ep = Uuid::new_v4();
        d.set_catch_all(Some(ep));
        assert!(d.is_catch_all_enabled);
        d.set_catch_all(None);
        assert!(!d.is_catch_all_enabled);
        assert!(d.catch_all_endpoint_id.is_none());
    }
}
