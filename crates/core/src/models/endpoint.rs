/// Delivery endpoint model
use super::user::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EndpointId(pub Uuid);

/// Per-variant endpoint configuration. Router and the executors dispatch on
/// this tag rather than on an inheritance hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndpointConfig {
    Webhook {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default = "default_timeout_secs")]
        timeout_s: u32,
        #[serde(default)]
        retry_attempts: u32,
    },
    Email {
        forward_to: String,
    },
    EmailGroup {
        emails: Vec<String>,
        #[serde(default)]
        no_duplicates: bool,
    },
}

fn default_timeout_secs() -> u32 {
    crate::constants::DEFAULT_WEBHOOK_TIMEOUT_SECONDS as u32
}

impl EndpointConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::Email { .. } => "email",
            Self::EmailGroup { .. } => "email_group",
        }
    }

    /// Field-level validation per SPEC_FULL §3/§8 (timeout range, group size,
    /// no duplicate recipients within a group).
    pub fn validate(&self) -> Result<(), crate::error::CoreError> {
        use crate::error::CoreError;
        match self {
            Self::Webhook {
                url,
                timeout_s,
                retry_attempts,
                ..
            } => {
                url::Url::parse(url)
                    .map_err(|e| CoreError::Validation(format!("invalid webhook url: {e}")))?;
                if !(1..=300).contains(timeout_s) {
                    return Err(CoreError::Validation(
                        "webhook timeout_s must be between 1 and 300".to_string(),
                    ));
                }
                if !(0..=10).contains(retry_attempts) {
                    return Err(CoreError::Validation(
                        "webhook retry_attempts must be between 0 and 10".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Email { forward_to } => {
                crate::utils::validate_email_address(forward_to).map_err(CoreError::Validation)
            }
            Self::EmailGroup { emails, .. } => {
                if emails.is_empty() || emails.len() > crate::constants::MAX_EMAIL_GROUP_SIZE {
                    return Err(CoreError::Validation(format!(
                        "email_group must have between 1 and {} addresses",
                        crate::constants::MAX_EMAIL_GROUP_SIZE
                    )));
                }
                let mut seen = std::collections::HashSet::new();
                for email in emails {
                    crate::utils::validate_email_address(email).map_err(CoreError::Validation)?;
                    if !seen.insert(email.to_lowercase()) {
                        return Err(CoreError::Validation(format!(
                            "duplicate address in email_group: {email}"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub owner_user: UserId,
    #[serde(flatten)]
    pub config: EndpointConfig,
    pub is_active: bool,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_used: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Endpoint {
    pub fn endpoint_type(&self) -> &'static str {
        self.config.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_timeout_validation() {
        let bad = EndpointConfig::Webhook {
            url: "https://example.com/hook".to_string(),
            secret: None,
            headers: HashMap::new(),
            timeout_s: 0,
            retry_attempts: 0,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_webhook_retry_attempts_validation() {
        let bad = EndpointConfig::Webhook {
            url: "https://example.com/hook".to_string(),
            secret: None,
            headers: HashMap::new(),
            timeout_s: 30,
            retry_attempts: 11,
        };
        assert!(bad.validate().is_err());

        let ok = EndpointConfig::Webhook {
            url: "https://example.com/hook".to_string(),
            secret: None,
            headers: HashMap::new(),
            timeout_s: 30,
            retry_attempts: 10,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_email_group_size_limit() {
        let too_big = EndpointConfig::EmailGroup {
            emails: (0..51).map(|i| format!("u{i}@example.com")).collect(),
            no_duplicates: false,
        };
        assert!(too_big.validate().is_err());

        let ok = EndpointConfig::EmailGroup {
            emails: (0..50).map(|i| format!("u{i}@example.com")).collect(),
            no_duplicates: false,
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_email_group_duplicate_rejected() {
        let dup = EndpointConfig::EmailGroup {
            emails: vec!["a@x.com".to_string(), "A@x.com".to_string()],
            no_duplicates: false,
        };
        assert!(dup.validate().is_err());
    }
}
