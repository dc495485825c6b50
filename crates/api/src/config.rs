/// Configuration, loaded once from the environment at process start and
/// validated eagerly so a misconfigured deploy fails before it binds a port.
/// Grounded on `services::config.rs`'s `EnvConfigProvider` shape, trimmed
/// from the teacher's routing-table/attachment-retention config to the
/// connection strings and feature toggles this service actually needs.
use postbox_core::error::CoreError;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub aws_region: String,
    pub ses_receipt_rule_set_name: String,
    pub raw_emails_bucket: String,
    pub forwarder_sender_address: String,
    pub agent_sender_address: String,
    pub entitlement_base_url: String,
    pub entitlement_api_key: String,
    pub service_api_key: String,
    pub api_bind_addr: String,
    pub webhook_default_timeout_secs: u64,
    pub jwks_json: String,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        let config = Self {
            database_url: require_env("DATABASE_URL")?,
            database_max_connections: optional_env("DATABASE_MAX_CONNECTIONS", "10")?,
            aws_region: optional_env_string("AWS_REGION", "us-east-1"),
            ses_receipt_rule_set_name: require_env("SES_RECEIPT_RULE_SET_NAME")?,
            raw_emails_bucket: require_env("RAW_EMAILS_BUCKET")?,
            forwarder_sender_address: require_env("FORWARDER_SENDER_ADDRESS")?,
            agent_sender_address: require_env("AGENT_SENDER_ADDRESS")?,
            entitlement_base_url: require_env("ENTITLEMENT_BASE_URL")?,
            entitlement_api_key: require_env("ENTITLEMENT_API_KEY")?,
            service_api_key: require_env("SERVICE_API_KEY")?,
            api_bind_addr: optional_env_string("API_BIND_ADDR", "0.0.0.0:8080"),
            webhook_default_timeout_secs: optional_env("WEBHOOK_DEFAULT_TIMEOUT_SECS", "30")?,
            jwks_json: require_env("JWKS_JSON")?,
        };

        config.validate()?;
        tracing::info!("configuration validated successfully");
        Ok(config)
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.database_max_connections == 0 {
            return Err(CoreError::Config("DATABASE_MAX_CONNECTIONS must be at least 1".to_string()));
        }
        if !self.forwarder_sender_address.contains('@') {
            return Err(CoreError::Config("FORWARDER_SENDER_ADDRESS is not a valid address".to_string()));
        }
        if !self.agent_sender_address.contains('@') {
            return Err(CoreError::Config("AGENT_SENDER_ADDRESS is not a valid address".to_string()));
        }
        if self.service_api_key.trim().is_empty() {
            return Err(CoreError::Config("SERVICE_API_KEY must not be empty".to_string()));
        }
        if serde_json::from_str::<serde_json::Value>(&self.jwks_json).is_err() {
            return Err(CoreError::Config("JWKS_JSON is not valid JSON".to_string()));
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String, CoreError> {
    std::env::var(key).map_err(|_| CoreError::Config(format!("missing required env var {key}")))
}

fn optional_env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_env<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, CoreError> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| CoreError::Config(format!("invalid value for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "DATABASE_URL",
            "DATABASE_MAX_CONNECTIONS",
            "SES_RECEIPT_RULE_SET_NAME",
            "RAW_EMAILS_BUCKET",
            "FORWARDER_SENDER_ADDRESS",
            "AGENT_SENDER_ADDRESS",
            "ENTITLEMENT_BASE_URL",
            "ENTITLEMENT_API_KEY",
            "SERVICE_API_KEY",
            "JWKS_JSON",
        ] {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_missing_required_var_fails() {
        clear_env();
        let result = Config::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_sender_address_fails_validation() {
        clear_env();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/postbox");
            std::env::set_var("SES_RECEIPT_RULE_SET_NAME", "postbox-rules");
            std::env::set_var("RAW_EMAILS_BUCKET", "postbox-raw");
            std::env::set_var("FORWARDER_SENDER_ADDRESS", "not-an-address");
            std::env::set_var("AGENT_SENDER_ADDRESS", "agent@postbox.dev");
            std::env::set_var("ENTITLEMENT_BASE_URL", "https://entitlements.internal");
            std::env::set_var("ENTITLEMENT_API_KEY", "key");
            std::env::set_var("SERVICE_API_KEY", "key");
            std::env::set_var("JWKS_JSON", r#"{"keys":[]}"#);
        }
        let result = Config::from_env();
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn test_invalid_jwks_json_fails_validation() {
        clear_env();
        unsafe {
            std::env::set_var("DATABASE_URL", "postgres://localhost/postbox");
            std::env::set_var("SES_RECEIPT_RULE_SET_NAME", "postbox-rules");
            std::env::set_var("RAW_EMAILS_BUCKET", "postbox-raw");
            std::env::set_var("FORWARDER_SENDER_ADDRESS", "forwarder@postbox.dev");
            std::env::set_var("AGENT_SENDER_ADDRESS", "agent@postbox.dev");
            std::env::set_var("ENTITLEMENT_BASE_URL", "https://entitlements.internal");
            std::env::set_var("ENTITLEMENT_API_KEY", "key");
            std::env::set_var("SERVICE_API_KEY", "key");
            std::env::set_var("JWKS_JSON", "not json");
        }
        let result = Config::from_env();
        assert!(result.is_err());
        clear_env();
    }
}
