/// Error types for the Postbox system
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency busy: {0}")]
    DependencyBusy(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Upstream mailer error: {0}")]
    UpstreamMailer(String),

    #[error("Upstream store error: {0}")]
    UpstreamStore(String),

    #[error("Email parse failure: {0}")]
    ParseFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Determines if an error is worth retrying (used by `utils::retry`).
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::UpstreamStore(_) => true,
            Self::UpstreamMailer(_) => true,
            Self::Unauthenticated(_) => false,
            Self::Forbidden(_) => false,
            Self::NotFound(_) => false,
            Self::Conflict(_) => false,
            Self::Validation(_) => false,
            Self::DependencyBusy(_) => false,
            Self::QuotaExceeded(_) => false,
            Self::ParseFailure(_) => false,
            Self::Config(_) => false,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<std::env::VarError> for CoreError {
    fn from(err: std::env::VarError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("record not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Self::Conflict(db_err.message().to_string())
            }
            other => Self::UpstreamStore(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamMailer(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_errors() {
        assert!(CoreError::UpstreamStore("test".to_string()).is_retriable());
        assert!(CoreError::UpstreamMailer("test".to_string()).is_retriable());
        assert!(!CoreError::Validation("test".to_string()).is_retriable());
        assert!(!CoreError::QuotaExceeded("test".to_string()).is_retriable());
    }

    #[test]
    fn test_error_display() {
        let err = CoreError::ParseFailure("invalid MIME".to_string());
        assert_eq!(err.to_string(), "Email parse failure: invalid MIME");
    }
}
