/// Cloud mailer integration: raw-send, quota, sender verification and the
/// raw-object fetch for ingested messages. Merges the teacher's separate
/// `services::ses` (`EmailSender`) and `services::s3` (`StorageService`)
/// traits into one boundary, since every caller in this system needs both
/// halves of the SES+S3 pair together (send outbound mail, fetch inbound
/// mail bodies).
use crate::error::CoreError;
use crate::utils::retry::{RetryConfig, retry_with_backoff};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SendQuota {
    pub max_24_hour_send: f64,
    pub max_send_rate: f64,
    pub sent_last_24_hours: f64,
}

impl SendQuota {
    pub fn exhausted(&self) -> bool {
        self.sent_last_24_hours >= self.max_24_hour_send
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_raw_email(&self, raw_email: &[u8], from: &str, to: &[String]) -> Result<String, CoreError>;
    async fn get_send_quota(&self) -> Result<SendQuota, CoreError>;
    async fn verify_sender_identity(&self, email: &str) -> Result<bool, CoreError>;
    /// Fetches the raw MIME bytes the mailer stashed in its object store for
    /// an inbound message (SES writes the full message to S3; the ingestion
    /// callback only carries the bucket/key).
    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, CoreError>;
}

pub struct SesMailer {
    ses: aws_sdk_ses::Client,
    s3: aws_sdk_s3::Client,
}

impl SesMailer {
    pub fn new(ses: aws_sdk_ses::Client, s3: aws_sdk_s3::Client) -> Self {
        Self { ses, s3 }
    }
}

#[async_trait]
impl Mailer for SesMailer {
    async fn send_raw_email(&self, raw_email: &[u8], from: &str, to: &[String]) -> Result<String, CoreError> {
        use aws_sdk_ses::primitives::Blob;

        let raw_message = aws_sdk_ses::types::RawMessage::builder()
            .data(Blob::new(raw_email))
            .build()
            .map_err(|e| CoreError::UpstreamMailer(format!("failed to build raw message: {e}")))?;

        let from_owned = from.to_string();
        let to_owned = to.to_vec();

        let response = retry_with_backoff(
            || {
                let client = self.ses.clone();
                let message = raw_message.clone();
                let from = from_owned.clone();
                let destinations = to_owned.clone();
                async move {
                    client
                        .send_raw_email()
                        .raw_message(message)
                        .source(from)
                        .set_destinations(Some(destinations))
                        .send()
                        .await
                        .map_err(|e| CoreError::UpstreamMailer(format!("send_raw_email failed: {e}")))
                }
            },
            RetryConfig::default(),
            "ses_send_raw_email",
        )
        .await?;

        let message_id = response.message_id;
        tracing::info!(message_id = %message_id, recipients = to.len(), "sent raw email via SES");
        Ok(message_id)
    }

    async fn get_send_quota(&self) -> Result<SendQuota, CoreError> {
        let response = retry_with_backoff(
            || {
                let client = self.ses.clone();
                async move {
                    client
                        .get_send_quota()
                        .send()
                        .await
                        .map_err(|e| CoreError::UpstreamMailer(format!("get_send_quota failed: {e}")))
                }
            },
            RetryConfig::default(),
            "ses_get_send_quota",
        )
        .await?;

        Ok(SendQuota {
            max_24_hour_send: response.max24_hour_send(),
            max_send_rate: response.max_send_rate(),
            sent_last_24_hours: response.sent_last24_hours(),
        })
    }

    async fn verify_sender_identity(&self, email: &str) -> Result<bool, CoreError> {
        let email_owned = email.to_string();

        let response = retry_with_backoff(
            || {
                let client = self.ses.clone();
                let email = email_owned.clone();
                async move {
                    client
                        .get_identity_verification_attributes()
                        .identities(email)
                        .send()
                        .await
                        .map_err(|e| CoreError::UpstreamMailer(format!("identity verification lookup failed: {e}")))
                }
            },
            RetryConfig::default(),
            "ses_verify_identity",
        )
        .await?;

        let verified = response
            .verification_attributes()
            .get(email)
            .map(|attr| matches!(attr.verification_status(), aws_sdk_ses::types::VerificationStatus::Success))
            .unwrap_or(false);

        Ok(verified)
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, CoreError> {
        let response = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamMailer(format!("S3 object fetch failed for {bucket}/{key}: {e}")))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| CoreError::UpstreamMailer(format!("failed to read S3 object body: {e}")))?
            .into_bytes()
            .to_vec();

        tracing::info!(bucket, key, bytes = data.len(), "fetched raw email from object store");
        Ok(data)
    }
}

/// In-memory mailer for tests, mirroring the trait+mock pairing used
/// throughout this service layer.
#[derive(Default)]
pub struct InMemoryMailer {
    pub sent: Mutex<Vec<(String, Vec<String>)>>,
    pub verified_senders: Mutex<HashMap<String, bool>>,
    pub quota: Mutex<Option<SendQuota>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verified(self, email: impl Into<String>) -> Self {
        self.verified_senders.lock().unwrap().insert(email.into(), true);
        self
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send_raw_email(&self, _raw_email: &[u8], from: &str, to: &[String]) -> Result<String, CoreError> {
        self.sent.lock().unwrap().push((from.to_string(), to.to_vec()));
        Ok(format!("mock-message-{}", uuid::Uuid::new_v4()))
    }

    async fn get_send_quota(&self) -> Result<SendQuota, CoreError> {
        Ok(self.quota.lock().unwrap().clone().unwrap_or(SendQuota {
            max_24_hour_send: 50_000.0,
            max_send_rate: 14.0,
            sent_last_24_hours: 0.0,
        }))
    }

    async fn verify_sender_identity(&self, email: &str) -> Result<bool, CoreError> {
        Ok(*self.verified_senders.lock().unwrap().get(email).unwrap_or(&false))
    }

    async fn fetch_object(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, CoreError> {
        Err(CoreError::UpstreamMailer("InMemoryMailer has no object store".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_mailer_send_and_verify() {
        let mailer = InMemoryMailer::new().with_verified("agent@acme.com");
        assert!(mailer.verify_sender_identity("agent@acme.com").await.unwrap());
        assert!(!mailer.verify_sender_identity("nobody@acme.com").await.unwrap());

        let id = mailer
            .send_raw_email(b"raw", "agent@acme.com", &["dest@example.com".to_string()])
            .await
            .unwrap();
        assert!(id.starts_with("mock-message-"));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_quota_exhausted() {
        let quota = SendQuota {
            max_24_hour_send: 100.0,
            max_send_rate: 10.0,
            sent_last_24_hours: 100.0,
        };
        assert!(quota.exhausted());
    }
}
