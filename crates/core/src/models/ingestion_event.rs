/// Mailer callback wire format and its persisted form
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IngestionEventId(pub Uuid);

/// A single verdict as the mailer reports it (`{"status": "PASS"}`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Verdict {
    pub status: String,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.status.eq_ignore_ascii_case("PASS")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommonHeaders {
    #[serde(default)]
    pub from: Vec<String>,
    #[serde(default)]
    pub to: Vec<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "messageId")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailerMail {
    pub timestamp: String,
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub source: String,
    pub destination: Vec<String>,
    #[serde(rename = "commonHeaders")]
    pub common_headers: Option<CommonHeaders>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailerAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub bucket: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailerReceipt {
    pub timestamp: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    pub recipients: Vec<String>,
    #[serde(rename = "spfVerdict")]
    pub spf_verdict: Option<Verdict>,
    #[serde(rename = "dkimVerdict")]
    pub dkim_verdict: Option<Verdict>,
    #[serde(rename = "dmarcVerdict")]
    pub dmarc_verdict: Option<Verdict>,
    #[serde(rename = "spamVerdict")]
    pub spam_verdict: Option<Verdict>,
    #[serde(rename = "virusVerdict")]
    pub virus_verdict: Option<Verdict>,
    pub action: MailerAction,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    #[serde(default)]
    pub content_fetched: bool,
    pub content_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SesPayload {
    pub mail: MailerMail,
    pub receipt: MailerReceipt,
}

/// One element of `processed_records[]` in the mailer callback.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessedRecord {
    pub event_source: String,
    pub event_version: String,
    pub ses: SesPayload,
    #[serde(default)]
    pub email_content: Option<String>,
    pub s3_location: Option<S3Location>,
    pub s3_error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionCallbackContext {
    pub function_name: String,
    pub function_version: String,
    pub request_id: String,
}

/// Top-level body the mailer POSTs to the ingestion callback.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionCallback {
    #[serde(rename = "type")]
    pub callback_type: String,
    pub timestamp: String,
    pub context: IngestionCallbackContext,
    pub processed_records: Vec<ProcessedRecord>,
}

/// The persisted, immutable record of one `ProcessedRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub id: IngestionEventId,
    pub message_id: String,
    pub source: String,
    pub destination: Vec<String>,
    pub recipients: Vec<String>,
    pub spf_verdict: Option<String>,
    pub dkim_verdict: Option<String>,
    pub dmarc_verdict: Option<String>,
    pub spam_verdict: Option<String>,
    pub virus_verdict: Option<String>,
    pub bucket: Option<String>,
    pub object_key: Option<String>,
    pub raw_content: Option<Vec<u8>>,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_passed() {
        assert!(
            Verdict {
                status: "PASS".to_string()
            }
            .passed()
        );
        assert!(
            !Verdict {
                status: "FAIL".to_string()
            }
            .passed()
        );
    }

    #[test]
    fn test_ingestion_callback_deserialization() {
        let json = r#"{
            "type": "ses_event_with_content",
            "timestamp": "2026-07-26T12:00:00.000Z",
            "context": {"function_name": "ingest", "function_version": "1", "request_id": "req-1"},
            "processed_records": [{
                "event_source": "aws:ses",
                "event_version": "1.0",
                "ses": {
                    "mail": {
                        "timestamp": "2026-07-26T12:00:00.000Z",
                        "messageId": "msg-1",
                        "source": "sender@example.com",
                        "destination": ["sales@acme.com"],
                        "commonHeaders": {"from": ["sender@example.com"], "to": ["sales@acme.com"], "subject": "Hi"}
                    },
                    "receipt": {
                        "timestamp": "2026-07-26T12:00:00.000Z",
                        "processing_time_ms": 120,
                        "recipients": ["sales@acme.com"],
                        "spfVerdict": {"status": "PASS"},
                        "dkimVerdict": {"status": "PASS"},
                        "spamVerdict": {"status": "PASS"},
                        "virusVerdict": {"status": "PASS"},
                        "action": {"type": "S3", "bucket": "raw-emails", "key": "msg-1"}
                    }
                },
                "s3_location": {"bucket": "raw-emails", "key": "msg-1", "content_fetched": true, "content_size": 1024}
            }]
        }"#;

        let callback: IngestionCallback = serde_json::from_str(json).unwrap();
        assert_eq!(callback.processed_records.len(), 1);
        assert_eq!(
            callback.processed_records[0].ses.mail.message_id,
            "msg-1"
        );
        assert!(
            callback.processed_records[0]
                .ses
                .receipt
                .spf_verdict
                .as_ref()
                .unwrap()
                .passed()
        );
    }
}
