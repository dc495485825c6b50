/// Outbound HTTP webhook delivery, the `webhook` endpoint dispatch target
/// from the Router. Request/timeout shape grounded on `services::ses.rs`'s
/// external-call style; HMAC signing grounded on the Svix webhook worker's
/// `sign_msg`/header-generation pattern, adapted from its `v1,{base64}`
/// multi-key scheme to this system's single-secret `t=...,v1={hex}` format.
use crate::models::*;
use crate::utils::sanitization::sanitize_html;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

use crate::constants::MAX_WEBHOOK_RESPONSE_BODY_BYTES;

const USER_AGENT: &str = concat!("postbox-webhook/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait WebhookExecutor: Send + Sync {
    /// Delivers one email to a `webhook`-typed endpoint, returning the
    /// resulting `DeliveryAttempt` (never an `Err` — failures are encoded in
    /// the attempt's own status per SPEC_FULL §4.6).
    async fn deliver(&self, record: &EmailRecord, endpoint: &Endpoint) -> DeliveryAttempt;
}

pub struct HttpWebhookExecutor {
    client: reqwest::Client,
}

impl Default for HttpWebhookExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWebhookExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build_payload(record: &EmailRecord, endpoint: &Endpoint) -> serde_json::Value {
        let parsed = record.parsed.as_ref();
        let html = parsed.and_then(|p| p.html_body.as_deref()).map(sanitize_html);
        let text = parsed.and_then(|p| p.text_body.clone());

        serde_json::json!({
            "event": "email.received",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "email": {
                "id": record.id.0,
                "messageId": record.message_id,
                "from": record.from,
                "to": record.to,
                "recipient": record.recipient,
                "subject": record.subject,
                "receivedAt": record.received_at.to_rfc3339(),
                "parsedData": parsed,
                "cleanedContent": {
                    "html": html,
                    "text": text,
                    "hasHtml": parsed.is_some_and(|p| p.html_body.is_some()),
                    "hasText": parsed.is_some_and(|p| p.text_body.is_some()),
                    "attachments": parsed.map(|p| &p.attachments),
                    "headers": parsed.map(|p| &p.headers),
                },
            },
            "endpoint": { "id": endpoint.id.0, "name": endpoint.name, "type": "webhook" },
        })
    }

    fn sign(secret: &str, timestamp: i64, body: &str) -> String {
        let to_sign = format!("{timestamp}.{body}");
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(to_sign.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn truncate_body(body: String) -> String {
        if body.len() <= MAX_WEBHOOK_RESPONSE_BODY_BYTES {
            body
        } else {
            let mut cut = MAX_WEBHOOK_RESPONSE_BODY_BYTES;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body[..cut].to_string()
        }
    }
}

/// Verifies an inbound `X-Webhook-Signature` value. Accepts both the current
/// `t={ts},v1={hex}` scheme and the legacy unversioned `sha256={hex}` over
/// the body alone, per SPEC_FULL §4.6.
pub fn verify_signature(secret: &str, body: &str, header_value: &str) -> bool {
    for part in header_value.split(',') {
        if let Some(hex_sig) = part.strip_prefix("sha256=") {
            return legacy_matches(secret, body, hex_sig);
        }
    }

    let mut timestamp = None;
    let mut signature = None;
    for part in header_value.split(',') {
        if let Some(v) = part.strip_prefix("t=") {
            timestamp = v.parse::<i64>().ok();
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = Some(v);
        }
    }
    match (timestamp, signature) {
        (Some(ts), Some(sig)) => {
            let expected = HttpWebhookExecutor::sign(secret, ts, body);
            constant_time_eq(&expected, sig)
        }
        _ => false,
    }
}

fn legacy_matches(secret: &str, body: &str, hex_sig: &str) -> bool {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, hex_sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait]
impl WebhookExecutor for HttpWebhookExecutor {
    async fn deliver(&self, record: &EmailRecord, endpoint: &Endpoint) -> DeliveryAttempt {
        let now = chrono::Utc::now();
        let EndpointConfig::Webhook {
            url,
            secret,
            headers,
            timeout_s,
            ..
        } = &endpoint.config
        else {
            return DeliveryAttempt {
                id: DeliveryAttemptId(Uuid::new_v4()),
                email_id: record.id,
                endpoint_id: endpoint.id,
                target: String::new(),
                payload: serde_json::Value::Null,
                status: DeliveryStatus::Failed,
                attempts: 1,
                response_code: None,
                response_body: None,
                latency_ms: 0,
                error: Some("endpoint is not configured as a webhook".to_string()),
                last_attempt_at: now,
            };
        };

        let payload = Self::build_payload(record, endpoint);
        let body = serde_json::to_string(&payload).unwrap_or_default();
        let timestamp = now.timestamp();

        let mut req_headers = HeaderMap::new();
        req_headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        req_headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        req_headers.insert("X-Webhook-Event", HeaderValue::from_static("email.received"));
        req_headers.insert(
            "X-Webhook-ID",
            HeaderValue::from_str(&Uuid::new_v4().to_string()).expect("uuid is a valid header value"),
        );
        req_headers.insert(
            "X-Webhook-Timestamp",
            HeaderValue::from_str(&timestamp.to_string()).expect("integer is a valid header value"),
        );
        if let Ok(v) = HeaderValue::from_str(&record.id.0.to_string()) {
            req_headers.insert("X-Email-ID", v);
        }
        if let Ok(v) = HeaderValue::from_str(&record.message_id) {
            req_headers.insert("X-Message-ID", v);
        }
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                req_headers.insert(name, value);
            } else {
                tracing::warn!(header = %name, "skipping invalid custom webhook header");
            }
        }
        if let Some(secret) = secret {
            let signature = Self::sign(secret, timestamp, &body);
            req_headers.insert(
                "X-Webhook-Signature",
                HeaderValue::from_str(&format!("t={timestamp},v1={signature}"))
                    .expect("hex signature is a valid header value"),
            );
        }

        let start = std::time::Instant::now();
        let result = self
            .client
            .post(url)
            .headers(req_headers)
            .timeout(Duration::from_secs(*timeout_s as u64))
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let attempt = match result {
            Ok(response) => {
                let status_code = response.status();
                let success = status_code.is_success();
                let response_body = response.text().await.unwrap_or_default();
                DeliveryAttempt {
                    id: DeliveryAttemptId(Uuid::new_v4()),
                    email_id: record.id,
                    endpoint_id: endpoint.id,
                    target: url.clone(),
                    payload,
                    status: if success { DeliveryStatus::Success } else { DeliveryStatus::Failed },
                    attempts: 1,
                    response_code: Some(status_code.as_u16()),
                    response_body: Some(Self::truncate_body(response_body)),
                    latency_ms,
                    error: if success { None } else { Some(format!("webhook returned HTTP {status_code}")) },
                    last_attempt_at: chrono::Utc::now(),
                }
            }
            Err(err) => {
                let error = if err.is_timeout() {
                    "webhook request timed out".to_string()
                } else {
                    err.to_string()
                };
                DeliveryAttempt {
                    id: DeliveryAttemptId(Uuid::new_v4()),
                    email_id: record.id,
                    endpoint_id: endpoint.id,
                    target: url.clone(),
                    payload,
                    status: DeliveryStatus::Failed,
                    attempts: 1,
                    response_code: None,
                    response_body: None,
                    latency_ms,
                    error: Some(error),
                    last_attempt_at: chrono::Utc::now(),
                }
            }
        };

        tracing::info!(
            endpoint_id = %endpoint.id.0,
            status = ?attempt.status,
            latency_ms = attempt.latency_ms,
            "webhook delivery attempt complete"
        );

        attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify_current_scheme() {
        let sig = HttpWebhookExecutor::sign("topsecret", 1700000000, "{\"a\":1}");
        let header = format!("t=1700000000,v1={sig}");
        assert!(verify_signature("topsecret", "{\"a\":1}", &header));
        assert!(!verify_signature("wrongsecret", "{\"a\":1}", &header));
    }

    #[test]
    fn test_verify_legacy_scheme() {
        let mut mac = HmacSha256::new_from_slice(b"topsecret").unwrap();
        mac.update(b"{\"a\":1}");
        let hex_sig = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={hex_sig}");
        assert!(verify_signature("topsecret", "{\"a\":1}", &header));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "a".repeat(3000);
        let truncated = HttpWebhookExecutor::truncate_body(body);
        assert_eq!(truncated.len(), MAX_WEBHOOK_RESPONSE_BODY_BYTES);
    }
}
