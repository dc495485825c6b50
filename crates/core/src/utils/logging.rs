/// Logging utilities for PII redaction and secure logging
///
/// Redacts personally identifiable information from logs so ingestion and
/// send paths can log freely without leaking message content.
use regex::Regex;
use std::sync::LazyLock;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap());

/// Redacts email addresses from text, preserving domain for debugging.
///
/// ```
/// use postbox_core::utils::logging::redact_email;
///
/// assert_eq!(redact_email("user@example.com"), "***@example.com");
/// ```
pub fn redact_email(text: &str) -> String {
    EMAIL_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let email = &caps[0];
            if let Some(at_pos) = email.find('@') {
                format!("***{}", &email[at_pos..])
            } else {
                "***@***".to_string()
            }
        })
        .to_string()
}

/// Fully redacts email addresses, hiding the domain too.
pub fn redact_email_full(text: &str) -> String {
    EMAIL_PATTERN.replace_all(text, "***@***.***").to_string()
}

/// Redacts a subject line for logging (truncates and masks).
pub fn redact_subject(subject: &str) -> String {
    const MAX_VISIBLE_CHARS: usize = 3;
    const MIN_LENGTH_TO_REDACT: usize = 6;

    if subject.len() < MIN_LENGTH_TO_REDACT {
        subject.to_string()
    } else {
        format!(
            "{}...[{} chars]",
            &subject[..MAX_VISIBLE_CHARS],
            subject.len()
        )
    }
}

/// Redacts message body for logging (shows length only).
pub fn redact_body(body: &str) -> String {
    format!("[{} bytes]", body.len())
}

/// Sanitizes an S3 key for logging, keeping only the filename segment.
pub fn sanitize_s3_key_for_log(key: &str) -> String {
    if let Some(filename) = key.split('/').next_back() {
        format!(".../{}", filename)
    } else {
        "...".to_string()
    }
}

/// Structured, PII-safe context for tracing spans over an inbound/outbound message.
pub fn safe_email_context(message_id: &str, from: &str, subject: &str) -> serde_json::Value {
    serde_json::json!({
        "message_id": message_id,
        "from_domain": extract_domain(from),
        "subject_preview": redact_subject(subject),
    })
}

fn extract_domain(email: &str) -> String {
    email.split('@').nth(1).unwrap_or("unknown").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_email() {
        assert_eq!(redact_email("user@example.com"), "***@example.com");
        assert_eq!(
            redact_email("Contact test@acme.com for help"),
            "Contact ***@acme.com for help"
        );
    }

    #[test]
    fn test_redact_email_full() {
        assert_eq!(redact_email_full("user@example.com"), "***@***.***");
    }

    #[test]
    fn test_redact_subject() {
        assert_eq!(redact_subject("Short"), "Short");
        assert_eq!(redact_subject("This is a long subject"), "Thi...[22 chars]");
    }

    #[test]
    fn test_redact_body() {
        assert_eq!(redact_body("Hello world"), "[11 bytes]");
    }

    #[test]
    fn test_sanitize_s3_key_for_log() {
        let result = sanitize_s3_key_for_log("message-id/attachments/file.pdf");
        assert!(result.contains("file.pdf") && result.starts_with("..."));
    }

    #[test]
    fn test_safe_email_context() {
        let context = safe_email_context("msg-123", "user@example.com", "Confidential Matter");
        assert_eq!(context["message_id"], "msg-123");
        assert_eq!(context["from_domain"], "example.com");
    }
}
