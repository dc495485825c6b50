/// Email composer using lettre
use crate::constants::SES_MAX_ATTACHMENT_SIZE_BYTES;
use crate::error::CoreError;
use crate::models::EmailAddress;
use async_trait::async_trait;
use lettre::message::{Attachment, Mailbox, Message, MultiPart, SinglePart};
use std::collections::HashMap;
use std::str::FromStr;

/// Decoded attachment ready to be embedded in a MIME part.
#[derive(Debug, Clone)]
pub struct ComposeAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Everything `EmailComposer` needs to build one outbound message. Built by
/// the sender service from a [`crate::models::SendRequest`]/[`crate::models::ReplyRequest`]
/// after attachments have been base64-decoded and validated.
#[derive(Debug, Clone, Default)]
pub struct ComposeInput {
    pub from: Option<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub reply_to: Vec<EmailAddress>,
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub headers: HashMap<String, String>,
    pub attachments: Vec<ComposeAttachment>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
}

#[async_trait]
pub trait EmailComposer: Send + Sync {
    async fn compose(&self, email: &ComposeInput) -> Result<Vec<u8>, CoreError>;
}

#[derive(Default)]
pub struct LettreEmailComposer;

impl LettreEmailComposer {
    pub fn new() -> Self {
        Self
    }

    fn to_mailbox(addr: &EmailAddress) -> Result<Mailbox, CoreError> {
        let mailbox = if let Some(name) = &addr.name {
            Mailbox::new(
                Some(name.clone()),
                addr.address
                    .parse()
                    .map_err(|e| CoreError::ParseFailure(format!("invalid email address: {e}")))?,
            )
        } else {
            Mailbox::from_str(&addr.address)
                .map_err(|e| CoreError::ParseFailure(format!("invalid email address: {e}")))?
        };
        Ok(mailbox)
    }
}

#[async_trait]
impl EmailComposer for LettreEmailComposer {
    async fn compose(&self, email: &ComposeInput) -> Result<Vec<u8>, CoreError> {
        let from = email
            .from
            .as_ref()
            .ok_or_else(|| CoreError::Validation("missing From address".to_string()))?;

        let mut builder = Message::builder()
            .from(Self::to_mailbox(from)?)
            .subject(&email.subject);

        for to in &email.to {
            builder = builder.to(Self::to_mailbox(to)?);
        }
        for cc in &email.cc {
            builder = builder.cc(Self::to_mailbox(cc)?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(Self::to_mailbox(bcc)?);
        }
        for reply_to in &email.reply_to {
            builder = builder.reply_to(Self::to_mailbox(reply_to)?);
        }

        let message = if email.attachments.is_empty() {
            match (&email.text_body, &email.html_body) {
                (Some(text), Some(html)) => builder
                    .multipart(
                        MultiPart::alternative()
                            .singlepart(SinglePart::plain(text.clone()))
                            .singlepart(SinglePart::html(html.clone())),
                    )
                    .map_err(|e| CoreError::ParseFailure(format!("failed to build message: {e}")))?,
                (Some(text), None) => builder
                    .body(text.clone())
                    .map_err(|e| CoreError::ParseFailure(format!("failed to build message: {e}")))?,
                (None, Some(html)) => builder
                    .singlepart(SinglePart::html(html.clone()))
                    .map_err(|e| CoreError::ParseFailure(format!("failed to build message: {e}")))?,
                (None, None) => builder
                    .body(String::new())
                    .map_err(|e| CoreError::ParseFailure(format!("failed to build message: {e}")))?,
            }
        } else {
            let total_size: usize = email.attachments.iter().map(|a| a.data.len()).sum();
            if total_size > SES_MAX_ATTACHMENT_SIZE_BYTES {
                return Err(CoreError::Validation(format!(
                    "total attachment size {total_size} bytes exceeds limit of {SES_MAX_ATTACHMENT_SIZE_BYTES} bytes"
                )));
            }

            let mut multipart = match (&email.text_body, &email.html_body) {
                (Some(text), Some(html)) => MultiPart::mixed().multipart(
                    MultiPart::alternative()
                        .singlepart(SinglePart::plain(text.clone()))
                        .singlepart(SinglePart::html(html.clone())),
                ),
                (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
                (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
                (None, None) => MultiPart::mixed().singlepart(SinglePart::plain(String::new())),
            };

            for attachment in &email.attachments {
                let content_type = attachment.content_type.parse().map_err(|e| {
                    CoreError::Validation(format!(
                        "invalid content type '{}': {e}",
                        attachment.content_type
                    ))
                })?;
                multipart = multipart
                    .singlepart(Attachment::new(attachment.filename.clone()).body(attachment.data.clone(), content_type));
            }

            builder
                .multipart(multipart)
                .map_err(|e| CoreError::ParseFailure(format!("failed to build message: {e}")))?
        };

        let mut raw_email = message.formatted();

        // lettre's typed header API has no slot for free-form passthrough
        // headers, so threading and custom headers are both spliced into
        // the formatted output directly.
        let needs_raw_headers =
            email.in_reply_to.is_some() || !email.references.is_empty() || !email.headers.is_empty();

        if needs_raw_headers {
            let email_str = String::from_utf8_lossy(&raw_email);
            let (headers_part, body_part) = match email_str.find("\r\n\r\n") {
                Some(pos) => (&email_str[..pos], &email_str[pos + 4..]),
                None => (email_str.as_ref(), ""),
            };

            let mut updated_headers = headers_part.to_string();
            if let Some(ref in_reply_to) = email.in_reply_to {
                updated_headers.push_str(&format!("\r\nIn-Reply-To: <{in_reply_to}>"));
            }
            if !email.references.is_empty() {
                let refs = email
                    .references
                    .iter()
                    .map(|r| format!("<{r}>"))
                    .collect::<Vec<_>>()
                    .join(" ");
                updated_headers.push_str(&format!("\r\nReferences: {refs}"));
            }
            for (name, value) in &email.headers {
                updated_headers.push_str(&format!("\r\n{name}: {value}"));
            }

            raw_email = format!("{updated_headers}\r\n\r\n{body_part}").into_bytes();
        }

        tracing::info!(
            subject = %email.subject,
            to_count = email.to.len(),
            "composed outbound message"
        );

        Ok(raw_email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compose_simple_email() {
        let email = ComposeInput {
            from: Some(EmailAddress {
                address: "sender@example.com".to_string(),
                name: Some("Sender".to_string()),
            }),
            to: vec![EmailAddress::new("recipient@example.com")],
            subject: "Test Subject".to_string(),
            text_body: Some("Test body".to_string()),
            ..Default::default()
        };

        let composer = LettreEmailComposer::new();
        let raw_email = composer.compose(&email).await.unwrap();
        let email_str = String::from_utf8_lossy(&raw_email);

        assert!(email_str.contains("From: Sender <sender@example.com>"));
        assert!(email_str.contains("To: recipient@example.com"));
        assert!(email_str.contains("Subject: Test Subject"));
        assert!(email_str.contains("Test body"));
    }

    #[tokio::test]
    async fn test_compose_multipart_email() {
        let email = ComposeInput {
            from: Some(EmailAddress::new("sender@example.com")),
            to: vec![EmailAddress::new("recipient@example.com")],
            subject: "Test".to_string(),
            text_body: Some("Plain text".to_string()),
            html_body: Some("<p>HTML</p>".to_string()),
            ..Default::default()
        };

        let composer = LettreEmailComposer::new();
        let raw_email = composer.compose(&email).await.unwrap();
        let email_str = String::from_utf8_lossy(&raw_email);

        assert!(email_str.contains("multipart/alternative"));
        assert!(email_str.contains("Plain text"));
        assert!(email_str.contains("<p>HTML</p>"));
    }

    #[tokio::test]
    async fn test_compose_missing_from_rejected() {
        let email = ComposeInput {
            subject: "no from".to_string(),
            ..Default::default()
        };
        let composer = LettreEmailComposer::new();
        assert!(composer.compose(&email).await.is_err());
    }

    #[tokio::test]
    async fn test_compose_threading_headers() {
        let email = ComposeInput {
            from: Some(EmailAddress::new("sender@example.com")),
            to: vec![EmailAddress::new("recipient@example.com")],
            subject: "Re: Test".to_string(),
            text_body: Some("reply body".to_string()),
            in_reply_to: Some("msg1@example.com".to_string()),
            references: vec!["msg0@example.com".to_string(), "msg1@example.com".to_string()],
            ..Default::default()
        };

        let composer = LettreEmailComposer::new();
        let raw_email = composer.compose(&email).await.unwrap();
        let email_str = String::from_utf8_lossy(&raw_email);

        assert!(email_str.contains("In-Reply-To: <msg1@example.com>"));
        assert!(email_str.contains("References: <msg0@example.com> <msg1@example.com>"));
    }
}
