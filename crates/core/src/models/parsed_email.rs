/// Structured MIME decoding result
use super::address::AddressGroup;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentStatus {
    Available,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedAttachment {
    pub filename: Option<String>,
    pub content_type: String,
    pub size: usize,
    pub content_id: Option<String>,
    pub disposition: String,
    pub status: AttachmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The structured form `MimeParser` produces for one raw message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedEmail {
    pub from: AddressGroup,
    pub to: AddressGroup,
    #[serde(default)]
    pub cc: AddressGroup,
    #[serde(default)]
    pub bcc: AddressGroup,
    pub reply_to: Option<AddressGroup>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub raw_body: Option<String>,
    pub attachments: Vec<ParsedAttachment>,
    /// Canonical header map, case-preserving and multi-value: every header
    /// line `mail-parser` saw, keyed by its original name, in source order.
    pub headers: HashMap<String, Vec<String>>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    pub date: Option<chrono::DateTime<chrono::Utc>>,
    pub priority: Option<String>,
    pub parse_success: bool,
    pub parse_error: Option<String>,
}

impl ParsedEmail {
    /// A minimal, unparseable placeholder — `parse_success` is false and all
    /// content fields are empty, but the record can still be persisted
    /// alongside its `EmailRecord` per SPEC_FULL §4.1.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            from: AddressGroup::default(),
            to: AddressGroup::default(),
            cc: AddressGroup::default(),
            bcc: AddressGroup::default(),
            reply_to: None,
            text_body: None,
            html_body: None,
            raw_body: None,
            attachments: Vec::new(),
            headers: HashMap::new(),
            message_id: None,
            in_reply_to: None,
            references: Vec::new(),
            date: None,
            priority: None,
            parse_success: false,
            parse_error: Some(error.into()),
        }
    }
}
