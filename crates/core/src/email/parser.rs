/// Email parser using mail-parser
use crate::error::CoreError;
use crate::models::{AddressGroup, AttachmentStatus, EmailAddress, ParsedAttachment, ParsedEmail};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mail_parser::{Addr, Address, MessageParser, MimeHeaders, PartType};
use std::collections::HashMap;

/// Decodes raw RFC 5322 bytes into a [`ParsedEmail`].
///
/// Never returns `Err` for a malformed message — per the ingestion
/// algorithm a parse failure still produces a `ParsedEmail` with
/// `parse_success: false` so the envelope can be persisted and routed.
#[async_trait]
pub trait EmailParser: Send + Sync {
    async fn parse(&self, raw_email: &[u8]) -> ParsedEmail;
}

#[derive(Default)]
pub struct MailParserEmailParser;

impl MailParserEmailParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_addr(addr: &Addr) -> EmailAddress {
        EmailAddress {
            address: addr
                .address
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            name: addr.name.as_ref().map(|n| n.to_string()),
        }
    }

    fn extract_group(address: Option<&Address>) -> AddressGroup {
        let addresses = match address {
            Some(Address::List(list)) => list.iter().map(Self::parse_addr).collect(),
            Some(Address::Group(groups)) => groups
                .iter()
                .flat_map(|g| g.addresses.iter())
                .map(Self::parse_addr)
                .collect(),
            None => vec![],
        };
        let text = if addresses.is_empty() {
            None
        } else {
            Some(
                addresses
                    .iter()
                    .map(|a| match &a.name {
                        Some(name) => format!("{name} <{}>", a.address),
                        None => a.address.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        };
        AddressGroup { text, addresses }
    }

    fn get_part_body(part: &mail_parser::MessagePart) -> Option<Vec<u8>> {
        match &part.body {
            PartType::Text(text) => Some(text.as_bytes().to_vec()),
            PartType::Html(html) => Some(html.as_bytes().to_vec()),
            PartType::Binary(data) => Some(data.to_vec()),
            PartType::InlineBinary(data) => Some(data.to_vec()),
            _ => None,
        }
    }

    fn extract_attachments(message: &mail_parser::Message) -> Vec<ParsedAttachment> {
        let mut attachments = Vec::new();
        let mut inline_index = 0;

        for part in message.parts.iter() {
            let is_attachment = part.attachment_name().is_some();
            let is_inline_image =
                part.is_content_type("image", "") && part.content_id().is_some();

            if !is_attachment && !is_inline_image {
                continue;
            }

            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            let filename = part.attachment_name().map(|n| n.to_string()).or_else(|| {
                part.content_id().map(|cid| {
                    format!("inline-{}.dat", cid.trim_matches(&['<', '>'][..]))
                })
            });

            let filename = filename.or_else(|| {
                inline_index += 1;
                Some(format!("inline-image-{inline_index}.dat"))
            });

            let disposition = if is_attachment { "attachment" } else { "inline" }.to_string();
            let content_id = part.content_id().map(|c| c.to_string());

            match Self::get_part_body(part) {
                Some(data) => attachments.push(ParsedAttachment {
                    filename,
                    content_type,
                    size: data.len(),
                    content_id,
                    disposition,
                    status: AttachmentStatus::Available,
                    error: None,
                }),
                None => attachments.push(ParsedAttachment {
                    filename,
                    content_type,
                    size: 0,
                    content_id,
                    disposition,
                    status: AttachmentStatus::Failed,
                    error: Some("empty or unsupported MIME part body".to_string()),
                }),
            }
        }

        attachments
    }
}

#[async_trait]
impl EmailParser for MailParserEmailParser {
    async fn parse(&self, raw_email: &[u8]) -> ParsedEmail {
        let message = match MessageParser::default().parse(raw_email) {
            Some(m) => m,
            None => return ParsedEmail::failed("failed to parse MIME message"),
        };

        let from = Self::extract_group(message.from());
        let to = Self::extract_group(message.to());
        let cc = Self::extract_group(message.cc());
        let bcc = Self::extract_group(message.bcc());
        let reply_to = {
            let group = Self::extract_group(message.reply_to());
            if group.addresses.is_empty() {
                None
            } else {
                Some(group)
            }
        };

        let message_id = message.message_id().map(|id| id.to_string());
        let in_reply_to = message.in_reply_to().as_text().map(|t| t.to_string());
        let references = message
            .references()
            .as_text_list()
            .map(|list| list.iter().map(|r| r.to_string()).collect())
            .unwrap_or_default();

        let text_body = message.body_text(0).map(|t| t.to_string());
        let html_body = message.body_html(0).map(|h| h.to_string());

        let date = message
            .date()
            .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single());

        let priority = message
            .header("X-Priority")
            .and_then(|h| h.as_text())
            .map(|s| s.to_string());

        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for header in message.root_part().headers() {
            let name = header.name().to_string();
            let value = header.value().as_text().unwrap_or_default().to_string();
            headers.entry(name).or_default().push(value);
        }

        let attachments = Self::extract_attachments(&message);

        ParsedEmail {
            from,
            to,
            cc,
            bcc,
            reply_to,
            text_body,
            html_body,
            raw_body: None,
            attachments,
            headers,
            message_id,
            in_reply_to,
            references,
            date,
            priority,
            parse_success: true,
            parse_error: None,
        }
    }
}

/// Raised only by callers that need a hard error rather than a degraded
/// [`ParsedEmail`] (e.g. composing a reply from stored content).
pub fn require_parse_success(parsed: &ParsedEmail) -> Result<(), CoreError> {
    if parsed.parse_success {
        Ok(())
    } else {
        Err(CoreError::ParseFailure(
            parsed
                .parse_error
                .clone()
                .unwrap_or_else(|| "unknown parse failure".to_string()),
        ))
    }
}
