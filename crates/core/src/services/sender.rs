/// Outbound send & reply, SPEC_FULL §4.9. Grounded on
/// `src/handlers/outbound.rs`'s send/reply flow, generalized from SQS
/// dispatch to direct persist→send→finalize against `Store`+`Mailer`.
use crate::constants::{MESSAGE_ID_PREFIX, SUBJECT_REPLY_PREFIXES};
use crate::email::composer::{ComposeAttachment, ComposeInput, EmailComposer};
use crate::error::CoreError;
use crate::models::*;
use crate::services::mailer::Mailer;
use crate::services::quota::{Feature, QuotaGate};
use crate::services::store::Store;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

pub struct Sender {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    composer: Arc<dyn EmailComposer>,
    quota: Arc<dyn QuotaGate>,
    agent_sender_address: String,
}

impl Sender {
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        composer: Arc<dyn EmailComposer>,
        quota: Arc<dyn QuotaGate>,
        agent_sender_address: String,
    ) -> Self {
        Self {
            store,
            mailer,
            composer,
            quota,
            agent_sender_address,
        }
    }

    /// Parses `addr@dom` or `Name <addr@dom>` into an [`EmailAddress`].
    fn parse_address(raw: &str) -> Result<EmailAddress, CoreError> {
        let mailbox = lettre::message::Mailbox::from_str(raw.trim())
            .map_err(|e| CoreError::Validation(format!("invalid address '{raw}': {e}")))?;
        Ok(EmailAddress {
            address: mailbox.email.to_string(),
            name: mailbox.name,
        })
    }

    fn domain_of(address: &str) -> Option<String> {
        address.split('@').nth(1).map(|d| d.to_lowercase())
    }

    /// SPEC_FULL §4.9 gates: the privileged agent address, or a verified
    /// Domain the calling user owns whose name matches `from_domain`.
    async fn check_sender_allowed(&self, owner: UserId, from_address: &str, from_domain: &str) -> Result<(), CoreError> {
        if from_address.eq_ignore_ascii_case(&self.agent_sender_address) {
            return Ok(());
        }

        let domains = self.store.list_domains(owner).await?;
        let owns_verified_domain = domains
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(from_domain) && matches!(d.status, DomainStatus::Verified));

        if owns_verified_domain {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "user does not own a verified domain for {from_domain}"
            )))
        }
    }

    fn quote_text(original: &str) -> String {
        original
            .lines()
            .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn quote_html(original: &str) -> String {
        format!("<blockquote>{original}</blockquote>")
    }

    fn new_message_id() -> String {
        format!("{MESSAGE_ID_PREFIX}-{}@postbox.dev", Uuid::new_v4())
    }

    fn normalized_subject(subject: &str) -> String {
        let mut s = subject.trim().to_string();
        loop {
            let lower = s.to_lowercase();
            let stripped = SUBJECT_REPLY_PREFIXES.iter().find_map(|p| lower.strip_prefix(p).map(|_| s[p.len()..].trim_start()));
            match stripped {
                Some(rest) => s = rest.to_string(),
                None => break,
            }
        }
        s
    }

    /// Sends a brand-new message per SPEC_FULL §4.9 (persist → send →
    /// finalize), honoring idempotency and the sender gates.
    pub async fn send(&self, owner: UserId, request: &SendRequest) -> Result<SentMessage, CoreError> {
        let from = Self::parse_address(&request.from)?;
        let from_domain = Self::domain_of(&from.address)
            .ok_or_else(|| CoreError::Validation("from address has no domain".to_string()))?;

        self.check_sender_allowed(owner, &from.address, &from_domain).await?;

        if let Some(decision) = self.check_quota(owner).await? {
            return Err(CoreError::QuotaExceeded(decision));
        }

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.store.find_sent_message_by_idempotency_key(owner, key).await? {
                return Ok(existing);
            }
        }

        let to = request.to.iter().map(|a| EmailAddress::new(a.clone())).collect::<Vec<_>>();
        let cc = request.cc.iter().map(|a| EmailAddress::new(a.clone())).collect::<Vec<_>>();
        let bcc = request.bcc.iter().map(|a| EmailAddress::new(a.clone())).collect::<Vec<_>>();
        let reply_to = request.reply_to.iter().map(|a| EmailAddress::new(a.clone())).collect::<Vec<_>>();
        let message_id = Self::new_message_id();

        let attachments = Self::decode_attachments(&request.attachments)?;

        let compose_input = ComposeInput {
            from: Some(from.clone()),
            to: to.clone(),
            cc: cc.clone(),
            bcc: bcc.clone(),
            reply_to: reply_to.clone(),
            subject: request.subject.clone(),
            text_body: request.text.clone(),
            html_body: request.html.clone(),
            headers: {
                let mut h = request.headers.clone();
                h.insert("Message-ID".to_string(), format!("<{message_id}>"));
                h
            },
            attachments,
            in_reply_to: None,
            references: Vec::new(),
        };

        let mut message = SentMessage {
            id: SentMessageId(Uuid::new_v4()),
            from,
            from_domain,
            to,
            cc,
            bcc,
            reply_to,
            subject: request.subject.clone(),
            text_body: request.text.clone(),
            html_body: request.html.clone(),
            headers: request.headers.clone(),
            tags: request.tags.clone(),
            status: SentStatus::Pending,
            message_id,
            provider_message_id: None,
            failure_reason: None,
            idempotency_key: request.idempotency_key.clone(),
            owner_user: owner,
            in_reply_to_email_id: None,
            created_at: chrono::Utc::now(),
            sent_at: None,
        };

        self.store.insert_sent_message(&message).await?;
        self.dispatch(&mut message, &compose_input).await;
        Ok(message)
    }

    /// Replies to `email_id` per SPEC_FULL §4.9: threading headers, subject
    /// prefixing, and quoted-original bodies.
    pub async fn reply(&self, owner: UserId, email_id: Uuid, request: &ReplyRequest) -> Result<SentMessage, CoreError> {
        let original = self
            .store
            .get_email_record(email_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("email {email_id} not found")))?;

        let from_address = self.agent_sender_address.clone();
        let from_domain = Self::domain_of(&from_address)
            .ok_or_else(|| CoreError::Config("agent sender address has no domain".to_string()))?;
        self.check_sender_allowed(owner, &from_address, &from_domain).await?;

        if let Some(decision) = self.check_quota(owner).await? {
            return Err(CoreError::QuotaExceeded(decision));
        }

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.store.find_sent_message_by_idempotency_key(owner, key).await? {
                return Ok(existing);
            }
        }

        let to = if request.to.is_empty() {
            vec![EmailAddress::new(original.from.clone())]
        } else {
            request.to.iter().map(|a| EmailAddress::new(a.clone())).collect()
        };

        let orig_message_id = original.message_id.trim_matches(|c| c == '<' || c == '>').to_string();
        let references = original
            .parsed
            .as_ref()
            .map(|p| {
                let mut refs = p.references.clone();
                refs.push(orig_message_id.clone());
                refs
            })
            .unwrap_or_else(|| vec![orig_message_id.clone()]);

        let original_subject = original.subject.clone().unwrap_or_default();
        let subject = if original_subject.to_lowercase().starts_with("re:") {
            original_subject.clone()
        } else {
            format!("Re: {original_subject}")
        };

        let mut text = request.text.clone();
        let mut html = request.html.clone();
        if request.include_original {
            if let Some(parsed) = &original.parsed {
                if let Some(orig_text) = &parsed.text_body {
                    let quoted = Self::quote_text(orig_text);
                    text = Some(match text {
                        Some(t) => format!("{t}\n\n{quoted}"),
                        None => quoted,
                    });
                }
                if let Some(orig_html) = &parsed.html_body {
                    let quoted = Self::quote_html(orig_html);
                    html = Some(match html {
                        Some(h) => format!("{h}\n{quoted}"),
                        None => quoted,
                    });
                }
            }
        }

        let from = EmailAddress::new(from_address.clone());
        let message_id = Self::new_message_id();
        let attachments = Self::decode_attachments(&request.attachments)?;

        let compose_input = ComposeInput {
            from: Some(from.clone()),
            to: to.clone(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: subject.clone(),
            text_body: text.clone(),
            html_body: html.clone(),
            headers: {
                let mut h = std::collections::HashMap::new();
                h.insert("Message-ID".to_string(), format!("<{message_id}>"));
                h
            },
            attachments,
            in_reply_to: Some(orig_message_id),
            references,
        };

        let mut message = SentMessage {
            id: SentMessageId(Uuid::new_v4()),
            from,
            from_domain,
            to,
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject,
            text_body: text,
            html_body: html,
            headers: std::collections::HashMap::new(),
            tags: Vec::new(),
            status: SentStatus::Pending,
            message_id,
            provider_message_id: None,
            failure_reason: None,
            idempotency_key: request.idempotency_key.clone(),
            owner_user: owner,
            in_reply_to_email_id: Some(email_id),
            created_at: chrono::Utc::now(),
            sent_at: None,
        };

        self.store.insert_sent_message(&message).await?;
        self.dispatch(&mut message, &compose_input).await;
        Ok(message)
    }

    /// Returns `Some(reason)` if the send/reply should be denied on quota
    /// grounds, `None` if it may proceed.
    async fn check_quota(&self, owner: UserId) -> Result<Option<String>, CoreError> {
        let decision = self.quota.check_and_track(owner, Feature::EmailsSent).await;
        Ok(if decision.allowed {
            None
        } else {
            Some(decision.reason.unwrap_or_else(|| "quota denied".to_string()))
        })
    }

    fn decode_attachments(attachments: &[OutboundAttachment]) -> Result<Vec<ComposeAttachment>, CoreError> {
        use base64::Engine;
        attachments
            .iter()
            .map(|a| {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(&a.content_base64)
                    .map_err(|e| CoreError::Validation(format!("invalid base64 for attachment '{}': {e}", a.filename)))?;
                Ok(ComposeAttachment {
                    filename: a.filename.clone(),
                    content_type: a.content_type.clone(),
                    data,
                })
            })
            .collect()
    }

    async fn dispatch(&self, message: &mut SentMessage, compose_input: &ComposeInput) {
        let raw = match self.composer.compose(compose_input).await {
            Ok(raw) => raw,
            Err(err) => {
                let reason = format!("compose failed: {err}");
                let _ = self.store.finalize_sent_message_failure(message.id.0, &reason).await;
                message.status = SentStatus::Failed;
                message.failure_reason = Some(reason);
                return;
            }
        };

        let to_addresses = message.to.iter().map(|a| a.address.clone()).collect::<Vec<_>>();
        match self.mailer.send_raw_email(&raw, &message.from.address, &to_addresses).await {
            Ok(provider_message_id) => {
                let _ = self
                    .store
                    .finalize_sent_message_success(message.id.0, &provider_message_id)
                    .await;
                message.status = SentStatus::Sent;
                message.provider_message_id = Some(provider_message_id);
                message.sent_at = Some(chrono::Utc::now());
            }
            Err(err) => {
                let reason = err.to_string();
                let _ = self.store.finalize_sent_message_failure(message.id.0, &reason).await;
                message.status = SentStatus::Failed;
                message.failure_reason = Some(reason);
            }
        }
    }
}
