/// Thread view (reply dependency), SPEC_FULL §4.10. Grounded on the
/// `MailflowRouter`/`QueueResolver` traversal style in `src/routing`,
/// generalized from a flat queue lookup to a bounded BFS over message-id
/// tokens with a visited set.
use crate::constants::SUBJECT_REPLY_PREFIXES;
use crate::models::{EmailRecord, SentMessage, UserId};
use crate::services::store::Store;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ThreadMessage {
    Inbound(EmailRecord),
    Outbound(SentMessage),
}

impl ThreadMessage {
    fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        match self {
            Self::Inbound(r) => r.received_at,
            Self::Outbound(m) => m.sent_at.unwrap_or(m.created_at),
        }
    }
}

pub struct ThreadBuilder {
    store: Arc<dyn Store>,
}

impl ThreadBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Strips `<>` and surrounding whitespace from a raw `Message-ID` header token.
    fn normalize_token(token: &str) -> String {
        token.trim().trim_start_matches('<').trim_end_matches('>').to_string()
    }

    /// Strips repeated leading reply/forward prefixes, then case-folds.
    pub fn normalize_subject(subject: &str) -> String {
        let mut s = subject.trim().to_string();
        loop {
            let lower = s.to_lowercase();
            let matched = SUBJECT_REPLY_PREFIXES.iter().find(|p| lower.starts_with(*p));
            match matched {
                Some(prefix) => s = s[prefix.len()..].trim_start().to_string(),
                None => break,
            }
        }
        s.to_lowercase()
    }

    fn tokens_of(record: &EmailRecord) -> Vec<String> {
        let mut tokens = vec![Self::normalize_token(&record.message_id)];
        if let Some(parsed) = &record.parsed {
            if let Some(in_reply_to) = &parsed.in_reply_to {
                tokens.push(Self::normalize_token(in_reply_to));
            }
            tokens.extend(parsed.references.iter().map(|r| Self::normalize_token(r)));
        }
        tokens
    }

    /// Builds the thread containing `seed_email_id`, per SPEC_FULL §4.10:
    /// BFS over message-id tokens; if the graph yields at most the seed
    /// itself, fall back to a normalized-subject search. Returns messages
    /// sorted ascending by best available timestamp.
    pub async fn build(&self, owner: UserId, seed_email_id: uuid::Uuid) -> Result<Vec<ThreadMessage>, crate::error::CoreError> {
        let seed = match self.store.get_email_record(seed_email_id).await? {
            Some(record) => record,
            None => return Ok(Vec::new()),
        };

        let mut visited_ids: HashSet<uuid::Uuid> = HashSet::new();
        let mut visited_tokens: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = Self::tokens_of(&seed).into_iter().collect();
        let mut records: Vec<EmailRecord> = Vec::new();

        visited_ids.insert(seed.id.0);
        records.push(seed.clone());

        while let Some(token) = queue.pop_front() {
            if !visited_tokens.insert(token.clone()) {
                continue;
            }
            let matches = self.store.find_email_records_by_message_ids(&[token]).await?;
            for record in matches {
                if !visited_ids.insert(record.id.0) {
                    continue;
                }
                for token in Self::tokens_of(&record) {
                    if !visited_tokens.contains(&token) {
                        queue.push_back(token);
                    }
                }
                records.push(record);
            }
        }

        if records.len() <= 1 {
            records = self
                .store
                .find_email_records_by_normalized_subject(owner, &Self::normalize_subject(seed.subject.as_deref().unwrap_or("")))
                .await?;
            if records.is_empty() {
                records.push(seed);
            }
        }

        let email_ids: Vec<uuid::Uuid> = records.iter().map(|r| r.id.0).collect();
        let sent = self.store.find_sent_messages_by_email_ids(&email_ids).await?;

        let mut messages: Vec<ThreadMessage> = records
            .into_iter()
            .filter(|r| r.owner_user == owner || owner.is_system())
            .map(ThreadMessage::Inbound)
            .chain(sent.into_iter().filter(|m| m.owner_user == owner).map(ThreadMessage::Outbound))
            .collect();

        messages.sort_by_key(|m| m.timestamp());
        Ok(messages)
    }
}
