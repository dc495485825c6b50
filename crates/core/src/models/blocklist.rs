/// Sender blocklist model, backing `BlocklistChecker`
use super::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "pattern_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Exact,
    Domain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistEntry {
    pub id: Uuid,
    /// `None` marks a system-wide block; otherwise the block applies only
    /// when resolving mail owned by this user.
    pub owner_user: Option<UserId>,
    pub pattern: String,
    pub pattern_kind: PatternKind,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl BlocklistEntry {
    pub fn matches(&self, sender_address: &str) -> bool {
        let sender_lower = sender_address.to_lowercase();
        match self.pattern_kind {
            PatternKind::Exact => sender_lower == self.pattern.to_lowercase(),
            PatternKind::Domain => sender_lower
                .rsplit_once('@')
                .map(|(_, domain)| domain.eq_ignore_ascii_case(&self.pattern))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pattern: &str, kind: PatternKind) -> BlocklistEntry {
        BlocklistEntry {
            id: Uuid::new_v4(),
            owner_user: None,
            pattern: pattern.to_string(),
            pattern_kind: kind,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let e = entry("Spammer@Bad.com", PatternKind::Exact);
        assert!(e.matches("spammer@bad.com"));
        assert!(!e.matches("other@bad.com"));
    }

    #[test]
    fn test_domain_match() {
        let e = entry("bad.com", PatternKind::Domain);
        assert!(e.matches("anyone@bad.com"));
        assert!(!e.matches("anyone@good.com"));
    }
}
