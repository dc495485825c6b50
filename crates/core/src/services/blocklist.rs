/// Sender blocklist check, SPEC_FULL ingestion step 3. Grounded on
/// `services::security.rs`'s `SecurityValidator` shape (a config/store-backed
/// validator with one decision method per concern).
use crate::models::{BlocklistEntry, UserId};
use crate::services::Store;
use std::sync::Arc;

pub struct BlocklistChecker {
    store: Arc<dyn Store>,
}

impl BlocklistChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `true` if `sender_address` matches a system-wide entry or one scoped
    /// to `owner`.
    pub async fn is_blocked(&self, owner: UserId, sender_address: &str) -> bool {
        let entries = match self.store.list_blocklist(Some(owner)).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(error = %err, "blocklist lookup failed, treating sender as not blocked");
                return false;
            }
        };
        Self::matches_any(&entries, sender_address)
    }

    fn matches_any(entries: &[BlocklistEntry], sender_address: &str) -> bool {
        entries.iter().any(|entry| entry.matches(sender_address))
    }
}
