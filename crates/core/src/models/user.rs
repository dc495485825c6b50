/// User and identity models
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Principal identifier. The core never issues or validates sessions; it
/// consumes an already-authenticated user id, or the `system` sentinel when
/// a recipient address resolves to nobody.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Sentinel owner used when `OwnerResolver` cannot map a recipient to a
    /// real user. Quota checks and routing are both no-ops for this id.
    pub const SYSTEM: UserId = UserId(Uuid::nil());

    pub fn is_system(&self) -> bool {
        *self == Self::SYSTEM
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
