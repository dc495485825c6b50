/// Application constants
///
/// This module contains all hardcoded values used throughout the application.
/// Constants are organized by category for easy maintenance.
// ============================================================================
// Message Format Constants
// ============================================================================
/// Source identifier for outbound/forwarded messages
pub const SOURCE_NAME: &str = "postbox";

/// Prefix for generated message IDs
pub const MESSAGE_ID_PREFIX: &str = "postbox";

// ============================================================================
// Timing Constants
// ============================================================================

/// Idempotency TTL in seconds (24 hours) — governs SentMessage idempotency-key lookups
pub const IDEMPOTENCY_TTL_SECONDS: u64 = 86400;

/// Default presigned URL expiration in seconds (7 days)
pub const DEFAULT_PRESIGNED_URL_EXPIRATION_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Default webhook delivery timeout in seconds
pub const DEFAULT_WEBHOOK_TIMEOUT_SECONDS: u64 = 30;

/// Maximum webhook delivery timeout in seconds
pub const MAX_WEBHOOK_TIMEOUT_SECONDS: u64 = 300;

/// Maximum size of a webhook response body retained on a DeliveryAttempt
pub const MAX_WEBHOOK_RESPONSE_BODY_BYTES: usize = 2 * 1024;

// ============================================================================
// Size Limits
// ============================================================================

/// Maximum email size supported by SES (40 MB)
pub const MAX_EMAIL_SIZE_BYTES: usize = 40 * 1024 * 1024;

/// Maximum size per attachment for inbound (35 MB, leaving room for headers)
pub const MAX_ATTACHMENT_SIZE_BYTES: usize = 35 * 1024 * 1024;

/// Maximum total attachment size for outbound via SES (10 MB)
pub const SES_MAX_ATTACHMENT_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// Maximum number of attachments per email
pub const MAX_ATTACHMENTS_PER_EMAIL: usize = 50;

/// Maximum email address length (RFC 5321)
pub const MAX_EMAIL_ADDRESS_LENGTH: usize = 320;

/// Maximum subject line length
pub const MAX_SUBJECT_LENGTH: usize = 998;

/// Maximum addresses in an `email_group` endpoint
pub const MAX_EMAIL_GROUP_SIZE: usize = 50;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Maximum number of retries for transient failures against AWS dependencies
pub const MAX_RETRIES: u32 = 5;

/// Base delay for exponential backoff in milliseconds
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Maximum delay for exponential backoff in milliseconds (5 minutes)
pub const RETRY_MAX_DELAY_MS: u64 = 5 * 60 * 1000;

/// Jitter factor for retry delays (0.0 to 1.0)
pub const RETRY_JITTER_FACTOR: f64 = 0.1;

// ============================================================================
// SES Limits
// ============================================================================

/// SES maximum recipients per email
pub const SES_MAX_RECIPIENTS: usize = 50;

// ============================================================================
// Security Constants
// ============================================================================

/// Blocked file extensions for security
pub const BLOCKED_FILE_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "com", "pif", "scr", "vbs", "js", "jar", "msi", "app", "deb", "rpm",
];

/// Blocked content types for security
pub const BLOCKED_CONTENT_TYPES: &[&str] = &[
    "application/x-executable",
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-sh",
    "application/x-shellscript",
];

// ============================================================================
// Validation Constants
// ============================================================================

/// Email validation regex (RFC 5322 simplified)
pub const EMAIL_REGEX_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

/// Reply/forward subject prefixes stripped when normalizing a subject for thread matching
pub const SUBJECT_REPLY_PREFIXES: &[&str] = &["re:", "fwd:", "fw:", "r:", "aw:", "wg:"];

// ============================================================================
// Logging & Monitoring
// ============================================================================

/// Log target for security events
pub const LOG_TARGET_SECURITY: &str = "security";

/// Log target for audit events
pub const LOG_TARGET_AUDIT: &str = "audit";

// ============================================================================
// Testing Constants
// ============================================================================
