/// External integrations and persistence, one module per dependency boundary
pub mod blocklist;
pub mod forward;
pub mod ingest;
pub mod mailer;
pub mod owner_resolver;
pub mod quota;
pub mod receipt_rules;
pub mod sender;
pub mod store;
pub mod thread;
pub mod webhook;

pub use blocklist::BlocklistChecker;
pub use forward::{ForwardExecutor, MailerForwardExecutor};
pub use ingest::{IngestResult, Ingestor};
pub use mailer::{Mailer, SesMailer};
pub use owner_resolver::OwnerResolver;
pub use quota::{Feature, HttpQuotaGate, QuotaGate};
pub use receipt_rules::{ReceiptRuleManager, SesReceiptRuleManager};
pub use sender::Sender;
pub use store::{InMemoryStore, PgStore, Store};
pub use thread::{ThreadBuilder, ThreadMessage};
pub use webhook::{HttpWebhookExecutor, WebhookExecutor};
