/// Data models for the Postbox system
pub mod address;
pub mod api_key;
pub mod blocklist;
pub mod delivery_attempt;
pub mod domain;
pub mod email_address;
pub mod email_record;
pub mod endpoint;
pub mod ingestion_event;
pub mod parsed_email;
pub mod sent_message;
pub mod user;

pub use address::*;
pub use api_key::*;
pub use blocklist::*;
pub use delivery_attempt::*;
pub use domain::*;
pub use email_address::*;
pub use email_record::*;
pub use endpoint::*;
pub use ingestion_event::*;
pub use parsed_email::*;
pub use sent_message::*;
pub use user::*;
