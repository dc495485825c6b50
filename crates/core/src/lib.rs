/// Postbox Core - shared library for the Postbox inbound/outbound email system
///
/// Contains domain types, service traits, and utilities shared by the
/// Postbox HTTP API and any future worker processes.
pub mod constants;
pub mod email;
pub mod error;
pub mod models;
pub mod routing;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use error::CoreError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
