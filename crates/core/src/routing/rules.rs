/// Routing destinations and recipient-address helpers
use crate::models::Endpoint;

/// The outcome of resolving one recipient address per SPEC_FULL §4.5.
#[derive(Debug, Clone)]
pub enum RouteDestination {
    Webhook(Endpoint),
    Forward { endpoint: Endpoint, targets: Vec<String> },
    /// No `EmailAddress` or catch-all `Domain` matched; not an error.
    None,
}

/// Splits `recipient` into its domain part, lower-cased for lookup.
pub fn extract_domain(recipient: &str) -> Option<String> {
    recipient.split('@').nth(1).map(|d| d.to_lowercase())
}
