/// Recipient routing: resolves a recipient address to a delivery endpoint
/// and dispatches to the matching executor, per SPEC_FULL §4.5.
pub mod engine;
pub mod resolver;
pub mod rules;

pub use engine::RoutingEngine;
pub use resolver::EndpointResolver;
pub use rules::RouteDestination;
