//! Postbox API: the REST surface and ingestion callback service.
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod routes;

pub use config::Config;
pub use context::ApiContext;
pub use error::ApiError;

use axum::Router;
use axum::middleware::from_fn_with_state;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the full application router: every route in `routes::router`, plus
/// CORS and the request-logging middleware layered on top.
pub fn app(ctx: Arc<ApiContext>) -> Router {
    routes::router(ctx.clone())
        .layer(from_fn_with_state(ctx, middleware::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
