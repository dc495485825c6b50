/// Request logging middleware: generates a request id, logs method/path/
/// status/duration. Kept from `crates/mailflow-api/src/middleware/logging.rs`;
/// the claims-extension lookup is dropped since principal resolution here
/// happens per-route (`auth::resolve_principal`) rather than via a
/// middleware-injected extension.
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::ApiContext;

pub async fn logging_middleware(State(_ctx): State<Arc<ApiContext>>, request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path().to_string();

    info!(request_id = %request_id, method = %method, path = %path, "incoming request");

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "request failed"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "request completed"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generation() {
        let id1 = Uuid::new_v4().to_string();
        let id2 = Uuid::new_v4().to_string();
        assert_ne!(id1, id2, "request ids should be unique");
    }
}
