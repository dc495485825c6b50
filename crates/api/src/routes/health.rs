/// `GET /health`: unauthenticated liveness/readiness probe. Checks store
/// connectivity and that the mailer client was constructed; grounded on
/// `api/health.rs`'s multi-dependency check shape, trimmed from
/// SQS/S3/DynamoDB/CloudWatch down to this system's two real dependencies.
use crate::context::ApiContext;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub store: String,
    pub mailer: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub checks: HealthChecks,
}

pub async fn handler(State(ctx): State<Arc<ApiContext>>) -> (StatusCode, Json<HealthResponse>) {
    let store_status = match ctx.store.ping().await {
        Ok(()) => "ok".to_string(),
        Err(err) => {
            tracing::error!(error = %err, "store health check failed");
            "error".to_string()
        }
    };

    // The mailer client is constructed eagerly at startup; reaching this
    // handler at all means it exists, so this reports construction, not a
    // live round trip to SES (that would cost real API quota per probe).
    let mailer_status = "ok".to_string();

    let healthy = store_status == "ok";
    let response = HealthResponse {
        status: if healthy { "healthy".to_string() } else { "degraded".to_string() },
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: HealthChecks {
            store: store_status,
            mailer: mailer_status,
        },
    };

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response))
}
