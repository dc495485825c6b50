pub mod common;
pub mod domains;
pub mod email_addresses;
pub mod emails;
pub mod endpoints;
pub mod health;
pub mod ingest;

use crate::context::ApiContext;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

pub fn router(ctx: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/ingest", post(ingest::callback))
        .route("/domains", get(domains::list).post(domains::create))
        .route("/domains/{id}", get(domains::get))
        .route(
            "/domains/{id}/catch-all",
            get(domains::get_catch_all).put(domains::put_catch_all).delete(domains::delete_catch_all),
        )
        .route("/domains/{id}/dns-records", get(domains::dns_records))
        .route("/email-addresses", get(email_addresses::list).post(email_addresses::create))
        .route(
            "/email-addresses/{id}",
            get(email_addresses::get).put(email_addresses::update).delete(email_addresses::delete),
        )
        .route("/endpoints", get(endpoints::list).post(endpoints::create))
        .route("/endpoints/{id}", get(endpoints::get).put(endpoints::update).delete(endpoints::delete))
        .route("/endpoints/{id}/test", post(endpoints::test))
        .route("/emails", get(emails::list).post(emails::send))
        .route("/emails/{id}", get(emails::get))
        .route("/emails/{id}/read", post(emails::mark_read))
        .route("/emails/{id}/thread", get(emails::thread))
        .route("/emails/{id}/reply", post(emails::reply))
        .with_state(ctx)
}
