//! Health server
//!
//! `GET /` answers 200 while every record is healthy and 500 with the first
//! problem found otherwise. Only deployed inside containers.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use ddns_core::RecordStore;
use ddns_core::health::is_healthy;
use ddns_core::traits::LookupIp;
use std::path::Path;
use std::sync::Arc;

/// File present at the root of Docker containers
const CONTAINER_MARKER: &str = "/.dockerenv";

#[derive(Clone)]
struct HealthState {
    records: Arc<RecordStore>,
    resolver: Arc<dyn LookupIp>,
}

/// Whether the process runs inside a container
pub fn in_container() -> bool {
    Path::new(CONTAINER_MARKER).exists()
}

/// Build the health router
pub fn router(records: Arc<RecordStore>, resolver: Arc<dyn LookupIp>) -> Router {
    Router::new()
        .route("/", get(check))
        .with_state(HealthState { records, resolver })
}

async fn check(State(state): State<HealthState>) -> (StatusCode, String) {
    let records = state.records.select_all().await;
    match is_healthy(&records, state.resolver.as_ref()).await {
        Ok(()) => (StatusCode::OK, String::new()),
        Err(e) => {
            tracing::warn!("Unhealthy: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
