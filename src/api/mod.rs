use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod devices;
pub mod dto;
pub mod events;
pub mod generation;
pub mod health;
pub mod middleware;

use crate::adapters::database::DbPool;
use crate::config::Config;
use crate::services::device_token_registry::DeviceTokenRegistry;
use crate::services::job_service::JobService;
use crate::services::sse_hub::SseHub;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub job_service: JobService,
    pub device_tokens: DeviceTokenRegistry,
    pub sse_hub: SseHub,
}

#[derive(Clone)]
pub struct MgmtState {
    pub pool: DbPool,
}

/// Builds the public API router: generation jobs, their SSE event streams,
/// and device-token registration. Every route but `queue-stats` and the SSE
/// streams requires a bearer token via the `AuthUser` extractor.
#[must_use]
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/generation/async", post(generation::submit))
        .route("/generation/status/{jobId}", get(generation::status))
        .route("/generation/result/{jobId}", get(generation::result))
        .route("/generation/{jobId}", delete(generation::cancel))
        .route("/generation/pending", get(generation::pending))
        .route("/generation/queue-stats", get(generation::queue_stats))
        .route("/events/jobs", get(events::stream_owner_events))
        .route("/events/jobs/{jobId}", get(events::stream_job_events))
        .route("/devices", post(devices::register))
        .route("/devices/{token}", delete(devices::unregister))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Builds the management router: liveness/readiness probes, kept separate
/// from the public API surface (and its auth requirements) the way the
/// teacher serves management endpoints off their own listener.
#[must_use]
pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new().route("/livez", get(health::livez)).route("/readyz", get(health::readyz)).with_state(state)
}
