use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use opentelemetry::{KeyValue, global};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::api::MgmtState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Liveness probe: returns 200 OK as long as the process is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks connectivity to the Job Store's backing database.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let meter = global::meter("fableforge-server");
    let histogram = meter
        .f64_histogram("health_check_duration_seconds")
        .with_description("Duration of health checks")
        .build();

    let start = Instant::now();
    let db_res = match timeout(DB_CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(&state.pool)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("database connection failed: {e}")),
        Err(_) => Err("database connection timed out".to_string()),
    };
    histogram.record(start.elapsed().as_secs_f64(), &[KeyValue::new("component", "database")]);

    let status_code = if let Err(e) = &db_res {
        tracing::warn!(error = %e, component = "database", "Readiness probe failed");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status_code,
        Json(json!({
            "status": if status_code == StatusCode::OK { "ok" } else { "error" },
            "database": if db_res.is_ok() { "ok" } else { "error" },
        })),
    )
}
