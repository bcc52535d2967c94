use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;
use utoipa::ToSchema;

use crate::{db, ApiResponse, ApiResult, AppState};

/// Tracks application start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub version: String,
    pub uptime_secs: u64,
    pub timestamp: String,
}

/// Liveness plus a database round-trip. The endpoint itself always answers
/// 200 so that load balancers can read the component status.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    summary = "Health check",
    responses(
        (status = 200, description = "OK", body = ApiResponse<HealthStatus>),
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    let (status, database) = match db::check_connection(&state.db).await {
        Ok(()) => ("healthy", "up"),
        Err(_) => ("degraded", "down"),
    };

    let health = HealthStatus {
        status: status.to_string(),
        database: database.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0),
        timestamp: Utc::now().to_rfc3339(),
    };

    Ok(Json(ApiResponse::success("OK", health)))
}
