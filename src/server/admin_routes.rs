//! Admin endpoints: scan control, system info and session cleanup.
//! All routes here sit behind the admin-role middleware.

use super::error::{ApiError, ApiResult};
use super::state::ServerState;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

pub async fn start_scan(State(state): State<ServerState>) -> ApiResult<Json<serde_json::Value>> {
    let scan_id = state.scanner.start_scan()?;
    Ok(Json(json!({ "scan_id": scan_id })))
}

pub async fn scan_status(State(state): State<ServerState>) -> ApiResult<Json<serde_json::Value>> {
    let status = state
        .scanner
        .status()
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("scan"))?;
    Ok(Json(json!({ "scan": status })))
}

pub async fn system_info(State(state): State<ServerState>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!({
        "version": env!("APP_VERSION"),
        "git_hash": env!("GIT_HASH"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "library": {
            "songs": state.store.count_songs().map_err(ApiError::internal)?,
            "albums": state.store.count_albums().map_err(ApiError::internal)?,
            "artists": state.store.count_artists().map_err(ApiError::internal)?,
        },
        "jobs_pending": state.store.pending_job_count().map_err(ApiError::internal)?,
        "scan_running": state.scanner.is_running(),
    })))
}

#[derive(Deserialize)]
pub struct CleanupQuery {
    pub older_than_secs: Option<i64>,
}

pub async fn cleanup_sessions(
    State(state): State<ServerState>,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state
        .auth
        .cleanup_sessions(query.older_than_secs.unwrap_or(0).max(0))?;
    Ok(Json(json!({ "deleted": deleted })))
}
