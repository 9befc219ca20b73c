//! Public authentication endpoints plus health/ping.

use super::error::{ApiError, ApiResult};
use super::session::Session;
use super::state::{GuardedAuth, ServerState};
use crate::store::User;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn register(
    State(auth): State<GuardedAuth>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = auth.register(&body.username, &body.password, body.email.as_deref())?;
    Ok(Json(json!({ "user": user })))
}

pub async fn login(
    State(auth): State<GuardedAuth>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<TokenResponse>> {
    let pair = auth.login(&body.username, &body.password)?;
    Ok(Json(TokenResponse {
        user: pair.user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

pub async fn refresh(
    State(auth): State<GuardedAuth>,
    Json(body): Json<RefreshBody>,
) -> ApiResult<Json<TokenResponse>> {
    let pair = auth.refresh(&body.refresh_token)?;
    Ok(Json(TokenResponse {
        user: pair.user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

pub async fn logout(
    session: Option<Session>,
    State(auth): State<GuardedAuth>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(session) = session {
        auth.logout(&session.token)?;
    }
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn health(State(state): State<ServerState>) -> ApiResult<Json<serde_json::Value>> {
    // A trivial query doubles as a database reachability check
    let songs = state.store.count_songs().map_err(ApiError::internal)?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("APP_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "songs": songs,
        "scan_running": state.scanner.is_running(),
    })))
}

pub async fn ping() -> &'static str {
    "pong"
}
