//! Router assembly and the server entry point.

use super::error::ApiError;
use super::session::Session;
use super::state::ServerState;
use super::{
    admin_routes, auth_routes, library_routes, log_requests, playlist_routes, stats_routes,
    stream_routes, user_routes,
};
use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::KeyExtractor, GovernorError, GovernorLayer,
};
use tracing::{debug, info};

/// Extracts the peer address for IP-based rate limiting on auth endpoints.
#[derive(Clone)]
pub struct IpKeyExtractor;

impl KeyExtractor for IpKeyExtractor {
    type Key = SocketAddr;

    fn extract<T>(&self, req: &axum::http::Request<T>) -> Result<Self::Key, GovernorError> {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Role gate for the admin surface.
async fn require_admin(session: Session, request: Request<Body>, next: Next) -> impl IntoResponse {
    if !session.is_admin() {
        debug!(
            "require_admin: FORBIDDEN - user_id={} role={:?}",
            session.user_id, session.role
        );
        return ApiError::Forbidden.into_response();
    }
    next.run(request).await
}

pub fn build_router(state: ServerState) -> Router {
    // Credential endpoints get strict IP-based rate limiting
    let per_second = (state.config.rate_limit_count as u64
        / state.config.rate_limit_window_secs.max(1))
    .max(1);
    let auth_rate_limit = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(per_second)
            .burst_size(state.config.rate_limit_count.max(1))
            .key_extractor(IpKeyExtractor)
            .finish()
            .expect("governor config is statically valid"),
    );

    let public_auth_routes: Router = Router::new()
        .route("/auth/register", post(auth_routes::register))
        .route("/auth/login", post(auth_routes::login))
        .route("/auth/refresh", post(auth_routes::refresh))
        .layer(GovernorLayer::new(auth_rate_limit))
        .with_state(state.clone());

    let public_routes: Router = Router::new()
        .route("/auth/logout", post(auth_routes::logout))
        .route("/health", get(auth_routes::health))
        .route("/ping", get(auth_routes::ping))
        .with_state(state.clone());

    let library: Router = Router::new()
        .route("/me", get(library_routes::me))
        .route("/library", get(library_routes::library))
        .route("/artists", get(library_routes::list_artists))
        .route("/artists/{id}", get(library_routes::get_artist))
        .route("/albums", get(library_routes::list_albums))
        .route("/albums/{id}", get(library_routes::get_album))
        .route("/songs", get(library_routes::list_songs))
        .route("/songs/{id}", get(library_routes::get_song))
        .route("/lyrics/{id}", get(library_routes::get_lyrics))
        .route("/search", get(library_routes::search))
        .route("/artwork/{id}", get(library_routes::artwork))
        .route("/artist-image/{id}", get(library_routes::artist_image))
        .with_state(state.clone());

    let streaming: Router = Router::new()
        .route("/stream/{id}", get(stream_routes::stream_song))
        .route("/stream/{id}/manifest.m3u8", get(stream_routes::hls_manifest))
        .route("/stream/{id}/init.mp4", get(stream_routes::hls_init))
        .route("/stream/{id}/{segment}", get(stream_routes::hls_segment))
        .route("/download/{id}", get(stream_routes::download_song))
        .with_state(state.clone());

    let user: Router = Router::new()
        .route("/player/state", get(user_routes::get_player_state))
        .route("/player/state", put(user_routes::put_player_state))
        .route("/settings", get(user_routes::get_settings))
        .route("/settings", put(user_routes::put_settings))
        .route("/favorites", get(user_routes::get_favorites))
        .route("/favorites/songs/{id}", post(user_routes::favorite_song))
        .route("/favorites/songs/{id}", delete(user_routes::unfavorite_song))
        .route("/favorites/albums/{id}", post(user_routes::favorite_album))
        .route("/favorites/albums/{id}", delete(user_routes::unfavorite_album))
        .route("/follows/artists/{id}", post(user_routes::follow_artist))
        .route("/follows/artists/{id}", delete(user_routes::unfollow_artist))
        .route("/history", post(user_routes::record_play))
        .route("/history", get(user_routes::get_history))
        .route("/home", get(user_routes::home))
        .with_state(state.clone());

    let playlists: Router = Router::new()
        .route("/playlists", get(playlist_routes::list_playlists))
        .route("/playlists", post(playlist_routes::create_playlist))
        .route("/playlists/{id}", get(playlist_routes::get_playlist))
        .route("/playlists/{id}", put(playlist_routes::update_playlist))
        .route("/playlists/{id}", delete(playlist_routes::delete_playlist))
        .route("/playlists/{id}/songs", post(playlist_routes::add_songs))
        .route("/playlists/{id}/songs", delete(playlist_routes::remove_songs))
        .route("/playlists/{id}/reorder", put(playlist_routes::reorder))
        .with_state(state.clone());

    let stats: Router = Router::new()
        .route("/stats", get(stats_routes::get_stats))
        .route("/stats/wrapped", get(stats_routes::get_wrapped))
        .route("/stats/insights", get(stats_routes::get_insights))
        .with_state(state.clone());

    let admin: Router = Router::new()
        .route("/admin/scan", post(admin_routes::start_scan))
        .route("/admin/scan/status", get(admin_routes::scan_status))
        .route("/admin/system", get(admin_routes::system_info))
        .route("/admin/sessions/cleanup", delete(admin_routes::cleanup_sessions))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .with_state(state.clone());

    let api = public_auth_routes
        .merge(public_routes)
        .merge(library)
        .merge(streaming)
        .merge(user)
        .merge(playlists)
        .merge(stats)
        .merge(admin);

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    state: ServerState,
    listen_addr: &str,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    info!("Listening on {}", listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .context("HTTP server error")
}
