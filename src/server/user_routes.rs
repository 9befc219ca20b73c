//! Per-user endpoints: player state, settings, favorites, play history and
//! the home feed.

use super::error::{ApiError, ApiResult};
use super::session::Session;
use super::state::GuardedStore;
use crate::store::{PlayerState, UserSettings};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

pub async fn get_player_state(
    session: Session,
    State(store): State<GuardedStore>,
) -> ApiResult<Json<PlayerState>> {
    let state = store
        .get_player_state(session.user_id)
        .map_err(ApiError::internal)?
        .unwrap_or(PlayerState {
            current_song_id: None,
            queue: Vec::new(),
            queue_index: 0,
            progress: 0.0,
        });
    Ok(Json(state))
}

pub async fn put_player_state(
    session: Session,
    State(store): State<GuardedStore>,
    Json(state): Json<PlayerState>,
) -> ApiResult<Json<serde_json::Value>> {
    store
        .set_player_state(session.user_id, &state)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn get_settings(
    session: Session,
    State(store): State<GuardedStore>,
) -> ApiResult<Json<UserSettings>> {
    let settings = store
        .get_user_settings(session.user_id)
        .map_err(ApiError::internal)?;
    Ok(Json(settings))
}

pub async fn put_settings(
    session: Session,
    State(store): State<GuardedStore>,
    Json(settings): Json<UserSettings>,
) -> ApiResult<Json<UserSettings>> {
    store
        .set_user_settings(session.user_id, &settings)
        .map_err(ApiError::internal)?;
    Ok(Json(settings))
}

// -- favorites ---------------------------------------------------------------

pub async fn favorite_song(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if store.get_song(id).map_err(ApiError::internal)?.is_none() {
        return Err(ApiError::NotFound("song"));
    }
    store
        .add_favorite_song(session.user_id, id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn unfavorite_song(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    store
        .remove_favorite_song(session.user_id, id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn favorite_album(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if store
        .get_album_details(id)
        .map_err(ApiError::internal)?
        .is_none()
    {
        return Err(ApiError::NotFound("album"));
    }
    store
        .add_favorite_album(session.user_id, id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn unfavorite_album(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    store
        .remove_favorite_album(session.user_id, id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn follow_artist(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if store.get_artist(id).map_err(ApiError::internal)?.is_none() {
        return Err(ApiError::NotFound("artist"));
    }
    store
        .follow_artist(session.user_id, id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn unfollow_artist(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    store
        .unfollow_artist(session.user_id, id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn get_favorites(
    session: Session,
    State(store): State<GuardedStore>,
) -> ApiResult<Json<serde_json::Value>> {
    let song_ids = store
        .favorite_song_ids(session.user_id)
        .map_err(ApiError::internal)?;
    let songs = store
        .get_songs_details(&song_ids)
        .map_err(ApiError::internal)?;

    let album_ids = store
        .favorite_album_ids(session.user_id)
        .map_err(ApiError::internal)?;
    let mut albums = Vec::with_capacity(album_ids.len());
    for album_id in album_ids {
        if let Some(album) = store
            .get_album_details(album_id)
            .map_err(ApiError::internal)?
        {
            albums.push(album);
        }
    }

    let artist_ids = store
        .followed_artist_ids(session.user_id)
        .map_err(ApiError::internal)?;
    let mut artists = Vec::with_capacity(artist_ids.len());
    for artist_id in artist_ids {
        if let Some(artist) = store.get_artist(artist_id).map_err(ApiError::internal)? {
            artists.push(artist);
        }
    }

    Ok(Json(json!({
        "songs": songs,
        "albums": albums,
        "artists": artists,
    })))
}

// -- history -----------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecordPlayBody {
    pub song_id: i64,
    /// Unix seconds; defaults to now.
    pub played_at: Option<i64>,
    pub duration_listened_sec: i64,
    pub completion_rate: f64,
    pub source: Option<String>,
}

pub async fn record_play(
    session: Session,
    State(store): State<GuardedStore>,
    Json(body): Json<RecordPlayBody>,
) -> ApiResult<Json<serde_json::Value>> {
    if store
        .get_song(body.song_id)
        .map_err(ApiError::internal)?
        .is_none()
    {
        return Err(ApiError::NotFound("song"));
    }
    if body.duration_listened_sec < 0 {
        return Err(ApiError::Validation(
            "duration_listened_sec must be non-negative".to_string(),
        ));
    }

    let id = store
        .record_play(
            session.user_id,
            body.song_id,
            body.played_at.unwrap_or_else(crate::store::now_ts),
            body.duration_listened_sec,
            body.completion_rate.clamp(0.0, 1.0),
            body.source.as_deref().unwrap_or("library"),
        )
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "id": id })))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_history(
    session: Session,
    State(store): State<GuardedStore>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let events = store
        .recent_plays(
            session.user_id,
            query.limit.unwrap_or(50).clamp(1, 500),
            query.offset.unwrap_or(0).max(0),
        )
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "history": events })))
}

/// The home feed: recent listening, new additions and a favorites slice.
pub async fn home(
    session: Session,
    State(store): State<GuardedStore>,
) -> ApiResult<Json<serde_json::Value>> {
    let recently_played = store
        .recent_plays(session.user_id, 10, 0)
        .map_err(ApiError::internal)?;
    let recently_added = store
        .recently_added_albums(10)
        .map_err(ApiError::internal)?;
    let favorite_ids = store
        .favorite_song_ids(session.user_id)
        .map_err(ApiError::internal)?;
    let favorites = store
        .get_songs_details(&favorite_ids[..favorite_ids.len().min(10)])
        .map_err(ApiError::internal)?;

    Ok(Json(json!({
        "recently_played": recently_played,
        "recently_added": recently_added,
        "favorites": favorites,
    })))
}
