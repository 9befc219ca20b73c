//! Playlist CRUD and entry mutations. Mutations are owner-only; reads allow
//! the owner or anyone for public playlists.

use super::error::{ApiError, ApiResult};
use super::session::Session;
use super::state::GuardedStore;
use crate::store::{Playlist, SqliteStore};
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

fn load_readable(store: &SqliteStore, id: i64, session: &Session) -> ApiResult<Playlist> {
    let playlist = store
        .get_playlist(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("playlist"))?;
    if playlist.user_id != session.user_id && !playlist.public {
        return Err(ApiError::NotFound("playlist"));
    }
    Ok(playlist)
}

fn load_owned(store: &SqliteStore, id: i64, session: &Session) -> ApiResult<Playlist> {
    let playlist = store
        .get_playlist(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("playlist"))?;
    if playlist.user_id != session.user_id {
        return Err(ApiError::Forbidden);
    }
    Ok(playlist)
}

#[derive(Deserialize)]
pub struct CreatePlaylistBody {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub song_ids: Vec<i64>,
}

pub async fn create_playlist(
    session: Session,
    State(store): State<GuardedStore>,
    Json(body): Json<CreatePlaylistBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("playlist name must not be empty".to_string()));
    }
    let playlist = store
        .create_playlist(session.user_id, name, body.description.as_deref(), body.public)
        .map_err(ApiError::internal)?;
    if !body.song_ids.is_empty() {
        store
            .add_playlist_songs(playlist.id, &body.song_ids)
            .map_err(|err| ApiError::Validation(err.to_string()))?;
    }
    Ok(Json(json!({ "playlist": playlist })))
}

pub async fn list_playlists(
    session: Session,
    State(store): State<GuardedStore>,
) -> ApiResult<Json<serde_json::Value>> {
    let playlists = store
        .list_playlists(session.user_id)
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "playlists": playlists })))
}

pub async fn get_playlist(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let playlist = load_readable(&store, id, &session)?;
    let songs = store.playlist_songs(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "playlist": playlist, "songs": songs })))
}

#[derive(Deserialize)]
pub struct UpdatePlaylistBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
}

pub async fn update_playlist(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePlaylistBody>,
) -> ApiResult<Json<serde_json::Value>> {
    load_owned(&store, id, &session)?;
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("playlist name must not be empty".to_string()));
        }
    }
    store
        .update_playlist(
            id,
            body.name.as_deref().map(str::trim),
            body.description.as_deref(),
            body.public,
        )
        .map_err(ApiError::internal)?;
    let playlist = store
        .get_playlist(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("playlist"))?;
    Ok(Json(json!({ "playlist": playlist })))
}

pub async fn delete_playlist(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    load_owned(&store, id, &session)?;
    store.delete_playlist(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
pub struct PlaylistSongsBody {
    pub song_ids: Vec<i64>,
}

pub async fn add_songs(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
    Json(body): Json<PlaylistSongsBody>,
) -> ApiResult<Json<serde_json::Value>> {
    load_owned(&store, id, &session)?;
    store
        .add_playlist_songs(id, &body.song_ids)
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    let songs = store.playlist_songs(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "songs": songs })))
}

pub async fn remove_songs(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
    Json(body): Json<PlaylistSongsBody>,
) -> ApiResult<Json<serde_json::Value>> {
    load_owned(&store, id, &session)?;
    store
        .remove_playlist_songs(id, &body.song_ids)
        .map_err(ApiError::internal)?;
    let songs = store.playlist_songs(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "songs": songs })))
}

#[derive(Deserialize)]
pub struct ReorderBody {
    pub song_ids: Vec<i64>,
}

pub async fn reorder(
    session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
    Json(body): Json<ReorderBody>,
) -> ApiResult<Json<serde_json::Value>> {
    load_owned(&store, id, &session)?;
    store
        .reorder_playlist(id, &body.song_ids)
        .map_err(|err| ApiError::Validation(err.to_string()))?;
    let songs = store.playlist_songs(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "songs": songs })))
}
