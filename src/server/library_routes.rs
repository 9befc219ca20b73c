//! Library browsing: artists, albums, songs, search, artwork and lyrics.

use super::error::{ApiError, ApiResult};
use super::session::Session;
use super::state::{GuardedSearch, GuardedStore, ServerState};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

pub async fn me(
    session: Session,
    State(store): State<GuardedStore>,
) -> ApiResult<Json<serde_json::Value>> {
    let user = store
        .get_user(session.user_id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(json!({ "user": user })))
}

/// Library overview: counts plus a paginated song listing.
pub async fn library(
    _session: Session,
    State(store): State<GuardedStore>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let songs = store
        .list_songs(page.limit(), page.offset())
        .map_err(ApiError::internal)?;
    Ok(Json(json!({
        "counts": {
            "songs": store.count_songs().map_err(ApiError::internal)?,
            "albums": store.count_albums().map_err(ApiError::internal)?,
            "artists": store.count_artists().map_err(ApiError::internal)?,
        },
        "songs": songs,
    })))
}

pub async fn list_artists(
    _session: Session,
    State(store): State<GuardedStore>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let artists = store
        .list_artists(page.limit(), page.offset())
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "artists": artists })))
}

/// Contextual wrapper: the artist with its albums and top tracks.
pub async fn get_artist(
    _session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let artist = store
        .get_artist(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("artist"))?;
    let albums = store.artist_albums(id).map_err(ApiError::internal)?;
    let top_songs = store.artist_top_songs(id, 10).map_err(ApiError::internal)?;
    Ok(Json(json!({
        "artist": artist,
        "albums": albums,
        "top_songs": top_songs,
    })))
}

pub async fn list_albums(
    _session: Session,
    State(store): State<GuardedStore>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let albums = store
        .list_albums(page.limit(), page.offset())
        .map_err(ApiError::internal)?;
    Ok(Json(json!({ "albums": albums })))
}

/// Contextual wrapper: the album with its songs in track order.
pub async fn get_album(
    _session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let album = store
        .get_album_details(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("album"))?;
    let songs = store.album_songs(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "album": album, "songs": songs })))
}

#[derive(Deserialize)]
pub struct SongsQuery {
    /// Comma-separated song ids.
    pub ids: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_songs(
    _session: Session,
    State(store): State<GuardedStore>,
    Query(query): Query<SongsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let songs = match &query.ids {
        Some(raw) => {
            let ids: Vec<i64> = raw
                .split(',')
                .map(|part| part.trim().parse::<i64>())
                .collect::<Result<_, _>>()
                .map_err(|_| ApiError::Validation("ids must be a comma-separated list of integers".to_string()))?;
            store.get_songs_details(&ids).map_err(ApiError::internal)?
        }
        None => {
            let page = PageQuery {
                limit: query.limit,
                offset: query.offset,
            };
            store
                .list_songs(page.limit(), page.offset())
                .map_err(ApiError::internal)?
        }
    };
    Ok(Json(json!({ "songs": songs })))
}

pub async fn get_song(
    _session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let song = store
        .get_song_details(id)
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound("song"))?;
    Ok(Json(json!({ "song": song })))
}

pub async fn get_lyrics(
    _session: Session,
    State(store): State<GuardedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if store.get_song(id).map_err(ApiError::internal)?.is_none() {
        return Err(ApiError::NotFound("song"));
    }
    let lyrics = store.get_lyrics(id).map_err(ApiError::internal)?;
    Ok(Json(json!({ "lyrics": lyrics })))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn search(
    _session: Session,
    State(search): State<GuardedSearch>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<crate::search::SearchResults>> {
    let results = search
        .search(
            &query.q,
            query.limit.unwrap_or(crate::search::DEFAULT_LIMIT),
            query.offset.unwrap_or(0),
        )
        .map_err(ApiError::internal)?;
    Ok(Json(results))
}

#[derive(Deserialize)]
pub struct ArtworkQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

fn image_mime(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}

async fn serve_cover(state: &ServerState, file_name: &str) -> ApiResult<Response> {
    let path = state.config.cover_cache_dir.join(file_name);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound("artwork"))?;
    Ok((
        [
            (header::CONTENT_TYPE, image_mime(file_name).to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Artwork for a song, or for its album with `?type=album`.
pub async fn artwork(
    _session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Query(query): Query<ArtworkQuery>,
) -> ApiResult<Response> {
    let cover = if query.kind.as_deref() == Some("album") {
        state
            .store
            .get_album_details(id)
            .map_err(ApiError::internal)?
            .and_then(|album| album.album.cover_path)
    } else {
        let song = state
            .store
            .get_song(id)
            .map_err(ApiError::internal)?
            .ok_or(ApiError::NotFound("song"))?;
        match song.cover_path {
            Some(cover) => Some(cover),
            None => state
                .store
                .get_album_details(song.album_id)
                .map_err(ApiError::internal)?
                .and_then(|album| album.album.cover_path),
        }
    };

    let Some(cover) = cover else {
        return Err(ApiError::NotFound("artwork"));
    };
    serve_cover(&state, &cover).await
}

/// Artist image: the cover of the artist's most recent album.
pub async fn artist_image(
    _session: Session,
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let albums = state.store.artist_albums(id).map_err(ApiError::internal)?;
    let cover = albums
        .iter()
        .rev()
        .find_map(|album| album.album.cover_path.clone())
        .ok_or(ApiError::NotFound("artwork"))?;
    serve_cover(&state, &cover).await
}
