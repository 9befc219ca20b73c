//! Library search: full-text over songs, substring over artists and albums,
//! merged into one hydrated response.

use crate::store::{AlbumDetails, Artist, SongDetails, SqliteStore};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Serialize)]
pub struct SearchResults {
    pub songs: Vec<SongDetails>,
    pub albums: Vec<AlbumDetails>,
    pub artists: Vec<Artist>,
}

pub struct SearchService {
    store: Arc<SqliteStore>,
}

impl SearchService {
    pub fn new(store: Arc<SqliteStore>) -> SearchService {
        SearchService { store }
    }

    /// Run all three categories for a query. An empty query returns empty
    /// results rather than the whole library.
    pub fn search(&self, query: &str, limit: i64, offset: i64) -> Result<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }
        let limit = limit.clamp(1, MAX_LIMIT);
        let offset = offset.max(0);

        Ok(SearchResults {
            songs: self.store.search_songs(query, limit, offset)?,
            albums: self.store.search_albums(query, limit, offset)?,
            artists: self.store.search_artists(query, limit, offset)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SongUpsert;

    fn seeded() -> SearchService {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        for (artist, album, title, path) in [
            ("Radiohead", "OK Computer", "Paranoid Android", "/m/pa.mp3"),
            ("Radiohead", "In Rainbows", "Nude", "/m/nude.mp3"),
            ("Portishead", "Dummy", "Roads", "/m/roads.mp3"),
        ] {
            let artist_id = store.upsert_artist(artist).unwrap();
            let album_id = store.upsert_album(album, artist_id, None).unwrap();
            let song_id = store
                .upsert_song(&SongUpsert {
                    album_id,
                    artist_id,
                    title: title.to_string(),
                    track_number: None,
                    disc_number: None,
                    duration_ms: 1000,
                    sample_rate: 44_100,
                    bit_depth: 16,
                    channels: 2,
                    bitrate_kbps: None,
                    format: "mp3".to_string(),
                    file_path: path.to_string(),
                    file_size: 1,
                    file_modified: 0,
                    cover_path: None,
                })
                .unwrap();
            store.update_song_fts(song_id, title, artist, album).unwrap();
        }
        SearchService::new(store)
    }

    #[test]
    fn empty_query_returns_nothing() {
        let search = seeded();
        let results = search.search("  ", 20, 0).unwrap();
        assert!(results.songs.is_empty());
        assert!(results.albums.is_empty());
        assert!(results.artists.is_empty());
    }

    #[test]
    fn merges_all_categories() {
        let search = seeded();
        let results = search.search("radiohead", 20, 0).unwrap();
        assert_eq!(results.songs.len(), 2);
        assert_eq!(results.artists.len(), 1);
        assert!(results.albums.is_empty());

        let results = search.search("head", 20, 0).unwrap();
        // Substring categories match both artists
        assert_eq!(results.artists.len(), 2);
    }

    #[test]
    fn pagination_applies_per_category() {
        let search = seeded();
        let page1 = search.search("radiohead", 1, 0).unwrap();
        let page2 = search.search("radiohead", 1, 1).unwrap();
        assert_eq!(page1.songs.len(), 1);
        assert_eq!(page2.songs.len(), 1);
        assert_ne!(page1.songs[0].song.id, page2.songs[0].song.id);
    }
}
