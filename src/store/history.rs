//! Append-only play history and the aggregation queries behind stats.
//!
//! Rankings and rollups are computed on demand; nothing is materialized.
//! `play_history.song_id` carries no foreign key on purpose: the log outlives
//! the songs it references, so hydrating joins are LEFT where history is
//! displayed and INNER where rankings need a live entity.

use super::models::*;
use super::SqliteStore;
use anyhow::Result;
use rusqlite::{params, Row};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryOverview {
    pub total_plays: i64,
    pub total_time_sec: i64,
    pub unique_songs: i64,
    pub unique_artists: i64,
    pub unique_albums: i64,
    pub avg_completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedSong {
    pub song: SongDetails,
    pub play_count: i64,
    pub total_time_sec: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedArtist {
    pub artist: Artist,
    pub play_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedAlbum {
    pub album: AlbumDetails,
    pub play_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternBucket {
    pub label: String,
    pub value: i64,
}

fn play_event_details_from_row(row: &Row) -> rusqlite::Result<PlayEventDetails> {
    Ok(PlayEventDetails {
        event: PlayEvent {
            id: row.get(0)?,
            user_id: row.get(1)?,
            song_id: row.get(2)?,
            played_at: row.get(3)?,
            duration_listened_sec: row.get(4)?,
            completion_rate: row.get(5)?,
            source: row.get(6)?,
        },
        song_title: row.get(7)?,
        artist_name: row.get(8)?,
        album_title: row.get(9)?,
        cover_path: row.get(10)?,
    })
}

impl SqliteStore {
    pub fn record_play(
        &self,
        user_id: i64,
        song_id: i64,
        played_at: i64,
        duration_listened_sec: i64,
        completion_rate: f64,
        source: &str,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO play_history
                (user_id, song_id, played_at, duration_listened_sec, completion_rate, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                song_id,
                played_at,
                duration_listened_sec,
                completion_rate,
                source
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_plays(&self, user_id: i64, limit: i64, offset: i64) -> Result<Vec<PlayEventDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT ph.id, ph.user_id, ph.song_id, ph.played_at, ph.duration_listened_sec,
                    ph.completion_rate, ph.source,
                    s.title, ar.name, al.title, s.cover_path
             FROM play_history ph
             LEFT JOIN songs s ON s.id = ph.song_id
             LEFT JOIN artists ar ON ar.id = s.artist_id
             LEFT JOIN albums al ON al.id = s.album_id
             WHERE ph.user_id = ?1
             ORDER BY ph.played_at DESC, ph.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![user_id, limit, offset], play_event_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Aggregate rollup over `[start, end)`.
    pub fn history_overview(&self, user_id: i64, start: i64, end: i64) -> Result<HistoryOverview> {
        let conn = self.lock();
        let overview = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(ph.duration_listened_sec), 0),
                    COUNT(DISTINCT ph.song_id),
                    COUNT(DISTINCT s.artist_id),
                    COUNT(DISTINCT s.album_id),
                    COALESCE(AVG(ph.completion_rate), 0.0)
             FROM play_history ph
             LEFT JOIN songs s ON s.id = ph.song_id
             WHERE ph.user_id = ?1 AND ph.played_at >= ?2 AND ph.played_at < ?3",
            params![user_id, start, end],
            |row| {
                Ok(HistoryOverview {
                    total_plays: row.get(0)?,
                    total_time_sec: row.get(1)?,
                    unique_songs: row.get(2)?,
                    unique_artists: row.get(3)?,
                    unique_albums: row.get(4)?,
                    avg_completion_rate: row.get(5)?,
                })
            },
        )?;
        Ok(overview)
    }

    pub fn top_songs(&self, user_id: i64, start: i64, end: i64, limit: i64) -> Result<Vec<RankedSong>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.album_id, s.artist_id, s.title, s.track_number, s.disc_number,
                    s.duration_ms, s.sample_rate, s.bit_depth, s.channels, s.bitrate_kbps, s.format,
                    s.file_path, s.file_size, s.file_modified, s.cover_path, s.external_id, s.created_at,
                    ar.name, al.title,
                    COUNT(*) AS plays, COALESCE(SUM(ph.duration_listened_sec), 0)
             FROM play_history ph
             JOIN songs s ON s.id = ph.song_id
             JOIN artists ar ON ar.id = s.artist_id
             JOIN albums al ON al.id = s.album_id
             WHERE ph.user_id = ?1 AND ph.played_at >= ?2 AND ph.played_at < ?3
             GROUP BY s.id
             ORDER BY plays DESC, MAX(ph.played_at) DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![user_id, start, end, limit], |row| {
            Ok(RankedSong {
                song: SongDetails {
                    song: Song {
                        id: row.get(0)?,
                        album_id: row.get(1)?,
                        artist_id: row.get(2)?,
                        title: row.get(3)?,
                        track_number: row.get(4)?,
                        disc_number: row.get(5)?,
                        duration_ms: row.get(6)?,
                        sample_rate: row.get(7)?,
                        bit_depth: row.get(8)?,
                        channels: row.get(9)?,
                        bitrate_kbps: row.get(10)?,
                        format: row.get(11)?,
                        file_path: row.get(12)?,
                        file_size: row.get(13)?,
                        file_modified: row.get(14)?,
                        cover_path: row.get(15)?,
                        external_id: row.get(16)?,
                        created_at: row.get(17)?,
                    },
                    artist_name: row.get(18)?,
                    album_title: row.get(19)?,
                },
                play_count: row.get(20)?,
                total_time_sec: row.get(21)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn top_artists(&self, user_id: i64, start: i64, end: i64, limit: i64) -> Result<Vec<RankedArtist>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT ar.id, ar.name, ar.sort_name, ar.external_id, ar.created_at, COUNT(*) AS plays
             FROM play_history ph
             JOIN songs s ON s.id = ph.song_id
             JOIN artists ar ON ar.id = s.artist_id
             WHERE ph.user_id = ?1 AND ph.played_at >= ?2 AND ph.played_at < ?3
             GROUP BY ar.id
             ORDER BY plays DESC, MAX(ph.played_at) DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![user_id, start, end, limit], |row| {
            Ok(RankedArtist {
                artist: Artist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    sort_name: row.get(2)?,
                    external_id: row.get(3)?,
                    created_at: row.get(4)?,
                },
                play_count: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn top_albums(&self, user_id: i64, start: i64, end: i64, limit: i64) -> Result<Vec<RankedAlbum>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT al.id, al.artist_id, al.title, al.year, al.cover_path, al.external_id, al.created_at,
                    ar.name,
                    (SELECT COUNT(*) FROM songs sc WHERE sc.album_id = al.id),
                    COUNT(*) AS plays
             FROM play_history ph
             JOIN songs s ON s.id = ph.song_id
             JOIN albums al ON al.id = s.album_id
             JOIN artists ar ON ar.id = al.artist_id
             WHERE ph.user_id = ?1 AND ph.played_at >= ?2 AND ph.played_at < ?3
             GROUP BY al.id
             ORDER BY plays DESC, MAX(ph.played_at) DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![user_id, start, end, limit], |row| {
            Ok(RankedAlbum {
                album: AlbumDetails {
                    album: Album {
                        id: row.get(0)?,
                        artist_id: row.get(1)?,
                        title: row.get(2)?,
                        year: row.get(3)?,
                        cover_path: row.get(4)?,
                        external_id: row.get(5)?,
                        created_at: row.get(6)?,
                    },
                    artist_name: row.get(7)?,
                    song_count: row.get(8)?,
                },
                play_count: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Histogram over a strftime bucket (`%H` hour, `%w` weekday, `%m` month)
    /// of local play times within `[start, end)`.
    pub fn play_pattern(&self, user_id: i64, start: i64, end: i64, bucket: &str) -> Result<Vec<PatternBucket>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT strftime(?4, played_at, 'unixepoch') AS bucket, COUNT(*)
             FROM play_history
             WHERE user_id = ?1 AND played_at >= ?2 AND played_at < ?3
             GROUP BY bucket
             ORDER BY bucket",
        )?;
        let rows = stmt.query_map(params![user_id, start, end, bucket], |row| {
            Ok(PatternBucket {
                label: row.get(0)?,
                value: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Songs first played inside the window: distinct songs with a play in
    /// `[start, end)` and none before `start`.
    pub fn new_songs_in_window(&self, user_id: i64, start: i64, end: i64) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(DISTINCT ph.song_id)
             FROM play_history ph
             WHERE ph.user_id = ?1 AND ph.played_at >= ?2 AND ph.played_at < ?3
               AND NOT EXISTS (
                   SELECT 1 FROM play_history prior
                   WHERE prior.user_id = ph.user_id
                     AND prior.song_id = ph.song_id
                     AND prior.played_at < ?2)",
            params![user_id, start, end],
            |row| row.get(0),
        )?)
    }

    pub fn new_artists_in_window(&self, user_id: i64, start: i64, end: i64) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(DISTINCT s.artist_id)
             FROM play_history ph
             JOIN songs s ON s.id = ph.song_id
             WHERE ph.user_id = ?1 AND ph.played_at >= ?2 AND ph.played_at < ?3
               AND NOT EXISTS (
                   SELECT 1 FROM play_history prior
                   JOIN songs sp ON sp.id = prior.song_id
                   WHERE prior.user_id = ph.user_id
                     AND sp.artist_id = s.artist_id
                     AND prior.played_at < ?2)",
            params![user_id, start, end],
            |row| row.get(0),
        )?)
    }

    /// Every distinct calendar day with at least one play, ascending,
    /// formatted `YYYY-MM-DD`.
    pub fn play_days(&self, user_id: i64) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT date(played_at, 'unixepoch') AS day
             FROM play_history WHERE user_id = ?1
             ORDER BY day",
        )?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn days_listened(&self, user_id: i64, start: i64, end: i64) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(DISTINCT date(played_at, 'unixepoch'))
             FROM play_history
             WHERE user_id = ?1 AND played_at >= ?2 AND played_at < ?3",
            params![user_id, start, end],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{SongUpsert, UserRole};

    fn seeded() -> (SqliteStore, i64, Vec<i64>) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store
            .create_user("u", "$hash", None, UserRole::User)
            .unwrap();
        let mut song_ids = Vec::new();
        for (artist, album, title, path) in [
            ("Art", "Alb", "T", "/m/t.mp3"),
            ("Art", "Alb", "U", "/m/u.mp3"),
            ("Other", "Elsewhere", "V", "/m/v.mp3"),
        ] {
            let artist_id = store.upsert_artist(artist).unwrap();
            let album_id = store.upsert_album(album, artist_id, None).unwrap();
            let id = store
                .upsert_song(&SongUpsert {
                    album_id,
                    artist_id,
                    title: title.to_string(),
                    track_number: None,
                    disc_number: None,
                    duration_ms: 200_000,
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
            song_ids.push(id);
        }
        (store, user.id, song_ids)
    }

    // 2025-06-01T10:00:00Z
    const T0: i64 = 1_748_772_000;

    #[test]
    fn overview_counts_window_only() {
        let (store, user, songs) = seeded();
        store.record_play(user, songs[0], T0, 180, 0.9, "library").unwrap();
        store.record_play(user, songs[1], T0 + 60, 120, 0.5, "library").unwrap();
        store.record_play(user, songs[0], T0 - 86_400, 30, 0.1, "library").unwrap();

        let overview = store.history_overview(user, T0 - 3600, T0 + 3600).unwrap();
        assert_eq!(overview.total_plays, 2);
        assert_eq!(overview.total_time_sec, 300);
        assert_eq!(overview.unique_songs, 2);
        assert_eq!(overview.unique_artists, 1);
        assert!((overview.avg_completion_rate - 0.7).abs() < 1e-9);
    }

    #[test]
    fn top_songs_orders_by_play_count() {
        let (store, user, songs) = seeded();
        for _ in 0..3 {
            store.record_play(user, songs[2], T0, 100, 1.0, "library").unwrap();
        }
        store.record_play(user, songs[0], T0, 100, 1.0, "library").unwrap();

        let top = store.top_songs(user, T0 - 10, T0 + 10, 10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].song.song.id, songs[2]);
        assert_eq!(top[0].play_count, 3);
    }

    #[test]
    fn hour_pattern_buckets_by_utc_hour() {
        let (store, user, songs) = seeded();
        store.record_play(user, songs[0], T0, 180, 0.9, "library").unwrap();
        let buckets = store.play_pattern(user, T0 - 10, T0 + 10, "%H").unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].label, "10");
        assert_eq!(buckets[0].value, 1);
    }

    #[test]
    fn discovery_excludes_previously_played() {
        let (store, user, songs) = seeded();
        // songs[0] heard before the window, songs[1] is new inside it
        store.record_play(user, songs[0], T0 - 86_400, 100, 1.0, "library").unwrap();
        store.record_play(user, songs[0], T0, 100, 1.0, "library").unwrap();
        store.record_play(user, songs[1], T0, 100, 1.0, "library").unwrap();

        let new_songs = store.new_songs_in_window(user, T0 - 3600, T0 + 3600).unwrap();
        assert_eq!(new_songs, 1);
        // Both songs share an artist already heard before the window
        let new_artists = store.new_artists_in_window(user, T0 - 3600, T0 + 3600).unwrap();
        assert_eq!(new_artists, 0);
    }

    #[test]
    fn play_days_are_distinct_and_sorted() {
        let (store, user, songs) = seeded();
        store.record_play(user, songs[0], T0, 10, 0.1, "library").unwrap();
        store.record_play(user, songs[1], T0 + 60, 10, 0.1, "library").unwrap();
        store.record_play(user, songs[0], T0 - 86_400, 10, 0.1, "library").unwrap();

        let days = store.play_days(user).unwrap();
        assert_eq!(days, vec!["2025-05-31".to_string(), "2025-06-01".to_string()]);
    }
}
