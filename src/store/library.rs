//! Artists, albums, songs, lyrics and the full-text index.
//!
//! Upserts use `ON CONFLICT ... RETURNING id` against the case-insensitive
//! unique keys, so rescanning the same tree is idempotent. The full-text
//! index over (title, artist, album) is maintained delete-then-insert per
//! song id.

use super::models::*;
use super::{now_ts, SqliteStore};
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;

const SONG_COLS: &str = "s.id, s.album_id, s.artist_id, s.title, s.track_number, s.disc_number, \
     s.duration_ms, s.sample_rate, s.bit_depth, s.channels, s.bitrate_kbps, s.format, \
     s.file_path, s.file_size, s.file_modified, s.cover_path, s.external_id, s.created_at";

const ALBUM_COLS: &str = "al.id, al.artist_id, al.title, al.year, al.cover_path, al.external_id, al.created_at";

fn song_from_row(row: &Row) -> rusqlite::Result<Song> {
    Ok(Song {
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
    })
}

fn song_details_from_row(row: &Row) -> rusqlite::Result<SongDetails> {
    Ok(SongDetails {
        song: song_from_row(row)?,
        artist_name: row.get(18)?,
        album_title: row.get(19)?,
    })
}

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        artist_id: row.get(1)?,
        title: row.get(2)?,
        year: row.get(3)?,
        cover_path: row.get(4)?,
        external_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn album_details_from_row(row: &Row) -> rusqlite::Result<AlbumDetails> {
    Ok(AlbumDetails {
        album: album_from_row(row)?,
        artist_name: row.get(7)?,
        song_count: row.get(8)?,
    })
}

fn artist_from_row(row: &Row) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        sort_name: row.get(2)?,
        external_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Sort key with leading English articles stripped: "The Kinks" -> "Kinks".
pub fn sort_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    for article in ["the ", "a ", "an "] {
        if lowered.starts_with(article) && name.len() > article.len() {
            return name[article.len()..].to_string();
        }
    }
    name.to_string()
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern
/// used with `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Quote a user query for FTS5 MATCH so punctuation is not parsed as syntax.
fn fts_quote(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}

pub(super) fn compact_playlist_positions(conn: &Connection, playlist_id: i64) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT song_id FROM playlist_entries WHERE playlist_id = ?1 ORDER BY position",
    )?;
    let song_ids: Vec<i64> = stmt
        .query_map([playlist_id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    conn.execute(
        "DELETE FROM playlist_entries WHERE playlist_id = ?1",
        [playlist_id],
    )?;
    let mut insert = conn.prepare(
        "INSERT INTO playlist_entries (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
    )?;
    for (index, song_id) in song_ids.iter().enumerate() {
        insert.execute(params![playlist_id, song_id, index as i64 + 1])?;
    }
    Ok(())
}

pub(super) fn compact_all_playlists(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("SELECT id FROM playlists")?;
    let ids: Vec<i64> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    for id in ids {
        compact_playlist_positions(conn, id)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub songs: usize,
    pub albums: usize,
    pub artists: usize,
}

impl SqliteStore {
    pub fn upsert_artist(&self, name: &str) -> Result<i64> {
        let conn = self.lock();
        let id = conn.query_row(
            "INSERT INTO artists (name, sort_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET name = artists.name
             RETURNING id",
            params![name, sort_name(name), now_ts()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn upsert_album(&self, title: &str, artist_id: i64, year: Option<i64>) -> Result<i64> {
        let conn = self.lock();
        let id = conn.query_row(
            "INSERT INTO albums (artist_id, title, year, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(title, artist_id) DO UPDATE SET year = COALESCE(excluded.year, albums.year)
             RETURNING id",
            params![artist_id, title, year, now_ts()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn set_album_cover(&self, album_id: i64, cover_path: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE albums SET cover_path = ?2 WHERE id = ?1",
            params![album_id, cover_path],
        )?;
        Ok(())
    }

    pub fn upsert_song(&self, song: &SongUpsert) -> Result<i64> {
        let conn = self.lock();
        let id = conn.query_row(
            "INSERT INTO songs (album_id, artist_id, title, track_number, disc_number,
                duration_ms, sample_rate, bit_depth, channels, bitrate_kbps, format,
                file_path, file_size, file_modified, cover_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(file_path) DO UPDATE SET
                album_id = excluded.album_id,
                artist_id = excluded.artist_id,
                title = excluded.title,
                track_number = excluded.track_number,
                disc_number = excluded.disc_number,
                duration_ms = excluded.duration_ms,
                sample_rate = excluded.sample_rate,
                bit_depth = excluded.bit_depth,
                channels = excluded.channels,
                bitrate_kbps = excluded.bitrate_kbps,
                format = excluded.format,
                file_size = excluded.file_size,
                file_modified = excluded.file_modified,
                cover_path = excluded.cover_path
             RETURNING id",
            params![
                song.album_id,
                song.artist_id,
                song.title,
                song.track_number,
                song.disc_number,
                song.duration_ms,
                song.sample_rate,
                song.bit_depth,
                song.channels,
                song.bitrate_kbps,
                song.format,
                song.file_path,
                song.file_size,
                song.file_modified,
                song.cover_path,
                now_ts(),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Replace every lyrics row of a song. At most one row survives per
    /// (language, type) because later sources never overwrite earlier ones;
    /// callers pass a pre-deduplicated set.
    pub fn replace_lyrics(&self, song_id: i64, lyrics: &[NewLyrics]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM lyrics WHERE song_id = ?1", [song_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO lyrics (song_id, content, type, source, language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in lyrics {
                stmt.execute(params![
                    song_id,
                    entry.content,
                    entry.kind.as_str(),
                    entry.source.as_str(),
                    entry.language,
                    now_ts(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_lyrics(&self, song_id: i64) -> Result<Vec<Lyrics>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, song_id, content, type, source, language, created_at
             FROM lyrics WHERE song_id = ?1 ORDER BY type, language",
        )?;
        let rows = stmt.query_map([song_id], |row| {
            Ok(Lyrics {
                id: row.get(0)?,
                song_id: row.get(1)?,
                content: row.get(2)?,
                kind: LyricsKind::from_str(&row.get::<_, String>(3)?),
                source: LyricsSource::from_str(&row.get::<_, String>(4)?),
                language: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Delete-then-insert refresh of one song's full-text row.
    pub fn update_song_fts(&self, song_id: i64, title: &str, artist: &str, album: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM songs_fts WHERE song_id = ?1", [song_id])?;
        conn.execute(
            "INSERT INTO songs_fts (song_id, title, artist, album) VALUES (?1, ?2, ?3, ?4)",
            params![song_id, title, artist, album],
        )?;
        Ok(())
    }

    pub fn get_song(&self, id: i64) -> Result<Option<Song>> {
        let conn = self.lock();
        let song = conn
            .query_row(
                &format!("SELECT {SONG_COLS} FROM songs s WHERE s.id = ?1"),
                [id],
                song_from_row,
            )
            .optional()?;
        Ok(song)
    }

    pub fn get_song_details(&self, id: i64) -> Result<Option<SongDetails>> {
        let conn = self.lock();
        let song = conn
            .query_row(
                &format!(
                    "SELECT {SONG_COLS}, ar.name, al.title FROM songs s
                     JOIN artists ar ON ar.id = s.artist_id
                     JOIN albums al ON al.id = s.album_id
                     WHERE s.id = ?1"
                ),
                [id],
                song_details_from_row,
            )
            .optional()?;
        Ok(song)
    }

    pub fn get_songs_details(&self, ids: &[i64]) -> Result<Vec<SongDetails>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLS}, ar.name, al.title FROM songs s
             JOIN artists ar ON ar.id = s.artist_id
             JOIN albums al ON al.id = s.album_id
             WHERE s.id IN ({placeholders})"
        ))?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), song_details_from_row)?;
        let mut songs: Vec<SongDetails> = rows.collect::<rusqlite::Result<_>>()?;
        // Preserve the caller's id order.
        songs.sort_by_key(|s| ids.iter().position(|id| *id == s.song.id).unwrap_or(usize::MAX));
        Ok(songs)
    }

    pub fn list_songs(&self, limit: i64, offset: i64) -> Result<Vec<SongDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLS}, ar.name, al.title FROM songs s
             JOIN artists ar ON ar.id = s.artist_id
             JOIN albums al ON al.id = s.album_id
             ORDER BY ar.sort_name, al.title, s.disc_number, s.track_number, s.title
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], song_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_song_id_by_path(&self, file_path: &str) -> Result<Option<i64>> {
        let conn = self.lock();
        let id = conn
            .query_row(
                "SELECT id FROM songs WHERE file_path = ?1",
                [file_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn count_songs(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))?)
    }

    pub fn count_albums(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))?)
    }

    pub fn count_artists(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?)
    }

    pub fn get_album_details(&self, id: i64) -> Result<Option<AlbumDetails>> {
        let conn = self.lock();
        let album = conn
            .query_row(
                &format!(
                    "SELECT {ALBUM_COLS}, ar.name,
                        (SELECT COUNT(*) FROM songs s WHERE s.album_id = al.id)
                     FROM albums al JOIN artists ar ON ar.id = al.artist_id
                     WHERE al.id = ?1"
                ),
                [id],
                album_details_from_row,
            )
            .optional()?;
        Ok(album)
    }

    pub fn album_songs(&self, album_id: i64) -> Result<Vec<SongDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLS}, ar.name, al.title FROM songs s
             JOIN artists ar ON ar.id = s.artist_id
             JOIN albums al ON al.id = s.album_id
             WHERE s.album_id = ?1
             ORDER BY s.disc_number, s.track_number, s.title"
        ))?;
        let rows = stmt.query_map([album_id], song_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn list_albums(&self, limit: i64, offset: i64) -> Result<Vec<AlbumDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALBUM_COLS}, ar.name,
                (SELECT COUNT(*) FROM songs s WHERE s.album_id = al.id)
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             ORDER BY ar.sort_name, al.year, al.title
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], album_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn recently_added_albums(&self, limit: i64) -> Result<Vec<AlbumDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALBUM_COLS}, ar.name,
                (SELECT COUNT(*) FROM songs s WHERE s.album_id = al.id)
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             ORDER BY al.created_at DESC, al.id DESC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map([limit], album_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        let conn = self.lock();
        let artist = conn
            .query_row(
                "SELECT id, name, sort_name, external_id, created_at FROM artists WHERE id = ?1",
                [id],
                artist_from_row,
            )
            .optional()?;
        Ok(artist)
    }

    pub fn list_artists(&self, limit: i64, offset: i64) -> Result<Vec<Artist>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, sort_name, external_id, created_at FROM artists
             ORDER BY sort_name LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], artist_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn artist_albums(&self, artist_id: i64) -> Result<Vec<AlbumDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALBUM_COLS}, ar.name,
                (SELECT COUNT(*) FROM songs s WHERE s.album_id = al.id)
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             WHERE al.artist_id = ?1
             ORDER BY al.year, al.title"
        ))?;
        let rows = stmt.query_map([artist_id], album_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Most-played songs of an artist, falling back to track order for
    /// libraries with no listening history yet.
    pub fn artist_top_songs(&self, artist_id: i64, limit: i64) -> Result<Vec<SongDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLS}, ar.name, al.title FROM songs s
             JOIN artists ar ON ar.id = s.artist_id
             JOIN albums al ON al.id = s.album_id
             LEFT JOIN play_history ph ON ph.song_id = s.id
             WHERE s.artist_id = ?1
             GROUP BY s.id
             ORDER BY COUNT(ph.id) DESC, s.album_id, s.track_number
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![artist_id, limit], song_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Post-scan cleanup: drop songs that were not seen on disk, then albums
    /// without songs, then artists without albums, all in one transaction.
    /// Playlist positions are re-compacted because entry rows cascade away
    /// with their songs.
    pub fn reconcile_library(&self, seen_songs: &HashSet<i64>) -> Result<ReconcileCounts> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let all_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM songs")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut counts = ReconcileCounts::default();
        for id in all_ids {
            if seen_songs.contains(&id) {
                continue;
            }
            tx.execute("DELETE FROM songs WHERE id = ?1", [id])?;
            tx.execute("DELETE FROM songs_fts WHERE song_id = ?1", [id])?;
            counts.songs += 1;
        }

        counts.albums = tx.execute(
            "DELETE FROM albums WHERE NOT EXISTS
                (SELECT 1 FROM songs WHERE songs.album_id = albums.id)",
            [],
        )?;
        counts.artists = tx.execute(
            "DELETE FROM artists WHERE NOT EXISTS
                (SELECT 1 FROM albums WHERE albums.artist_id = artists.id)",
            [],
        )?;

        if counts.songs > 0 {
            compact_all_playlists(&tx)?;
        }

        tx.commit()?;
        Ok(counts)
    }

    pub fn search_songs(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<SongDetails>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SONG_COLS}, ar.name, al.title FROM songs_fts
             JOIN songs s ON s.id = songs_fts.song_id
             JOIN artists ar ON ar.id = s.artist_id
             JOIN albums al ON al.id = s.album_id
             WHERE songs_fts MATCH ?1
             ORDER BY bm25(songs_fts)
             LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![fts_quote(query), limit, offset],
            song_details_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn search_artists(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<Artist>> {
        let conn = self.lock();
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = conn.prepare(
            "SELECT id, name, sort_name, external_id, created_at FROM artists
             WHERE name LIKE ?1 ESCAPE '\\'
             ORDER BY sort_name LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(params![pattern, limit, offset], artist_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn search_albums(&self, query: &str, limit: i64, offset: i64) -> Result<Vec<AlbumDetails>> {
        let conn = self.lock();
        let pattern = format!("%{}%", escape_like(query));
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALBUM_COLS}, ar.name,
                (SELECT COUNT(*) FROM songs s WHERE s.album_id = al.id)
             FROM albums al JOIN artists ar ON ar.id = al.artist_id
             WHERE al.title LIKE ?1 ESCAPE '\\'
             ORDER BY ar.sort_name, al.title LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(params![pattern, limit, offset], album_details_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn insert_song(store: &SqliteStore, artist: &str, album: &str, title: &str, path: &str) -> i64 {
        let artist_id = store.upsert_artist(artist).unwrap();
        let album_id = store.upsert_album(album, artist_id, Some(2001)).unwrap();
        let song_id = store
            .upsert_song(&SongUpsert {
                album_id,
                artist_id,
                title: title.to_string(),
                track_number: Some(1),
                disc_number: Some(1),
                duration_ms: 200_000,
                sample_rate: 44_100,
                bit_depth: 16,
                channels: 2,
                bitrate_kbps: Some(320),
                format: "mp3".to_string(),
                file_path: path.to_string(),
                file_size: 8_000_000,
                file_modified: 1_700_000_000,
                cover_path: None,
            })
            .unwrap();
        store.update_song_fts(song_id, title, artist, album).unwrap();
        song_id
    }

    #[test]
    fn artist_upsert_is_case_insensitive() {
        let store = store();
        let a = store.upsert_artist("The Kinks").unwrap();
        let b = store.upsert_artist("the kinks").unwrap();
        assert_eq!(a, b);
        // Original casing is preserved
        assert_eq!(store.get_artist(a).unwrap().unwrap().name, "The Kinks");
    }

    #[test]
    fn album_upsert_keyed_by_title_and_artist() {
        let store = store();
        let kinks = store.upsert_artist("The Kinks").unwrap();
        let wire = store.upsert_artist("Wire").unwrap();
        let a = store.upsert_album("Arthur", kinks, Some(1969)).unwrap();
        let b = store.upsert_album("arthur", kinks, None).unwrap();
        let c = store.upsert_album("Arthur", wire, None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Year survives an upsert that carries none
        assert_eq!(store.get_album_details(a).unwrap().unwrap().album.year, Some(1969));
    }

    #[test]
    fn song_rescan_preserves_id() {
        let store = store();
        let first = insert_song(&store, "Art", "Alb", "T", "/m/a.mp3");
        let second = insert_song(&store, "Art", "Alb", "T (remaster)", "/m/a.mp3");
        assert_eq!(first, second);
        assert_eq!(store.count_songs().unwrap(), 1);
        assert_eq!(
            store.get_song(first).unwrap().unwrap().title,
            "T (remaster)"
        );
    }

    #[test]
    fn reconcile_removes_orphans() {
        let store = store();
        let keep = insert_song(&store, "Art", "Alb", "Keep", "/m/keep.mp3");
        insert_song(&store, "Gone", "GoneAlb", "Gone", "/m/gone.mp3");

        let mut seen = HashSet::new();
        seen.insert(keep);
        let counts = store.reconcile_library(&seen).unwrap();
        assert_eq!(counts, ReconcileCounts { songs: 1, albums: 1, artists: 1 });

        assert_eq!(store.count_songs().unwrap(), 1);
        assert_eq!(store.count_albums().unwrap(), 1);
        assert_eq!(store.count_artists().unwrap(), 1);

        // Unchanged rescan is a no-op
        let counts = store.reconcile_library(&seen).unwrap();
        assert_eq!(counts, ReconcileCounts::default());
    }

    #[test]
    fn fts_search_finds_songs_by_artist() {
        let store = store();
        insert_song(&store, "Radiohead", "OK Computer", "Airbag", "/m/airbag.mp3");
        insert_song(&store, "Wire", "Pink Flag", "Three Girl Rhumba", "/m/rhumba.mp3");

        let hits = store.search_songs("radiohead", 10, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].song.title, "Airbag");

        // Substring category over albums
        let albums = store.search_albums("pink", 10, 0).unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].album.title, "Pink Flag");
    }

    #[test]
    fn fts_rows_follow_deletes() {
        let store = store();
        let id = insert_song(&store, "Art", "Alb", "Target", "/m/t.mp3");
        assert_eq!(store.search_songs("target", 10, 0).unwrap().len(), 1);

        store.reconcile_library(&HashSet::new()).unwrap();
        assert_eq!(store.search_songs("target", 10, 0).unwrap().len(), 0);
        assert!(store.get_song(id).unwrap().is_none());
    }

    #[test]
    fn sort_name_strips_articles() {
        assert_eq!(sort_name("The Kinks"), "Kinks");
        assert_eq!(sort_name("A Tribe Called Quest"), "Tribe Called Quest");
        assert_eq!(sort_name("An Horse"), "Horse");
        assert_eq!(sort_name("Theatre of Tragedy"), "Theatre of Tragedy");
        assert_eq!(sort_name("Wire"), "Wire");
    }
}
