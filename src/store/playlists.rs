//! Playlists and favorites.
//!
//! Entry positions are kept dense (1..N) after every mutation; every
//! multi-row change runs in one transaction.

use super::library::compact_playlist_positions;
use super::models::*;
use super::{now_ts, SqliteStore};
use anyhow::{bail, Result};
use rusqlite::{params, OptionalExtension, Row};

fn playlist_from_row(row: &Row) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        public: row.get(4)?,
        source_path: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const PLAYLIST_COLS: &str = "id, user_id, name, description, public, source_path, created_at";

impl SqliteStore {
    pub fn create_playlist(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> Result<Playlist> {
        let conn = self.lock();
        let playlist = conn.query_row(
            &format!(
                "INSERT INTO playlists (user_id, name, description, public, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {PLAYLIST_COLS}"
            ),
            params![user_id, name, description, public, now_ts()],
            playlist_from_row,
        )?;
        Ok(playlist)
    }

    pub fn get_playlist(&self, id: i64) -> Result<Option<Playlist>> {
        let conn = self.lock();
        let playlist = conn
            .query_row(
                &format!("SELECT {PLAYLIST_COLS} FROM playlists WHERE id = ?1"),
                [id],
                playlist_from_row,
            )
            .optional()?;
        Ok(playlist)
    }

    pub fn list_playlists(&self, user_id: i64) -> Result<Vec<Playlist>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAYLIST_COLS} FROM playlists
             WHERE user_id = ?1 OR public = 1
             ORDER BY name"
        ))?;
        let rows = stmt.query_map([user_id], playlist_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn update_playlist(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
        public: Option<bool>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE playlists SET
                name = COALESCE(?2, name),
                description = COALESCE(?3, description),
                public = COALESCE(?4, public)
             WHERE id = ?1",
            params![id, name, description, public],
        )?;
        Ok(())
    }

    pub fn delete_playlist(&self, id: i64) -> Result<bool> {
        let conn = self.lock();
        let deleted = conn.execute("DELETE FROM playlists WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    /// Append songs at the end of a playlist. Unknown song ids are rejected
    /// up front so a partial append never commits.
    pub fn add_playlist_songs(&self, playlist_id: i64, song_ids: &[i64]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for song_id in song_ids {
            let exists: Option<i64> = tx
                .query_row("SELECT id FROM songs WHERE id = ?1", [song_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                bail!("song {} does not exist", song_id);
            }
        }
        let mut next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM playlist_entries WHERE playlist_id = ?1",
            [playlist_id],
            |row| row.get(0),
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO playlist_entries (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for song_id in song_ids {
                insert.execute(params![playlist_id, song_id, next])?;
                next += 1;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove every entry referencing the given songs, then close the gaps.
    pub fn remove_playlist_songs(&self, playlist_id: i64, song_ids: &[i64]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut delete = tx.prepare(
                "DELETE FROM playlist_entries WHERE playlist_id = ?1 AND song_id = ?2",
            )?;
            for song_id in song_ids {
                delete.execute(params![playlist_id, song_id])?;
            }
        }
        compact_playlist_positions(&tx, playlist_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the playlist's order with the given song sequence. The new
    /// order must be a permutation of the current entries.
    pub fn reorder_playlist(&self, playlist_id: i64, song_ids: &[i64]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let current: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT song_id FROM playlist_entries WHERE playlist_id = ?1 ORDER BY position",
            )?;
            let rows = stmt.query_map([playlist_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let mut sorted_current = current.clone();
        sorted_current.sort_unstable();
        let mut sorted_new = song_ids.to_vec();
        sorted_new.sort_unstable();
        if sorted_current != sorted_new {
            bail!("reorder must contain exactly the playlist's current songs");
        }

        tx.execute(
            "DELETE FROM playlist_entries WHERE playlist_id = ?1",
            [playlist_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO playlist_entries (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (index, song_id) in song_ids.iter().enumerate() {
                insert.execute(params![playlist_id, song_id, index as i64 + 1])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn playlist_songs(&self, playlist_id: i64) -> Result<Vec<SongDetails>> {
        let ordered_ids: Vec<i64> = {
            let conn = self.lock();
            let mut stmt = conn.prepare(
                "SELECT song_id FROM playlist_entries WHERE playlist_id = ?1 ORDER BY position",
            )?;
            let rows = stmt.query_map([playlist_id], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        self.get_songs_details(&ordered_ids)
    }

    /// Create or replace a filesystem-imported playlist keyed by its source
    /// file path. Entries are set to the file's track order.
    pub fn upsert_imported_playlist(
        &self,
        owner_id: i64,
        name: &str,
        source_path: &str,
        song_ids: &[i64],
    ) -> Result<i64> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let playlist_id: i64 = tx.query_row(
            "INSERT INTO playlists (user_id, name, description, public, source_path, created_at)
             VALUES (?1, ?2, NULL, 0, ?3, ?4)
             ON CONFLICT(source_path) DO UPDATE SET name = excluded.name
             RETURNING id",
            params![owner_id, name, source_path, now_ts()],
            |row| row.get(0),
        )?;
        tx.execute(
            "DELETE FROM playlist_entries WHERE playlist_id = ?1",
            [playlist_id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO playlist_entries (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (index, song_id) in song_ids.iter().enumerate() {
                insert.execute(params![playlist_id, song_id, index as i64 + 1])?;
            }
        }
        tx.commit()?;
        Ok(playlist_id)
    }

    // -- favorites -----------------------------------------------------------

    pub fn add_favorite_song(&self, user_id: i64, song_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO favorite_songs (user_id, song_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, song_id, now_ts()],
        )?;
        Ok(())
    }

    pub fn remove_favorite_song(&self, user_id: i64, song_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM favorite_songs WHERE user_id = ?1 AND song_id = ?2",
            params![user_id, song_id],
        )?;
        Ok(())
    }

    pub fn add_favorite_album(&self, user_id: i64, album_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO favorite_albums (user_id, album_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, album_id, now_ts()],
        )?;
        Ok(())
    }

    pub fn remove_favorite_album(&self, user_id: i64, album_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM favorite_albums WHERE user_id = ?1 AND album_id = ?2",
            params![user_id, album_id],
        )?;
        Ok(())
    }

    pub fn follow_artist(&self, user_id: i64, artist_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO followed_artists (user_id, artist_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, artist_id, now_ts()],
        )?;
        Ok(())
    }

    pub fn unfollow_artist(&self, user_id: i64, artist_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM followed_artists WHERE user_id = ?1 AND artist_id = ?2",
            params![user_id, artist_id],
        )?;
        Ok(())
    }

    pub fn favorite_song_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT song_id FROM favorite_songs WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn favorite_album_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT album_id FROM favorite_albums WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn followed_artist_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT artist_id FROM followed_artists WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{SongUpsert, UserRole};

    fn store_with_songs(count: i64) -> (SqliteStore, i64, Vec<i64>) {
        let store = SqliteStore::in_memory().unwrap();
        let user = store
            .create_user("owner", "$hash", None, UserRole::User)
            .unwrap();
        let artist_id = store.upsert_artist("Art").unwrap();
        let album_id = store.upsert_album("Alb", artist_id, None).unwrap();
        let mut song_ids = Vec::new();
        for n in 0..count {
            let id = store
                .upsert_song(&SongUpsert {
                    album_id,
                    artist_id,
                    title: format!("Track {n}"),
                    track_number: Some(n + 1),
                    disc_number: None,
                    duration_ms: 180_000,
                    sample_rate: 44_100,
                    bit_depth: 16,
                    channels: 2,
                    bitrate_kbps: Some(192),
                    format: "mp3".to_string(),
                    file_path: format!("/m/{n}.mp3"),
                    file_size: 1,
                    file_modified: 0,
                    cover_path: None,
                })
                .unwrap();
            song_ids.push(id);
        }
        (store, user.id, song_ids)
    }

    fn positions(store: &SqliteStore, playlist_id: i64) -> Vec<(i64, i64)> {
        let conn = store.lock();
        let mut stmt = conn
            .prepare(
                "SELECT position, song_id FROM playlist_entries WHERE playlist_id = ?1 ORDER BY position",
            )
            .unwrap();
        let rows = stmt
            .query_map([playlist_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        rows.collect::<rusqlite::Result<_>>().unwrap()
    }

    #[test]
    fn add_reorder_remove_keeps_positions_dense() {
        let (store, user_id, ids) = store_with_songs(5);
        let playlist = store.create_playlist(user_id, "P", None, false).unwrap();

        store.add_playlist_songs(playlist.id, &ids).unwrap();

        // Reorder to [3,1,2,5,4] (1-based over the seeded ids)
        let order = vec![ids[2], ids[0], ids[1], ids[4], ids[3]];
        store.reorder_playlist(playlist.id, &order).unwrap();

        store.remove_playlist_songs(playlist.id, &[ids[0]]).unwrap();

        let entries = positions(&store, playlist.id);
        let pos: Vec<i64> = entries.iter().map(|(p, _)| *p).collect();
        let songs: Vec<i64> = entries.iter().map(|(_, s)| *s).collect();
        assert_eq!(pos, vec![1, 2, 3, 4]);
        assert_eq!(songs, vec![ids[2], ids[1], ids[4], ids[3]]);
    }

    #[test]
    fn reorder_rejects_foreign_ids() {
        let (store, user_id, ids) = store_with_songs(3);
        let playlist = store.create_playlist(user_id, "P", None, false).unwrap();
        store.add_playlist_songs(playlist.id, &ids).unwrap();

        let bogus = vec![ids[0], ids[1], 9999];
        assert!(store.reorder_playlist(playlist.id, &bogus).is_err());
        // Unchanged on failure
        assert_eq!(positions(&store, playlist.id).len(), 3);
    }

    #[test]
    fn add_rejects_unknown_songs_atomically() {
        let (store, user_id, ids) = store_with_songs(2);
        let playlist = store.create_playlist(user_id, "P", None, false).unwrap();
        assert!(store
            .add_playlist_songs(playlist.id, &[ids[0], 12345])
            .is_err());
        assert!(positions(&store, playlist.id).is_empty());
    }

    #[test]
    fn imported_playlist_replaces_by_source_path() {
        let (store, user_id, ids) = store_with_songs(3);
        let first = store
            .upsert_imported_playlist(user_id, "road", "/m/road.m3u", &[ids[0], ids[1]])
            .unwrap();
        let second = store
            .upsert_imported_playlist(user_id, "road trip", "/m/road.m3u", &[ids[2]])
            .unwrap();
        assert_eq!(first, second);

        let songs = store.playlist_songs(first).unwrap();
        assert_eq!(songs.len(), 1);
        assert_eq!(songs[0].song.id, ids[2]);
        assert_eq!(store.get_playlist(first).unwrap().unwrap().name, "road trip");
    }

    #[test]
    fn favorites_are_idempotent() {
        let (store, user_id, ids) = store_with_songs(1);
        store.add_favorite_song(user_id, ids[0]).unwrap();
        store.add_favorite_song(user_id, ids[0]).unwrap();
        assert_eq!(store.favorite_song_ids(user_id).unwrap(), vec![ids[0]]);
        store.remove_favorite_song(user_id, ids[0]).unwrap();
        assert!(store.favorite_song_ids(user_id).unwrap().is_empty());
    }
}
