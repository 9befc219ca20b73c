//! Versioned schema for the library database.
//!
//! Forward-only migrations keyed on `PRAGMA user_version`. Each version is a
//! single SQL batch applied inside one transaction; there is no downgrade
//! path.

use anyhow::{bail, Result};
use rusqlite::Connection;

pub struct SchemaVersion {
    pub version: i64,
    pub sql: &'static str,
}

const SCHEMA_V1: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    email TEXT,
    role TEXT NOT NULL DEFAULT 'user',
    created_at INTEGER NOT NULL
);

CREATE TABLE sessions (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    expires_at INTEGER NOT NULL
);
CREATE INDEX idx_sessions_user_id ON sessions(user_id);
CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);

CREATE TABLE refresh_tokens (
    token_hash TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    session_token TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_refresh_tokens_session ON refresh_tokens(session_token);

CREATE TABLE artists (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
    sort_name TEXT NOT NULL,
    external_id TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE albums (
    id INTEGER PRIMARY KEY,
    artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    title TEXT NOT NULL COLLATE NOCASE,
    year INTEGER,
    cover_path TEXT,
    external_id TEXT,
    created_at INTEGER NOT NULL,
    UNIQUE (title, artist_id)
);
CREATE INDEX idx_albums_artist_id ON albums(artist_id);

CREATE TABLE songs (
    id INTEGER PRIMARY KEY,
    album_id INTEGER NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
    artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    track_number INTEGER,
    disc_number INTEGER,
    duration_ms INTEGER NOT NULL,
    sample_rate INTEGER NOT NULL,
    bit_depth INTEGER NOT NULL,
    channels INTEGER NOT NULL,
    bitrate_kbps INTEGER,
    format TEXT NOT NULL,
    file_path TEXT NOT NULL UNIQUE,
    file_size INTEGER NOT NULL,
    file_modified INTEGER NOT NULL,
    cover_path TEXT,
    external_id TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX idx_songs_album_id ON songs(album_id);
CREATE INDEX idx_songs_artist_id ON songs(artist_id);

CREATE TABLE lyrics (
    id INTEGER PRIMARY KEY,
    song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    type TEXT NOT NULL,
    source TEXT NOT NULL,
    language TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (song_id, language, type)
);

CREATE TABLE playlists (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    public INTEGER NOT NULL DEFAULT 0,
    source_path TEXT UNIQUE,
    created_at INTEGER NOT NULL
);
CREATE INDEX idx_playlists_user_id ON playlists(user_id);

CREATE TABLE playlist_entries (
    playlist_id INTEGER NOT NULL REFERENCES playlists(id) ON DELETE CASCADE,
    song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    PRIMARY KEY (playlist_id, position)
);
CREATE INDEX idx_playlist_entries_song_id ON playlist_entries(song_id);

CREATE TABLE favorite_songs (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    song_id INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, song_id)
);

CREATE TABLE favorite_albums (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    album_id INTEGER NOT NULL REFERENCES albums(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, album_id)
);

CREATE TABLE followed_artists (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, artist_id)
);

CREATE TABLE play_history (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    song_id INTEGER NOT NULL,
    played_at INTEGER NOT NULL,
    duration_listened_sec INTEGER NOT NULL,
    completion_rate REAL NOT NULL,
    source TEXT NOT NULL DEFAULT ''
);
CREATE INDEX idx_play_history_user_played ON play_history(user_id, played_at);
CREATE INDEX idx_play_history_song_id ON play_history(song_id);

CREATE TABLE scan_status (
    id INTEGER PRIMARY KEY,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    total INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    current_file TEXT
);

CREATE TABLE jobs (
    id INTEGER PRIMARY KEY,
    type TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at INTEGER NOT NULL,
    processed_at INTEGER
);
CREATE INDEX idx_jobs_status_type ON jobs(status, type);

CREATE TABLE player_state (
    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    state TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE user_settings (
    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    shuffle INTEGER NOT NULL DEFAULT 0,
    repeat TEXT NOT NULL DEFAULT 'off'
);

CREATE VIRTUAL TABLE songs_fts USING fts5(
    song_id UNINDEXED,
    title,
    artist,
    album,
    tokenize='trigram'
);
"#;

pub const SCHEMA_VERSIONS: &[SchemaVersion] = &[SchemaVersion {
    version: 1,
    sql: SCHEMA_V1,
}];

pub fn current_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Apply every migration newer than the database's `user_version`.
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let mut version = current_version(conn)?;
    let latest = SCHEMA_VERSIONS.last().map(|s| s.version).unwrap_or(0);
    if version > latest {
        bail!(
            "Database schema version {} is newer than supported version {}",
            version,
            latest
        );
    }

    for schema in SCHEMA_VERSIONS {
        if schema.version <= version {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(schema.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {}", schema.version))?;
        tx.commit()?;
        tracing::info!("Applied schema version {}", schema.version);
        version = schema.version;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_to_empty_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);

        // All core tables present
        for table in [
            "users",
            "sessions",
            "refresh_tokens",
            "artists",
            "albums",
            "songs",
            "lyrics",
            "playlists",
            "playlist_entries",
            "favorite_songs",
            "favorite_albums",
            "followed_artists",
            "play_history",
            "scan_status",
            "jobs",
            "player_state",
            "user_settings",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        apply_migrations(&mut conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);
    }
}
