//! SQLite persistence for the whole library: music entities, users and
//! sessions, playlists, favorites, play history, scan status and the job
//! queue, plus the full-text index over songs.

mod history;
mod jobs;
mod library;
pub mod models;
mod playlists;
mod scans;
pub mod schema;
mod users;

pub use history::{HistoryOverview, PatternBucket, RankedAlbum, RankedArtist, RankedSong};
pub use library::{sort_name, ReconcileCounts};
pub use models::*;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Current time as unix seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The one store behind all persistence. Methods are synchronous and guarded
/// by a connection mutex; multi-row operations run inside a single
/// transaction on that connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(path: &Path) -> Result<SqliteStore> {
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// In-memory database, used by tests.
    pub fn in_memory() -> Result<SqliteStore> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(mut conn: Connection) -> Result<SqliteStore> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::apply_migrations(&mut conn)?;

        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        let reconciled = store.fail_stale_scans()?;
        if reconciled > 0 {
            tracing::warn!(
                "Marked {} interrupted scan(s) from a previous run as failed",
                reconciled
            );
        }
        Ok(store)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}
