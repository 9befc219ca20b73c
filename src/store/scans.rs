//! Scan status rows. One logical scan runs at a time; history is retained.

use super::models::*;
use super::{now_ts, SqliteStore};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

fn scan_from_row(row: &Row) -> rusqlite::Result<ScanStatus> {
    Ok(ScanStatus {
        id: row.get(0)?,
        status: ScanState::from_str(&row.get::<_, String>(1)?),
        progress: row.get(2)?,
        total: row.get(3)?,
        errors: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        current_file: row.get(7)?,
    })
}

const SCAN_COLS: &str = "id, status, progress, total, errors, started_at, completed_at, current_file";

impl SqliteStore {
    pub fn create_scan(&self) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO scan_status (status, progress, total, errors, started_at)
             VALUES ('running', 0, 0, 0, ?1)",
            [now_ts()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_scan_total(&self, scan_id: i64, total: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE scan_status SET total = ?2 WHERE id = ?1",
            params![scan_id, total],
        )?;
        Ok(())
    }

    pub fn update_scan_progress(
        &self,
        scan_id: i64,
        progress: i64,
        errors: i64,
        current_file: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE scan_status SET progress = ?2, errors = ?3, current_file = ?4 WHERE id = ?1",
            params![scan_id, progress, errors, current_file],
        )?;
        Ok(())
    }

    pub fn finish_scan(&self, scan_id: i64, status: ScanState, progress: i64, errors: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE scan_status SET status = ?2, progress = ?3, errors = ?4,
                completed_at = ?5, current_file = NULL
             WHERE id = ?1",
            params![scan_id, status.as_str(), progress, errors, now_ts()],
        )?;
        Ok(())
    }

    pub fn get_scan(&self, scan_id: i64) -> Result<Option<ScanStatus>> {
        let conn = self.lock();
        let scan = conn
            .query_row(
                &format!("SELECT {SCAN_COLS} FROM scan_status WHERE id = ?1"),
                [scan_id],
                scan_from_row,
            )
            .optional()?;
        Ok(scan)
    }

    pub fn latest_scan(&self) -> Result<Option<ScanStatus>> {
        let conn = self.lock();
        let scan = conn
            .query_row(
                &format!("SELECT {SCAN_COLS} FROM scan_status ORDER BY id DESC LIMIT 1"),
                [],
                scan_from_row,
            )
            .optional()?;
        Ok(scan)
    }

    /// Startup reconciliation: a row still marked running belongs to a dead
    /// process, because the in-memory running flag cannot survive a restart.
    pub fn fail_stale_scans(&self) -> Result<usize> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE scan_status SET status = 'failed', completed_at = ?1
             WHERE status = 'running'",
            [now_ts()],
        )?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.create_scan().unwrap();
        store.set_scan_total(id, 10).unwrap();
        store.update_scan_progress(id, 4, 1, Some("/m/x.mp3")).unwrap();

        let status = store.get_scan(id).unwrap().unwrap();
        assert_eq!(status.status, ScanState::Running);
        assert_eq!(status.progress, 4);
        assert_eq!(status.total, 10);
        assert_eq!(status.errors, 1);
        assert_eq!(status.current_file.as_deref(), Some("/m/x.mp3"));

        store.finish_scan(id, ScanState::Completed, 10, 1).unwrap();
        let status = store.latest_scan().unwrap().unwrap();
        assert_eq!(status.status, ScanState::Completed);
        assert!(status.completed_at.is_some());
        assert!(status.current_file.is_none());
    }

    #[test]
    fn stale_running_scans_fail_on_startup() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_scan().unwrap();
        assert_eq!(store.fail_stale_scans().unwrap(), 1);
        assert_eq!(
            store.latest_scan().unwrap().unwrap().status,
            ScanState::Failed
        );
    }
}
