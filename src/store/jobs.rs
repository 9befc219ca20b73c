//! The durable job queue.
//!
//! A dequeue is one transaction that selects the oldest pending row of an
//! allowed type and flips it to processing. The connection mutex serializes
//! competing workers, so two of them can never claim the same row.

use super::models::*;
use super::{now_ts, SqliteStore};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        job_type: row.get(1)?,
        payload: row.get(2)?,
        status: JobStatus::from_str(&row.get::<_, String>(3)?),
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        created_at: row.get(6)?,
        processed_at: row.get(7)?,
    })
}

const JOB_COLS: &str = "id, type, payload, status, attempts, last_error, created_at, processed_at";

impl SqliteStore {
    pub fn enqueue_job(&self, job_type: &str, payload: &str) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (type, payload, status, created_at) VALUES (?1, ?2, 'pending', ?3)",
            params![job_type, payload, now_ts()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Claim the oldest pending job of any allowed type, or None.
    pub fn dequeue_job(&self, allowed_types: &[&str]) -> Result<Option<Job>> {
        if allowed_types.is_empty() {
            return Ok(None);
        }
        let placeholders = allowed_types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let job = tx
            .query_row(
                &format!(
                    "SELECT {JOB_COLS} FROM jobs
                     WHERE status = 'pending' AND type IN ({placeholders})
                     ORDER BY id LIMIT 1"
                ),
                rusqlite::params_from_iter(allowed_types.iter()),
                job_from_row,
            )
            .optional()?;

        let Some(mut job) = job else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE jobs SET status = 'processing', attempts = attempts + 1 WHERE id = ?1",
            [job.id],
        )?;
        tx.commit()?;

        job.status = JobStatus::Processing;
        job.attempts += 1;
        Ok(Some(job))
    }

    pub fn complete_job(&self, id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'completed', processed_at = ?2, last_error = NULL WHERE id = ?1",
            params![id, now_ts()],
        )?;
        Ok(())
    }

    pub fn fail_job(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'failed', processed_at = ?2, last_error = ?3 WHERE id = ?1",
            params![id, now_ts(), error],
        )?;
        Ok(())
    }

    /// Put a processing job back to pending when attempts remain. Returns
    /// false when the retry budget is exhausted.
    pub fn retry_job(&self, id: i64, error: &str, max_attempts: i64) -> Result<bool> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE jobs SET status = 'pending', last_error = ?2
             WHERE id = ?1 AND attempts < ?3",
            params![id, error, max_attempts],
        )?;
        Ok(changed > 0)
    }

    pub fn cleanup_completed_jobs(&self, before: i64) -> Result<usize> {
        let conn = self.lock();
        let deleted = conn.execute(
            "DELETE FROM jobs WHERE status IN ('completed', 'failed') AND processed_at < ?1",
            [before],
        )?;
        Ok(deleted)
    }

    pub fn pending_job_count(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'processing')",
            [],
            |row| row.get(0),
        )?)
    }

    pub fn get_job(&self, id: i64) -> Result<Option<Job>> {
        let conn = self.lock();
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLS} FROM jobs WHERE id = ?1"),
                [id],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeue_is_fifo_and_filters_by_type() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.enqueue_job("library_scan", "{}").unwrap();
        let b = store.enqueue_job("other", "{}").unwrap();
        let c = store.enqueue_job("library_scan", "{}").unwrap();

        let first = store.dequeue_job(&["library_scan"]).unwrap().unwrap();
        assert_eq!(first.id, a);
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.attempts, 1);

        let second = store.dequeue_job(&["library_scan"]).unwrap().unwrap();
        assert_eq!(second.id, c);
        assert!(store.dequeue_job(&["library_scan"]).unwrap().is_none());

        let other = store.dequeue_job(&["other"]).unwrap().unwrap();
        assert_eq!(other.id, b);
    }

    #[test]
    fn retry_respects_attempt_budget() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.enqueue_job("library_scan", "{}").unwrap();

        // First attempt fails, one retry remains with max_attempts = 2
        store.dequeue_job(&["library_scan"]).unwrap().unwrap();
        assert!(store.retry_job(id, "boom", 2).unwrap());

        store.dequeue_job(&["library_scan"]).unwrap().unwrap();
        assert!(!store.retry_job(id, "boom again", 2).unwrap());
        store.fail_job(id, "boom again").unwrap();

        let job = store.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn cleanup_prunes_finished_jobs() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store.enqueue_job("library_scan", "{}").unwrap();
        store.dequeue_job(&["library_scan"]).unwrap();
        store.complete_job(id).unwrap();

        assert_eq!(store.cleanup_completed_jobs(now_ts() + 1).unwrap(), 1);
        assert!(store.get_job(id).unwrap().is_none());
    }
}
