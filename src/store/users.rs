//! Users, sessions, refresh tokens, per-user settings and player state.

use super::models::*;
use super::{now_ts, SqliteStore};
use anyhow::Result;
use rusqlite::{params, OptionalExtension, Row};

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        role: UserRole::from_str(&row.get::<_, String>(4)?),
        created_at: row.get(5)?,
    })
}

const USER_COLS: &str = "id, username, password_hash, email, role, created_at";

impl SqliteStore {
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        email: Option<&str>,
        role: UserRole,
    ) -> Result<User> {
        let conn = self.lock();
        let id: i64 = conn.query_row(
            "INSERT INTO users (username, password_hash, email, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
            params![username, password_hash, email, role.as_str(), now_ts()],
            |row| row.get(0),
        )?;
        drop(conn);
        Ok(self.get_user(id)?.expect("user row just inserted"))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.lock();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLS} FROM users WHERE username = ?1"),
                [username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn count_users(&self) -> Result<i64> {
        let conn = self.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )?;
        Ok(())
    }

    /// Look up a session, deleting it when already expired. Expired rows are
    /// swept lazily on lookup rather than by a dedicated task.
    pub fn get_valid_session(&self, token: &str, now: i64) -> Result<Option<Session>> {
        let conn = self.lock();
        let session = conn
            .query_row(
                "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
                [token],
                |row| {
                    Ok(Session {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()?;

        match session {
            Some(session) if session.expires_at <= now => {
                conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Delete a session and any refresh token bound to it (logout).
    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM refresh_tokens WHERE session_token = ?1",
            [token],
        )?;
        let deleted = tx.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Remove sessions whose expiry predates `now - older_than_secs`, along
    /// with refresh tokens that are past their own expiry.
    pub fn cleanup_sessions(&self, older_than_secs: i64) -> Result<usize> {
        let conn = self.lock();
        let cutoff = now_ts() - older_than_secs;
        let deleted = conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [cutoff])?;
        conn.execute(
            "DELETE FROM refresh_tokens WHERE expires_at < ?1 OR revoked = 1",
            [now_ts()],
        )?;
        Ok(deleted)
    }

    pub fn insert_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO refresh_tokens (token_hash, user_id, session_token, expires_at, revoked)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token.token_hash,
                token.user_id,
                token.session_token,
                token.expires_at,
                token.revoked,
            ],
        )?;
        Ok(())
    }

    /// One-time-use rotation: if `old_hash` identifies a live refresh token,
    /// revoke it, delete its session and install the replacement pair in one
    /// transaction. Returns the user id the rotation applied to.
    pub fn rotate_refresh_token(
        &self,
        old_hash: &str,
        new_session_token: &str,
        session_expires_at: i64,
        new_refresh_hash: &str,
        refresh_expires_at: i64,
    ) -> Result<Option<i64>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT user_id, session_token, expires_at, revoked
                 FROM refresh_tokens WHERE token_hash = ?1",
                [old_hash],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, session_token, expires_at, revoked)) = existing else {
            return Ok(None);
        };
        if revoked || expires_at <= now_ts() {
            return Ok(None);
        }

        tx.execute(
            "UPDATE refresh_tokens SET revoked = 1 WHERE token_hash = ?1",
            [old_hash],
        )?;
        tx.execute("DELETE FROM sessions WHERE token = ?1", [session_token])?;
        tx.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![new_session_token, user_id, session_expires_at],
        )?;
        tx.execute(
            "INSERT INTO refresh_tokens (token_hash, user_id, session_token, expires_at, revoked)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![new_refresh_hash, user_id, new_session_token, refresh_expires_at],
        )?;
        tx.commit()?;
        Ok(Some(user_id))
    }

    pub fn get_player_state(&self, user_id: i64) -> Result<Option<PlayerState>> {
        let conn = self.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT state FROM player_state WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    pub fn set_player_state(&self, user_id: i64, state: &PlayerState) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO player_state (user_id, state, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            params![user_id, serde_json::to_string(state)?, now_ts()],
        )?;
        Ok(())
    }

    pub fn get_user_settings(&self, user_id: i64) -> Result<UserSettings> {
        let conn = self.lock();
        let settings = conn
            .query_row(
                "SELECT shuffle, repeat FROM user_settings WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(UserSettings {
                        shuffle: row.get(0)?,
                        repeat: RepeatMode::from_str(&row.get::<_, String>(1)?),
                    })
                },
            )
            .optional()?;
        Ok(settings.unwrap_or_default())
    }

    pub fn set_user_settings(&self, user_id: i64, settings: &UserSettings) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO user_settings (user_id, shuffle, repeat) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET shuffle = excluded.shuffle, repeat = excluded.repeat",
            params![user_id, settings.shuffle, settings.repeat.as_str()],
        )?;
        Ok(())
    }
}
