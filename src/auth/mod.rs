//! Accounts, sessions and token issuance.
//!
//! Access tokens are short-lived signed JWTs whose `sid` claim must also
//! resolve to a live server-side session row. Refresh tokens are opaque
//! random strings stored only as SHA-256 hashes and rotated on every use.

pub mod hasher;

use crate::store::{RefreshToken, Session, SqliteStore, User, UserRole};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,
    sid: String,
    role: String,
    iat: i64,
    exp: i64,
}

/// The result of a successful login or refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: i64,
    pub role: UserRole,
    pub session_token: String,
}

fn random_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.len() < 3 || username.len() > 64 {
        return Err(AuthError::Validation(
            "username must be 3-64 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AuthError::Validation(
            "username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

pub struct AuthService {
    store: Arc<SqliteStore>,
    secret: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl AuthService {
    pub fn new(store: Arc<SqliteStore>, secret: String, access_ttl_secs: u64, refresh_ttl_secs: u64) -> AuthService {
        AuthService {
            store,
            secret,
            access_ttl_secs: access_ttl_secs as i64,
            refresh_ttl_secs: refresh_ttl_secs as i64,
        }
    }

    /// Create the initial admin account on an empty user table. A missing
    /// admin password leaves the instance registration-only.
    pub fn bootstrap_admin(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if self.store.count_users().map_err(AuthError::Internal)? > 0 {
            return Ok(());
        }
        if password.is_empty() {
            tracing::warn!("No initial admin password configured; skipping admin bootstrap");
            return Ok(());
        }
        let password_hash = hasher::hash_password(password)?;
        let user = self
            .store
            .create_user(username, &password_hash, None, UserRole::Admin)
            .map_err(AuthError::Internal)?;
        tracing::info!("Created initial admin user '{}' (id {})", user.username, user.id);
        Ok(())
    }

    pub fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<User, AuthError> {
        validate_username(username)?;
        validate_password(password)?;
        if self
            .store
            .get_user_by_username(username)
            .map_err(AuthError::Internal)?
            .is_some()
        {
            return Err(AuthError::UsernameTaken);
        }
        let password_hash = hasher::hash_password(password)?;
        let user = self
            .store
            .create_user(username, &password_hash, email, UserRole::User)
            .map_err(AuthError::Internal)?;
        Ok(user)
    }

    pub fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .store
            .get_user_by_username(username)
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidCredentials)?;
        if !hasher::verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        self.issue_pair(user)
    }

    fn issue_pair(&self, user: User) -> Result<TokenPair, AuthError> {
        let now = crate::store::now_ts();
        let session = Session {
            token: random_token(),
            user_id: user.id,
            expires_at: now + self.access_ttl_secs,
        };
        self.store
            .insert_session(&session)
            .map_err(AuthError::Internal)?;

        let refresh_raw = random_token();
        self.store
            .insert_refresh_token(&RefreshToken {
                token_hash: sha256_hex(&refresh_raw),
                user_id: user.id,
                session_token: session.token.clone(),
                expires_at: now + self.refresh_ttl_secs,
                revoked: false,
            })
            .map_err(AuthError::Internal)?;

        let access_token = self.encode_access_token(&user, &session.token, now)?;
        Ok(TokenPair {
            user,
            access_token,
            refresh_token: refresh_raw,
        })
    }

    fn encode_access_token(&self, user: &User, session_token: &str, now: i64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.id,
            sid: session_token.to_string(),
            role: user.role.as_str().to_string(),
            iat: now,
            exp: now + self.access_ttl_secs,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|err| AuthError::Internal(err.into()))
    }

    /// Validate a bearer access token: signature, expiry, and a live session
    /// row matching the `sid` claim.
    pub fn authenticate(&self, token: &str) -> Result<AuthedUser, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|_| AuthError::InvalidToken)?;
        let claims = decoded.claims;

        let session = self
            .store
            .get_valid_session(&claims.sid, crate::store::now_ts())
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidToken)?;
        if session.user_id != claims.sub {
            return Err(AuthError::InvalidToken);
        }

        Ok(AuthedUser {
            user_id: claims.sub,
            role: UserRole::from_str(&claims.role),
            session_token: claims.sid,
        })
    }

    /// Rotate a refresh token: the old token and its session die, a fresh
    /// pair is issued. Reuse of a consumed token is rejected.
    pub fn refresh(&self, raw_refresh: &str) -> Result<TokenPair, AuthError> {
        let now = crate::store::now_ts();
        let old_hash = sha256_hex(raw_refresh);

        let new_session_token = random_token();
        let new_refresh_raw = random_token();
        let user_id = self
            .store
            .rotate_refresh_token(
                &old_hash,
                &new_session_token,
                now + self.access_ttl_secs,
                &sha256_hex(&new_refresh_raw),
                now + self.refresh_ttl_secs,
            )
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidToken)?;

        let user = self
            .store
            .get_user(user_id)
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidToken)?;
        let access_token = self.encode_access_token(&user, &new_session_token, now)?;
        Ok(TokenPair {
            user,
            access_token,
            refresh_token: new_refresh_raw,
        })
    }

    pub fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.store
            .delete_session(session_token)
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    pub fn cleanup_sessions(&self, older_than_secs: i64) -> Result<usize, AuthError> {
        self.store
            .cleanup_sessions(older_than_secs)
            .map_err(AuthError::Internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        AuthService::new(store, "a-test-secret-at-least-16".to_string(), 900, 86_400)
    }

    #[test]
    fn register_login_authenticate() {
        let auth = service();
        let user = auth.register("alice", "password1", None).unwrap();
        assert_eq!(user.role, UserRole::User);

        let pair = auth.login("alice", "password1").unwrap();
        let authed = auth.authenticate(&pair.access_token).unwrap();
        assert_eq!(authed.user_id, user.id);
        assert_eq!(authed.role, UserRole::User);
    }

    #[test]
    fn login_with_wrong_password_fails() {
        let auth = service();
        auth.register("alice", "password1", None).unwrap();
        assert!(matches!(
            auth.login("alice", "wrong-password"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody", "password1"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn register_validates_input() {
        let auth = service();
        assert!(matches!(
            auth.register("al", "password1", None),
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            auth.register("alice", "short", None),
            Err(AuthError::Validation(_))
        ));
        auth.register("alice", "password1", None).unwrap();
        assert!(matches!(
            auth.register("ALICE", "password1", None),
            Err(AuthError::UsernameTaken)
        ));
    }

    #[test]
    fn refresh_rotates_and_invalidates_old_pair() {
        let auth = service();
        auth.register("alice", "password1", None).unwrap();
        let first = auth.login("alice", "password1").unwrap();

        let second = auth.refresh(&first.refresh_token).unwrap();
        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);

        // The consumed refresh token is single-use
        assert!(matches!(
            auth.refresh(&first.refresh_token),
            Err(AuthError::InvalidToken)
        ));
        // The old access token's session is gone
        assert!(matches!(
            auth.authenticate(&first.access_token),
            Err(AuthError::InvalidToken)
        ));
        // The new pair works
        auth.authenticate(&second.access_token).unwrap();
    }

    #[test]
    fn logout_kills_the_session() {
        let auth = service();
        auth.register("alice", "password1", None).unwrap();
        let pair = auth.login("alice", "password1").unwrap();
        let authed = auth.authenticate(&pair.access_token).unwrap();

        auth.logout(&authed.session_token).unwrap();
        assert!(matches!(
            auth.authenticate(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn bootstrap_admin_only_on_empty_store() {
        let auth = service();
        auth.bootstrap_admin("admin", "adminpass1").unwrap();
        let pair = auth.login("admin", "adminpass1").unwrap();
        assert_eq!(pair.user.role, UserRole::Admin);

        // A second bootstrap is a no-op
        auth.bootstrap_admin("admin2", "adminpass2").unwrap();
        assert!(matches!(
            auth.login("admin2", "adminpass2"),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let auth = service();
        assert!(matches!(
            auth.authenticate("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            auth.refresh("never-issued"),
            Err(AuthError::InvalidToken)
        ));
    }
}
