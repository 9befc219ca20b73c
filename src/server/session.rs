//! Bearer-token session extraction.

use super::error::ApiError;
use super::state::ServerState;
use crate::store::UserRole;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

/// Identity of the authenticated caller, extracted from the Authorization
/// header. Handlers take this as an argument to require authentication.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub role: UserRole,
    pub token: String,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let authed = state.auth.authenticate(token)?;
        Ok(Session {
            user_id: authed.user_id,
            role: authed.role,
            token: authed.session_token,
        })
    }
}

impl FromRequestParts<ServerState> for Option<Session> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            None => Ok(None),
            Some(token) => match state.auth.authenticate(token) {
                Ok(authed) => Ok(Some(Session {
                    user_id: authed.user_id,
                    role: authed.role,
                    token: authed.session_token,
                })),
                Err(_) => Ok(None),
            },
        }
    }
}
