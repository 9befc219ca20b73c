//! The API error envelope.
//!
//! Every failure surfaces as `{"error": "<message>", "code": "<UPPER_SNAKE>"}`
//! with exactly one status code per kind. Internal details are logged here
//! and never returned to the client.

use crate::auth::AuthError;
use crate::scanner::ScanError;
use crate::streaming::{HlsError, TranscodeError};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized,
    Forbidden,
    NotFound(&'static str),
    Conflict {
        code: &'static str,
        message: String,
    },
    RangeNotSatisfiable {
        size: u64,
    },
    DependencyUnavailable(String),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> ApiError {
        ApiError::Internal(err.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict { code, .. } => code,
            ApiError::RangeNotSatisfiable { .. } => "RANGE_NOT_SATISFIABLE",
            ApiError::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(message) => message.clone(),
            ApiError::Unauthorized => "authentication required".to_string(),
            ApiError::Forbidden => "insufficient permissions".to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::Conflict { message, .. } => message.clone(),
            ApiError::RangeNotSatisfiable { .. } => "requested range not satisfiable".to_string(),
            ApiError::DependencyUnavailable(what) => format!("{} is not available", what),
            // Internal details stay in the log
            ApiError::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(err) = &self {
            error!("Internal error: {:#}", err);
        }

        let status = self.status();
        let body = Json(ErrorBody {
            error: self.message(),
            code: self.code(),
        });

        match self {
            ApiError::RangeNotSatisfiable { size } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> ApiError {
        ApiError::Internal(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> ApiError {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidToken => ApiError::Unauthorized,
            AuthError::UsernameTaken => ApiError::Conflict {
                code: "USERNAME_TAKEN",
                message: "username is already taken".to_string(),
            },
            AuthError::Validation(message) => ApiError::Validation(message),
            AuthError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> ApiError {
        match err {
            ScanError::AlreadyRunning => ApiError::Conflict {
                code: "SCAN_ALREADY_RUNNING",
                message: "a scan is already running".to_string(),
            },
            ScanError::Internal(err) => ApiError::Internal(err),
        }
    }
}

impl From<TranscodeError> for ApiError {
    fn from(err: TranscodeError) -> ApiError {
        match err {
            TranscodeError::InvalidFormat(_) | TranscodeError::InvalidBitrate { .. } => {
                ApiError::Validation(err.to_string())
            }
            TranscodeError::EncoderUnavailable(binary) => {
                ApiError::DependencyUnavailable(format!("encoder '{}'", binary))
            }
            TranscodeError::Io(io) => ApiError::Internal(io.into()),
        }
    }
}

impl From<HlsError> for ApiError {
    fn from(err: HlsError) -> ApiError {
        match err {
            HlsError::SegmentOutOfRange(_) => ApiError::NotFound("segment"),
            HlsError::UnsupportedFormat(_) => ApiError::Validation(err.to_string()),
            HlsError::Transcode(inner) => inner.into(),
            HlsError::Internal(inner) => ApiError::Internal(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_kinds() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("song").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::from(ScanError::AlreadyRunning).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::RangeNotSatisfiable { size: 10 }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
    }

    #[test]
    fn scan_conflict_has_stable_code() {
        let err = ApiError::from(ScanError::AlreadyRunning);
        assert_eq!(err.code(), "SCAN_ALREADY_RUNNING");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = ApiError::Internal(anyhow::anyhow!("secret path /media/x"));
        assert_eq!(err.message(), "internal server error");
    }
}
