use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;

use crate::source::SourceError;
use crate::sync::guard::GuardError;
use crate::sync::SyncError;

/// Error returned by every handler and by the services behind them.
///
/// Each variant maps to one HTTP status and a stable `code` string in the JSON body.
#[derive(Debug)]
pub enum AppError {
    /// Logged with an error id; the client only sees the id.
    Internal(anyhow::Error),
    BadRequest(String),
    /// Unknown account, path or file id, or a node that is hidden or tombstoned.
    NotFound(String),
    /// A sync or session refresh for the account is already running.
    Conflict(String),
    ServiceUnavailable(String),
    Database(String),
    /// Well-formed request aimed at the wrong kind of node, e.g. downloading a folder.
    InvalidInput(String),
    /// The drive backend failed or has no registered connector.
    RemoteUnavailable(String),
    /// The drive backend rejected the stored session; a refresh has been scheduled.
    SessionExpired(String),
    /// Missing admin token or wrong folder password.
    Unauthorized(String),
    /// Request came from a referrer outside `index.only_referrer`.
    Forbidden(String),
    RateLimited { retry_after_seconds: u64 },
    ValidationError { field: String, message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::RemoteUnavailable(msg) => write!(f, "Remote unavailable: {}", msg),
            AppError::SessionExpired(msg) => write!(f, "Session expired: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::RateLimited { retry_after_seconds } => {
                write!(f, "Rate limited. Retry after {} seconds", retry_after_seconds)
            }
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message, details) = match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                let error_id = uuid::Uuid::new_v4();
                tracing::error!("Error ID: {}", error_id);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg, None)
            }
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    None,
                )
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            AppError::RemoteUnavailable(msg) => {
                tracing::warn!("Remote unavailable: {}", msg);
                (StatusCode::BAD_GATEWAY, "REMOTE_UNAVAILABLE", msg, None)
            }
            AppError::SessionExpired(msg) => {
                tracing::warn!("Session expired: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "SESSION_EXPIRED", msg, None)
            }
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            AppError::RateLimited { retry_after_seconds } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests. Please retry after {} seconds", retry_after_seconds),
                Some(json!({ "retry_after_seconds": retry_after_seconds })),
            ),
            AppError::ValidationError { field, message } => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": error_message,
            },
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

/// Local file errors surface while serving native accounts. A missing file is a 404,
/// anything else is internal.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AppError::NotFound("File not found".to_string()),
            _ => AppError::Internal(anyhow::Error::new(err).context("local file access failed")),
        }
    }
}

impl From<SourceError> for AppError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => AppError::RemoteUnavailable(msg),
            SourceError::SessionExpired(msg) => AppError::SessionExpired(msg),
            SourceError::NotFound(msg) => AppError::NotFound(format!("Remote item not found: {}", msg)),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::RemoteUnavailable(msg) => AppError::RemoteUnavailable(msg),
            SyncError::SessionExpired(msg) => AppError::SessionExpired(msg),
            SyncError::PathNotFound(path) => AppError::NotFound(format!("Path {} not found", path)),
            SyncError::NotAFolder(path) => AppError::InvalidInput(format!("{} is not a folder", path)),
            SyncError::Cancelled => AppError::ServiceUnavailable("Sync cancelled by shutdown".to_string()),
            SyncError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        AppError::Conflict(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Turns a missing cache row into `AppError::NotFound("<entity> not found")`.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}
