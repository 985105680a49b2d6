//! Unified error handling for the sync node.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use waypost_engine::RecordId;

/// Local cache failures.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Remote store adapter failures. The adapter never retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Transient: unreachable, timed out, or overloaded
    #[error("remote store unreachable: {0}")]
    Unavailable(String),

    /// The store answered and refused the request
    #[error("remote store rejected request: {0}")]
    Rejected(String),

    #[error("malformed remote response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return RemoteError::Decode(e.to_string());
        }
        match e.status() {
            Some(status) if is_rejection(status) => RemoteError::Rejected(e.to_string()),
            _ => RemoteError::Unavailable(e.to_string()),
        }
    }
}

/// Client errors other than timeouts and throttling mean the request itself
/// is wrong; repeating it will not help.
fn is_rejection(status: reqwest::StatusCode) -> bool {
    status.is_client_error()
        && status != reqwest::StatusCode::REQUEST_TIMEOUT
        && status != reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Errors surfaced by the sync orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A required field is missing or the payload cannot be decoded
    #[error("validation failed: {0}")]
    Validation(waypost_engine::Error),

    #[error("invalid record id '{id}': {reason}")]
    InvalidId { id: String, reason: &'static str },

    /// A replica attempted to write
    #[error("{operation} rejected: this node is a read-only replica")]
    RoleViolation { operation: &'static str },

    /// The local change succeeded but the remote store did not take it
    #[error("remote store unavailable for {}: {source}", .id.as_deref().unwrap_or("collection"))]
    RemoteUnavailable {
        id: Option<RecordId>,
        #[source]
        source: RemoteError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] CacheError),
}

impl SyncError {
    /// Only remote failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RemoteUnavailable { .. })
    }
}

impl From<waypost_engine::Error> for SyncError {
    fn from(e: waypost_engine::Error) -> Self {
        match e {
            waypost_engine::Error::InvalidId { id, reason } => SyncError::InvalidId { id, reason },
            other => SyncError::Validation(other),
        }
    }
}

/// Result type for orchestrator operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// HTTP-facing error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Unauthorized")]
    Unauthorized,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Sync(SyncError::Storage(e)) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                    None,
                )
            }
            AppError::Sync(e @ SyncError::RemoteUnavailable { source, .. }) => {
                tracing::warn!("Remote error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Remote store unavailable".to_string(),
                    Some(source.to_string()),
                )
            }
            AppError::Sync(e @ SyncError::RoleViolation { .. }) => {
                (StatusCode::FORBIDDEN, e.to_string(), None)
            }
            AppError::Sync(e) => (StatusCode::BAD_REQUEST, e.to_string(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_taxonomy() {
        let err: SyncError = waypost_engine::Error::InvalidId {
            id: "bad id!".into(),
            reason: "contains characters outside [A-Za-z0-9_-]",
        }
        .into();
        assert!(matches!(err, SyncError::InvalidId { .. }));

        let err: SyncError = waypost_engine::Error::MissingRequiredField("title".into()).into();
        assert_eq!(
            err.to_string(),
            "validation failed: missing required field: title"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn remote_unavailable_display() {
        let err = SyncError::RemoteUnavailable {
            id: Some("P1".into()),
            source: RemoteError::Unavailable("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "remote store unavailable for P1: remote store unreachable: connection refused"
        );
        assert!(err.is_retryable());

        let err = SyncError::RemoteUnavailable {
            id: None,
            source: RemoteError::Unavailable("timeout".into()),
        };
        assert!(err.to_string().starts_with("remote store unavailable for collection"));
    }

    #[test]
    fn role_violation_maps_to_forbidden() {
        let response = AppError::from(SyncError::RoleViolation { operation: "write" }).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn throttling_is_not_a_rejection() {
        assert!(is_rejection(reqwest::StatusCode::BAD_REQUEST));
        assert!(is_rejection(reqwest::StatusCode::FORBIDDEN));
        assert!(!is_rejection(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_rejection(reqwest::StatusCode::REQUEST_TIMEOUT));
        assert!(!is_rejection(reqwest::StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(RemoteError::Unavailable("x".into()).is_transient());
        assert!(!RemoteError::Rejected("x".into()).is_transient());
        assert!(!RemoteError::Decode("x".into()).is_transient());
    }
}
