//! Crate-wide error type and the errno -> HTTP status mapping used by the
//! REST surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OpError>;

#[derive(Error, Debug, Clone)]
pub enum OpError {
    /// A kv-shard or query-engine RPC failed to connect or timed out.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// Query submitted but the query engine never acked within the deadline.
    #[error("query engine unavailable: {0}")]
    QueryEngineUnavailable(String),

    /// Malformed filter, unknown table, bad token, bad purge input, etc.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown query id, or a TTL-expired query result.
    #[error("not found: {0}")]
    NotFound(String),

    /// A purge is already running cluster-wide.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Query engine reported progress < 0; -progress is a POSIX errno.
    /// `message`, when present, is a human-readable detail from whatever
    /// reported the failure (e.g. a producer's own `error_msg`) and takes
    /// over the client-facing error text in place of the generic errno
    /// string.
    #[error("engine failure, errno {errno}")]
    EngineFailure { errno: i32, message: Option<String> },

    /// Internal invariant violation that doesn't fit another kind.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OpError {
    /// Maps a POSIX errno (as used by the query engine's progress field and
    /// `opserver.py`'s `_ERRORS` table) to an HTTP status.
    pub fn errno_status(errno: i32) -> StatusCode {
        match errno {
            libc_errno::EBADMSG => StatusCode::BAD_REQUEST,
            libc_errno::ENOBUFS => StatusCode::FORBIDDEN,
            libc_errno::EINVAL => StatusCode::NOT_FOUND,
            libc_errno::ENOENT => StatusCode::GONE,
            libc_errno::EIO => StatusCode::INTERNAL_SERVER_ERROR,
            libc_errno::EBUSY => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OpError::NetworkUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OpError::QueryEngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OpError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OpError::NotFound(_) => StatusCode::GONE,
            OpError::Conflict(_) => StatusCode::OK, // 200 w/ status:running body
            OpError::EngineFailure { errno, .. } => Self::errno_status(*errno),
            OpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_text = match &self {
            OpError::EngineFailure { message: Some(msg), .. } => msg.clone(),
            _ => self.to_string(),
        };
        (status, axum::Json(json!({ "error": error_text }))).into_response()
    }
}

/// A tiny stand-in for the subset of POSIX errno constants the original
/// implementation routes on (`errno.EBADMSG` and friends). Kept local so the
/// crate doesn't need a libc dependency just for six integer constants.
pub mod libc_errno {
    pub const EBADMSG: i32 = 74;
    pub const ENOBUFS: i32 = 105;
    pub const EINVAL: i32 = 22;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const EBUSY: i32 = 16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_status_table_matches_spec() {
        assert_eq!(OpError::errno_status(libc_errno::EBADMSG), StatusCode::BAD_REQUEST);
        assert_eq!(OpError::errno_status(libc_errno::ENOBUFS), StatusCode::FORBIDDEN);
        assert_eq!(OpError::errno_status(libc_errno::EINVAL), StatusCode::NOT_FOUND);
        assert_eq!(OpError::errno_status(libc_errno::ENOENT), StatusCode::GONE);
        assert_eq!(OpError::errno_status(libc_errno::EIO), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(OpError::errno_status(libc_errno::EBUSY), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn engine_failure_maps_through_errno_table() {
        let err = OpError::EngineFailure { errno: libc_errno::EBUSY, message: None };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn engine_failure_message_overrides_client_facing_text() {
        let err = OpError::EngineFailure { errno: libc_errno::EIO, message: Some("disk full on node-3".to_string()) };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
