//! Error types for the Tubesync client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures of a backend call
///
/// Busy signals are not errors; they arrive as regular payloads.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: connect, timeout or body read
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("backend error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// `{"ok": false}` with a message
    #[error("{0}")]
    Failure(String),

    #[error("unexpected response: {0}")]
    ParseError(String),

    /// Rejected before anything was sent
    #[error("{0}")]
    InvalidRequest(String),
}

impl ClientError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of an `ApiError`
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The backend could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::RequestFailed(e) if e.is_connect() || e.is_timeout())
    }

    /// Short message to show next to the affected view
    pub fn user_message(&self) -> String {
        match self {
            Self::RequestFailed(e) if e.is_timeout() => "The server did not answer in time.".into(),
            Self::RequestFailed(e) if e.is_connect() => "Cannot reach the server.".into(),
            Self::RequestFailed(_) => "Network request failed.".into(),
            Self::ApiError { message, .. } | Self::Failure(message) => message.clone(),
            Self::ParseError(_) => "Unexpected response from the server.".into(),
            Self::InvalidRequest(message) => message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_api_errors() {
        assert_eq!(ClientError::api_error(404, "job not found").status(), Some(404));
        assert_eq!(ClientError::Failure("nope".into()).status(), None);
        assert!(!ClientError::Failure("nope".into()).is_unreachable());
    }

    #[test]
    fn test_user_message_keeps_api_text() {
        let err = ClientError::api_error(400, "video_id is required");
        assert_eq!(err.user_message(), "video_id is required");
        assert_eq!(ClientError::Failure("topic is required".into()).user_message(), "topic is required");
    }
}
