//! Error taxonomy for the sync engine

use thiserror::Error;

use crate::models::RemoteError;

/// Result alias used throughout the crate
pub type Result<T, E = CrmError> = std::result::Result<T, E>;

/// Errors surfaced by the sync engine
#[derive(Debug, Error)]
pub enum CrmError {
    /// A request was missing a required field (detected before any network call)
    #[error("invalid request: {0}")]
    Validation(String),

    /// The network call itself failed (DNS, timeout, connection reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// The CRM answered with an error status or a body we could not use
    #[error("remote error (status {status}): {error}")]
    Remote { status: u16, error: RemoteError },

    /// Token refresh failed or the stored credential failed verification
    #[error("auth error: {0}")]
    Auth(String),

    /// A bulk export entered an unrecognized state or a stage of the pipeline failed
    #[error("bulk job error: {0}")]
    Job(String),

    /// The worker threads for a request window could not be started
    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrmError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub(crate) fn job(msg: impl Into<String>) -> Self {
        Self::Job(msg.into())
    }

    /// Whether the error came from the credential layer
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_includes_status_and_code() {
        let err = CrmError::Remote {
            status: 401,
            error: RemoteError::new("INVALID_TOKEN", "invalid oauth token"),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("INVALID_TOKEN"));
    }

    #[test]
    fn test_is_auth() {
        assert!(CrmError::auth("expired").is_auth());
        assert!(!CrmError::validation("module is required").is_auth());
    }
}
