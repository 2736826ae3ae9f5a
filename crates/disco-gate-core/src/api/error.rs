use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Why a session could not be renewed.
///
/// `Clone` because a single renewal outcome is handed to every navigation
/// that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("No refresh token available")]
    NoCredential,

    #[error("Renewal rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Renewal endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Renewal timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Malformed renewal response: {0}")]
    MalformedResponse(String),
}

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RenewalError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build a rejection from a non-success response. Only the status is
    /// kept; the body goes to the debug log.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        debug!(status = status.as_u16(), body = %Self::truncate_body(body), "Renewal rejected");
        RenewalError::Rejected {
            status: status.as_u16(),
        }
    }

    pub fn from_transport(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            RenewalError::TimedOut(timeout)
        } else {
            RenewalError::Unreachable(err.to_string())
        }
    }

    /// HTTP status carried by a rejection.
    pub fn status(&self) -> Option<u16> {
        match self {
            RenewalError::Rejected { status } => Some(*status),
            _ => None,
        }
    }

    /// Transport-level failures: no usable response arrived at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, RenewalError::Unreachable(_) | RenewalError::TimedOut(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_only_status() {
        let err = RenewalError::from_status(reqwest::StatusCode::FORBIDDEN, "{\"message\":\"nope\"}");
        assert_eq!(err, RenewalError::Rejected { status: 403 });
        assert_eq!(err.status(), Some(403));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_transport_classification() {
        assert!(RenewalError::Unreachable("connection refused".into()).is_transport());
        assert!(RenewalError::TimedOut(Duration::from_secs(1)).is_transport());
        assert!(!RenewalError::MalformedResponse("missing field".into()).is_transport());
        assert!(!RenewalError::NoCredential.is_transport());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(RenewalError::truncate_body("short"), "short");

        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = RenewalError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with(&format!("({} total bytes)", MAX_ERROR_BODY_LENGTH + 10)));
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_BODY_LENGTH);
        // Must not panic on a multi-byte boundary
        let truncated = RenewalError::truncate_body(&long);
        assert!(truncated.contains("truncated"));
    }
}
