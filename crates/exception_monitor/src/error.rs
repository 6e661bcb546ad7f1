use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while configuring or driving a [`crate::Monitor`].
///
/// None of these surface on the capture path; `handle_error` never fails.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("app id must not be empty")]
    EmptyAppId,
    #[error("production mode requires an API base URL")]
    MissingApiBase,
    #[error("invalid API base URL `{url}`: {reason}")]
    InvalidApiBase { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("monitor must be started inside a tokio runtime")]
    NoRuntime,
    #[error("monitor has been shut down")]
    Stopped,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("identity lookup task failed: {0}")]
    IdentityTask(#[source] tokio::task::JoinError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures while delivering a payload to the collector.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("collector at {endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Environment profile resolution failures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ProfileError {
    #[error("native bridge rejected the device info request: {reason}")]
    BridgeRejected { reason: String },
}

/// Failures reading or persisting the session identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to access identity storage at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("identity storage key must not be empty")]
    EmptyKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_endpoint() {
        let err = TransportError::Status {
            endpoint: "http://localhost:8000/monitoring/app/exceptions".to_string(),
            status: 502,
        };
        let text = err.to_string();
        assert!(text.contains("/monitoring/app/exceptions"));
        assert!(text.contains("502"));
    }

    #[test]
    fn profile_error_carries_reason() {
        let err = ProfileError::BridgeRejected {
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "native bridge rejected the device info request: permission denied"
        );
    }
}
