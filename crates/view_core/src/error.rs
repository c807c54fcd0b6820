use shared::error::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {method} failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned status {status}: {remote}")]
    Status {
        method: String,
        status: u16,
        remote: RemoteError,
    },
    #[error("unexpected payload from {method}: {reason}")]
    UnexpectedPayload { method: String, reason: String },
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("snapshot source unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// The decoded backend failure, when the server answered with one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Status { remote, .. } => Some(remote),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("invalid directive: {reason}")]
    InvalidDirective { reason: String },
    #[error("invalid view context: {0}")]
    InvalidContext(#[source] serde_json::Error),
    #[error("refresh failed: {0}")]
    RefreshFailed(#[from] TransportError),
}

impl ViewError {
    pub fn invalid_directive(reason: impl Into<String>) -> Self {
        Self::InvalidDirective {
            reason: reason.into(),
        }
    }
}
