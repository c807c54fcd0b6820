use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    /// Maps a backend exception class name onto an error code.
    pub fn from_exc_type(exc_type: &str) -> Option<Self> {
        let code = match exc_type {
            "AuthenticationError" | "SessionExpired" | "CSRFTokenError" => Self::Unauthorized,
            "PermissionError" => Self::Forbidden,
            "DoesNotExistError" | "PageDoesNotExistError" => Self::NotFound,
            "ValidationError" | "MandatoryError" | "LinkValidationError" | "DataError" => {
                Self::Validation
            }
            "TooManyRequestsError" | "RateLimitExceededError" => Self::RateLimited,
            _ => return None,
        };
        Some(code)
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 409 | 417 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

/// A failure reported by the backend, decoded from its error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exc_type: Option<String>,
    pub message: String,
}

/// Error body returned by a failed method call.
///
/// `_server_messages` is a JSON-encoded list whose entries are themselves
/// JSON-encoded objects with a `message` key (or plain strings).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteErrorEnvelope {
    #[serde(default)]
    pub exc_type: Option<String>,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default, rename = "_server_messages")]
    pub server_messages: Option<String>,
}

impl RemoteErrorEnvelope {
    pub fn into_remote_error(self, status: u16) -> RemoteError {
        let code = self
            .exc_type
            .as_deref()
            .and_then(ErrorCode::from_exc_type)
            .unwrap_or_else(|| ErrorCode::from_status(status));

        let message = self
            .server_messages
            .as_deref()
            .and_then(decode_server_messages)
            .or_else(|| self.exception.clone())
            .or_else(|| self.exc_type.clone())
            .unwrap_or_else(|| format!("remote call failed with status {status}"));

        RemoteError {
            code,
            exc_type: self.exc_type,
            message,
        }
    }
}

fn decode_server_messages(raw: &str) -> Option<String> {
    let entries: Vec<String> = serde_json::from_str(raw).ok()?;
    let messages: Vec<String> = entries
        .into_iter()
        .map(|entry| {
            serde_json::from_str::<serde_json::Value>(&entry)
                .ok()
                .and_then(|value| {
                    value
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or(entry)
        })
        .filter(|m| !m.is_empty())
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
