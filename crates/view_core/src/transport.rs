//! Remote context services the views refresh from.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde_json::Value;
use shared::{
    domain::SessionId,
    error::RemoteErrorEnvelope,
    lenient,
    protocol::{MethodResponse, SessionRequest, Snapshot},
};
use tracing::{debug, warn};
use url::Url;

use crate::{config::ClientSettings, error::TransportError};

/// Returns the flat key/value state of a session.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self, session_id: &SessionId) -> Result<Snapshot, TransportError>;
}

pub struct MissingSnapshotSource;

#[async_trait]
impl SnapshotSource for MissingSnapshotSource {
    async fn fetch_snapshot(&self, session_id: &SessionId) -> Result<Snapshot, TransportError> {
        Err(TransportError::Unavailable(format!(
            "no snapshot source configured for session {session_id}"
        )))
    }
}

/// Calls a whitelisted backend method at `{server_url}/api/method/{method}`
/// with `{"session_id": ...}` and reads the snapshot from `message`.
#[derive(Clone)]
pub struct MethodClient {
    http: Client,
    endpoint: Url,
    method: String,
    api_token: Option<String>,
}

impl MethodClient {
    pub fn new(
        http: Client,
        server_url: &str,
        method: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let method = method.into();
        let base = if server_url.ends_with('/') {
            Url::parse(server_url)?
        } else {
            Url::parse(&format!("{server_url}/"))?
        };
        let endpoint = base.join(&format!("api/method/{method}"))?;
        Ok(Self {
            http,
            endpoint,
            method,
            api_token: None,
        })
    }

    pub fn with_api_token(mut self, api_token: Option<String>) -> Self {
        self.api_token = api_token.filter(|token| !token.is_empty());
        self
    }

    /// Client for the form view's session-context method.
    pub fn session_context(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::from_settings(settings, &settings.context_method)
    }

    /// Client for the summary view's session-summary method.
    pub fn session_summary(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::from_settings(settings, &settings.summary_method)
    }

    fn from_settings(settings: &ClientSettings, method: &str) -> anyhow::Result<Self> {
        let http = settings.http_client()?;
        let client = Self::new(http, &settings.server_url, method).with_context(|| {
            format!(
                "failed to build endpoint for method '{method}' on '{}'",
                settings.server_url
            )
        })?;
        Ok(client.with_api_token(settings.api_token.clone()))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    fn http_error(&self, source: reqwest::Error) -> TransportError {
        TransportError::Http {
            method: self.method.clone(),
            source,
        }
    }

    fn unexpected(&self, reason: impl Into<String>) -> TransportError {
        TransportError::UnexpectedPayload {
            method: self.method.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SnapshotSource for MethodClient {
    async fn fetch_snapshot(&self, session_id: &SessionId) -> Result<Snapshot, TransportError> {
        let mut request = self.http.post(self.endpoint.clone()).json(&SessionRequest {
            session_id: session_id.clone(),
        });
        if let Some(token) = &self.api_token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request.send().await.map_err(|err| self.http_error(err))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|err| self.http_error(err))?;

        if !status.is_success() {
            let envelope = serde_json::from_slice::<RemoteErrorEnvelope>(&body).unwrap_or_default();
            let remote = envelope.into_remote_error(status.as_u16());
            warn!(method = %self.method, %session_id, status = status.as_u16(), error = %remote, "method call rejected");
            return Err(TransportError::Status {
                method: self.method.clone(),
                status: status.as_u16(),
                remote,
            });
        }

        let payload: MethodResponse = serde_json::from_slice(&body)
            .map_err(|err| self.unexpected(format!("body is not a method response: {err}")))?;

        match payload.message {
            Some(Value::Object(snapshot)) => {
                debug!(method = %self.method, %session_id, fields = snapshot.len(), "snapshot received");
                Ok(snapshot)
            }
            // A falsy message carries nothing to merge.
            Some(ref other) if !lenient::is_truthy(other) => Ok(Snapshot::new()),
            None => Ok(Snapshot::new()),
            Some(other) => {
                warn!(method = %self.method, %session_id, message = %other, "method returned a non-object message; treating it as empty");
                Ok(Snapshot::new())
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
