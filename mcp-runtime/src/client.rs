use serde_json::Value;

use crate::config::RuntimeConfig;
use crate::error::ToolError;
use crate::query::QueryPayload;

/// Thin client for `POST {api_url}/query`. One attempt per call: no retry,
/// no caching, transport-default timeouts.
#[derive(Debug, Clone)]
pub struct PlausibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl PlausibleClient {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.query_endpoint(),
            api_key: config.api_key().to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn query(&self, payload: &QueryPayload) -> Result<Value, ToolError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|source| ToolError::Connection {
                url: self.endpoint.clone(),
                source,
            })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), site_id = %payload.site_id, "plausible query answered");

        if !status.is_success() {
            // The status is the primary signal; a body cut short must not hide it.
            let body = response.text().await.unwrap_or_else(|e| {
                tracing::debug!(error = %e, "failed to read error response body");
                String::new()
            });
            return Err(ToolError::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ToolError::Decode(format!("failed to read response body: {e}")))?;

        serde_json::from_slice(&bytes).map_err(|e| ToolError::Decode(e.to_string()))
    }
}
