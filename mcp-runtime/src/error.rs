use reqwest::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

/// Failure of a single tool call. Always reported in-band as `{"error": message}`;
/// never tears down the server.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Validation(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Failed to reach Plausible API at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Plausible API error: {} {}: {body}", .status.as_u16(), .status.canonical_reason().unwrap_or("Unknown Status"))]
    Status { status: StatusCode, body: String },

    #[error("Failed to decode Plausible API response: {0}")]
    Decode(String),
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Machine-readable code, used for logging only.
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::Validation(_) => "validation_failed",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Connection { .. } => "connection_error",
            ToolError::Status { .. } => "api_error",
            ToolError::Decode(_) => "response_error",
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Startup misconfiguration. Fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PLAUSIBLE_API_KEY is not set (pass --api-key or export PLAUSIBLE_API_KEY)")]
    MissingApiKey,

    #[error("invalid Plausible API URL '{url}': {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::MissingApiKey => "config_missing_api_key",
            ConfigError::InvalidApiUrl { .. } => "config_invalid_api_url",
        }
    }
}

/// Transport failure that ends the stdio loop.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to read MCP message: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write MCP response: {0}")]
    Write(#[source] std::io::Error),

    #[error("MCP worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// JSON-RPC protocol fault, reported through the `error` member of a response.
#[derive(Debug)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}
