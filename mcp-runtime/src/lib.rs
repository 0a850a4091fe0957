use std::sync::Arc;

use clap::{Args, Subcommand};
use serde_json::{Value, json};
use tokio::io::{self, BufReader};

pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod server;
pub mod transport;

pub use client::PlausibleClient;
pub use config::{API_KEY_ENV, API_URL_ENV, DEFAULT_API_URL, RuntimeConfig};
pub use error::{ConfigError, ServeError, ToolError};
pub use server::McpServer;

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the Plausible MCP server over stdio
    Serve(McpServeArgs),
    /// Print the advertised tool list (name, description, input schema) and exit
    Tools,
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    /// Plausible Stats API base URL (the query endpoint is `{api_url}/query`)
    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL)]
    pub api_url: String,
    /// Plausible Stats API key, sent as a bearer token
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,
}

pub async fn run(command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let config = match RuntimeConfig::new(&args.api_url, args.api_key) {
                Ok(config) => config,
                Err(err) => return fatal(err.code(), &err),
            };
            let server = Arc::new(McpServer::new(&config));
            tracing::info!(
                endpoint = server.endpoint(),
                version = env!("CARGO_PKG_VERSION"),
                "Plausible MCP server running on stdio"
            );
            match transport::serve(server, BufReader::new(io::stdin()), io::stdout()).await {
                Ok(()) => {
                    tracing::info!("stdin closed, shutting down");
                    0
                }
                Err(err) => fatal("mcp_server_error", &err),
            }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&server::tools_list_payload()));
            0
        }
    }
}

fn fatal(code: &str, err: &dyn std::error::Error) -> i32 {
    tracing::error!(code, error = %err, "fatal error");
    let payload = json!({
        "error": code,
        "message": err.to_string(),
    });
    eprintln!("{}", to_pretty_json(&payload));
    1
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
