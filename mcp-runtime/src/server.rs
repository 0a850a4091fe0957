use serde_json::{Map, Value, json};

use crate::client::PlausibleClient;
use crate::config::RuntimeConfig;
use crate::error::{RpcError, ToolError};
use crate::query::{DateInput, QUERY_TOOL_NAME, QueryArgs, tool_definitions};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "plausible-mcp";

/// Stateless dispatcher. Shared across concurrently running calls; the only
/// state it holds is the read-only client configuration.
pub struct McpServer {
    client: PlausibleClient,
}

impl McpServer {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            client: PlausibleClient::new(config),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            // Notifications are never answered, even malformed ones.
            let id = obj.get("id").cloned()?;
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        // Responses to server-initiated requests; this server never sends any.
        let method = obj.get("method").and_then(Value::as_str)?;

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                tracing::trace!(method, "notification ignored");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let result = self.execute_tool(name, params.get("arguments")).await;
        Ok(match result {
            Ok(response) => {
                tracing::info!(tool = name, "tool call succeeded");
                build_tool_call_response(&response, false)
            }
            Err(err) => {
                tracing::warn!(tool = name, code = err.code(), error = %err, "tool call failed");
                build_tool_call_response(&err.to_value(), true)
            }
        })
    }

    async fn execute_tool(&self, name: &str, arguments: Option<&Value>) -> Result<Value, ToolError> {
        match name {
            QUERY_TOOL_NAME => {
                let args = match arguments {
                    Some(Value::Object(map)) => map,
                    Some(Value::Null) | None => {
                        return Err(ToolError::validation("Arguments are required"));
                    }
                    Some(_) => return Err(ToolError::validation("Arguments must be an object")),
                };
                self.tool_query(args).await
            }
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    async fn tool_query(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let args = QueryArgs::from_arguments(args)?;
        if let DateInput::Range {
            ignored_date: Some(date),
            ..
        } = &args.date
        {
            tracing::debug!(date = %date, "date ignored in favour of date_range");
        }
        let payload = args.into_payload();
        self.client.query(&payload).await
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Use plausible_query to read aggregate or grouped stats for a site. site_id and metrics are required, plus either date_range or a single date. Responses are the raw Plausible Stats API JSON; errors come back as {\"error\": message}."
    })
}

pub fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .iter()
        .map(|tool| tool.to_value())
        .collect();
    json!({ "tools": tools })
}

fn build_tool_call_response(body: &Value, is_error: bool) -> Value {
    let text = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }]
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }]
        })
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_for(base_url: &str) -> McpServer {
        let config = RuntimeConfig::new(base_url, Some("test-key".to_string()))
            .expect("test config must be valid");
        McpServer::new(&config)
    }

    fn offline_server() -> McpServer {
        server_for("http://127.0.0.1:9/api/v2")
    }

    fn call(name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
    }

    async fn single(server: &McpServer, message: Value) -> Value {
        let mut responses = server.handle_incoming_message(message).await;
        assert_eq!(responses.len(), 1, "expected exactly one response");
        responses.remove(0)
    }

    fn text_of(response: &Value) -> Value {
        let text = response["result"]["content"][0]["text"]
            .as_str()
            .expect("tool result must carry a text block");
        serde_json::from_str(text).expect("text block must be JSON")
    }

    #[tokio::test]
    async fn tools_list_returns_the_query_tool() {
        let server = offline_server();
        let response = single(
            &server,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        )
        .await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], QUERY_TOOL_NAME);
        assert!(tools[0]["inputSchema"]["definitions"]["filterExpression"].is_object());
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server_info() {
        let server = offline_server();
        let response = single(
            &server,
            json!({ "jsonrpc": "2.0", "id": "init", "method": "initialize", "params": {} }),
        )
        .await;
        assert_eq!(response["id"], "init");
        assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], MCP_SERVER_NAME);
        assert_eq!(response["result"]["capabilities"]["tools"]["listChanged"], false);
    }

    #[tokio::test]
    async fn query_round_trip_relays_remote_body_verbatim() {
        let mock = MockServer::start().await;
        // Keys deliberately out of alphabetical order.
        let remote = r#"{"results":[{"metrics":[1234,5678],"dimensions":[]}],"meta":{},"query":{"site_id":"example.com"}}"#;
        Mock::given(method("POST"))
            .and(path("/api/v2/query"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(json!({
                "site_id": "example.com",
                "metrics": ["visitors", "pageviews"],
                "date_range": ["2024-07-01", "2024-07-01"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(remote, "application/json"))
            .expect(1)
            .mount(&mock)
            .await;

        let server = server_for(&format!("{}/api/v2", mock.uri()));
        let response = single(
            &server,
            call(
                QUERY_TOOL_NAME,
                json!({
                    "site_id": "example.com",
                    "metrics": ["visitors", "pageviews"],
                    "date": "2024-07-01"
                }),
            ),
        )
        .await;

        assert_eq!(response["id"], 7);
        assert!(response["result"].get("isError").is_none());
        assert_eq!(response["result"]["content"][0]["text"], remote);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_in_band_without_remote_call() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock)
            .await;

        let server = server_for(&mock.uri());
        let response = single(&server, call("foo", json!({}))).await;

        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(text_of(&response), json!({ "error": "Unknown tool: foo" }));
    }

    #[tokio::test]
    async fn unauthorized_remote_is_reported_in_band_and_server_keeps_serving() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid API key" })),
            )
            .expect(2)
            .mount(&mock)
            .await;

        let server = server_for(&mock.uri());
        let args = json!({ "site_id": "example.com", "metrics": ["visitors"], "date_range": "7d" });

        for _ in 0..2 {
            let response = single(&server, call(QUERY_TOOL_NAME, args.clone())).await;
            assert_eq!(response["result"]["isError"], true);
            let error = text_of(&response)["error"].as_str().unwrap().to_string();
            assert!(error.contains("401"), "{error}");
            assert!(error.contains("Invalid API key"), "{error}");
        }
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_network() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock)
            .await;
        let server = server_for(&mock.uri());

        let cases = [
            (
                json!({ "site_id": "example.com", "metrics": ["visitors"] }),
                "Missing required arguments: date_range (or date for single day)",
            ),
            (
                json!({ "metrics": ["visitors"], "date": "2024-07-01" }),
                "Missing required arguments: site_id and metrics",
            ),
            (Value::Null, "Arguments are required"),
            (json!(["not", "an", "object"]), "Arguments must be an object"),
        ];
        for (arguments, expected) in cases {
            let response = single(&server, call(QUERY_TOOL_NAME, arguments)).await;
            assert_eq!(text_of(&response), json!({ "error": expected }));
        }

        let response = single(
            &server,
            call(
                QUERY_TOOL_NAME,
                json!({
                    "site_id": "example.com",
                    "metrics": ["visitors"],
                    "date": "2024-07-01",
                    "filters": [["bogus", "a", ["x"]]]
                }),
            ),
        )
        .await;
        let error = text_of(&response)["error"].as_str().unwrap().to_string();
        assert!(error.contains("unknown filter operator 'bogus'"), "{error}");
    }

    #[tokio::test]
    async fn protocol_faults_use_jsonrpc_errors() {
        let server = offline_server();

        let response = single(
            &server,
            json!({ "jsonrpc": "2.0", "id": 1, "method": "resources/read" }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32601);

        let response = single(&server, json!({ "id": 2, "method": "ping" })).await;
        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["id"], 2);

        let response = single(
            &server,
            json!({ "jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": { "arguments": {} } }),
        )
        .await;
        assert_eq!(response["error"]["code"], -32602);

        let response = single(&server, json!([])).await;
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn notifications_and_client_responses_get_no_reply() {
        let server = offline_server();
        let replies = server
            .handle_incoming_message(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
            .await;
        assert!(replies.is_empty());

        let replies = server
            .handle_incoming_message(json!({ "jsonrpc": "2.0", "id": 4, "result": {} }))
            .await;
        assert!(replies.is_empty());

        let replies = server
            .handle_incoming_message(json!({ "jsonrpc": "1.0", "method": "notifications/initialized" }))
            .await;
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn batch_requests_are_answered_per_request() {
        let server = offline_server();
        let replies = server
            .handle_incoming_message(json!([
                { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                { "jsonrpc": "2.0", "method": "notifications/initialized" },
                { "jsonrpc": "2.0", "id": 2, "method": "tools/list" }
            ]))
            .await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[1]["id"], 2);
    }
}
