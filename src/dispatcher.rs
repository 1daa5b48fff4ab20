//! JSON-RPC 2.0 / MCP tool-call surface: `initialize`, `tools/list`,
//! `tools/call`, and the three tools themselves.
//!
//! Grounded on the pack's stdio MCP dispatcher (`JsonRpcRequest`/
//! `JsonRpcResponse`/`ToolDefinition`/`ToolResult`/`ToolContent` shapes and
//! the `initialize`/`tools/list`/`tools/call` match arms), adapted from
//! stdio line-framing to request/response values passed in from the HTTP
//! layer, and on the teacher's `daemon_protocol::Response{result,error}`
//! envelope for the split between a successful result and a protocol error.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::DispatchError;
use crate::executor::{Executor, ExecutionRequest};
use crate::manager::Manager;
use crate::registry::RunnerCatalog;
use crate::signer;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "mcp-sandbox";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a request handler needs: configuration plus the three core
/// collaborators (Manager, Registry, Executor). Shared read-only across
/// concurrent requests behind an `Arc`, following the teacher's
/// `Arc<Mutex<DaemonState>>` pattern minus the mutex, since nothing here is
/// mutated after construction.
pub struct AppState {
    pub manager: Manager,
    pub registry: RunnerCatalog,
    pub executor: Executor,
    pub public_base_url: String,
    pub file_secret: String,
    pub exec_timeout: Duration,
    pub cleanup_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(rename = "jsonrpc", default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        JsonRpcResponse { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, error: DispatchError) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcErrorBody { code: error.code(), message: error.message() }),
        }
    }
}

/// Build the error response for a request body that failed to parse as
/// JSON-RPC at all, so the id is unknown and `Value::Null` per the spec.
pub fn parse_error_response(message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::err(Value::Null, DispatchError::Parse(message.into()))
}

/// Dispatch one parsed JSON-RPC request to completion.
pub async fn handle_request(state: &AppState, request: JsonRpcRequest) -> JsonRpcResponse {
    if !request.jsonrpc.is_empty() && request.jsonrpc != "2.0" {
        return JsonRpcResponse::err(
            request.id,
            DispatchError::InvalidRequest(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
        );
    }

    let id = request.id.clone();
    match request.method.as_str() {
        "initialize" => JsonRpcResponse::ok(id, initialize_result()),
        "tools/list" => JsonRpcResponse::ok(id, tools_list_result()),
        "tools/call" => match handle_tools_call(state, request.params).await {
            Ok(result) => JsonRpcResponse::ok(id, result),
            Err(error) => JsonRpcResponse::err(id, error),
        },
        other => JsonRpcResponse::err(id, DispatchError::MethodNotFound(other.to_string())),
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": { "name": SERVER_NAME, "version": SERVER_VERSION },
        "capabilities": { "tools": {} },
    })
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "upload_file",
            "description": "Upload a base64-encoded file into a conversation's sandbox directory.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "conversationId": { "type": "string" },
                    "filename": { "type": "string" },
                    "content": { "type": "string", "description": "base64-encoded file content" },
                },
                "required": ["conversationId", "filename", "content"],
            },
        },
        {
            "name": "run_code",
            "description": "Run a snippet of source code inside an ephemeral, network-restricted container.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "conversationId": { "type": "string" },
                    "language": { "type": "string" },
                    "code": { "type": "string" },
                    "network": { "type": "boolean", "default": false },
                    "environment": { "type": "object", "additionalProperties": { "type": "string" } },
                },
                "required": ["conversationId", "language", "code"],
            },
        },
        {
            "name": "list_runners",
            "description": "List the languages available for run_code and their runner images.",
            "inputSchema": { "type": "object", "properties": {} },
        },
    ])
}

fn tools_list_result() -> Value {
    json!({ "tools": tool_definitions() })
}

async fn handle_tools_call(state: &AppState, params: Value) -> Result<Value, DispatchError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::InvalidParams("missing 'name'".to_string()))?;
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let tool_result = match name {
        "upload_file" => upload_file(state, &arguments)?,
        "run_code" => run_code(state, &arguments).await?,
        "list_runners" => list_runners(state),
        other => return Err(DispatchError::MethodNotFound(format!("unknown tool '{other}'"))),
    };

    Ok(wrap_tool_result(&tool_result))
}

/// Wrap a tool's own JSON result as a single pretty-printed text content
/// block, matching the MCP tool-result convention.
fn wrap_tool_result(result: &Value) -> Value {
    let text = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    json!({
        "content": [ { "type": "text", "text": text } ],
        "isError": false,
    })
}

fn required_str<'a>(arguments: &'a Value, field: &str) -> Result<&'a str, DispatchError> {
    match arguments.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        Some(_) => Err(DispatchError::InvalidParams(format!("'{field}' must not be empty"))),
        None => Err(DispatchError::InvalidParams(format!("missing required field '{field}'"))),
    }
}

fn upload_file(state: &AppState, arguments: &Value) -> Result<Value, DispatchError> {
    let conversation_id = required_str(arguments, "conversationId")?;
    let filename = required_str(arguments, "filename")?;
    let content = required_str(arguments, "content")?;

    let bytes = match base64::engine::general_purpose::STANDARD.decode(content) {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(json!({
                "success": false,
                "message": format!("invalid base64 content: {err}"),
            }))
        }
    };

    match state.manager.write_file(conversation_id, filename, &bytes) {
        Ok(()) => {
            let url = signer::file_url(&state.public_base_url, conversation_id, &state.file_secret, filename);
            Ok(json!({
                "success": true,
                "message": format!("uploaded {filename}"),
                "file": { "name": filename, "url": url },
            }))
        }
        Err(err) => Ok(json!({
            "success": false,
            "message": format!("failed to write file: {err}"),
        })),
    }
}

async fn run_code(state: &AppState, arguments: &Value) -> Result<Value, DispatchError> {
    let conversation_id = required_str(arguments, "conversationId")?;
    let language = required_str(arguments, "language")?;
    let code = required_str(arguments, "code")?;
    let network_enabled = arguments.get("network").and_then(Value::as_bool).unwrap_or(false);

    let mut env: HashMap<String, String> = arguments
        .get("environment")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let runner = match state.registry.lookup(language) {
        Some(runner) => runner.clone(),
        None => {
            return Ok(json!({
                "success": false,
                "stdout": "",
                "stderr": format!("language '{language}' is not supported by any registered runner"),
            }))
        }
    };

    let (_hashed_id, server_path) = state
        .manager
        .ensure(conversation_id)
        .map_err(|err| DispatchError::Internal(format!("failed to prepare sandbox: {err}")))?;
    let host_path = state.manager.host_path(conversation_id);
    let _ = server_path;

    env.insert(
        "FILE_BASE_URL".to_string(),
        signer::file_base_url(&state.public_base_url, conversation_id, &state.file_secret),
    );

    let outcome = state
        .executor
        .run(ExecutionRequest {
            image_reference: &runner.image_reference,
            host_bind_path: &host_path.to_string_lossy(),
            code,
            network_enabled,
            env: &env,
            timeout: state.exec_timeout,
            cleanup_timeout: state.cleanup_timeout,
        })
        .await;

    Ok(json!({
        "success": outcome.success,
        "stdout": outcome.stdout,
        "stderr": outcome.stderr,
    }))
}

fn list_runners(state: &AppState) -> Value {
    let languages: Vec<Value> = state
        .registry
        .list()
        .iter()
        .map(|r| json!({ "language": r.language, "image": r.image_reference }))
        .collect();
    json!({ "languages": languages })
}
