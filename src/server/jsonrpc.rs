//! MCP JSON-RPC 2.0 dispatch for a single bridged tool.

use crate::core::entities::ToolResponse;
use crate::core::handler::RequestHandler;
use crate::core::prompt::input_schema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err<T: Into<String>>(id: Value, code: i64, message: T) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Outcome of dispatching one HTTP body.
#[derive(Debug)]
pub enum Dispatch {
    Reply(RpcResponse),
    /// A notification: acknowledged without a body.
    Accepted,
}

pub async fn dispatch(handler: &RequestHandler, body: &[u8]) -> Dispatch {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => {
            return Dispatch::Reply(RpcResponse::err(
                Value::Null,
                PARSE_ERROR,
                format!("parse error: {}", err),
            ))
        }
    };

    let object = match value {
        Value::Object(object) => object,
        Value::Array(_) => {
            return Dispatch::Reply(RpcResponse::err(
                Value::Null,
                INVALID_REQUEST,
                "batch requests are not supported",
            ))
        }
        _ => {
            return Dispatch::Reply(RpcResponse::err(
                Value::Null,
                INVALID_REQUEST,
                "request must be a JSON object",
            ))
        }
    };

    let id = object.get("id").cloned();
    let request: RpcRequest = match serde_json::from_value(Value::Object(object)) {
        Ok(request) => request,
        Err(err) => {
            return Dispatch::Reply(RpcResponse::err(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                format!("invalid request: {}", err),
            ))
        }
    };

    if request.jsonrpc.as_deref() != Some("2.0") {
        return Dispatch::Reply(RpcResponse::err(
            id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }

    let Some(id) = id else {
        debug!(method = %request.method, "notification received");
        return Dispatch::Accepted;
    };

    debug!(method = %request.method, "rpc request");
    let reply = match request.method.as_str() {
        "initialize" => RpcResponse::ok(id, initialize_result(handler)),
        "ping" => RpcResponse::ok(id, json!({})),
        "tools/list" => RpcResponse::ok(id, tools_list_result(handler)),
        "tools/call" => match call_tool(handler, &request.params).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(message) => RpcResponse::err(id, INVALID_PARAMS, message),
        },
        other => RpcResponse::err(id, METHOD_NOT_FOUND, format!("unknown method: {}", other)),
    };
    Dispatch::Reply(reply)
}

fn initialize_result(handler: &RequestHandler) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {"listChanged": false}
        },
        "serverInfo": {
            "name": handler.config().name,
            "version": crate::VERSION
        }
    })
}

fn tools_list_result(handler: &RequestHandler) -> Value {
    let config = handler.config();
    json!({
        "tools": [{
            "name": config.name,
            "description": config.description,
            "inputSchema": input_schema(config.prompt_style)
        }]
    })
}

async fn call_tool(handler: &RequestHandler, params: &Value) -> Result<Value, String> {
    let empty = Map::new();
    let params = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err("params must be an object".to_string()),
    };
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| "name is required".to_string())?;
    if name != handler.config().name {
        return Err(format!("unknown tool: {}", name));
    }

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let response = handler.handle_arguments(&arguments).await;
    Ok(tool_result(&response))
}

/// Wrap a [`ToolResponse`] in the MCP `tools/call` result shape.
pub fn tool_result(response: &ToolResponse) -> Value {
    let text_source = match response {
        ToolResponse::Success { payload, .. } => payload.clone(),
        ToolResponse::Failure(failure) => json!(failure),
    };
    let text = serde_json::to_string_pretty(&text_source).unwrap_or_else(|_| text_source.to_string());
    json!({
        "content": [{"type": "text", "text": text}],
        "structuredContent": response,
        "isError": !response.is_success()
    })
}
