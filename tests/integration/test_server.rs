#![cfg(unix)]

use agent_bridge::core::config::BridgeConfig;
use agent_bridge::core::error::AppError;
use agent_bridge::core::handler::RequestHandler;
use agent_bridge::core::types::ErrorCategory;
use agent_bridge::server;
use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::oneshot, task::JoinHandle};

fn bridge_config(max_body_bytes: usize) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::for_command("echo {{payload}}")?;
    config.name = "echo-bridge".to_string();
    config.bind = "127.0.0.1:0".parse()?;
    config.timeout = Duration::from_secs(5);
    config.max_body_bytes = max_body_bytes;
    config.legacy_endpoint = Some("/execute".to_string());
    Ok(config)
}

async fn spawn_bridge_server(
    config: BridgeConfig,
) -> Result<(SocketAddr, JoinHandle<Result<(), AppError>>)> {
    let handler = RequestHandler::new(Arc::new(config));
    let (addr_tx, addr_rx) = oneshot::channel();
    let handle =
        tokio::spawn(async move { server::serve_with_ready_notifier(handler, addr_tx).await });
    let addr = addr_rx.await.map_err(|_| {
        AppError::new(
            ErrorCategory::InternalError,
            "bridge startup canceled before bind address reported",
        )
    })?;
    Ok((addr, handle))
}

async fn rpc(client: &reqwest::Client, addr: SocketAddr, body: Value) -> Result<Value> {
    let resp = client
        .post(format!("http://{}/mcp", addr))
        .json(&body)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(resp.json().await?)
}

#[tokio::test]
async fn mcp_handshake_and_tool_call() -> Result<()> {
    let (addr, handle) = spawn_bridge_server(bridge_config(1_048_576)?).await?;
    let client = reqwest::Client::new();

    let init = rpc(
        &client,
        addr,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
    )
    .await?;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "echo-bridge");

    let resp = client
        .post(format!("http://{}/mcp", addr))
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert!(resp.bytes().await?.is_empty());

    let list = rpc(
        &client,
        addr,
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await?;
    assert_eq!(list["result"]["tools"][0]["name"], "echo-bridge");
    assert_eq!(list["result"]["tools"][0]["inputSchema"]["type"], "object");

    let call = rpc(
        &client,
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "echo-bridge", "arguments": {"prompt": "{\"ok\":true}"}}
        }),
    )
    .await?;
    assert_eq!(call["result"]["isError"], false);
    assert_eq!(call["result"]["structuredContent"]["status"], "success");
    assert_eq!(call["result"]["structuredContent"]["payload"], json!({"ok": true}));
    assert_eq!(call["result"]["content"][0]["type"], "text");

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn mcp_protocol_errors() -> Result<()> {
    let (addr, handle) = spawn_bridge_server(bridge_config(1_048_576)?).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/mcp", addr))
        .body("{not json")
        .send()
        .await?;
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);

    let unknown_method = rpc(
        &client,
        addr,
        json!({"jsonrpc": "2.0", "id": 4, "method": "prompts/list"}),
    )
    .await?;
    assert_eq!(unknown_method["error"]["code"], -32601);

    let unknown_tool = rpc(
        &client,
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": {"name": "someone-else", "arguments": {"prompt": "x"}}
        }),
    )
    .await?;
    assert_eq!(unknown_tool["error"]["code"], -32602);

    let malformed = rpc(
        &client,
        addr,
        json!({
            "jsonrpc": "2.0",
            "id": 6,
            "method": "tools/call",
            "params": {"name": "echo-bridge", "arguments": {}}
        }),
    )
    .await?;
    assert_eq!(malformed["result"]["isError"], true);
    assert_eq!(
        malformed["result"]["structuredContent"]["kind"],
        "malformed_request"
    );

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn health_and_legacy_endpoint() -> Result<()> {
    let (addr, handle) = spawn_bridge_server(bridge_config(1_048_576)?).await?;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["name"], "echo-bridge");
    assert_eq!(health["version"], agent_bridge::VERSION);

    let resp = client
        .post(format!("http://{}/execute", addr))
        .json(&json!({"prompt": "[1, 2]"}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await?;
    assert_eq!(body["status"], "success");
    assert_eq!(body["payload"], json!([1, 2]));

    let resp = client
        .post(format!("http://{}/execute", addr))
        .body("nope")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "BRG-SRV-400");

    handle.abort();
    let _ = handle.await;
    Ok(())
}

#[tokio::test]
async fn oversized_body_is_rejected() -> Result<()> {
    let (addr, handle) = spawn_bridge_server(bridge_config(64)?).await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/mcp", addr))
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "echo-bridge", "arguments": {"prompt": "a".repeat(512)}}
        }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "BRG-SRV-413");

    handle.abort();
    let _ = handle.await;
    Ok(())
}
