#![cfg(unix)]

use agent_bridge::core::config::{BridgeConfig, BridgeSettings, ConfigValidator};
use agent_bridge::core::entities::{FailureKind, ToolRequest, ToolResponse};
use agent_bridge::core::handler::RequestHandler;
use agent_bridge::core::prompt::output_schema;
use agent_bridge::core::template::{ResolveContext, TemplateResolver};
use agent_bridge::core::types::PromptStyle;
use anyhow::Result;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    format!("sh {}", shell_words::quote(&path.display().to_string()))
}

fn handler_for(command: &str, timeout: Duration) -> Result<RequestHandler> {
    let mut config = BridgeConfig::for_command(command)?;
    config.timeout = timeout;
    Ok(RequestHandler::new(Arc::new(config)))
}

#[tokio::test]
async fn echo_payload_round_trips_as_json() -> Result<()> {
    let handler = handler_for("echo {{payload}}", Duration::from_secs(5))?;

    let response = handler.handle_arguments(&json!({"prompt": "{\"ok\":true}"})).await;

    assert_eq!(response.payload(), Some(&json!({"ok": true})));
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_run_independently() -> Result<()> {
    let dir = TempDir::new()?;
    let command = write_script(dir.path(), "slow.sh", "sleep 2\nprintf '{\"id\":\"%s\"}' \"$1\"\n");
    let handler = handler_for(&command, Duration::from_secs(5))?;

    let started = Instant::now();
    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let handler = handler.clone();
            tokio::spawn(async move {
                let prompt = format!("req-{}", i);
                let response = handler.handle_arguments(&json!({"prompt": prompt})).await;
                (i, response)
            })
        })
        .collect();

    for task in tasks {
        let (i, response) = task.await?;
        assert_eq!(
            response.payload(),
            Some(&json!({"id": format!("req-{}", i)})),
            "request {} got {:?}",
            i,
            response
        );
    }
    assert!(started.elapsed() < Duration::from_secs(9));
    Ok(())
}

#[tokio::test]
async fn plain_text_output_is_unparseable() -> Result<()> {
    let dir = TempDir::new()?;
    let command = write_script(dir.path(), "text.sh", "echo 'not json at all'\n");
    let handler = handler_for(&command, Duration::from_secs(5))?;

    let response = handler.handle_arguments(&json!({"prompt": "hi"})).await;

    match response {
        ToolResponse::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::UnparseableOutput);
            assert!(failure
                .diagnostics
                .unwrap_or_default()
                .contains("not json at all"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn slow_cli_times_out() -> Result<()> {
    let dir = TempDir::new()?;
    let command = write_script(dir.path(), "hang.sh", "echo started\nsleep 30\n");
    let handler = handler_for(&command, Duration::from_millis(500))?;

    let started = Instant::now();
    let response = handler.handle_arguments(&json!({"prompt": "hi"})).await;

    assert_eq!(response.failure_kind(), Some(FailureKind::TimedOut));
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    let command = write_script(dir.path(), "fail.sh", "echo 'model refused' >&2\nexit 7\n");
    let handler = handler_for(&command, Duration::from_secs(5))?;

    let response = handler.handle_arguments(&json!({"prompt": "hi"})).await;

    match response {
        ToolResponse::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::NonZeroExit);
            assert_eq!(failure.exit_code, Some(7));
            assert_eq!(failure.stderr.as_deref(), Some("model refused\n"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn proxy_variables_are_blanked_for_the_child() -> Result<()> {
    let dir = TempDir::new()?;
    let command = write_script(
        dir.path(),
        "proxy.sh",
        "printf '{\"upper\":\"%s\",\"lower\":\"%s\"}' \"$HTTPS_PROXY\" \"$http_proxy\"\n",
    );
    let mut config = BridgeConfig::for_command(&command)?;
    config.timeout = Duration::from_secs(5);
    let mut base_env = BTreeMap::new();
    base_env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    base_env.insert("HTTPS_PROXY".to_string(), "http://proxy:3128".to_string());
    base_env.insert("http_proxy".to_string(), "http://proxy:3128".to_string());
    let handler = RequestHandler::new(Arc::new(config)).with_base_env(base_env);

    let response = handler.handle_arguments(&json!({"prompt": "hi"})).await;

    assert_eq!(
        response.payload(),
        Some(&json!({"upper": "", "lower": ""}))
    );
    Ok(())
}

#[test]
fn resolution_is_deterministic() -> Result<()> {
    let config = BridgeConfig::for_command("droid exec --output-format json")?;
    let mut base_env = BTreeMap::new();
    base_env.insert("HTTP_PROXY".to_string(), "http://proxy:3128".to_string());
    base_env.insert("HOME".to_string(), "/home/bridge".to_string());
    let ctx = ResolveContext {
        config: &config,
        base_env: &base_env,
        output_file: None,
        schema_file: None,
    };
    let request = ToolRequest::new("agent-bridge", "summarize the repo").with_cwd("sub");

    let first = TemplateResolver::resolve(&request, &ctx)?;
    let second = TemplateResolver::resolve(&request, &ctx)?;

    assert_eq!(first, second);
    assert_eq!(first.args.last().map(String::as_str), Some("summarize the repo"));
    assert_eq!(first.env.get("HTTP_PROXY").map(String::as_str), Some(""));
    assert_eq!(first.cwd, config.workdir.join("sub"));
    Ok(())
}

#[tokio::test]
async fn output_file_takes_precedence_over_stdout() -> Result<()> {
    let dir = TempDir::new()?;
    let command = write_script(
        dir.path(),
        "file.sh",
        "echo 'progress line'\nprintf '{\"from\":\"file\"}' > \"$1\"\n",
    );
    let handler = handler_for(&format!("{} {{{{output_file}}}}", command), Duration::from_secs(5))?;

    let response = handler.handle_arguments(&json!({"prompt": "hi"})).await;

    assert_eq!(response.payload(), Some(&json!({"from": "file"})));
    let value: Value = serde_json::to_value(&response)?;
    assert_eq!(value["status"], "success");
    Ok(())
}

#[tokio::test]
async fn advisor_schema_file_is_readable_by_the_cli() -> Result<()> {
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "schema.sh", "cat \"$1\"\n");
    let config = ConfigValidator::resolve(BridgeSettings {
        command: format!("{} {{{{schema_file}}}}", script),
        prompt_style: PromptStyle::Advisor,
        timeout: "5s".to_string(),
        workdir: Some(dir.path().to_path_buf()),
        ..BridgeSettings::default()
    })?;
    let handler = RequestHandler::new(Arc::new(config));

    let response = handler
        .handle_arguments(&json!({"problem": "Pick a queue"}))
        .await;

    assert_eq!(response.payload(), output_schema(PromptStyle::Advisor).as_ref());
    Ok(())
}
