use agent_bridge::core::config::{ConfigLoader, ConfigOverrides};
use agent_bridge::core::types::{PromptStyle, RiskLevel};
use serial_test::serial;
use std::env;
use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use tokio_test::{assert_err, assert_ok};

const BRIDGE_VARS: &[&str] = &[
    "BRIDGE_NAME",
    "BRIDGE_BIND",
    "PORT",
    "BRIDGE_CLI_CMD",
    "BRIDGE_RESUME_CMD",
    "BRIDGE_TIMEOUT",
    "BRIDGE_RISK_LEVEL",
    "BRIDGE_PROXY_BYPASS",
    "BRIDGE_WORKDIR",
];

/// Clears the bridge variables and restores them on drop.
struct EnvGuard(Vec<(&'static str, Option<OsString>)>);

impl EnvGuard {
    fn clean() -> Self {
        let saved = BRIDGE_VARS
            .iter()
            .map(|key| {
                let previous = env::var_os(key);
                env::remove_var(key);
                (*key, previous)
            })
            .collect();
        EnvGuard(saved)
    }

    fn set(&self, key: &str, value: &str) {
        env::set_var(key, value);
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, previous) in self.0.drain(..) {
            match previous {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    write!(file, "{}", toml).expect("write config");
    file
}

#[test]
#[serial]
fn defaults_without_file_or_env() {
    let _env = EnvGuard::clean();

    let config = assert_ok!(ConfigLoader::load(None, &ConfigOverrides::default()));

    assert_eq!(config.name, "agent-bridge");
    assert_eq!(config.bind.to_string(), "127.0.0.1:53001");
    assert_eq!(config.timeout, Duration::from_secs(600));
    assert_eq!(config.template.program(), "codex");
    assert!(config.proxy_bypass);
    assert_eq!(config.prompt_style, PromptStyle::Raw);
}

#[test]
#[serial]
fn file_then_env_then_cli() {
    let env_guard = EnvGuard::clean();
    let workdir = TempDir::new().expect("workdir");
    let file = write_config(&format!(
        r#"
[bridge]
name = "droid"
bind = "127.0.0.1:6000"
command = "droid exec --output-format json"
timeout = "30s"
risk_flag = "--auto"
risk_level = "low"
prompt_style = "executor"
workdir = "{}"
legacy_endpoint = "/execute"

[bridge.env]
DROID_MODE = "bridge"
"#,
        workdir.path().display()
    ));
    env_guard.set("BRIDGE_TIMEOUT", "45");
    env_guard.set("BRIDGE_RISK_LEVEL", "medium");

    let overrides = ConfigOverrides {
        port: Some(7000),
        ..ConfigOverrides::default()
    };
    let config = assert_ok!(ConfigLoader::load(Some(file.path()), &overrides));

    assert_eq!(config.name, "droid");
    assert_eq!(config.bind.to_string(), "127.0.0.1:7000");
    assert_eq!(config.timeout, Duration::from_secs(45));
    assert_eq!(config.risk_flag.as_deref(), Some("--auto"));
    assert_eq!(config.risk_level, Some(RiskLevel::Medium));
    assert_eq!(config.prompt_style, PromptStyle::Executor);
    assert_eq!(config.workdir, workdir.path());
    assert_eq!(config.legacy_endpoint.as_deref(), Some("/execute"));
    assert_eq!(config.env.get("DROID_MODE").map(String::as_str), Some("bridge"));
}

#[test]
#[serial]
fn env_overrides_command_and_proxy_bypass() {
    let env_guard = EnvGuard::clean();
    env_guard.set("BRIDGE_CLI_CMD", "claude -p {{payload}} --output-format json");
    env_guard.set("BRIDGE_PROXY_BYPASS", "false");
    env_guard.set("BRIDGE_BIND", "0.0.0.0:9000");
    env_guard.set("PORT", "9100");
    env_guard.set("BRIDGE_TIMEOUT", "2m");

    let config = assert_ok!(ConfigLoader::load(None, &ConfigOverrides::default()));

    assert_eq!(config.template.program(), "claude");
    assert!(!config.proxy_bypass);
    assert_eq!(config.bind.to_string(), "0.0.0.0:9100");
    assert_eq!(config.timeout, Duration::from_secs(120));
}

#[test]
#[serial]
fn cli_command_beats_env() {
    let env_guard = EnvGuard::clean();
    env_guard.set("BRIDGE_CLI_CMD", "from-env");

    let overrides = ConfigOverrides {
        command: Some("from-cli --json".to_string()),
        timeout: Some("5s".to_string()),
        ..ConfigOverrides::default()
    };
    let config = assert_ok!(ConfigLoader::load(None, &overrides));

    assert_eq!(config.template.program(), "from-cli");
    assert_eq!(config.timeout, Duration::from_secs(5));
}

#[test]
#[serial]
fn invalid_values_carry_codes() {
    let env_guard = EnvGuard::clean();

    let missing = assert_err!(ConfigLoader::load(
        Some(std::path::Path::new("/nonexistent/bridge.toml")),
        &ConfigOverrides::default()
    ));
    assert_eq!(missing.code, "BRG-CFG-001");

    env_guard.set("BRIDGE_RISK_LEVEL", "reckless");
    let risk = assert_err!(ConfigLoader::load(None, &ConfigOverrides::default()));
    assert_eq!(risk.code, "BRG-CFG-004");
    env::remove_var("BRIDGE_RISK_LEVEL");

    env_guard.set("PORT", "not-a-port");
    let port = assert_err!(ConfigLoader::load(None, &ConfigOverrides::default()));
    assert_eq!(port.code, "BRG-CFG-002");
    env::remove_var("PORT");

    env_guard.set("BRIDGE_TIMEOUT", "0");
    let timeout = assert_err!(ConfigLoader::load(None, &ConfigOverrides::default()));
    assert_eq!(timeout.code, "BRG-CFG-009");
    env_guard.set("BRIDGE_TIMEOUT", "18446744073709551615");
    let timeout = assert_err!(ConfigLoader::load(None, &ConfigOverrides::default()));
    assert_eq!(timeout.code, "BRG-CFG-009");
    env::remove_var("BRIDGE_TIMEOUT");

    let template = assert_err!(ConfigLoader::load(
        None,
        &ConfigOverrides {
            command: Some("codex {{prompt}}".to_string()),
            ..ConfigOverrides::default()
        }
    ));
    assert_eq!(template.code, "BRG-TPL-002");
}

#[test]
#[serial]
fn unknown_keys_in_file_are_rejected() {
    let _env = EnvGuard::clean();
    let file = write_config(
        r#"
[bridge]
name = "codex"
timeout_seconds = 30
"#,
    );

    let err = assert_err!(ConfigLoader::load(Some(file.path()), &ConfigOverrides::default()));
    assert_eq!(err.code, "BRG-CFG-001");
}

#[test]
#[serial]
fn advisor_with_schema_and_resume_command() {
    let env_guard = EnvGuard::clean();
    let file = write_config(
        r#"
[bridge]
name = "codex-advisor"
command = "codex exec --output-schema {{schema_file}} -o {{output_file}}"
resume_command = "codex exec resume"
prompt_style = "advisor"
"#,
    );

    let config = assert_ok!(ConfigLoader::load(Some(file.path()), &ConfigOverrides::default()));
    assert!(config.template.declares_schema_file());
    let resume = config.resume_template.expect("resume template");
    assert_eq!(resume.as_str(), "codex exec resume");

    env_guard.set("BRIDGE_RESUME_CMD", "");
    let config = assert_ok!(ConfigLoader::load(Some(file.path()), &ConfigOverrides::default()));
    assert!(config.resume_template.is_none());

    let raw = write_config(
        r#"
[bridge]
command = "codex exec --output-schema {{schema_file}}"
"#,
    );
    let err = assert_err!(ConfigLoader::load(Some(raw.path()), &ConfigOverrides::default()));
    assert_eq!(err.code, "BRG-CFG-011");
}
