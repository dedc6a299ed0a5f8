pub mod loader;
pub mod validation;

pub use loader::{ConfigLoader, ConfigOverrides};
pub use validation::ConfigValidator;

use crate::core::template::CommandTemplate;
use crate::core::types::{PromptStyle, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level layout of the bridge TOML file.
///
/// The `[logging]` table lives in the same file and is read by
/// [`crate::logging::config::LoggingConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub bridge: BridgeSettings,
}

/// Raw `[bridge]` settings as written by operators, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSettings {
    /// Tool name advertised over MCP and used in logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Human readable tool description for `tools/list`.
    #[serde(default = "default_description")]
    pub description: String,

    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// CLI binary and fixed flags, shell-style quoted.
    #[serde(default = "default_command")]
    pub command: String,

    /// Template used when a request continues an earlier session, e.g.
    /// "codex exec resume". The session id (or `--last`) follows its arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_command: Option<String>,

    /// Wall-clock budget per request (humantime, e.g. "10m", or bare seconds).
    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Flag that introduces the risk level, e.g. "--auto".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_flag: Option<String>,

    /// Configured risk level and ceiling for per-request overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,

    /// Arguments that select structured output, e.g. ["-o", "json"].
    #[serde(default)]
    pub output_format_args: Vec<String>,

    #[serde(default)]
    pub prompt_style: PromptStyle,

    /// Force proxy variables empty in the child environment.
    #[serde(default = "default_proxy_bypass")]
    pub proxy_bypass: bool,

    /// Extra variables injected into the child environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Default working directory; the bridge's own cwd when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Extra REST route accepting the raw argument object, e.g. "/execute".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_endpoint: Option<String>,
}

/// Immutable, validated configuration shared by every request.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub name: String,
    pub description: String,
    pub bind: SocketAddr,
    pub template: CommandTemplate,
    pub resume_template: Option<CommandTemplate>,
    pub timeout: Duration,
    pub risk_flag: Option<String>,
    pub risk_level: Option<RiskLevel>,
    pub output_format_args: Vec<String>,
    pub prompt_style: PromptStyle,
    pub proxy_bypass: bool,
    pub env: BTreeMap<String, String>,
    pub workdir: PathBuf,
    pub max_payload_bytes: usize,
    pub max_body_bytes: usize,
    pub legacy_endpoint: Option<String>,
}

impl BridgeConfig {
    /// Build a config around a command template with every other setting at its default.
    pub fn for_command(command: &str) -> Result<Self, crate::core::error::AppError> {
        let settings = BridgeSettings {
            command: command.to_string(),
            workdir: Some(std::env::temp_dir()),
            ..BridgeSettings::default()
        };
        ConfigValidator::resolve(settings)
    }
}

fn default_name() -> String {
    "agent-bridge".to_string()
}

fn default_description() -> String {
    "Run a task through the configured coding-agent CLI and return its structured result."
        .to_string()
}

fn default_bind() -> String {
    "127.0.0.1:53001".to_string()
}

fn default_command() -> String {
    "codex exec --skip-git-repo-check --sandbox read-only".to_string()
}

fn default_timeout() -> String {
    "600s".to_string()
}

fn default_proxy_bypass() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    200_000
}

fn default_max_body_bytes() -> usize {
    1_048_576
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            name: default_name(),
            description: default_description(),
            bind: default_bind(),
            command: default_command(),
            resume_command: None,
            timeout: default_timeout(),
            risk_flag: None,
            risk_level: None,
            output_format_args: Vec::new(),
            prompt_style: PromptStyle::default(),
            proxy_bypass: default_proxy_bypass(),
            env: BTreeMap::new(),
            workdir: None,
            max_payload_bytes: default_max_payload_bytes(),
            max_body_bytes: default_max_body_bytes(),
            legacy_endpoint: None,
        }
    }
}
