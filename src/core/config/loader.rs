#![allow(clippy::result_large_err)]

use super::{BridgeConfig, BridgeSettings, ConfigFile, ConfigValidator};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, RiskLevel};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Values supplied on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub command: Option<String>,
    pub timeout: Option<String>,
    pub workdir: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Build the validated configuration: defaults, then the file, then
    /// environment variables, then command line overrides.
    pub fn load(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<BridgeConfig, AppError> {
        let mut settings = match path {
            Some(path) => Self::load_from_file(path)?
                .ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::ConfigError,
                        format!("config file {} does not exist", path.display()),
                    )
                    .with_code("BRG-CFG-001")
                })?
                .bridge,
            None => BridgeSettings::default(),
        };

        Self::apply_env_overrides(&mut settings)?;
        Self::apply_overrides(&mut settings, overrides)?;

        ConfigValidator::resolve(settings)
    }

    /// Load config from a specific file path.
    /// Returns Ok(None) if the file doesn't exist.
    pub fn load_from_file(path: &Path) -> Result<Option<ConfigFile>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: ConfigFile = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("BRG-CFG-001")
        })?;

        Ok(Some(config))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(settings: &mut BridgeSettings) -> Result<(), AppError> {
        if let Ok(name) = env::var("BRIDGE_NAME") {
            settings.name = name;
        }

        if let Ok(bind) = env::var("BRIDGE_BIND") {
            settings.bind = bind;
        }

        if let Ok(port) = env::var("PORT") {
            let port = port.trim().parse::<u16>().map_err(|_| {
                AppError::new(
                    ErrorCategory::ConfigError,
                    format!("PORT must be a port number, got '{}'", port),
                )
                .with_code("BRG-CFG-002")
            })?;
            settings.bind = with_port(&settings.bind, port)?;
        }

        if let Ok(command) = env::var("BRIDGE_CLI_CMD") {
            settings.command = command;
        }

        if let Ok(command) = env::var("BRIDGE_RESUME_CMD") {
            settings.resume_command = Some(command).filter(|command| !command.trim().is_empty());
        }

        if let Ok(timeout) = env::var("BRIDGE_TIMEOUT") {
            settings.timeout = timeout;
        }

        if let Ok(risk) = env::var("BRIDGE_RISK_LEVEL") {
            let level = risk.parse::<RiskLevel>().map_err(|e| {
                AppError::new(ErrorCategory::ConfigError, e).with_code("BRG-CFG-004")
            })?;
            settings.risk_level = Some(level);
        }

        if let Ok(bypass) = env::var("BRIDGE_PROXY_BYPASS") {
            if let Some(bypass) = parse_bool(&bypass) {
                settings.proxy_bypass = bypass;
            }
        }

        if let Ok(workdir) = env::var("BRIDGE_WORKDIR") {
            settings.workdir = Some(PathBuf::from(workdir));
        }

        Ok(())
    }

    fn apply_overrides(
        settings: &mut BridgeSettings,
        overrides: &ConfigOverrides,
    ) -> Result<(), AppError> {
        if let Some(bind) = &overrides.bind {
            settings.bind = bind.clone();
        }
        if let Some(port) = overrides.port {
            settings.bind = with_port(&settings.bind, port)?;
        }
        if let Some(command) = &overrides.command {
            settings.command = command.clone();
        }
        if let Some(timeout) = &overrides.timeout {
            settings.timeout = timeout.clone();
        }
        if let Some(workdir) = &overrides.workdir {
            settings.workdir = Some(workdir.clone());
        }
        Ok(())
    }

    /// Documentation for supported environment variables.
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "BRIDGE_NAME - Override the tool name",
            "BRIDGE_BIND - Override the listen address (default: 127.0.0.1:53001)",
            "PORT - Override only the listen port",
            "BRIDGE_CLI_CMD - Override the command template",
            "BRIDGE_RESUME_CMD - Override the session resume template (empty disables resuming)",
            "BRIDGE_TIMEOUT - Override the per-request timeout (e.g. 10m, or seconds)",
            "BRIDGE_RISK_LEVEL - Override the risk level (read-only, low, medium, high)",
            "BRIDGE_PROXY_BYPASS - Blank proxy variables for the child (true/false, default: true)",
            "BRIDGE_WORKDIR - Override the default working directory",
        ]
    }
}

fn with_port(bind: &str, port: u16) -> Result<String, AppError> {
    let mut addr: SocketAddr = bind.parse().map_err(|e| {
        AppError::new(
            ErrorCategory::ConfigError,
            format!("invalid bind address '{}': {}", bind, e),
        )
        .with_code("BRG-CFG-002")
    })?;
    addr.set_port(port);
    Ok(addr.to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
