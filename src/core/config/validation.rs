#![allow(clippy::result_large_err)]

use super::{BridgeConfig, BridgeSettings};
use crate::core::error::AppError;
use crate::core::template::{CommandTemplate, Placeholder};
use crate::core::types::{ErrorCategory, PromptStyle};
use crate::utils::env::EnvIsolator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Longest accepted per-request timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate raw settings and turn them into the immutable runtime config.
    pub fn resolve(settings: BridgeSettings) -> Result<BridgeConfig, AppError> {
        Self::validate(&settings)?;

        let bind: SocketAddr = settings.bind.parse().map_err(|e| {
            invalid(format!("invalid bind address '{}': {}", settings.bind, e))
                .with_code("BRG-CFG-002")
        })?;
        let template = CommandTemplate::parse(&settings.command)?;
        let resume_template = settings
            .resume_command
            .as_deref()
            .map(CommandTemplate::parse)
            .transpose()?;
        for candidate in std::iter::once(&template).chain(resume_template.as_ref()) {
            check_schema_placeholder(candidate, settings.prompt_style)?;
        }
        let timeout = parse_timeout(&settings.timeout)?;
        let workdir = resolve_workdir(settings.workdir)?;

        Ok(BridgeConfig {
            name: settings.name,
            description: settings.description,
            bind,
            template,
            resume_template,
            timeout,
            risk_flag: settings.risk_flag,
            risk_level: settings.risk_level,
            output_format_args: settings.output_format_args,
            prompt_style: settings.prompt_style,
            proxy_bypass: settings.proxy_bypass,
            env: settings.env,
            workdir,
            max_payload_bytes: settings.max_payload_bytes,
            max_body_bytes: settings.max_body_bytes,
            legacy_endpoint: settings.legacy_endpoint,
        })
    }

    /// Validate configuration rules that do not need parsing.
    pub fn validate(settings: &BridgeSettings) -> Result<(), AppError> {
        if settings.name.trim().is_empty() {
            return Err(invalid("name cannot be empty").with_code("BRG-CFG-003"));
        }

        if settings.risk_flag.is_some() && settings.risk_level.is_none() {
            return Err(
                invalid("risk_flag is set but risk_level is missing").with_code("BRG-CFG-004")
            );
        }

        for (key, value) in &settings.env {
            if key.is_empty() || key.contains('=') || key.contains('\0') || value.contains('\0') {
                return Err(invalid(format!("invalid environment entry '{}'", key))
                    .with_code("BRG-CFG-005"));
            }
            if settings.proxy_bypass && EnvIsolator::is_proxy_var(key) && !value.is_empty() {
                return Err(invalid(format!(
                    "env sets {} while proxy_bypass is enabled",
                    key
                ))
                .with_code("BRG-CFG-005"));
            }
        }

        if settings.output_format_args.iter().any(|arg| arg.contains('\0')) {
            return Err(
                invalid("output_format_args contains a NUL byte").with_code("BRG-CFG-006")
            );
        }

        if settings.max_payload_bytes == 0 {
            return Err(
                invalid("max_payload_bytes must be greater than 0").with_code("BRG-CFG-007")
            );
        }

        if settings.max_body_bytes < settings.max_payload_bytes {
            return Err(invalid(format!(
                "max_body_bytes ({}) must be at least max_payload_bytes ({})",
                settings.max_body_bytes, settings.max_payload_bytes
            ))
            .with_code("BRG-CFG-007"));
        }

        if let Some(endpoint) = &settings.legacy_endpoint {
            if !endpoint.starts_with('/') || endpoint.len() < 2 {
                return Err(invalid(format!(
                    "legacy_endpoint '{}' must be an absolute path",
                    endpoint
                ))
                .with_code("BRG-CFG-008"));
            }
            if endpoint == "/mcp" || endpoint == "/health" {
                return Err(invalid(format!(
                    "legacy_endpoint '{}' collides with a built-in route",
                    endpoint
                ))
                .with_code("BRG-CFG-008"));
            }
        }

        Ok(())
    }
}

/// Parse a timeout given as humantime ("10m", "1h 30m") or bare seconds.
pub fn parse_timeout(value: &str) -> Result<Duration, AppError> {
    let value = value.trim();
    let duration = if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        value.parse::<u64>().map(Duration::from_secs).map_err(|e| e.to_string())
    } else {
        humantime::parse_duration(value).map_err(|e| e.to_string())
    };

    match duration {
        Ok(duration) if duration.is_zero() => {
            Err(invalid("timeout must be greater than zero").with_code("BRG-CFG-009"))
        }
        Ok(duration) if duration > MAX_TIMEOUT => Err(invalid(format!(
            "timeout '{}' exceeds the maximum of {}",
            value,
            humantime::format_duration(MAX_TIMEOUT)
        ))
        .with_code("BRG-CFG-009")),
        Ok(duration) => Ok(duration),
        Err(e) => Err(invalid(format!("invalid timeout '{}': {}", value, e))
            .with_code("BRG-CFG-009")),
    }
}

/// Only the advisor style has a fixed result shape to hand the CLI.
fn check_schema_placeholder(
    template: &CommandTemplate,
    style: PromptStyle,
) -> Result<(), AppError> {
    if template.declares(Placeholder::SchemaFile) && style != PromptStyle::Advisor {
        return Err(invalid(format!(
            "{{{{{}}}}} in '{}' requires prompt_style = \"advisor\"",
            Placeholder::SchemaFile.name(),
            template
        ))
        .with_code("BRG-CFG-011"));
    }
    Ok(())
}

fn resolve_workdir(workdir: Option<PathBuf>) -> Result<PathBuf, AppError> {
    let current = std::env::current_dir().map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("cannot determine the current directory: {}", e),
        )
        .with_code("BRG-CFG-010")
    })?;

    let workdir = match workdir {
        Some(path) if path.is_absolute() => path,
        Some(path) => current.join(path),
        None => current,
    };

    if !workdir.is_dir() {
        return Err(invalid(format!(
            "workdir {} is not a directory",
            workdir.display()
        ))
        .with_code("BRG-CFG-010"));
    }

    Ok(workdir)
}

fn invalid<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::ConfigError, message)
}
