#![allow(clippy::result_large_err)]

//! Command template parsing and per-request argument resolution.
//!
//! A template such as `droid exec --cwd={{cwd}}` is split once, shell style,
//! into tokens made of literal text and placeholders. Resolution substitutes
//! request values segment by segment, so a payload is always exactly one
//! argument and is never re-split or handed to a shell.

use crate::core::config::BridgeConfig;
use crate::core::entities::{ExecutionSpec, SessionSelector, ToolRequest};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::utils::env::EnvIsolator;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Values a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Payload,
    Cwd,
    OutputFile,
    SchemaFile,
}

impl Placeholder {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "payload" => Some(Placeholder::Payload),
            "cwd" => Some(Placeholder::Cwd),
            "output_file" => Some(Placeholder::OutputFile),
            "schema_file" => Some(Placeholder::SchemaFile),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Payload => "payload",
            Placeholder::Cwd => "cwd",
            Placeholder::OutputFile => "output_file",
            Placeholder::SchemaFile => "schema_file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(Placeholder),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    segments: Vec<Segment>,
}

impl Token {
    fn parse(raw: &str) -> Result<Self, AppError> {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            let name = &after[..end];
            let placeholder = Placeholder::from_name(name).ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ConfigError,
                    format!("unknown placeholder '{{{{{}}}}}' in command template", name),
                )
                .with_code("BRG-TPL-002")
                .with_context("token", raw)
            })?;
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            segments.push(Segment::Value(placeholder));
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Token { segments })
    }

    fn uses(&self, placeholder: Placeholder) -> bool {
        self.segments
            .iter()
            .any(|segment| *segment == Segment::Value(placeholder))
    }

    fn literal(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Literal(text)] => Some(text),
            _ => None,
        }
    }

    fn render(&self, values: &Values<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Value(Placeholder::Payload) => out.push_str(values.payload),
                Segment::Value(Placeholder::Cwd) => out.push_str(values.cwd),
                Segment::Value(Placeholder::OutputFile) => {
                    out.push_str(values.output_file.unwrap_or_default())
                }
                Segment::Value(Placeholder::SchemaFile) => {
                    out.push_str(values.schema_file.unwrap_or_default())
                }
            }
        }
        out
    }
}

struct Values<'a> {
    payload: &'a str,
    cwd: &'a str,
    output_file: Option<&'a str>,
    schema_file: Option<&'a str>,
}

/// Parsed command template: a literal program followed by argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    program: String,
    args: Vec<Token>,
}

impl CommandTemplate {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let words = shell_words::split(raw).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigError,
                format!("command template is not valid shell syntax: {}", e),
            )
            .with_code("BRG-TPL-001")
            .with_context("template", raw)
        })?;

        let mut tokens = words
            .iter()
            .map(|word| Token::parse(word))
            .collect::<Result<Vec<_>, _>>()?;

        if tokens.is_empty() {
            return Err(
                AppError::new(ErrorCategory::ConfigError, "command template is empty")
                    .with_code("BRG-TPL-001"),
            );
        }

        let first = tokens.remove(0);
        let program = first
            .literal()
            .filter(|program| !program.is_empty())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ConfigError,
                    "the program in a command template must be a plain literal",
                )
                .with_code("BRG-TPL-003")
                .with_context("template", raw)
            })?
            .to_string();

        Ok(CommandTemplate {
            raw: raw.to_string(),
            program,
            args: tokens,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn declares(&self, placeholder: Placeholder) -> bool {
        self.args.iter().any(|token| token.uses(placeholder))
    }

    pub fn declares_output_file(&self) -> bool {
        self.declares(Placeholder::OutputFile)
    }

    pub fn declares_schema_file(&self) -> bool {
        self.declares(Placeholder::SchemaFile)
    }

    fn render_args(&self, values: &Values<'_>) -> Vec<String> {
        self.args.iter().map(|token| token.render(values)).collect()
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Inputs the resolver needs besides the request itself.
pub struct ResolveContext<'a> {
    pub config: &'a BridgeConfig,
    /// Snapshot of the environment the child inherits before isolation.
    pub base_env: &'a BTreeMap<String, String>,
    /// Path the CLI should write its result to, when the template asks for one.
    pub output_file: Option<&'a Path>,
    /// Path of the result schema, when the template asks for one.
    pub schema_file: Option<&'a Path>,
}

pub struct TemplateResolver;

impl TemplateResolver {
    /// Turn a request into a ready-to-run [`ExecutionSpec`].
    ///
    /// Pure: the same request and context always produce an identical spec.
    pub fn resolve(
        request: &ToolRequest,
        ctx: &ResolveContext<'_>,
    ) -> Result<ExecutionSpec, AppError> {
        let config = ctx.config;
        Self::check_payload(&request.payload, config.max_payload_bytes)?;

        let template = Self::template_for(request, config)?;
        let session_args = Self::session_args(request.session.as_ref())?;
        let cwd = Self::resolve_cwd(request.cwd.as_deref(), &config.workdir)?;
        let risk_args = Self::risk_args(request, config)?;

        let output_file =
            Self::allocated(template, Placeholder::OutputFile, ctx.output_file, "BRG-TPL-016")?;
        let schema_file =
            Self::allocated(template, Placeholder::SchemaFile, ctx.schema_file, "BRG-TPL-017")?;

        let cwd_text = cwd.to_string_lossy();
        let output_text = output_file.as_ref().map(|path| path.to_string_lossy());
        let schema_text = schema_file.as_ref().map(|path| path.to_string_lossy());
        let values = Values {
            payload: &request.payload,
            cwd: &cwd_text,
            output_file: output_text.as_deref(),
            schema_file: schema_text.as_deref(),
        };

        let mut args = template.render_args(&values);
        args.extend(session_args);
        args.extend(risk_args);
        args.extend(config.output_format_args.iter().cloned());
        if !template.declares(Placeholder::Payload) {
            args.push(request.payload.clone());
        }

        Ok(ExecutionSpec {
            program: template.program().to_string(),
            args,
            env: EnvIsolator::build_env(ctx.base_env, config),
            cwd,
            timeout: config.timeout,
            output_file,
            schema_file,
        })
    }

    /// The template a request runs under: the resume template when it
    /// continues a session, the main one otherwise.
    pub fn template_for<'c>(
        request: &ToolRequest,
        config: &'c BridgeConfig,
    ) -> Result<&'c CommandTemplate, AppError> {
        match (&request.session, &config.resume_template) {
            (None, _) => Ok(&config.template),
            (Some(_), Some(resume)) => Ok(resume),
            (Some(_), None) => Err(malformed(
                "session resume requested but this bridge has no resume_command",
            )
            .with_code("BRG-TPL-018")),
        }
    }

    fn allocated(
        template: &CommandTemplate,
        placeholder: Placeholder,
        path: Option<&Path>,
        code: &str,
    ) -> Result<Option<PathBuf>, AppError> {
        if !template.declares(placeholder) {
            return Ok(None);
        }
        let path = path.ok_or_else(|| {
            AppError::new(
                ErrorCategory::InternalError,
                format!(
                    "command template declares {{{{{}}}}} but no path was allocated",
                    placeholder.name()
                ),
            )
            .with_code(code)
        })?;
        Ok(Some(path.to_path_buf()))
    }

    fn session_args(session: Option<&SessionSelector>) -> Result<Vec<String>, AppError> {
        match session {
            None => Ok(Vec::new()),
            Some(SessionSelector::Last) => Ok(vec!["--last".to_string()]),
            Some(SessionSelector::Id(id)) => {
                if id.trim().is_empty() || id.contains('\0') || id.starts_with('-') {
                    return Err(malformed(format!("invalid session id '{}'", id.escape_debug()))
                        .with_code("BRG-TPL-019"));
                }
                Ok(vec![id.clone()])
            }
        }
    }

    fn check_payload(payload: &str, limit: usize) -> Result<(), AppError> {
        if payload.contains('\0') {
            return Err(malformed("payload contains a NUL byte").with_code("BRG-TPL-010"));
        }
        if payload.trim().is_empty() {
            return Err(malformed("payload is empty").with_code("BRG-TPL-011"));
        }
        if payload.len() > limit {
            return Err(malformed(format!(
                "payload is {} bytes, limit is {}",
                payload.len(),
                limit
            ))
            .with_code("BRG-TPL-012"));
        }
        Ok(())
    }

    fn resolve_cwd(requested: Option<&Path>, default: &Path) -> Result<PathBuf, AppError> {
        let Some(requested) = requested else {
            return Ok(default.to_path_buf());
        };
        if requested.to_string_lossy().contains('\0') {
            return Err(
                malformed("working directory contains a NUL byte").with_code("BRG-TPL-015")
            );
        }
        if requested.as_os_str().is_empty() {
            return Ok(default.to_path_buf());
        }
        if requested.is_absolute() {
            Ok(requested.to_path_buf())
        } else {
            Ok(default.join(requested))
        }
    }

    fn risk_args(request: &ToolRequest, config: &BridgeConfig) -> Result<Vec<String>, AppError> {
        let Some(flag) = config.risk_flag.as_ref() else {
            if let Some(requested) = request.risk {
                return Err(malformed(format!(
                    "risk level '{}' requested but this bridge has no risk flag",
                    requested
                ))
                .with_code("BRG-TPL-014"));
            }
            return Ok(Vec::new());
        };

        let ceiling = config.risk_level;
        let level = match (request.risk, ceiling) {
            (Some(requested), Some(ceiling)) if requested > ceiling => {
                return Err(malformed(format!(
                    "risk level '{}' exceeds the configured ceiling '{}'",
                    requested, ceiling
                ))
                .with_code("BRG-TPL-013"));
            }
            (Some(requested), _) => requested,
            (None, Some(ceiling)) => ceiling,
            (None, None) => return Ok(Vec::new()),
        };

        Ok(vec![flag.clone(), level.as_arg().to_string()])
    }
}

fn malformed<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::MalformedRequest, message)
}
