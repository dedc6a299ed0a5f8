//! Per-request orchestration: resolve, execute, interpret.
//!
//! Every outcome, including a panic inside the pipeline, becomes a
//! [`ToolResponse`]; nothing a caller sends can take the service down.

use crate::core::config::BridgeConfig;
use crate::core::entities::{
    ExecutionResult, ExecutionStatus, FailureKind, SessionSelector, ToolFailure, ToolRequest,
    ToolResponse,
};
use crate::core::error::AppError;
use crate::core::executor::{ProcessRunner, TokioProcessRunner};
use crate::core::interpreter::{attach_session_id, extract_session_id, interpret};
use crate::core::prompt::{output_schema, request_from_arguments};
use crate::core::template::{ResolveContext, TemplateResolver};
use crate::core::types::{ErrorCategory, ErrorSeverity, RequestPhase};
use crate::utils::env::EnvIsolator;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Slack on top of the request timeout before the backstop fires.
///
/// Covers the executor's reap and drain windows plus output-file reading.
pub const BACKSTOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RequestHandler {
    config: Arc<BridgeConfig>,
    runner: Arc<dyn ProcessRunner>,
    base_env: Arc<BTreeMap<String, String>>,
}

impl RequestHandler {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner))
    }

    pub fn with_runner(config: Arc<BridgeConfig>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config,
            runner,
            base_env: Arc::new(EnvIsolator::snapshot()),
        }
    }

    /// Replace the ambient environment snapshot children inherit from.
    pub fn with_base_env(mut self, base_env: BTreeMap<String, String>) -> Self {
        self.base_env = Arc::new(base_env);
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Decode MCP-style arguments with the configured prompt style and handle them.
    pub async fn handle_arguments(&self, arguments: &Value) -> ToolResponse {
        match request_from_arguments(&self.config.name, self.config.prompt_style, arguments) {
            Ok(request) => self.handle(request).await,
            Err(err) => rejected(&err, 0),
        }
    }

    pub async fn handle(&self, request: ToolRequest) -> ToolResponse {
        let request_id = Uuid::new_v4();
        let span = info_span!("tool_request", %request_id, tool = %request.tool);
        let started = Instant::now();
        let backstop = self.config.timeout.saturating_add(BACKSTOP_GRACE);

        let pipeline = run_pipeline(
            Arc::clone(&self.config),
            Arc::clone(&self.runner),
            Arc::clone(&self.base_env),
            request,
        )
        .instrument(span.clone());
        let mut task = tokio::spawn(pipeline);

        let response = match tokio::time::timeout(backstop, &mut task).await {
            Ok(Ok(response)) => response,
            Ok(Err(join_err)) => {
                error!(parent: &span, error = %join_err, "request pipeline panicked");
                internal("request pipeline failed unexpectedly", started)
            }
            Err(_) => {
                error!(
                    parent: &span,
                    backstop_ms = backstop.as_millis() as u64,
                    "request exceeded its backstop deadline; aborting"
                );
                task.abort();
                // Dropping the aborted pipeline kills its process group.
                let _ = task.await;
                internal("request exceeded its backstop deadline", started)
            }
        };

        info!(
            parent: &span,
            phase = %RequestPhase::Responded,
            success = response.is_success(),
            kind = ?response.failure_kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        response
    }
}

async fn run_pipeline(
    config: Arc<BridgeConfig>,
    runner: Arc<dyn ProcessRunner>,
    base_env: Arc<BTreeMap<String, String>>,
    request: ToolRequest,
) -> ToolResponse {
    let started = Instant::now();
    debug!(
        phase = %RequestPhase::Received,
        payload_bytes = request.payload.len(),
        cwd = ?request.cwd,
        risk = ?request.risk,
        "request received"
    );

    debug!(phase = %RequestPhase::Resolving, "resolving request");
    let template = match TemplateResolver::template_for(&request, &config) {
        Ok(template) => template,
        Err(err) => return rejected(&err, started.elapsed().as_millis() as u64),
    };

    // Both files are removed from disk when this request finishes.
    let output_file = if template.declares_output_file() {
        match temp_file(".json", None) {
            Ok(path) => Some(path),
            Err(err) => return rejected(&err, started.elapsed().as_millis() as u64),
        }
    } else {
        None
    };
    let schema_file = if template.declares_schema_file() {
        match schema_temp_file(&config) {
            Ok(path) => Some(path),
            Err(err) => return rejected(&err, started.elapsed().as_millis() as u64),
        }
    } else {
        None
    };

    let ctx = ResolveContext {
        config: &config,
        base_env: &base_env,
        output_file: output_file.as_deref(),
        schema_file: schema_file.as_deref(),
    };
    let spec = match TemplateResolver::resolve(&request, &ctx) {
        Ok(spec) => spec,
        Err(err) => return rejected(&err, started.elapsed().as_millis() as u64),
    };

    debug!(
        phase = %RequestPhase::Spawned,
        command = %spec.command_line(),
        cwd = %spec.cwd.display(),
        "spawning subprocess"
    );
    let result = runner.run(&spec).await;

    let phase = match &result.status {
        ExecutionStatus::Success => RequestPhase::Succeeded,
        ExecutionStatus::NonZeroExit { .. } => RequestPhase::NonZeroExit,
        ExecutionStatus::TimedOut => RequestPhase::TimedOut,
        ExecutionStatus::SpawnFailure { .. } => RequestPhase::SpawnFailure,
    };
    info!(
        phase = %phase,
        elapsed_ms = result.elapsed_ms(),
        stdout_bytes = result.stdout.len(),
        stderr_bytes = result.stderr.len(),
        stdout_truncated = result.stdout_truncated,
        "subprocess finished"
    );

    let file_content = match (&result.status, &spec.output_file) {
        (ExecutionStatus::Success, Some(path)) => match tokio::fs::read(path).await {
            Ok(content) => Some(content),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "output file unreadable; using stdout");
                None
            }
        },
        _ => None,
    };

    let mut response = interpret(&result, file_content.as_deref());
    if config.resume_template.is_some() {
        if let Some(session_id) = session_id_for(&request, &result) {
            response = attach_session_id(response, &session_id);
        }
    }
    debug!(phase = %RequestPhase::Parsed, success = response.is_success(), "output interpreted");
    response
}

/// The id the CLI reported, else the one the caller asked to resume.
fn session_id_for(request: &ToolRequest, result: &ExecutionResult) -> Option<String> {
    let stdout = String::from_utf8_lossy(&result.stdout);
    let stderr = String::from_utf8_lossy(&result.stderr);
    extract_session_id(&stdout, &stderr).or_else(|| match &request.session {
        Some(SessionSelector::Id(id)) => Some(id.clone()),
        Some(SessionSelector::Last) | None => None,
    })
}

fn temp_file(suffix: &str, contents: Option<&[u8]>) -> Result<TempPath, AppError> {
    let mut file = tempfile::Builder::new()
        .prefix("agent-bridge-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to allocate temporary file: {}", e),
            )
        })?;
    if let Some(contents) = contents {
        file.write_all(contents)
            .and_then(|_| file.flush())
            .map_err(|e| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("failed to write temporary file: {}", e),
                )
            })?;
    }
    Ok(file.into_temp_path())
}

fn schema_temp_file(config: &BridgeConfig) -> Result<TempPath, AppError> {
    let schema = output_schema(config.prompt_style).ok_or_else(|| {
        AppError::new(
            ErrorCategory::InternalError,
            format!(
                "prompt style '{:?}' has no result schema for {{{{schema_file}}}}",
                config.prompt_style
            ),
        )
        .with_code("BRG-TPL-017")
    })?;
    let bytes = serde_json::to_vec_pretty(&schema).map_err(|e| {
        AppError::new(
            ErrorCategory::InternalError,
            format!("failed to encode result schema: {}", e),
        )
    })?;
    temp_file(".schema.json", Some(&bytes))
}

fn rejected(err: &AppError, elapsed_ms: u64) -> ToolResponse {
    match err.severity() {
        ErrorSeverity::Warning | ErrorSeverity::Info => {
            warn!(code = %err.code, error = %err.message, "request rejected")
        }
        ErrorSeverity::Error => {
            error!(
                code = %err.code,
                category = ?err.category,
                error = %err.message,
                "request failed before spawning"
            )
        }
    }
    ToolResponse::Failure(failure_from_error(err, elapsed_ms))
}

fn failure_from_error(err: &AppError, elapsed_ms: u64) -> ToolFailure {
    let kind = match err.category {
        ErrorCategory::MalformedRequest => FailureKind::MalformedRequest,
        ErrorCategory::SpawnFailure => FailureKind::SpawnFailure,
        ErrorCategory::NonZeroExit => FailureKind::NonZeroExit,
        ErrorCategory::TimedOut => FailureKind::TimedOut,
        ErrorCategory::UnparseableOutput => FailureKind::UnparseableOutput,
        ErrorCategory::ConfigError | ErrorCategory::IoError | ErrorCategory::InternalError => {
            FailureKind::Internal
        }
    };
    let mut failure = ToolFailure::new(kind, err.message.clone());
    failure.elapsed_ms = elapsed_ms;
    failure
}

fn internal<T: Into<String>>(message: T, started: Instant) -> ToolResponse {
    let mut failure = ToolFailure::new(FailureKind::Internal, message);
    failure.elapsed_ms = started.elapsed().as_millis() as u64;
    ToolResponse::Failure(failure)
}
