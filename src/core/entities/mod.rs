use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use crate::core::types::RiskLevel;

/// One inbound tool call, after the transport has decoded its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    /// Tool name the caller addressed.
    pub tool: String,
    /// Instruction text handed to the CLI as its final argument.
    pub payload: String,
    /// Working directory for the subprocess; relative paths resolve against the bridge workdir.
    pub cwd: Option<PathBuf>,
    /// Optional risk level, never above the configured ceiling.
    pub risk: Option<RiskLevel>,
    /// Earlier CLI session to continue instead of starting a fresh one.
    pub session: Option<SessionSelector>,
}

/// Which prior session a resumed call continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelector {
    Id(String),
    /// The CLI's most recent session.
    Last,
}

impl ToolRequest {
    pub fn new<T: Into<String>, P: Into<String>>(tool: T, payload: P) -> Self {
        Self {
            tool: tool.into(),
            payload: payload.into(),
            cwd: None,
            risk: None,
            session: None,
        }
    }

    pub fn with_cwd<P: Into<PathBuf>>(mut self, cwd: P) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk = Some(risk);
        self
    }

    pub fn with_session(mut self, session: SessionSelector) -> Self {
        self.session = Some(session);
        self
    }
}

/// Fully resolved, ready-to-run description of one subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Complete child environment; the executor clears the inherited one.
    pub env: BTreeMap<String, String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    /// File the CLI was told to write its structured result into.
    pub output_file: Option<PathBuf>,
    /// JSON schema the CLI was told its result must satisfy.
    pub schema_file: Option<PathBuf>,
}

impl ExecutionSpec {
    /// Program plus arguments, for diagnostics only.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        shell_words::join(parts)
    }
}

/// Terminal state of one subprocess execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    NonZeroExit { code: i32 },
    TimedOut,
    SpawnFailure { error: String },
}

/// Raw outcome of one subprocess execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn spawn_failure<T: Into<String>>(error: T, elapsed: Duration) -> Self {
        Self {
            status: ExecutionStatus::SpawnFailure {
                error: error.into(),
            },
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            elapsed,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

/// Failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedRequest,
    SpawnFailure,
    NonZeroExit,
    TimedOut,
    UnparseableOutput,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::MalformedRequest => "malformed_request",
            FailureKind::SpawnFailure => "spawn_failure",
            FailureKind::NonZeroExit => "non_zero_exit",
            FailureKind::TimedOut => "timed_out",
            FailureKind::UnparseableOutput => "unparseable_output",
            FailureKind::Internal => "internal",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Truncated raw output kept for diagnosis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolFailure {
    pub fn new<T: Into<String>>(kind: FailureKind, message: T) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            stderr: None,
            diagnostics: None,
            elapsed_ms: 0,
        }
    }
}

/// Structured outcome returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success { payload: Value, elapsed_ms: u64 },
    #[serde(rename = "error")]
    Failure(ToolFailure),
}

impl ToolResponse {
    pub fn failure<T: Into<String>>(kind: FailureKind, message: T) -> Self {
        ToolResponse::Failure(ToolFailure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ToolResponse::Success { .. } => None,
            ToolResponse::Failure(failure) => Some(failure.kind),
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ToolResponse::Success { payload, .. } => Some(payload),
            ToolResponse::Failure(_) => None,
        }
    }
}
