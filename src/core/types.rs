use serde::{Deserialize, Serialize};

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    MalformedRequest,
    SpawnFailure,
    NonZeroExit,
    TimedOut,
    UnparseableOutput,
    ConfigError,
    IoError,
    InternalError,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

/// Lifecycle phases a single tool request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestPhase {
    Received,
    Resolving,
    Spawned,
    Succeeded,
    TimedOut,
    NonZeroExit,
    SpawnFailure,
    Parsed,
    Responded,
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How permissive the wrapped CLI may be about applying changes.
///
/// Ordered from least to most permissive so a request can be checked against
/// the configured ceiling with a plain comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskLevel {
    ReadOnly,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Value passed to the CLI after the configured risk flag.
    pub fn as_arg(self) -> &'static str {
        match self {
            RiskLevel::ReadOnly => "read-only",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "read-only" | "readonly" | "read_only" => Ok(RiskLevel::ReadOnly),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            _ => Err(format!(
                "invalid risk level '{}'; supported values are read-only, low, medium, high",
                value
            )),
        }
    }
}

/// Shape of the arguments a bridge accepts and how they become a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptStyle {
    /// A single `prompt` string passed through untouched.
    #[default]
    Raw,
    /// Implementation task: objective, instructions, context, constraints, acceptance criteria.
    Executor,
    /// Design review: problem, context, candidate plans, focus areas.
    Advisor,
}
