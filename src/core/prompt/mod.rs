#![allow(clippy::result_large_err)]

//! Tool arguments to instruction payload.
//!
//! Three argument shapes are supported. `raw` passes a single `prompt` string
//! through. `executor` describes an implementation task and `advisor` a
//! design decision; both are rendered into a plain-text prompt for the CLI.
//! Advisor calls may also continue an earlier CLI session.

use crate::core::entities::{SessionSelector, ToolRequest};
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, PromptStyle, RiskLevel};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

pub const MAX_OBJECTIVE_CHARS: usize = 50_000;
pub const MAX_INSTRUCTIONS_CHARS: usize = 100_000;

/// Keys of the JSON object an advisor answer must consist of.
pub const ADVISOR_OUTPUT_KEYS: [&str; 5] = [
    "clarifying_questions",
    "key_risks",
    "recommendation",
    "recommendation_confidence",
    "notes",
];
const CONFIDENCE_LEVELS: [&str; 3] = ["low", "medium", "high"];

#[derive(Debug, Deserialize)]
struct RawArgs {
    prompt: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    risk: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecutorArgs {
    #[serde(default)]
    objective: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    context: ExecutorContext,
    #[serde(default)]
    constraints: Vec<String>,
    #[serde(default)]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    risk: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExecutorContext {
    #[serde(default)]
    files_of_interest: Vec<String>,
    #[serde(default)]
    repo_root: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdvisorArgs {
    #[serde(default)]
    problem: Option<String>,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    candidate_plans: Vec<CandidatePlan>,
    #[serde(default)]
    focus_areas: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    risk: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    resume_last: bool,
}

impl AdvisorArgs {
    /// An explicit id wins over `resume_last`.
    fn session(&self) -> Option<SessionSelector> {
        match non_blank(self.session_id.as_deref()) {
            Some(id) => Some(SessionSelector::Id(id.to_string())),
            None if self.resume_last => Some(SessionSelector::Last),
            None => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CandidatePlan {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    assumptions: Vec<String>,
    #[serde(default)]
    suspicions: Vec<String>,
}

/// Decode MCP tool arguments into a [`ToolRequest`] for the given style.
pub fn request_from_arguments(
    tool: &str,
    style: PromptStyle,
    arguments: &Value,
) -> Result<ToolRequest, AppError> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        Value::Object(_) => arguments.clone(),
        _ => {
            return Err(malformed("tool arguments must be a JSON object").with_code("BRG-REQ-001"))
        }
    };

    let (payload, cwd, risk, session) = match style {
        PromptStyle::Raw => {
            let args: RawArgs = decode(arguments)?;
            (args.prompt, args.cwd, args.risk, None)
        }
        PromptStyle::Executor => {
            let args: ExecutorArgs = decode(arguments)?;
            let cwd = args.cwd.clone().or_else(|| args.context.repo_root.clone());
            let risk = args.risk.clone();
            (build_executor_prompt(&args)?, cwd, risk, None)
        }
        PromptStyle::Advisor => {
            let args: AdvisorArgs = decode(arguments)?;
            let cwd = args.cwd.clone();
            let risk = args.risk.clone();
            (build_advisor_prompt(&args)?, cwd, risk, args.session())
        }
    };

    let mut request = ToolRequest::new(tool, payload);
    if let Some(cwd) = cwd.filter(|cwd| !cwd.trim().is_empty()) {
        request = request.with_cwd(PathBuf::from(cwd));
    }
    if let Some(risk) = risk {
        let level = risk
            .parse::<RiskLevel>()
            .map_err(|e| malformed(e).with_code("BRG-REQ-003"))?;
        request = request.with_risk(level);
    }
    if let Some(session) = session {
        request = request.with_session(session);
    }
    Ok(request)
}

fn decode<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, AppError> {
    serde_json::from_value(arguments).map_err(|e| {
        malformed(format!("invalid tool arguments: {}", e)).with_code("BRG-REQ-001")
    })
}

fn build_executor_prompt(args: &ExecutorArgs) -> Result<String, AppError> {
    let objective = non_blank(args.objective.as_deref())
        .or_else(|| non_blank(args.task_id.as_deref()))
        .ok_or_else(|| malformed("objective is required").with_code("BRG-REQ-002"))?;
    if objective.chars().count() > MAX_OBJECTIVE_CHARS {
        return Err(malformed(format!(
            "objective exceeds {} characters",
            MAX_OBJECTIVE_CHARS
        ))
        .with_code("BRG-REQ-002"));
    }
    let instructions = non_blank(args.instructions.as_deref());
    if instructions.is_some_and(|text| text.chars().count() > MAX_INSTRUCTIONS_CHARS) {
        return Err(malformed(format!(
            "instructions exceed {} characters",
            MAX_INSTRUCTIONS_CHARS
        ))
        .with_code("BRG-REQ-002"));
    }

    let mut parts = vec![format!("Objective: {}", objective)];
    if let Some(instructions) = instructions {
        parts.push(format!("Instructions: {}", instructions));
    }
    if !args.context.files_of_interest.is_empty() {
        parts.push(format!(
            "Relevant files: {}",
            args.context.files_of_interest.join(", ")
        ));
    }
    if !args.constraints.is_empty() {
        parts.push(format!("Constraints: {}", args.constraints.join("; ")));
    }
    if !args.acceptance_criteria.is_empty() {
        parts.push(format!(
            "Acceptance criteria: {}",
            args.acceptance_criteria.join("; ")
        ));
    }
    parts.push(String::new());
    parts.push(
        "Act as an implementation-focused coding agent. \
         Execute the necessary edits and commands in the current repository to satisfy the objective \
         and acceptance criteria. Return a concise JSON summary of what you did."
            .to_string(),
    );

    Ok(parts.join("\n"))
}

fn build_advisor_prompt(args: &AdvisorArgs) -> Result<String, AppError> {
    let problem = non_blank(args.problem.as_deref())
        .ok_or_else(|| malformed("problem is required").with_code("BRG-REQ-002"))?;

    let mut lines = vec![
        "You are a senior technical design advisor. \
         You will receive a description of a design decision that is about to be made. \
         Analyze it carefully and respond ONLY with a single JSON object."
            .to_string(),
        String::new(),
        "Decision request:".to_string(),
        format!("- problem: {}", problem),
    ];
    if let Some(context) = non_blank(args.context.as_deref()) {
        lines.push(format!("- context: {}", context));
    }
    if !args.focus_areas.is_empty() {
        lines.push(format!("- focus_areas: {}", args.focus_areas.join(", ")));
    }

    if !args.candidate_plans.is_empty() {
        lines.push(String::new());
        lines.push("Candidate plans:".to_string());
        for (idx, plan) in args.candidate_plans.iter().enumerate() {
            let name = non_blank(plan.name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| format!("plan-{}", idx + 1));
            let description = plan.description.as_deref().unwrap_or("");
            lines.push(format!("- {}: {}", name, description));
            if !plan.assumptions.is_empty() {
                lines.push(format!("  assumptions: {}", plan.assumptions.join(", ")));
            }
            if !plan.suspicions.is_empty() {
                lines.push(format!("  concerns: {}", plan.suspicions.join(", ")));
            }
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Think step by step, but do NOT show your reasoning. \
         Output a single JSON object with exactly the keys {}. \
         recommendation_confidence is one of {}. \
         Do not include any extra keys, comments, or surrounding text.",
        ADVISOR_OUTPUT_KEYS.join(", "),
        CONFIDENCE_LEVELS.join(", ")
    ));

    Ok(lines.join("\n"))
}

/// JSON Schema advertised in `tools/list` for a prompt style.
pub fn input_schema(style: PromptStyle) -> Value {
    let common = json!({
        "cwd": {
            "type": "string",
            "description": "Working directory for the agent; relative paths resolve against the bridge workdir"
        },
        "risk": {
            "type": "string",
            "enum": ["read-only", "low", "medium", "high"],
            "description": "Risk level for this call; may not exceed the configured level"
        }
    });

    let (mut properties, required) = match style {
        PromptStyle::Raw => (
            json!({
                "prompt": {"type": "string", "description": "Instruction passed to the agent verbatim"}
            }),
            json!(["prompt"]),
        ),
        PromptStyle::Executor => (
            json!({
                "objective": {"type": "string", "maxLength": MAX_OBJECTIVE_CHARS},
                "task_id": {"type": "string", "description": "Used as the objective when none is given"},
                "instructions": {"type": "string", "maxLength": MAX_INSTRUCTIONS_CHARS},
                "context": {
                    "type": "object",
                    "properties": {
                        "files_of_interest": {"type": "array", "items": {"type": "string"}},
                        "repo_root": {"type": "string"}
                    }
                },
                "constraints": {"type": "array", "items": {"type": "string"}},
                "acceptance_criteria": {"type": "array", "items": {"type": "string"}}
            }),
            json!(["objective"]),
        ),
        PromptStyle::Advisor => (
            json!({
                "problem": {"type": "string"},
                "context": {"type": "string"},
                "candidate_plans": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "description": {"type": "string"},
                            "assumptions": {"type": "array", "items": {"type": "string"}},
                            "suspicions": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                },
                "focus_areas": {"type": "array", "items": {"type": "string"}},
                "session_id": {
                    "type": "string",
                    "description": "Continue this earlier session instead of starting a new one"
                },
                "resume_last": {
                    "type": "boolean",
                    "description": "Continue the most recent session; ignored when session_id is set"
                }
            }),
            json!(["problem"]),
        ),
    };

    if let (Some(map), Value::Object(extra)) = (properties.as_object_mut(), common) {
        map.extend(extra);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

/// JSON Schema the CLI's answer must satisfy, for styles with a fixed answer shape.
pub fn output_schema(style: PromptStyle) -> Option<Value> {
    match style {
        PromptStyle::Advisor => Some(json!({
            "type": "object",
            "additionalProperties": false,
            "required": ADVISOR_OUTPUT_KEYS,
            "properties": {
                "clarifying_questions": {"type": "array", "items": {"type": "string"}},
                "key_risks": {"type": "array", "items": {"type": "string"}},
                "recommendation": {"type": "string"},
                "recommendation_confidence": {"type": "string", "enum": CONFIDENCE_LEVELS},
                "notes": {"type": "string"}
            }
        })),
        PromptStyle::Raw | PromptStyle::Executor => None,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}

fn malformed<T: Into<String>>(message: T) -> AppError {
    AppError::new(ErrorCategory::MalformedRequest, message)
}
