use crate::core::entities::{
    ExecutionResult, ExecutionStatus, FailureKind, ToolFailure, ToolResponse,
};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Raw output kept in a failure for diagnosis.
pub const DIAGNOSTIC_LIMIT_BYTES: usize = 2048;

/// Upper bound on `{`/`[` positions tried when scanning noisy output.
pub const MAX_CANDIDATES: usize = 4096;

/// Turn a finished execution into the response the caller sees.
///
/// `output_file` is the content of the file the CLI was told to write, when
/// the template declared one. Empty or whitespace-only content falls back to
/// stdout.
pub fn interpret(result: &ExecutionResult, output_file: Option<&[u8]>) -> ToolResponse {
    let elapsed_ms = result.elapsed_ms();

    match &result.status {
        ExecutionStatus::Success => {}
        ExecutionStatus::TimedOut => {
            return failure(
                result,
                FailureKind::TimedOut,
                format!("subprocess exceeded its timeout after {} ms", elapsed_ms),
                None,
            );
        }
        ExecutionStatus::NonZeroExit { code } => {
            return failure(
                result,
                FailureKind::NonZeroExit,
                format!("subprocess exited with code {}", code),
                Some(*code),
            );
        }
        ExecutionStatus::SpawnFailure { error } => {
            return failure(result, FailureKind::SpawnFailure, error.clone(), None);
        }
    }

    let source = match output_file {
        Some(content) if !String::from_utf8_lossy(content).trim().is_empty() => content,
        _ => result.stdout.as_slice(),
    };
    let text = String::from_utf8_lossy(source);

    match extract_structured(&text) {
        Some(payload) => ToolResponse::Success {
            payload,
            elapsed_ms,
        },
        None => {
            let mut failure = ToolFailure::new(
                FailureKind::UnparseableOutput,
                "subprocess output did not contain a JSON object or array",
            );
            failure.diagnostics = Some(truncate_diagnostic(&text));
            failure.stderr = non_empty(&result.stderr);
            failure.elapsed_ms = elapsed_ms;
            ToolResponse::Failure(failure)
        }
    }
}

/// Find the first complete JSON object or array in `text`.
///
/// The whole trimmed text is tried first so clean output never pays for the
/// scan. Scalars are ignored: a bare `42` in a log line is not a result.
pub fn extract_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .take(MAX_CANDIDATES)
        .find_map(|(idx, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) if value.is_object() || value.is_array() => Some(value),
                _ => None,
            }
        })
}

/// Keep at most [`DIAGNOSTIC_LIMIT_BYTES`] of `text`, cut on a char boundary.
/// Forms a CLI uses to announce its session, most specific first.
const SESSION_ID_PATTERNS: [&str; 4] = [
    r"(?i)session id:\s*([a-f0-9-]+)",
    r"(?i)session[_-]?id[:\s]+([a-f0-9-]+)",
    r#"(?i)"conversationId":\s*"([^"]+)""#,
    r#"(?i)"threadId":\s*"([^"]+)""#,
];

fn session_id_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SESSION_ID_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Find the session id a CLI reported, searching stdout before stderr.
pub fn extract_session_id(stdout: &str, stderr: &str) -> Option<String> {
    [stdout, stderr].into_iter().find_map(|text| {
        session_id_patterns().iter().find_map(|re| {
            re.captures(text)
                .and_then(|cap| cap.get(1))
                .map(|id| id.as_str().to_string())
        })
    })
}

/// Add `session_id` to an object payload that does not already carry one.
pub fn attach_session_id(response: ToolResponse, session_id: &str) -> ToolResponse {
    match response {
        ToolResponse::Success {
            payload: Value::Object(mut map),
            elapsed_ms,
        } => {
            map.entry("session_id")
                .or_insert_with(|| Value::String(session_id.to_string()));
            ToolResponse::Success {
                payload: Value::Object(map),
                elapsed_ms,
            }
        }
        other => other,
    }
}

pub fn truncate_diagnostic(text: &str) -> String {
    if text.len() <= DIAGNOSTIC_LIMIT_BYTES {
        return text.to_string();
    }
    let mut end = DIAGNOSTIC_LIMIT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}

fn non_empty(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn failure(
    result: &ExecutionResult,
    kind: FailureKind,
    message: String,
    exit_code: Option<i32>,
) -> ToolResponse {
    let mut failure = ToolFailure::new(kind, message);
    failure.exit_code = exit_code;
    failure.elapsed_ms = result.elapsed_ms();

    // Non-zero exits carry the full captured stderr; other kinds only a preview.
    failure.stderr = match kind {
        FailureKind::NonZeroExit => non_empty(&result.stderr),
        _ => non_empty(&result.stderr)
            .map(|stderr| truncate_diagnostic(&stderr)),
    };
    if !result.stdout.is_empty() {
        failure.diagnostics = Some(truncate_diagnostic(&String::from_utf8_lossy(
            &result.stdout,
        )));
    }

    ToolResponse::Failure(failure)
}
