use crate::cli::Command;
use std::env;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// `serve` started by hand in a terminal.
    Foreground,
    /// `serve` running under a process supervisor that discards output.
    Supervised,
    /// `invoke`, whose stdout carries the response and must stay clean.
    OneShot,
}

impl ExecutionContext {
    /// Returns `true` when console sinks are off unless explicitly requested.
    pub fn quiet_by_default(self) -> bool {
        matches!(self, ExecutionContext::Supervised)
    }
}

/// Derive the active execution context from a parsed CLI command plus environment.
pub fn detect_context(command: &Command) -> ExecutionContext {
    match command {
        Command::Invoke(_) => ExecutionContext::OneShot,
        Command::Serve(_) if supervised() => ExecutionContext::Supervised,
        Command::Serve(_) => ExecutionContext::Foreground,
    }
}

/// `BRIDGE_SUPERVISED=1` or the `pm_id` variable pm2 sets on its children.
fn supervised() -> bool {
    let flagged = env::var("BRIDGE_SUPERVISED")
        .map(|value| value.trim() == "1")
        .unwrap_or(false);
    flagged || env::var_os("pm_id").is_some()
}
