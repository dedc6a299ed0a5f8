#![cfg(unix)]

use agent_bridge::core::entities::{ExecutionSpec, ExecutionStatus};
use agent_bridge::core::executor::{execute, ProcessRunner, TokioProcessRunner};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

fn sh(script: &str, timeout: Duration) -> ExecutionSpec {
    let mut env = BTreeMap::new();
    env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
    ExecutionSpec {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        env,
        cwd: std::env::temp_dir(),
        timeout,
        output_file: None,
        schema_file: None,
    }
}

/// True once `pid` no longer runs: gone entirely, or a zombie nobody reaped yet.
fn process_gone(pid: i32) -> bool {
    let alive = unsafe { libc::kill(pid, 0) } == 0;
    if !alive {
        return std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH);
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map(|rest| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => true,
    }
}

async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..40 {
        if process_gone(pid) {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

fn first_pid(stdout: &[u8]) -> i32 {
    String::from_utf8_lossy(stdout)
        .lines()
        .next()
        .and_then(|line| line.trim().parse().ok())
        .expect("script prints the background pid first")
}

#[tokio::test]
async fn timeout_kills_and_keeps_partial_output() {
    let started = Instant::now();
    let result = execute(&sh("echo partial; sleep 30", Duration::from_millis(500))).await;

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert!(String::from_utf8_lossy(&result.stdout).contains("partial"));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_kills_the_whole_process_group() {
    let result = execute(&sh(
        "sleep 30 & echo $!; wait",
        Duration::from_millis(500),
    ))
    .await;

    assert_eq!(result.status, ExecutionStatus::TimedOut);
    let grandchild = first_pid(&result.stdout);
    assert!(wait_until_gone(grandchild).await, "pid {} survived", grandchild);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn normal_exit_sweeps_background_children() {
    let started = Instant::now();
    let result = execute(&sh("sleep 30 & echo $!", Duration::from_secs(10))).await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert!(started.elapsed() < Duration::from_secs(8));
    let straggler = first_pid(&result.stdout);
    assert!(wait_until_gone(straggler).await, "pid {} survived", straggler);
}

#[tokio::test]
async fn non_zero_exit_keeps_code_and_stderr() {
    let result = execute(&sh(
        "echo out; echo first >&2; echo second >&2; exit 3",
        Duration::from_secs(5),
    ))
    .await;

    assert_eq!(result.status, ExecutionStatus::NonZeroExit { code: 3 });
    assert_eq!(result.stdout, b"out\n");
    assert_eq!(result.stderr, b"first\nsecond\n");
}

#[tokio::test]
async fn missing_program_is_spawn_failure() {
    let mut spec = sh("true", Duration::from_secs(5));
    spec.program = "/nonexistent/agent-cli".to_string();
    spec.args.clear();

    let result = TokioProcessRunner.run(&spec).await;
    match result.status {
        ExecutionStatus::SpawnFailure { error } => assert!(!error.is_empty()),
        other => panic!("expected spawn failure, got {:?}", other),
    }
}

#[tokio::test]
async fn child_sees_only_resolved_environment() {
    std::env::set_var("AGENT_BRIDGE_AMBIENT_MARKER", "leaked");
    let mut spec = sh(
        "printf '%s|%s' \"$AGENT_BRIDGE_AMBIENT_MARKER\" \"$INJECTED\"",
        Duration::from_secs(5),
    );
    spec.env.insert("INJECTED".to_string(), "yes".to_string());

    let result = execute(&spec).await;
    std::env::remove_var("AGENT_BRIDGE_AMBIENT_MARKER");

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.stdout, b"|yes");
}
