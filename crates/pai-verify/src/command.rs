//! CLI contract verification.
//!
//! A declared command signature like `email search --json <query>` is
//! split into the invocable first token and its remainder. `<name>` and
//! `[name]` placeholders are substituted from the caller's plan when a
//! value is provided; otherwise they pass through literally and are
//! reported in the outcome. The invocable is resolved against the
//! process PATH, executed under a deadline, and judged by its exit code.

use crate::report::CliCheckOutcome;
use crate::validate::{SchemaValidator, ValidationIssue};
use pai_registry::VerifyStatus;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Largest stdout/stderr capture per execution.
const CAPTURE_LIMIT: usize = 64 * 1024;

/// Length of the stderr excerpt recorded in verification details.
const STDERR_EXCERPT: usize = 1024;

/// Caller-supplied placeholder values for command signatures.
pub type CommandPlan = HashMap<String, String>;

/// Splits a command signature into its invocable and arguments,
/// substituting placeholders from the plan.
///
/// Returns `(argv, unresolved)` where `unresolved` lists placeholders
/// that had no plan value and were passed through literally.
pub fn parse_command_signature(signature: &str, plan: &CommandPlan) -> (Vec<String>, Vec<String>) {
    let mut argv = Vec::new();
    let mut unresolved = Vec::new();
    for token in signature.split_whitespace() {
        let placeholder = token
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .or_else(|| token.strip_prefix('[').and_then(|t| t.strip_suffix(']')));
        match placeholder {
            Some(name) => match plan.get(name) {
                Some(value) => argv.push(value.clone()),
                None => {
                    unresolved.push(name.to_string());
                    argv.push(token.to_string());
                }
            },
            None => argv.push(token.to_string()),
        }
    }
    (argv, unresolved)
}

/// Locates an executable by name, like shell `which`.
///
/// A token containing a path separator is treated as a direct path.
pub fn resolve_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let resolved = dir.join(name);
        resolved.is_file().then_some(resolved)
    })
}

/// Runs one CLI contract check.
///
/// `quick` skips execution and passes on PATH presence alone. When
/// `output_schema` is given, captured stdout must parse as JSON and
/// validate against it.
pub async fn check_cli_contract(
    contract_id: i64,
    signature: &str,
    working_dir: Option<&Path>,
    output_schema: Option<&Path>,
    validator: &mut SchemaValidator,
    plan: &CommandPlan,
    quick: bool,
    timeout: Duration,
) -> CliCheckOutcome {
    let started = Instant::now();
    let (argv, unresolved) = parse_command_signature(signature, plan);
    let mut outcome = CliCheckOutcome::new(contract_id, signature);
    outcome.unresolved_placeholders = unresolved;

    let Some(invocable) = argv.first().cloned() else {
        outcome.status = VerifyStatus::Fail;
        outcome.reason = Some("empty_command".into());
        return outcome;
    };

    let Some(resolved) = resolve_executable(&invocable) else {
        debug!(command = %invocable, "invocable not on PATH");
        outcome.status = VerifyStatus::Fail;
        outcome.reason = Some("not_found".into());
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        return outcome;
    };

    if quick {
        outcome.status = VerifyStatus::Pass;
        outcome.quick = true;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        return outcome;
    }

    let mut cmd = Command::new(&resolved);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            outcome.status = VerifyStatus::Fail;
            outcome.reason = Some(format!("spawn_error: {e}"));
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            return outcome;
        }
    };

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");
    let stdout_task = tokio::spawn(read_capped(stdout, CAPTURE_LIMIT));
    let stderr_task = tokio::spawn(read_capped(stderr, CAPTURE_LIMIT));

    let wait = tokio::time::timeout(timeout, child.wait()).await;
    let exit = match wait {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            outcome.status = VerifyStatus::Fail;
            outcome.reason = Some(format!("wait_error: {e}"));
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            return outcome;
        }
        Err(_) => {
            // Deadline expired: kill and reap, the outcome is a timeout.
            warn!(command = %signature, timeout_ms = timeout.as_millis() as u64, "command timed out");
            let _ = child.start_kill();
            let _ = child.wait().await;
            outcome.status = VerifyStatus::Fail;
            outcome.reason = Some("timeout".into());
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            return outcome;
        }
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    outcome.exit_code = exit.code();
    outcome.duration_ms = started.elapsed().as_millis() as u64;
    outcome.stderr_excerpt = excerpt(&stderr_bytes);

    if !exit.success() {
        outcome.status = VerifyStatus::Fail;
        outcome.reason = Some("nonzero_exit".into());
        return outcome;
    }

    if let Some(schema_path) = output_schema {
        let stdout_text = String::from_utf8_lossy(&stdout_bytes);
        let payload: serde_json::Value = match serde_json::from_str(stdout_text.trim()) {
            Ok(value) => value,
            Err(e) => {
                outcome.status = VerifyStatus::Fail;
                outcome.reason = Some(format!("invalid_json: {e}"));
                return outcome;
            }
        };
        match validator.validate(schema_path, &payload) {
            Ok(issues) if issues.is_empty() => {}
            Ok(issues) => {
                outcome.status = VerifyStatus::Fail;
                outcome.reason = Some("schema_violation".into());
                outcome.validation_issues = issues;
                return outcome;
            }
            Err(e) => {
                outcome.status = VerifyStatus::Fail;
                outcome.reason = Some(format!("schema_error: {e}"));
                return outcome;
            }
        }
    }

    outcome.status = VerifyStatus::Pass;
    outcome
}

/// Reads at most `limit` bytes, then drains the rest so the child never
/// blocks on a full pipe.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R, limit: usize) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < limit {
                    let take = n.min(limit - captured.len());
                    captured.extend_from_slice(&buf[..take]);
                }
            }
        }
    }
    captured
}

fn excerpt(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(STDERR_EXCERPT).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(pairs: &[(&str, &str)]) -> CommandPlan {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn run(signature: &str, schema: Option<&Path>, quick: bool) -> CliCheckOutcome {
        let mut validator = SchemaValidator::new();
        check_cli_contract(
            1,
            signature,
            None,
            schema,
            &mut validator,
            &CommandPlan::new(),
            quick,
            Duration::from_secs(5),
        )
        .await
    }

    #[test]
    fn test_signature_split() {
        let (argv, unresolved) = parse_command_signature("email search --json", &plan(&[]));
        assert_eq!(argv, vec!["email", "search", "--json"]);
        assert!(unresolved.is_empty());
    }

    #[test]
    fn test_placeholder_substitution() {
        let (argv, unresolved) =
            parse_command_signature("email search <query> [limit]", &plan(&[("query", "rust")]));
        assert_eq!(argv, vec!["email", "search", "rust", "[limit]"]);
        assert_eq!(unresolved, vec!["limit"]);
    }

    #[test]
    fn test_resolve_executable() {
        assert!(resolve_executable("sh").is_some());
        assert!(resolve_executable("definitely-not-a-binary-pai").is_none());
        // Direct paths bypass PATH lookup.
        assert!(resolve_executable("/bin/sh").is_some());
    }

    #[tokio::test]
    async fn test_missing_command_is_not_found() {
        let outcome = run("definitely-not-a-binary-pai --flag", None, false).await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.reason.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_quick_mode_passes_on_presence() {
        let outcome = run("sh -c exit", None, true).await;
        assert_eq!(outcome.status, VerifyStatus::Pass);
        assert!(outcome.quick);
        assert!(outcome.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_exit_zero_passes() {
        let outcome = run("true", None, false).await;
        assert_eq!(outcome.status, VerifyStatus::Pass);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let outcome = run("false", None, false).await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.reason.as_deref(), Some("nonzero_exit"));
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_stderr_excerpt_captured() {
        let mut validator = SchemaValidator::new();
        let outcome = check_cli_contract(
            1,
            "sh -c <script>",
            None,
            None,
            &mut validator,
            &plan(&[("script", "echo oops >&2; exit 3")]),
            false,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr_excerpt.as_deref(), Some("oops"));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let mut validator = SchemaValidator::new();
        let started = Instant::now();
        let outcome = check_cli_contract(
            1,
            "sleep 30",
            None,
            None,
            &mut validator,
            &CommandPlan::new(),
            false,
            Duration::from_millis(200),
        )
        .await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.reason.as_deref(), Some("timeout"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_json_output_validated() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("out.json");
        std::fs::write(
            &schema,
            r#"{"type": "object", "required": ["ok"], "properties": {"ok": {"type": "boolean"}}}"#,
        )
        .unwrap();

        let mut validator = SchemaValidator::new();
        let good = check_cli_contract(
            1,
            "echo {\"ok\":true}",
            None,
            Some(&schema),
            &mut validator,
            &CommandPlan::new(),
            false,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(good.status, VerifyStatus::Pass, "{:?}", good.reason);

        let bad = check_cli_contract(
            1,
            "echo {\"wrong\":1}",
            None,
            Some(&schema),
            &mut validator,
            &CommandPlan::new(),
            false,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(bad.status, VerifyStatus::Fail);
        assert_eq!(bad.reason.as_deref(), Some("schema_violation"));
        assert_eq!(bad.validation_issues.len(), 1);
    }

    #[tokio::test]
    async fn test_non_json_output_with_schema_fails() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("out.json");
        std::fs::write(&schema, r#"{"type": "object"}"#).unwrap();

        let outcome = run("echo not-json", Some(&schema), false).await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert!(outcome.reason.as_deref().unwrap().starts_with("invalid_json"));
    }
}
