//! MCP server verification over stdio JSON-RPC.
//!
//! The probe spawns the configured start command with piped stdio,
//! performs the JSON-RPC 2.0 handshake (`initialize`, the `initialized`
//! notification, then `tools/list`), and compares the reported tool
//! names with the declared set.
//!
//! Responses are correlated by request id, never by arrival order;
//! notifications and unrelated responses in between are skipped. The
//! child is always reaped: stdin closes first, a grace timer lets the
//! server exit cleanly, then it is killed.

use pai_registry::VerifyStatus;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// How long a server gets to exit after stdin closes before SIGKILL.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Why an MCP check failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum McpFailure {
    #[serde(rename = "startup_error")]
    StartupError,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "protocol_error")]
    ProtocolError,
    #[serde(rename = "missing_tools")]
    MissingTools,
    #[serde(rename = "extra_tools")]
    ExtraTools,
}

/// Outcome of probing one MCP server.
#[derive(Debug, Clone, Serialize)]
pub struct McpCheckOutcome {
    pub status: VerifyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<McpFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Declared tools the server reported.
    pub found: Vec<String>,
    /// Declared tools the server did not report. Non-empty always fails.
    pub missing: Vec<String>,
    /// Reported tools that were never declared. Reported, not a failure,
    /// unless strict mode says otherwise.
    pub extra: Vec<String>,
    pub duration_ms: u64,
}

impl McpCheckOutcome {
    pub fn details(&self) -> Value {
        serde_json::to_value(self).expect("outcome serialization cannot fail")
    }
}

#[derive(Debug)]
enum ProbeError {
    Protocol(String),
    ClosedStream,
}

/// Runs the JSON-RPC handshake against arbitrary stdio-like streams and
/// returns the tool names the server reports.
///
/// Split out from process management so protocol behavior is testable
/// against in-memory streams.
pub async fn probe_mcp_server<R, W>(reader: &mut R, writer: &mut W) -> Result<Vec<String>, String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match handshake(reader, writer).await {
        Ok(tools) => Ok(tools),
        Err(ProbeError::Protocol(msg)) => Err(msg),
        Err(ProbeError::ClosedStream) => Err("server closed its stdio".to_string()),
    }
}

async fn handshake<R, W>(reader: &mut R, writer: &mut W) -> Result<Vec<String>, ProbeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send(
        writer,
        &json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": {"name": "pai-deps", "version": env!("CARGO_PKG_VERSION")}
            }
        }),
    )
    .await?;
    let _initialize_result = await_response(reader, 1).await?;

    send(
        writer,
        &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await?;

    send(
        writer,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await?;
    let listing = await_response(reader, 2).await?;

    let tools = listing
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| ProbeError::Protocol("tools/list result has no tools array".into()))?;
    Ok(tools
        .iter()
        .filter_map(|tool| tool.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> Result<(), ProbeError> {
    let mut line = message.to_string();
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|e| ProbeError::Protocol(format!("write failed: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ProbeError::Protocol(format!("flush failed: {e}")))?;
    Ok(())
}

/// Reads frames until the response whose id matches `expected`.
///
/// Notifications and responses to other requests are skipped; a frame
/// that is not JSON at all is a protocol error.
async fn await_response<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    expected: i64,
) -> Result<Value, ProbeError> {
    loop {
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ProbeError::Protocol(format!("read failed: {e}")))?;
        if read == 0 {
            return Err(ProbeError::ClosedStream);
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let frame: Value = serde_json::from_str(line)
            .map_err(|e| ProbeError::Protocol(format!("malformed JSON frame: {e}")))?;

        match frame.get("id").and_then(Value::as_i64) {
            Some(id) if id == expected => {
                if let Some(error) = frame.get("error") {
                    return Err(ProbeError::Protocol(format!("server error: {error}")));
                }
                return Ok(frame.get("result").cloned().unwrap_or(Value::Null));
            }
            // A response to some other request, or a notification.
            _ => continue,
        }
    }
}

/// Set comparison between declared and reported tool names.
///
/// Both sides are deduplicated; outputs are sorted.
pub fn compare_tool_sets(declared: &[String], reported: &[String]) -> (Vec<String>, Vec<String>, Vec<String>) {
    use std::collections::BTreeSet;
    let declared: BTreeSet<&str> = declared.iter().map(String::as_str).collect();
    let reported: BTreeSet<&str> = reported.iter().map(String::as_str).collect();

    let found = declared
        .intersection(&reported)
        .map(|s| s.to_string())
        .collect();
    let missing = declared
        .difference(&reported)
        .map(|s| s.to_string())
        .collect();
    let extra = reported
        .difference(&declared)
        .map(|s| s.to_string())
        .collect();
    (found, missing, extra)
}

/// Spawns the server and verifies its tool surface against the declared
/// names.
///
/// `start_command` is argv for the server process, executed with the
/// caller's environment in `working_dir`. The whole probe runs under
/// `deadline`; expiry kills the child and reports a timeout. The child
/// is reaped on every path.
pub async fn verify_mcp_tools(
    start_command: &[String],
    working_dir: Option<&Path>,
    declared: &[String],
    strict_extras: bool,
    deadline: Duration,
) -> McpCheckOutcome {
    let started = Instant::now();
    let mut outcome = McpCheckOutcome {
        status: VerifyStatus::Fail,
        reason: None,
        detail: None,
        found: Vec::new(),
        missing: declared.to_vec(),
        extra: Vec::new(),
        duration_ms: 0,
    };

    let Some(program) = start_command.first() else {
        outcome.reason = Some(McpFailure::StartupError);
        outcome.detail = Some("empty start command".into());
        return outcome;
    };

    let mut cmd = Command::new(program);
    cmd.args(&start_command[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            outcome.reason = Some(McpFailure::StartupError);
            outcome.detail = Some(e.to_string());
            outcome.duration_ms = started.elapsed().as_millis() as u64;
            return outcome;
        }
    };

    let mut stdin = child.stdin.take().expect("stdin was piped");
    let mut stdout = BufReader::new(child.stdout.take().expect("stdout was piped"));

    // Server stderr is diagnostics, not protocol; forward it to the log.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    debug!(target: "pai_verify::mcp_stderr", "{line}");
                }
            }
        });
    }

    let probed = tokio::time::timeout(deadline, probe_mcp_server(&mut stdout, &mut stdin)).await;

    // Shutdown: close stdin, give the server a grace period, then kill.
    drop(stdin);
    if tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    outcome.duration_ms = started.elapsed().as_millis() as u64;
    match probed {
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "MCP probe timed out");
            outcome.reason = Some(McpFailure::Timeout);
            outcome
        }
        Ok(Err(detail)) => {
            outcome.reason = Some(McpFailure::ProtocolError);
            outcome.detail = Some(detail);
            outcome
        }
        Ok(Ok(reported)) => {
            let (found, missing, extra) = compare_tool_sets(declared, &reported);
            outcome.found = found;
            outcome.missing = missing;
            outcome.extra = extra;

            if !outcome.missing.is_empty() {
                outcome.reason = Some(McpFailure::MissingTools);
            } else if strict_extras && !outcome.extra.is_empty() {
                outcome.reason = Some(McpFailure::ExtraTools);
            } else {
                outcome.status = VerifyStatus::Pass;
            }
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    /// In-memory MCP server good enough for the handshake.
    async fn fake_server(
        stream: tokio::io::DuplexStream,
        tools: Vec<&'static str>,
        interleave_noise: bool,
    ) {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return;
            }
            let Ok(frame) = serde_json::from_str::<Value>(line.trim()) else {
                return;
            };
            let Some(id) = frame.get("id").and_then(Value::as_i64) else {
                continue; // notification
            };
            let method = frame.get("method").and_then(Value::as_str).unwrap_or("");
            if interleave_noise {
                // A notification and an unrelated response must both be
                // skipped by id correlation.
                let noise = json!({"jsonrpc": "2.0", "method": "notifications/progress"});
                write_half
                    .write_all(format!("{noise}\n").as_bytes())
                    .await
                    .unwrap();
                let unrelated = json!({"jsonrpc": "2.0", "id": 99, "result": {}});
                write_half
                    .write_all(format!("{unrelated}\n").as_bytes())
                    .await
                    .unwrap();
            }
            let result = match method {
                "initialize" => json!({"protocolVersion": "2024-11-05", "capabilities": {}}),
                "tools/list" => {
                    let entries: Vec<Value> = tools
                        .iter()
                        .map(|name| json!({"name": name, "inputSchema": {}}))
                        .collect();
                    json!({"tools": entries})
                }
                _ => json!({}),
            };
            let response = json!({"jsonrpc": "2.0", "id": id, "result": result});
            write_half
                .write_all(format!("{response}\n").as_bytes())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_probe_happy_path() {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(fake_server(server, vec!["email_search", "email_send"], false));

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let tools = probe_mcp_server(&mut reader, &mut write_half).await.unwrap();
        assert_eq!(tools, vec!["email_search", "email_send"]);
    }

    #[tokio::test]
    async fn test_probe_correlates_by_id_not_order() {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(fake_server(server, vec!["email_search"], true));

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let tools = probe_mcp_server(&mut reader, &mut write_half).await.unwrap();
        assert_eq!(tools, vec!["email_search"]);
    }

    #[tokio::test]
    async fn test_probe_malformed_json_is_protocol_error() {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(async move {
            let (read_half, mut write_half) = tokio::io::split(server);
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(b"this is not json\n").await.unwrap();
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let err = probe_mcp_server(&mut reader, &mut write_half)
            .await
            .unwrap_err();
        assert!(err.contains("malformed"));
    }

    #[tokio::test]
    async fn test_probe_closed_stream() {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(async move {
            // Read the initialize request, then hang up.
            let (read_half, write_half) = tokio::io::split(server);
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            let _ = reader.read_line(&mut line).await;
            drop(write_half);
        });

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);
        let err = probe_mcp_server(&mut reader, &mut write_half)
            .await
            .unwrap_err();
        assert!(err.contains("closed"));
    }

    #[test]
    fn test_compare_tool_sets_scenario() {
        // Declared {email_search, email_send}; server also has email_draft.
        let declared = vec!["email_search".to_string(), "email_send".to_string()];
        let reported = vec![
            "email_search".to_string(),
            "email_send".to_string(),
            "email_draft".to_string(),
        ];
        let (found, missing, extra) = compare_tool_sets(&declared, &reported);
        assert_eq!(found, vec!["email_search", "email_send"]);
        assert!(missing.is_empty());
        assert_eq!(extra, vec!["email_draft"]);
    }

    #[test]
    fn test_compare_tool_sets_missing() {
        let declared = vec!["a".to_string(), "b".to_string()];
        let reported = vec!["b".to_string()];
        let (found, missing, extra) = compare_tool_sets(&declared, &reported);
        assert_eq!(found, vec!["b"]);
        assert_eq!(missing, vec!["a"]);
        assert!(extra.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_startup_error() {
        let outcome = verify_mcp_tools(
            &["definitely-not-a-server-pai".to_string()],
            None,
            &["a".to_string()],
            false,
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.reason, Some(McpFailure::StartupError));
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out_and_is_reaped() {
        let started = Instant::now();
        let outcome = verify_mcp_tools(
            &["sleep".to_string(), "30".to_string()],
            None,
            &["a".to_string()],
            false,
            Duration::from_millis(300),
        )
        .await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.reason, Some(McpFailure::Timeout));
        // Deadline plus grace, not the sleep's 30 seconds.
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_extras_do_not_fail_by_default() {
        // sh one-liner acting as a minimal MCP server for two requests.
        let script = r#"
read line
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read line
read line
printf '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"email_search"},{"name":"email_send"},{"name":"email_draft"}]}}\n'
"#;
        let declared = vec!["email_search".to_string(), "email_send".to_string()];
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];

        let outcome = verify_mcp_tools(&argv, None, &declared, false, Duration::from_secs(5)).await;
        assert_eq!(outcome.status, VerifyStatus::Pass, "{outcome:?}");
        assert_eq!(outcome.extra, vec!["email_draft"]);

        let strict = verify_mcp_tools(&argv, None, &declared, true, Duration::from_secs(5)).await;
        assert_eq!(strict.status, VerifyStatus::Fail);
        assert_eq!(strict.reason, Some(McpFailure::ExtraTools));
    }

    #[tokio::test]
    async fn test_missing_tools_always_fail() {
        let script = r#"
read line
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read line
read line
printf '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"email_search"}]}}\n'
"#;
        let declared = vec!["email_search".to_string(), "email_send".to_string()];
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];

        let outcome = verify_mcp_tools(&argv, None, &declared, false, Duration::from_secs(5)).await;
        assert_eq!(outcome.status, VerifyStatus::Fail);
        assert_eq!(outcome.reason, Some(McpFailure::MissingTools));
        assert_eq!(outcome.missing, vec!["email_send"]);
        assert_eq!(outcome.found, vec!["email_search"]);
    }

    #[tokio::test]
    async fn test_details_blob_shape() {
        let outcome = McpCheckOutcome {
            status: VerifyStatus::Pass,
            reason: None,
            detail: None,
            found: vec!["a".into()],
            missing: vec![],
            extra: vec!["b".into()],
            duration_ms: 12,
        };
        let details = outcome.details();
        assert_eq!(details["found"][0], "a");
        assert_eq!(details["extra"][0], "b");
        assert!(details.get("reason").is_none());
    }

    #[tokio::test]
    async fn test_fake_server_loop_reads_all_frames() {
        // Guard against the fake server consuming the notification as a
        // request (it must not respond to id-less frames).
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(fake_server(server, vec!["t"], false));
        let (read_half, mut write_half) = tokio::io::split(client);
        let mut reader = BufReader::new(read_half);

        send(&mut write_half, &json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}))
            .await
            .unwrap();
        let first = await_response(&mut reader, 1).await.unwrap();
        assert!(first.is_object());

        send(&mut write_half, &json!({"jsonrpc":"2.0","method":"notifications/initialized"}))
            .await
            .unwrap();
        send(&mut write_half, &json!({"jsonrpc":"2.0","id":2,"method":"tools/list"}))
            .await
            .unwrap();
        let listing = await_response(&mut reader, 2).await.unwrap();
        assert_eq!(listing["tools"][0]["name"], "t");

        // Nothing further arrives.
        write_half.shutdown().await.unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
