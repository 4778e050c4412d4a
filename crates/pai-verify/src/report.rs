//! Verification outcome types.

use crate::drift::DriftOutcome;
use crate::mcp::McpCheckOutcome;
use crate::validate::ValidationIssue;
use pai_registry::{OverallStatus, VerifyStatus};
use serde::Serialize;

/// Outcome of one CLI contract check.
#[derive(Debug, Clone, Serialize)]
pub struct CliCheckOutcome {
    pub contract_id: i64,
    pub command: String,
    pub status: VerifyStatus,
    /// Failure reason: `not_found`, `timeout`, `nonzero_exit`,
    /// `invalid_json: …`, `schema_violation`, `spawn_error: …`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
    /// Schema violations found in the command's JSON output.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<ValidationIssue>,
    /// Placeholders with no plan value, passed through literally.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_placeholders: Vec<String>,
    /// True when presence on PATH stood in for execution.
    pub quick: bool,
}

impl CliCheckOutcome {
    pub(crate) fn new(contract_id: i64, command: &str) -> Self {
        Self {
            contract_id,
            command: command.to_string(),
            status: VerifyStatus::Fail,
            reason: None,
            exit_code: None,
            duration_ms: 0,
            stderr_excerpt: None,
            validation_issues: Vec::new(),
            unresolved_placeholders: Vec::new(),
            quick: false,
        }
    }

    /// Verification-row details blob for this check.
    pub fn details(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("outcome serialization cannot fail")
    }
}

/// Everything one whole-tool verification run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ToolVerifyReport {
    pub tool_id: String,
    pub overall_status: OverallStatus,
    pub cli: Vec<CliCheckOutcome>,
    /// Skipped CLI contracts (tool kind has no CLI surface).
    pub cli_skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp: Option<McpCheckOutcome>,
    pub drift: Vec<DriftOutcome>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
