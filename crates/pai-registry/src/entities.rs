//! Persistent entity types.
//!
//! All timestamps are UTC and stored as RFC 3339 text. Synthetic ids are
//! SQLite rowids; the tool id is the manifest name.

use chrono::{DateTime, Utc};
use pai_manifest::{DependencyKind, ToolKind};
use serde::{Deserialize, Serialize};

/// A registered tool, real or stub.
///
/// A stub is a placeholder synthesized when an edge names a provider that
/// has not been registered yet; it has `is_stub = true` and
/// `filesystem_path = "unknown"` until a real registration replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Stable identifier, the manifest's `name`.
    pub id: String,
    pub display_name: String,
    pub filesystem_path: String,
    pub kind: ToolKind,
    pub version: Option<String>,
    /// Self-assessed reliability in [0, 1].
    pub reliability: f64,
    pub debt_score: u32,
    pub manifest_path: Option<String>,
    /// Canonical hash of the registered manifest; basis for sync
    /// change-classification. Absent on stubs.
    pub manifest_hash: Option<String>,
    pub is_stub: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A consumer → provider dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: i64,
    pub consumer_id: String,
    pub provider_id: String,
    pub kind: DependencyKind,
    pub version_constraint: Option<String>,
    pub optional: bool,
    pub created_at: DateTime<Utc>,
}

/// What a contract promises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    #[serde(rename = "cli_output")]
    CliOutput,
    #[serde(rename = "mcp_tool")]
    McpTool,
    #[serde(rename = "library_export")]
    LibraryExport,
    #[serde(rename = "db_schema")]
    DbSchema,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::CliOutput => "cli_output",
            ContractKind::McpTool => "mcp_tool",
            ContractKind::LibraryExport => "library_export",
            ContractKind::DbSchema => "db_schema",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cli_output" => Some(ContractKind::CliOutput),
            "mcp_tool" => Some(ContractKind::McpTool),
            "library_export" => Some(ContractKind::LibraryExport),
            "db_schema" => Some(ContractKind::DbSchema),
            _ => None,
        }
    }
}

/// Health of a contract as of its last verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractStatus {
    #[serde(rename = "valid")]
    Valid,
    #[serde(rename = "drift")]
    Drift,
    #[serde(rename = "broken")]
    Broken,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Valid => "valid",
            ContractStatus::Drift => "drift",
            ContractStatus::Broken => "broken",
            ContractStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(ContractStatus::Valid),
            "drift" => Some(ContractStatus::Drift),
            "broken" => Some(ContractStatus::Broken),
            "unknown" => Some(ContractStatus::Unknown),
            _ => None,
        }
    }
}

/// A machine-checkable promise about one facet of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub tool_id: String,
    pub kind: ContractKind,
    /// Facet name, e.g. `email search --json` or `email_search`.
    pub name: String,
    /// Schema path relative to the tool's filesystem path, preserved
    /// verbatim from the manifest.
    pub schema_path: Option<String>,
    /// Lowercase-hex SHA-256 of the canonical schema, if recorded.
    pub schema_hash: Option<String>,
    /// Canonical JSON of the schema as of the last hash update; the
    /// basis for top-level drift diffs. Not part of the JSON surface.
    #[serde(skip)]
    pub schema_snapshot: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub status: ContractStatus,
}

/// Outcome of one verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyStatus {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "drift")]
    Drift,
}

impl VerifyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyStatus::Pass => "pass",
            VerifyStatus::Fail => "fail",
            VerifyStatus::Drift => "drift",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(VerifyStatus::Pass),
            "fail" => Some(VerifyStatus::Fail),
            "drift" => Some(VerifyStatus::Drift),
            _ => None,
        }
    }
}

/// One recorded verification attempt against a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub id: i64,
    pub contract_id: i64,
    pub verified_at: DateTime<Utc>,
    pub status: VerifyStatus,
    /// Free-form provenance: exit codes, stderr excerpts, hashes, reasons.
    pub details: serde_json::Value,
    pub vcs_commit: Option<String>,
}

/// Pass/fail rollup for a whole-tool verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Pass => "pass",
            OverallStatus::Fail => "fail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(OverallStatus::Pass),
            "fail" => Some(OverallStatus::Fail),
            _ => None,
        }
    }
}

/// Per-tool verification summary with per-facet counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolVerification {
    pub id: i64,
    pub tool_id: String,
    pub verified_at: DateTime<Utc>,
    pub cli_pass: u32,
    pub cli_fail: u32,
    pub cli_skip: u32,
    pub mcp_found: u32,
    pub mcp_missing: u32,
    pub mcp_extra: u32,
    pub overall_status: OverallStatus,
    pub vcs_commit: Option<String>,
    pub duration_ms: u64,
}

/// A detected dependency cycle. Append-only; `resolved` is operator
/// bookkeeping, nothing clears cycles automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularDepRecord {
    pub id: i64,
    /// Ordered tool ids; first equals last.
    pub cycle: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_kind_round_trip() {
        for kind in [
            ContractKind::CliOutput,
            ContractKind::McpTool,
            ContractKind::LibraryExport,
            ContractKind::DbSchema,
        ] {
            assert_eq!(ContractKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ContractKind::parse("CLI_OUTPUT"), None);
    }

    #[test]
    fn test_contract_status_default_is_unknown() {
        assert_eq!(ContractStatus::default(), ContractStatus::Unknown);
    }

    #[test]
    fn test_status_serde_strings() {
        assert_eq!(
            serde_json::to_string(&VerifyStatus::Drift).unwrap(),
            "\"drift\""
        );
        assert_eq!(
            serde_json::to_string(&ContractStatus::Broken).unwrap(),
            "\"broken\""
        );
    }
}
