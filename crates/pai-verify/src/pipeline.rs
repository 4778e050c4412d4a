//! Whole-tool verification runs.
//!
//! One call verifies every contract a tool declares, records a
//! verification row per contract attempted, rolls the counts into a
//! tool-verification summary, and stamps the tool's last-verified time.
//! Contract failures never abort the run; the pipeline records them and
//! moves on.

use crate::command::{check_cli_contract, CommandPlan};
use crate::drift::{check_drift, resolve_schema_path, DriftState};
use crate::error::VerifyError;
use crate::mcp::verify_mcp_tools;
use crate::report::ToolVerifyReport;
use crate::validate::SchemaValidator;
use chrono::Utc;
use pai_registry::{
    Contract, ContractKind, ContractStatus, OverallStatus, Store, ToolVerification, VerifyStatus,
};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Knobs for a verification run.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Presence-only CLI checks: resolve on PATH, skip execution.
    pub quick: bool,
    /// Deadline per child-process interaction.
    pub timeout: Duration,
    /// Treat undeclared MCP tools as failures instead of reports.
    pub strict_mcp_extras: bool,
    /// Accept current schema hashes as the new drift baseline.
    pub update_drift: bool,
    /// Placeholder values for CLI command signatures.
    pub plan: CommandPlan,
    /// argv to start the tool's MCP server; MCP checks are skipped with
    /// a warning when absent.
    pub mcp_start_command: Option<Vec<String>>,
    /// VCS commit recorded with every verification row.
    pub vcs_commit: Option<String>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            quick: false,
            timeout: Duration::from_secs(10),
            strict_mcp_extras: false,
            update_drift: false,
            plan: CommandPlan::new(),
            mcp_start_command: None,
            vcs_commit: None,
        }
    }
}

/// Verifies every contract of `tool_id` and records the outcomes.
///
/// # Errors
///
/// Only store access and broken schema files error out; contract-level
/// failures are recorded outcomes, not errors.
pub async fn verify_tool(
    store: &Store,
    tool_id: &str,
    opts: &VerifyOptions,
) -> Result<ToolVerifyReport, VerifyError> {
    let started = Instant::now();
    let tool = store
        .get_tool(tool_id)?
        .ok_or_else(|| pai_registry::RegistryError::tool_not_found(tool_id))?;
    let contracts = store.contracts_for(tool_id)?;
    let working_dir = Path::new(&tool.filesystem_path);
    let vcs = opts.vcs_commit.as_deref();

    let mut report = ToolVerifyReport {
        tool_id: tool_id.to_string(),
        overall_status: OverallStatus::Pass,
        cli: Vec::new(),
        cli_skipped: 0,
        mcp: None,
        drift: Vec::new(),
        duration_ms: 0,
        warnings: Vec::new(),
    };
    let mut validator = SchemaValidator::new();

    // CLI contracts run only for tools with a CLI surface.
    for contract in contracts.iter().filter(|c| c.kind == ContractKind::CliOutput) {
        if !tool.kind.has_cli_surface() {
            report.cli_skipped += 1;
            continue;
        }
        let schema_file = contract
            .schema_path
            .as_deref()
            .map(|p| resolve_schema_path(&tool, p));
        let outcome = check_cli_contract(
            contract.id,
            &contract.name,
            working_dir.is_dir().then_some(working_dir),
            schema_file.as_deref(),
            &mut validator,
            &opts.plan,
            opts.quick,
            opts.timeout,
        )
        .await;

        store.insert_verification(contract.id, outcome.status, &outcome.details(), vcs)?;
        let status = match outcome.status {
            VerifyStatus::Pass => ContractStatus::Valid,
            _ => ContractStatus::Broken,
        };
        store.set_contract_status(contract.id, status, Utc::now())?;
        report.cli.push(outcome);
    }

    // MCP contracts: one probe covers every declared tool name.
    let mcp_contracts: Vec<&Contract> = contracts
        .iter()
        .filter(|c| c.kind == ContractKind::McpTool)
        .collect();
    if !mcp_contracts.is_empty() && tool.kind.has_mcp_surface() {
        let declared = declared_mcp_tools(&tool, &mcp_contracts);
        match &opts.mcp_start_command {
            None => {
                report
                    .warnings
                    .push("mcp_skipped(no start command configured)".to_string());
            }
            Some(argv) => {
                let outcome = verify_mcp_tools(
                    argv,
                    working_dir.is_dir().then_some(working_dir),
                    &declared,
                    opts.strict_mcp_extras,
                    opts.timeout,
                )
                .await;

                let probe_failed = matches!(
                    outcome.reason,
                    Some(crate::mcp::McpFailure::StartupError)
                        | Some(crate::mcp::McpFailure::Timeout)
                        | Some(crate::mcp::McpFailure::ProtocolError)
                );
                for contract in &mcp_contracts {
                    if !declared.iter().any(|name| name == &contract.name) {
                        continue;
                    }
                    let tool_found = outcome.found.iter().any(|name| name == &contract.name);
                    let (row_status, contract_status) = if probe_failed {
                        // The probe itself failed; no per-tool signal.
                        (VerifyStatus::Fail, ContractStatus::Unknown)
                    } else if tool_found {
                        (VerifyStatus::Pass, ContractStatus::Valid)
                    } else {
                        (VerifyStatus::Fail, ContractStatus::Broken)
                    };
                    store.insert_verification(
                        contract.id,
                        row_status,
                        &outcome.details(),
                        vcs,
                    )?;
                    store.set_contract_status(contract.id, contract_status, Utc::now())?;
                }
                report.mcp = Some(outcome);
            }
        }
    }

    // Drift over every contract with a declared schema.
    for contract in contracts.iter().filter(|c| c.schema_path.is_some()) {
        let outcome = match check_drift(store, &tool, contract, opts.update_drift) {
            Ok(outcome) => outcome,
            Err(VerifyError::Registry(e)) => return Err(e.into()),
            Err(e) => {
                // A broken schema file fails this contract, not the run.
                let details =
                    serde_json::json!({"reason": "schema_error", "error": e.to_string()});
                store.insert_verification(contract.id, VerifyStatus::Fail, &details, vcs)?;
                store.set_contract_status(contract.id, ContractStatus::Broken, Utc::now())?;
                report
                    .warnings
                    .push(format!("drift_error({}): {e}", contract.name));
                continue;
            }
        };
        if !opts.update_drift {
            match outcome.state {
                DriftState::Drift => {
                    store.insert_verification(
                        contract.id,
                        VerifyStatus::Drift,
                        &outcome.details(),
                        vcs,
                    )?;
                    store.set_contract_status(contract.id, ContractStatus::Drift, Utc::now())?;
                }
                DriftState::Missing => {
                    store.insert_verification(
                        contract.id,
                        VerifyStatus::Fail,
                        &outcome.details(),
                        vcs,
                    )?;
                    store.set_contract_status(contract.id, ContractStatus::Broken, Utc::now())?;
                }
                _ => {}
            }
        }
        report.drift.push(outcome);
    }

    // Rollup.
    let cli_pass = report
        .cli
        .iter()
        .filter(|c| c.status == VerifyStatus::Pass)
        .count() as u32;
    let cli_fail = report.cli.len() as u32 - cli_pass;
    let (mcp_found, mcp_missing, mcp_extra) = report
        .mcp
        .as_ref()
        .map(|m| {
            (
                m.found.len() as u32,
                m.missing.len() as u32,
                m.extra.len() as u32,
            )
        })
        .unwrap_or_default();

    let mcp_failed = report
        .mcp
        .as_ref()
        .is_some_and(|m| m.status == VerifyStatus::Fail);
    report.overall_status = if cli_fail > 0 || mcp_failed {
        OverallStatus::Fail
    } else {
        OverallStatus::Pass
    };
    report.duration_ms = started.elapsed().as_millis() as u64;

    let now = Utc::now();
    store.insert_tool_verification(&ToolVerification {
        id: 0,
        tool_id: tool_id.to_string(),
        verified_at: now,
        cli_pass,
        cli_fail,
        cli_skip: report.cli_skipped as u32,
        mcp_found,
        mcp_missing,
        mcp_extra,
        overall_status: report.overall_status,
        vcs_commit: opts.vcs_commit.clone(),
        duration_ms: report.duration_ms,
    })?;
    store.set_tool_last_verified(tool_id, now)?;

    info!(
        tool = %tool_id,
        overall = ?report.overall_status,
        cli_pass,
        cli_fail,
        drift = report.drift.len(),
        "verification run finished"
    );
    Ok(report)
}

/// Declared MCP tool names: from the manifest when it is still
/// readable (resources are not tools), otherwise the contract names.
fn declared_mcp_tools(tool: &pai_registry::Tool, contracts: &[&Contract]) -> Vec<String> {
    if let Some(manifest_path) = tool.manifest_path.as_deref() {
        if let Ok(manifest) = pai_manifest::load_manifest(Path::new(manifest_path)) {
            let names: Vec<String> = manifest
                .provides
                .mcp_tool_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            if !names.is_empty() {
                return names;
            }
        }
    }
    debug!(tool = %tool.id, "falling back to contract names for declared MCP tools");
    contracts.iter().map(|c| c.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pai_registry::register_manifest;
    use std::path::PathBuf;

    fn setup(dir: &Path, manifest_yaml: &str) -> Store {
        let mut store = Store::open_in_memory().unwrap();
        std::fs::create_dir_all(dir).unwrap();
        let manifest_file = dir.join(pai_manifest::MANIFEST_FILE_NAME);
        std::fs::write(&manifest_file, manifest_yaml).unwrap();
        let manifest = pai_manifest::parse_manifest(manifest_yaml).unwrap();
        register_manifest(&mut store, &manifest, &manifest_file).unwrap();
        store
    }

    #[tokio::test]
    async fn test_cli_contract_verified_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(
            dir.path(),
            "name: t\nkind: cli\nprovides:\n  cli:\n    - command: \"true\"\n    - command: \"false\"\n",
        );

        let report = verify_tool(&store, "t", &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(report.cli.len(), 2);
        assert_eq!(report.overall_status, OverallStatus::Fail);

        let summaries = store.tool_verifications_for("t").unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].cli_pass, 1);
        assert_eq!(summaries[0].cli_fail, 1);
        assert_eq!(summaries[0].overall_status, OverallStatus::Fail);

        // Each contract got a verification row and a status.
        for contract in store.contracts_for("t").unwrap() {
            assert_eq!(store.verifications_for(contract.id).unwrap().len(), 1);
            assert_ne!(contract.status, ContractStatus::Unknown);
        }

        // The tool is stamped.
        let tool = store.get_tool("t").unwrap().unwrap();
        assert!(tool.last_verified_at.is_some());
    }

    #[tokio::test]
    async fn test_cli_contracts_skipped_for_non_cli_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(
            dir.path(),
            "name: t\nkind: library\nprovides:\n  cli:\n    - command: \"true\"\n",
        );

        let report = verify_tool(&store, "t", &VerifyOptions::default())
            .await
            .unwrap();
        assert!(report.cli.is_empty());
        assert_eq!(report.cli_skipped, 1);
        assert_eq!(report.overall_status, OverallStatus::Pass);
        assert_eq!(store.tool_verifications_for("t").unwrap()[0].cli_skip, 1);
    }

    #[tokio::test]
    async fn test_mcp_skipped_without_start_command() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(
            dir.path(),
            "name: t\nkind: mcp\nprovides:\n  mcp:\n    - tool: email_search\n",
        );

        let report = verify_tool(&store, "t", &VerifyOptions::default())
            .await
            .unwrap();
        assert!(report.mcp.is_none());
        assert!(report.warnings.iter().any(|w| w.starts_with("mcp_skipped")));
        // Skipped MCP does not fail the run.
        assert_eq!(report.overall_status, OverallStatus::Pass);
    }

    #[tokio::test]
    async fn test_mcp_probe_records_per_contract_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(
            dir.path(),
            "name: t\nkind: mcp\nprovides:\n  mcp:\n    - tool: email_search\n    - tool: email_send\n",
        );

        let script = r#"
read line
printf '{"jsonrpc":"2.0","id":1,"result":{}}\n'
read line
read line
printf '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"email_search"}]}}\n'
"#;
        let opts = VerifyOptions {
            mcp_start_command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
            ]),
            ..VerifyOptions::default()
        };
        let report = verify_tool(&store, "t", &opts).await.unwrap();
        let mcp = report.mcp.unwrap();
        assert_eq!(mcp.found, vec!["email_search"]);
        assert_eq!(mcp.missing, vec!["email_send"]);
        assert_eq!(report.overall_status, OverallStatus::Fail);

        let found = store
            .find_contract("t", ContractKind::McpTool, "email_search")
            .unwrap()
            .unwrap();
        assert_eq!(found.status, ContractStatus::Valid);
        let missing = store
            .find_contract("t", ContractKind::McpTool, "email_send")
            .unwrap()
            .unwrap();
        assert_eq!(missing.status, ContractStatus::Broken);

        let summary = &store.tool_verifications_for("t").unwrap()[0];
        assert_eq!(summary.mcp_found, 1);
        assert_eq!(summary.mcp_missing, 1);
    }

    #[tokio::test]
    async fn test_drift_recorded_during_verification() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("schemas")).unwrap();
        std::fs::write(dir.path().join("schemas/out.json"), r#"{"a": 1}"#).unwrap();
        let store = setup(
            dir.path(),
            "name: t\nkind: cli\nprovides:\n  cli:\n    - command: \"echo {}\"\n      output_schema: schemas/out.json\n",
        );

        // First run with update to set the baseline.
        let opts = VerifyOptions {
            update_drift: true,
            ..VerifyOptions::default()
        };
        let report = verify_tool(&store, "t", &opts).await.unwrap();
        assert_eq!(report.drift.len(), 1);
        assert_eq!(report.drift[0].state, DriftState::New);

        // Change the schema, verify without update: drift recorded.
        std::fs::write(dir.path().join("schemas/out.json"), r#"{"b": 2}"#).unwrap();
        let report = verify_tool(&store, "t", &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(report.drift[0].state, DriftState::Drift);
        // Drift alone does not fail the run; the command still passes.
        assert_eq!(report.overall_status, OverallStatus::Pass);

        let contract = store.contracts_for("t").unwrap()[0].clone();
        assert_eq!(contract.status, ContractStatus::Drift);
    }

    #[tokio::test]
    async fn test_quick_mode_counts_passes() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(
            dir.path(),
            "name: t\nkind: cli\nprovides:\n  cli:\n    - command: \"sh -c anything\"\n",
        );
        let opts = VerifyOptions {
            quick: true,
            ..VerifyOptions::default()
        };
        let report = verify_tool(&store, "t", &opts).await.unwrap();
        assert_eq!(report.cli[0].status, VerifyStatus::Pass);
        assert!(report.cli[0].quick);
        assert_eq!(report.overall_status, OverallStatus::Pass);
    }

    #[tokio::test]
    async fn test_unknown_tool_errors() {
        let store = Store::open_in_memory().unwrap();
        let err = verify_tool(&store, "ghost", &VerifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Registry(_)));
    }

    #[test]
    fn test_declared_mcp_tools_excludes_resources() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = "name: t\nkind: mcp\nprovides:\n  mcp:\n    - tool: email_search\n    - resource: inbox\n";
        let store = setup(dir.path(), yaml);
        let tool = store.get_tool("t").unwrap().unwrap();
        let contracts = store.contracts_for("t").unwrap();
        let refs: Vec<&Contract> = contracts.iter().collect();
        // Manifest is readable: only the tool facet is a declared MCP tool.
        assert_eq!(declared_mcp_tools(&tool, &refs), vec!["email_search"]);

        // With the manifest gone, contract names are the fallback.
        std::fs::remove_file(PathBuf::from(tool.manifest_path.clone().unwrap())).unwrap();
        let names = declared_mcp_tools(&tool, &refs);
        assert_eq!(names.len(), 2);
    }
}
