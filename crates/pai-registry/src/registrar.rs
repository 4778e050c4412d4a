//! Manifest ingestion.
//!
//! Registration is atomic: parse first (no writes on failure), then one
//! transaction covering the tool upsert, en-bloc edge replacement, stub
//! synthesis, and contract reconciliation. Cycle detection runs after the
//! commit, in the caller, so a cycle can never roll back a registration.
//!
//! Registering the same manifest twice yields the same tool row, edge
//! set, and contract set; only `updated_at` moves.

use crate::entities::ContractKind;
use crate::error::RegistryError;
use crate::store::Store;
use crate::{Result, Tool};
use chrono::Utc;
use pai_manifest::{load_manifest, Manifest, MANIFEST_FILE_NAME};
use rusqlite::{params, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Whether a registration created the tool or refreshed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegisterAction {
    #[serde(rename = "registered")]
    Registered,
    #[serde(rename = "updated")]
    Updated,
}

/// Result of one registrar call.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub action: RegisterAction,
    pub tool: Tool,
    pub edge_count: usize,
    pub contract_count: usize,
    /// Non-fatal notes: synthesized stubs, ignored duplicates, detected
    /// cycles (appended by the caller after commit).
    pub warnings: Vec<String>,
}

/// Result of an unregister call.
#[derive(Debug, Clone, Serialize)]
pub struct UnregisterOutcome {
    pub tool_id: String,
    pub was_stub: bool,
    pub removed_contracts: usize,
    pub removed_edges: usize,
    /// Consumers that were still depending on the tool (populated only
    /// when the removal was forced past a conflict).
    pub orphaned_dependents: Vec<String>,
}

/// Loads the manifest at `path` (a file or a tool directory) and
/// registers it.
pub fn register_path(store: &mut Store, path: &Path) -> Result<RegisterOutcome> {
    let manifest = load_manifest(path)?;
    let manifest_file = if path.is_dir() {
        path.join(MANIFEST_FILE_NAME)
    } else {
        path.to_path_buf()
    };
    register_manifest(store, &manifest, &manifest_file)
}

/// Registers a parsed manifest: upserts the tool, replaces its outgoing
/// edges en bloc, synthesizes stub providers for unknown names, and
/// reconciles contracts with the declared facets.
///
/// # Errors
///
/// [`RegistryError::Store`] rolls back the whole registration; the store
/// never exposes a partial write.
pub fn register_manifest(
    store: &mut Store,
    manifest: &Manifest,
    manifest_file: &Path,
) -> Result<RegisterOutcome> {
    let mut warnings = Vec::new();
    let tool_dir = manifest_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());

    let tx = store.conn.transaction()?;
    let now = Utc::now().to_rfc3339();

    // Step 2: upsert the tool, preserving created_at on update.
    let existing: Option<(String, bool)> = tx
        .query_row(
            "SELECT created_at, is_stub FROM tools WHERE id = ?1",
            params![manifest.name],
            |row| Ok((row.get(0)?, row.get::<_, i64>(1)? != 0)),
        )
        .optional()?;

    let action = match &existing {
        Some((_, is_stub)) if !is_stub => RegisterAction::Updated,
        // First real registration, including promotion of a stub.
        _ => RegisterAction::Registered,
    };
    let created_at = existing
        .as_ref()
        .map(|(created, _)| created.clone())
        .unwrap_or_else(|| now.clone());

    tx.execute(
        "INSERT INTO tools (id, display_name, filesystem_path, kind, version, reliability,
                            debt_score, manifest_path, manifest_hash, is_stub,
                            created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
             display_name = excluded.display_name,
             filesystem_path = excluded.filesystem_path,
             kind = excluded.kind,
             version = excluded.version,
             reliability = excluded.reliability,
             debt_score = excluded.debt_score,
             manifest_path = excluded.manifest_path,
             manifest_hash = excluded.manifest_hash,
             is_stub = 0,
             updated_at = excluded.updated_at",
        params![
            manifest.name,
            manifest.name,
            tool_dir,
            manifest.kind.as_str(),
            manifest.version,
            manifest.reliability,
            manifest.debt_score,
            manifest_file.display().to_string(),
            manifest.canonical_hash(),
            created_at,
            now
        ],
    )?;

    // Step 3: en-bloc replacement of this consumer's edges.
    tx.execute(
        "DELETE FROM dependency_edges WHERE consumer_id = ?1",
        params![manifest.name],
    )?;

    // Step 4: edges, synthesizing stub providers as needed.
    let mut seen_providers: HashSet<&str> = HashSet::new();
    let mut edge_count = 0usize;
    for dep in &manifest.depends_on {
        if !seen_providers.insert(dep.name.as_str()) {
            warnings.push(format!(
                "duplicate_dependency({}): second edge ignored",
                dep.name
            ));
            continue;
        }

        let provider_exists: bool = tx
            .query_row(
                "SELECT 1 FROM tools WHERE id = ?1",
                params![dep.name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !provider_exists {
            synthesize_stub(&tx, &dep.name, dep.kind.stub_tool_kind().as_str(), &now)?;
            warnings.push(format!("stub_created({})", dep.name));
        }

        tx.execute(
            "INSERT INTO dependency_edges
                (consumer_id, provider_id, kind, version_constraint, optional, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                manifest.name,
                dep.name,
                dep.kind.as_str(),
                dep.version,
                dep.optional as i64,
                now
            ],
        )?;
        edge_count += 1;
    }

    // Step 5: reconcile contracts with the declared facets.
    let contract_count = reconcile_contracts(&tx, manifest)?;

    // Step 6.
    tx.commit()?;

    let tool = store
        .get_tool(&manifest.name)?
        .ok_or_else(|| RegistryError::tool_not_found(&manifest.name))?;

    info!(
        tool = %tool.id,
        action = ?action,
        edges = edge_count,
        contracts = contract_count,
        "registered manifest"
    );
    for warning in &warnings {
        warn!(tool = %tool.id, "{warning}");
    }

    Ok(RegisterOutcome {
        action,
        tool,
        edge_count,
        contract_count,
        warnings,
    })
}

/// Removes a tool and everything cascading from it.
///
/// # Errors
///
/// [`RegistryError::Conflict`] when other tools still consume this one
/// and `force` is false; [`RegistryError::NotFound`] when absent.
pub fn unregister_tool(store: &mut Store, id: &str, force: bool) -> Result<UnregisterOutcome> {
    let tool = store
        .get_tool(id)?
        .ok_or_else(|| RegistryError::tool_not_found(id))?;

    let mut dependents: Vec<String> = store
        .edges_to(id)?
        .into_iter()
        .map(|e| e.consumer_id)
        .filter(|consumer| consumer != id)
        .collect();
    dependents.sort();
    dependents.dedup();

    if !dependents.is_empty() && !force {
        return Err(RegistryError::Conflict {
            id: id.to_string(),
            dependents,
        });
    }

    let removed_contracts = store.contracts_for(id)?.len();
    // Distinct ids so a self-loop is not counted twice.
    let removed_edges = store
        .edges_from(id)?
        .into_iter()
        .chain(store.edges_to(id)?)
        .map(|e| e.id)
        .collect::<HashSet<_>>()
        .len();
    store.delete_tool(id)?;
    debug!(tool = %id, forced = force, "unregistered tool");

    Ok(UnregisterOutcome {
        tool_id: id.to_string(),
        was_stub: tool.is_stub,
        removed_contracts,
        removed_edges,
        orphaned_dependents: dependents,
    })
}

fn synthesize_stub(
    tx: &Transaction<'_>,
    name: &str,
    kind: &str,
    now: &str,
) -> std::result::Result<(), rusqlite::Error> {
    tx.execute(
        "INSERT INTO tools (id, display_name, filesystem_path, kind, reliability,
                            debt_score, is_stub, created_at, updated_at)
         VALUES (?1, ?1, 'unknown', ?2, 0.95, 0, 1, ?3, ?3)",
        params![name, kind, now],
    )?;
    Ok(())
}

/// Upserts a contract row per declared facet (keyed by tool, kind, name),
/// preserving the recorded schema hash when the declared schema path is
/// unchanged, and drops contracts for facets no longer declared.
fn reconcile_contracts(tx: &Transaction<'_>, manifest: &Manifest) -> Result<usize> {
    let mut desired: Vec<(ContractKind, String, Option<String>)> = Vec::new();
    for facet in &manifest.provides.cli {
        desired.push((
            ContractKind::CliOutput,
            facet.command.clone(),
            facet.output_schema.clone(),
        ));
    }
    for facet in &manifest.provides.mcp {
        desired.push((
            ContractKind::McpTool,
            facet.name().to_string(),
            facet.schema.clone(),
        ));
    }
    for facet in &manifest.provides.library {
        desired.push((
            ContractKind::LibraryExport,
            facet.export.clone(),
            facet.path.clone(),
        ));
    }
    for facet in &manifest.provides.database {
        desired.push((
            ContractKind::DbSchema,
            facet.path.clone(),
            facet.schema.clone(),
        ));
    }

    let mut kept_ids: Vec<i64> = Vec::new();
    for (kind, name, schema_path) in &desired {
        let existing: Option<(i64, Option<String>)> = tx
            .query_row(
                "SELECT id, schema_path FROM contracts
                 WHERE tool_id = ?1 AND kind = ?2 AND name = ?3",
                params![manifest.name, kind.as_str(), name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, old_path)) if old_path == *schema_path => kept_ids.push(id),
            Some((id, _)) => {
                // The declared schema moved; the recorded hash no longer
                // has a basis.
                tx.execute(
                    "UPDATE contracts SET schema_path = ?2, schema_hash = NULL,
                            schema_snapshot = NULL, status = 'unknown'
                     WHERE id = ?1",
                    params![id, schema_path],
                )?;
                kept_ids.push(id);
            }
            None => {
                tx.execute(
                    "INSERT INTO contracts (tool_id, kind, name, schema_path, status)
                     VALUES (?1, ?2, ?3, ?4, 'unknown')",
                    params![manifest.name, kind.as_str(), name, schema_path],
                )?;
                kept_ids.push(tx.last_insert_rowid());
            }
        }
    }

    // Facets removed from the manifest lose their contracts.
    if kept_ids.is_empty() {
        tx.execute(
            "DELETE FROM contracts WHERE tool_id = ?1",
            params![manifest.name],
        )?;
    } else {
        let placeholders = kept_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM contracts WHERE tool_id = ? AND id NOT IN ({placeholders})"
        );
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&manifest.name];
        for id in &kept_ids {
            params_vec.push(id);
        }
        tx.execute(&sql, params_vec.as_slice())?;
    }

    Ok(desired.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ContractStatus;
    use pai_manifest::parse_manifest;

    const EMAIL: &str = r#"
name: email
version: 1.2.0
kind: cli+mcp
provides:
  cli:
    - command: "email search --json"
      output_schema: schemas/search.json
  mcp:
    - tool: email_search
depends_on:
  - name: resona
    kind: library
"#;

    fn register(store: &mut Store, yaml: &str, path: &str) -> RegisterOutcome {
        let manifest = parse_manifest(yaml).unwrap();
        register_manifest(store, &manifest, Path::new(path)).unwrap()
    }

    #[test]
    fn test_register_creates_tool_edge_and_stub() {
        let mut store = Store::open_in_memory().unwrap();
        let outcome = register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");

        assert_eq!(outcome.action, RegisterAction::Registered);
        assert_eq!(outcome.tool.id, "email");
        assert_eq!(outcome.tool.filesystem_path, "/tools/email");
        assert!(!outcome.tool.is_stub);
        assert!(outcome.tool.manifest_hash.is_some());
        assert_eq!(outcome.warnings, vec!["stub_created(resona)"]);

        let stub = store.get_tool("resona").unwrap().unwrap();
        assert!(stub.is_stub);
        assert_eq!(stub.filesystem_path, "unknown");
        assert_eq!(stub.kind, pai_manifest::ToolKind::Library);

        let edges = store.edges_from("email").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].provider_id, "resona");

        let contracts = store.contracts_for("email").unwrap();
        assert_eq!(contracts.len(), 2);
    }

    #[test]
    fn test_register_twice_is_idempotent() {
        let mut store = Store::open_in_memory().unwrap();
        let first = register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");
        let contracts_before = store.contracts_for("email").unwrap();

        let second = register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");
        assert_eq!(second.action, RegisterAction::Updated);
        // The stub already exists; no new warnings.
        assert!(second.warnings.is_empty());
        assert_eq!(second.tool.created_at, first.tool.created_at);

        assert_eq!(store.list_tools().unwrap().len(), 2);
        assert_eq!(store.edges_from("email").unwrap().len(), 1);
        let contracts_after = store.contracts_for("email").unwrap();
        assert_eq!(contracts_after.len(), contracts_before.len());
        // Same rows, not re-created.
        assert_eq!(contracts_after[0].id, contracts_before[0].id);
    }

    #[test]
    fn test_stub_promotion_reports_registered() {
        let mut store = Store::open_in_memory().unwrap();
        register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");

        let outcome = register(
            &mut store,
            "name: resona\nkind: library\n",
            "/tools/resona/pai-manifest.yaml",
        );
        assert_eq!(outcome.action, RegisterAction::Registered);
        assert!(!outcome.tool.is_stub);
        assert_eq!(outcome.tool.filesystem_path, "/tools/resona");
        // The inbound edge from email survives the promotion.
        assert_eq!(store.edges_to("resona").unwrap().len(), 1);
    }

    #[test]
    fn test_edges_replaced_en_bloc() {
        let mut store = Store::open_in_memory().unwrap();
        register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");

        let rewritten = r#"
name: email
kind: cli+mcp
depends_on:
  - name: calendar
    kind: mcp
"#;
        let outcome = register(&mut store, rewritten, "/tools/email/pai-manifest.yaml");
        assert_eq!(outcome.warnings, vec!["stub_created(calendar)"]);

        let edges = store.edges_from("email").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].provider_id, "calendar");
        // The orphaned stub remains until explicitly unregistered.
        assert!(store.get_tool("resona").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_dependency_ignored_with_warning() {
        let mut store = Store::open_in_memory().unwrap();
        let doc = r#"
name: t
kind: cli
depends_on:
  - name: dup
    kind: library
  - name: dup
    kind: cli
"#;
        let outcome = register(&mut store, doc, "/tools/t/pai-manifest.yaml");
        assert_eq!(store.edges_from("t").unwrap().len(), 1);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.starts_with("duplicate_dependency(dup)")));
    }

    #[test]
    fn test_self_loop_edge_is_permitted() {
        let mut store = Store::open_in_memory().unwrap();
        let doc = "name: ouro\nkind: library\ndepends_on:\n  - name: ouro\n    kind: library\n";
        register(&mut store, doc, "/tools/ouro/pai-manifest.yaml");
        let edges = store.edges_from("ouro").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].provider_id, "ouro");
    }

    #[test]
    fn test_schema_hash_preserved_unless_path_changes() {
        let mut store = Store::open_in_memory().unwrap();
        register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");
        let contract = store
            .find_contract("email", ContractKind::CliOutput, "email search --json")
            .unwrap()
            .unwrap();
        store
            .update_contract_hash(contract.id, Some("h1"), Some("{}"), ContractStatus::Valid, Utc::now())
            .unwrap();

        // Same path: hash survives re-registration.
        register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");
        let contract = store.get_contract(contract.id).unwrap().unwrap();
        assert_eq!(contract.schema_hash.as_deref(), Some("h1"));

        // Moved path: hash resets.
        let moved = EMAIL.replace("schemas/search.json", "schemas/v2/search.json");
        register(&mut store, &moved, "/tools/email/pai-manifest.yaml");
        let contract = store.get_contract(contract.id).unwrap().unwrap();
        assert!(contract.schema_hash.is_none());
        assert_eq!(contract.status, ContractStatus::Unknown);
    }

    #[test]
    fn test_dropped_facet_loses_contract() {
        let mut store = Store::open_in_memory().unwrap();
        register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");
        assert_eq!(store.contracts_for("email").unwrap().len(), 2);

        let trimmed = r#"
name: email
kind: cli+mcp
provides:
  mcp:
    - tool: email_search
depends_on:
  - name: resona
    kind: library
"#;
        register(&mut store, trimmed, "/tools/email/pai-manifest.yaml");
        let contracts = store.contracts_for("email").unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].name, "email_search");
    }

    #[test]
    fn test_unregister_conflict_and_force() {
        let mut store = Store::open_in_memory().unwrap();
        register(&mut store, EMAIL, "/tools/email/pai-manifest.yaml");
        register(
            &mut store,
            "name: resona\nkind: library\n",
            "/tools/resona/pai-manifest.yaml",
        );

        let err = unregister_tool(&mut store, "resona", false).unwrap_err();
        match err {
            RegistryError::Conflict { dependents, .. } => {
                assert_eq!(dependents, vec!["email".to_string()]);
            }
            other => panic!("expected Conflict, got {other:?}"),
        }

        let outcome = unregister_tool(&mut store, "resona", true).unwrap();
        assert_eq!(outcome.orphaned_dependents, vec!["email".to_string()]);
        assert!(store.get_tool("resona").unwrap().is_none());
        // The incident edge went with it.
        assert!(store.edges_from("email").unwrap().is_empty());
    }

    #[test]
    fn test_unregister_missing_is_not_found() {
        let mut store = Store::open_in_memory().unwrap();
        let err = unregister_tool(&mut store, "ghost", false).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[test]
    fn test_register_path_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tool_dir = dir.path().join("email");
        std::fs::create_dir_all(&tool_dir).unwrap();
        std::fs::write(tool_dir.join(MANIFEST_FILE_NAME), EMAIL).unwrap();

        let mut store = Store::open_in_memory().unwrap();
        let outcome = register_path(&mut store, &tool_dir).unwrap();
        assert_eq!(outcome.tool.id, "email");
        assert_eq!(outcome.tool.filesystem_path, tool_dir.display().to_string());
    }
}
