//! The unified pai-deps engine.
//!
//! [`DepsEngine`] owns the store and orchestrates the component crates:
//! registration (with post-commit cycle recording), discovery and sync,
//! graph queries, contract verification, and impact analysis. Every
//! method returns a structured result; the CLI wrapper decides how to
//! render it.

use crate::config::EngineConfig;
use crate::Result;
use pai_discovery::{discover, sync_manifests, DiscoveryReport, FileToolMapper, SyncReport};
use pai_graph::{
    affected_by, blast_radius, compound_reliability, normalize_cycle, AffectedTool, BlastRadius,
    CompoundReliability, DepGraph,
};
use pai_registry::{
    register_path, unregister_tool, CircularDepRecord, Contract, RegisterOutcome, Store,
    StoreStats, Tool, ToolVerification, UnregisterOutcome,
};
use pai_verify::{check_drift, verify_tool, DriftOutcome, ToolVerifyReport, VerifyOptions};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything known about one tool, for the `show` surface.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDetails {
    pub tool: Tool,
    /// Direct providers (what it depends on).
    pub providers: Vec<String>,
    /// Direct consumers (what depends on it).
    pub consumers: Vec<String>,
    pub contracts: Vec<Contract>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_verification: Option<ToolVerification>,
}

/// Result of a sync run: discovery plus registration plus cycles.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub report: SyncReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discovery_warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cycle_warnings: Vec<String>,
}

/// Result of verifying every registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyAllSummary {
    pub reports: Vec<ToolVerifyReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// One drift outcome attributed to its tool.
#[derive(Debug, Clone, Serialize)]
pub struct DriftItem {
    pub tool_id: String,
    #[serde(flatten)]
    pub outcome: DriftOutcome,
}

/// Drift results across tools.
#[derive(Debug, Clone, Serialize)]
pub struct DriftSummary {
    pub items: Vec<DriftItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The CI-facing affected-set answer.
#[derive(Debug, Clone, Serialize)]
pub struct AffectedByFiles {
    /// Changed files grouped by owning tool.
    pub files_by_tool: BTreeMap<String, Vec<PathBuf>>,
    /// Transitive dependents of the changed tools.
    pub affected: Vec<AffectedTool>,
}

/// The unified engine facade.
///
/// Single-writer: one engine owns the store for the life of the
/// process. Graph snapshots are taken per query and never observe
/// later writes.
pub struct DepsEngine {
    config: EngineConfig,
    store: Store,
    runtime: tokio::runtime::Runtime,
}

impl DepsEngine {
    /// Opens the engine over the configured store path.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be opened or the async runtime
    /// cannot start.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store = match &config.store.db_path {
            Some(path) => Store::open(path)?,
            None => Store::open_default()?,
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        info!("engine initialized");
        Ok(Self {
            config,
            store,
            runtime,
        })
    }

    /// Engine over an in-memory store, for tests.
    pub fn in_memory() -> Result<Self> {
        let store = Store::open_in_memory()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            config: EngineConfig::default(),
            store,
            runtime,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── registration ─────────────────────────────────────────────────

    /// Registers the manifest at `path` (file or tool directory), then
    /// runs cycle detection seeded at the registered tool. New cycles
    /// are appended to the circular-dependency records and reported as
    /// warnings; cycle-detection failure degrades to a warning too.
    pub fn register(&mut self, path: &Path) -> Result<RegisterOutcome> {
        let mut outcome = register_path(&mut self.store, path)?;
        match self.record_cycles_through(&outcome.tool.id) {
            Ok(mut cycle_warnings) => outcome.warnings.append(&mut cycle_warnings),
            Err(e) => {
                warn!(tool = %outcome.tool.id, error = %e, "cycle detection failed");
                outcome
                    .warnings
                    .push(format!("cycle_detection_failed: {e}"));
            }
        }
        Ok(outcome)
    }

    /// Removes a tool. Refuses with a conflict when live dependents
    /// exist, unless forced.
    pub fn unregister(&mut self, id: &str, force: bool) -> Result<UnregisterOutcome> {
        Ok(unregister_tool(&mut self.store, id, force)?)
    }

    // ── reads ────────────────────────────────────────────────────────

    pub fn show(&self, id: &str) -> Result<ToolDetails> {
        let tool = self
            .store
            .get_tool(id)?
            .ok_or_else(|| pai_registry::RegistryError::tool_not_found(id))?;
        let providers = self
            .store
            .edges_from(id)?
            .into_iter()
            .map(|e| e.provider_id)
            .collect();
        let consumers = self
            .store
            .edges_to(id)?
            .into_iter()
            .map(|e| e.consumer_id)
            .collect();
        let contracts = self.store.contracts_for(id)?;
        let latest_verification = self.store.tool_verifications_for(id)?.into_iter().last();
        Ok(ToolDetails {
            tool,
            providers,
            consumers,
            contracts,
            latest_verification,
        })
    }

    pub fn list(
        &self,
        kind: Option<pai_manifest::ToolKind>,
        include_stubs: bool,
    ) -> Result<Vec<Tool>> {
        let tools = match kind {
            Some(kind) => self.store.list_tools_by_kind(kind)?,
            None => self.store.list_tools()?,
        };
        Ok(tools
            .into_iter()
            .filter(|t| include_stubs || !t.is_stub)
            .collect())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    pub fn cycle_records(&self, unresolved_only: bool) -> Result<Vec<CircularDepRecord>> {
        Ok(self.store.list_cycle_records(unresolved_only)?)
    }

    /// Operator bookkeeping: mark a recorded cycle resolved.
    pub fn resolve_cycle(&self, record_id: i64) -> Result<bool> {
        Ok(self.store.resolve_cycle(record_id)?)
    }

    // ── discovery & sync ─────────────────────────────────────────────

    pub fn discover(&self, roots: &[PathBuf]) -> DiscoveryReport {
        discover(roots, &self.config.discovery)
    }

    /// Discovers manifests under `roots` and registers what changed.
    /// Idempotent: a second run over the same tree classifies every
    /// manifest `unchanged`.
    pub fn sync(&mut self, roots: &[PathBuf], force: bool) -> Result<SyncSummary> {
        let discovery = discover(roots, &self.config.discovery);
        let report = sync_manifests(&mut self.store, &discovery.manifests, force);

        let mut cycle_warnings = Vec::new();
        let registered: Vec<String> = report
            .registered_ids()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for id in registered {
            match self.record_cycles_through(&id) {
                Ok(warnings) => cycle_warnings.extend(warnings),
                Err(e) => cycle_warnings.push(format!("cycle_detection_failed({id}): {e}")),
            }
        }
        cycle_warnings.sort();
        cycle_warnings.dedup();

        Ok(SyncSummary {
            report,
            discovery_warnings: discovery.warnings,
            cycle_warnings,
        })
    }

    // ── graph ────────────────────────────────────────────────────────

    /// A fresh snapshot of the dependency graph.
    pub fn graph(&self) -> Result<DepGraph> {
        Ok(DepGraph::load(&self.store)?)
    }

    pub fn graph_summary(&self) -> Result<serde_json::Value> {
        Ok(self.graph()?.serialize())
    }

    pub fn find_path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>> {
        Ok(self.graph()?.find_path(from, to)?)
    }

    pub fn all_paths(&self, from: &str, to: &str, max: usize) -> Result<Vec<Vec<String>>> {
        Ok(self.graph()?.all_paths(from, to, max)?)
    }

    pub fn cycles(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.graph()?.cycles())
    }

    pub fn topological_order(&self) -> Result<Vec<String>> {
        Ok(self.graph()?.topological_sort())
    }

    // ── verification ─────────────────────────────────────────────────

    /// Verifies every contract of one tool.
    pub fn verify(&self, id: &str, opts: &VerifyOptions) -> Result<ToolVerifyReport> {
        let report = self
            .runtime
            .block_on(verify_tool(&self.store, id, opts))?;
        Ok(report)
    }

    /// Verifies every registered (non-stub) tool. Per-tool failures of
    /// the verifier machinery become warnings; the run continues.
    pub fn verify_all(&self, opts: &VerifyOptions) -> Result<VerifyAllSummary> {
        let mut summary = VerifyAllSummary {
            reports: Vec::new(),
            warnings: Vec::new(),
        };
        for tool in self.list(None, false)? {
            match self.verify(&tool.id, opts) {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    warn!(tool = %tool.id, error = %e, "verification run failed");
                    summary.warnings.push(format!("verify_failed({}): {e}", tool.id));
                }
            }
        }
        Ok(summary)
    }

    /// Default verification options derived from the engine config.
    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            quick: self.config.verify.quick,
            timeout: self.config.verify.timeout,
            strict_mcp_extras: self.config.verify.strict_mcp_extras,
            ..VerifyOptions::default()
        }
    }

    /// Drift check across one tool, or every non-stub tool.
    pub fn drift_check(&self, id: Option<&str>, update: bool) -> Result<DriftSummary> {
        let tools = match id {
            Some(id) => vec![self
                .store
                .get_tool(id)?
                .ok_or_else(|| pai_registry::RegistryError::tool_not_found(id))?],
            None => self.list(None, false)?,
        };

        let mut summary = DriftSummary {
            items: Vec::new(),
            warnings: Vec::new(),
        };
        for tool in &tools {
            for contract in self.store.contracts_for(&tool.id)? {
                if contract.schema_path.is_none() {
                    continue;
                }
                match check_drift(&self.store, tool, &contract, update) {
                    Ok(outcome) => summary.items.push(DriftItem {
                        tool_id: tool.id.clone(),
                        outcome,
                    }),
                    Err(pai_verify::VerifyError::Registry(e)) => return Err(e.into()),
                    Err(e) => summary
                        .warnings
                        .push(format!("drift_error({}/{}): {e}", tool.id, contract.name)),
                }
            }
        }
        Ok(summary)
    }

    // ── analysis ─────────────────────────────────────────────────────

    /// Blast radius of `id`: affected set plus risk metrics.
    pub fn impact(&self, id: &str, max_depth: Option<usize>) -> Result<BlastRadius> {
        Ok(blast_radius(&self.graph()?, id, max_depth)?)
    }

    pub fn compound_reliability(&self, id: &str) -> Result<CompoundReliability> {
        Ok(compound_reliability(&self.graph()?, id)?)
    }

    /// Maps changed files to owning tools and expands to every
    /// transitive dependent, the contract CI glue consumes.
    pub fn affected_by_files(&self, paths: &[PathBuf]) -> Result<AffectedByFiles> {
        let mut mapper = FileToolMapper::new(&self.store);
        let files_by_tool = mapper.map_files(paths);
        let sources: Vec<String> = files_by_tool.keys().cloned().collect();
        let affected = if sources.is_empty() {
            Vec::new()
        } else {
            affected_by(&self.graph()?, &sources)?
        };
        Ok(AffectedByFiles {
            files_by_tool,
            affected,
        })
    }

    // ── internals ────────────────────────────────────────────────────

    /// Registrar step 7: detect cycles through `id` on a fresh
    /// snapshot, append unseen ones, return warnings for all of them.
    fn record_cycles_through(&self, id: &str) -> Result<Vec<String>> {
        let graph = DepGraph::load(&self.store)?;
        let mut warnings = Vec::new();
        for cycle in graph.cycles_through(id) {
            let normalized = normalize_cycle(&cycle);
            warnings.push(format!("cycle_detected({})", normalized.join(" -> ")));
            if !self.store.has_unresolved_cycle(&normalized)? {
                self.store.insert_cycle_record(&normalized)?;
                debug!(cycle = ?normalized, "recorded dependency cycle");
            }
        }
        Ok(warnings)
    }
}

impl std::fmt::Debug for DepsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepsEngine").finish_non_exhaustive()
    }
}
