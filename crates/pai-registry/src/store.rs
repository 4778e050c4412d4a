//! SQLite-backed registry store.
//!
//! One embedded relational file per user, opened (or created) with an
//! idempotent `CREATE … IF NOT EXISTS` bootstrap. Foreign keys are
//! enforced per connection and every multi-row mutation runs inside a
//! transaction, so a crash mid-registration never exposes partial state.
//!
//! The store is single-writer: one process, one connection, exclusive
//! ownership. Concurrent multi-user access is out of scope.

use crate::entities::{
    CircularDepRecord, Contract, ContractKind, ContractStatus, DependencyEdge, OverallStatus,
    Tool, ToolVerification, Verification, VerifyStatus,
};
use crate::error::RegistryError;
use crate::Result;
use chrono::{DateTime, Utc};
use pai_manifest::{DependencyKind, ToolKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the default store location.
pub const DB_ENV_VAR: &str = "PAI_DEPS_DB";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tools (
    id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    filesystem_path TEXT NOT NULL,
    kind TEXT NOT NULL,
    version TEXT,
    reliability REAL NOT NULL DEFAULT 0.95,
    debt_score INTEGER NOT NULL DEFAULT 0,
    manifest_path TEXT,
    manifest_hash TEXT,
    is_stub INTEGER NOT NULL DEFAULT 0,
    last_verified_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tools_kind ON tools(kind);
CREATE INDEX IF NOT EXISTS idx_tools_is_stub ON tools(is_stub);

CREATE TABLE IF NOT EXISTS dependency_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    consumer_id TEXT NOT NULL REFERENCES tools(id) ON DELETE CASCADE,
    provider_id TEXT NOT NULL REFERENCES tools(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    version_constraint TEXT,
    optional INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(consumer_id, provider_id)
);
CREATE INDEX IF NOT EXISTS idx_edges_consumer ON dependency_edges(consumer_id);
CREATE INDEX IF NOT EXISTS idx_edges_provider ON dependency_edges(provider_id);

CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tool_id TEXT NOT NULL REFERENCES tools(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    name TEXT NOT NULL,
    schema_path TEXT,
    schema_hash TEXT,
    schema_snapshot TEXT,
    last_verified_at TEXT,
    status TEXT NOT NULL DEFAULT 'unknown',
    UNIQUE(tool_id, kind, name)
);
CREATE INDEX IF NOT EXISTS idx_contracts_tool ON contracts(tool_id);

CREATE TABLE IF NOT EXISTS verifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contract_id INTEGER NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    verified_at TEXT NOT NULL,
    status TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    vcs_commit TEXT
);
CREATE INDEX IF NOT EXISTS idx_verifications_contract ON verifications(contract_id);

CREATE TABLE IF NOT EXISTS tool_verifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tool_id TEXT NOT NULL REFERENCES tools(id) ON DELETE CASCADE,
    verified_at TEXT NOT NULL,
    cli_pass INTEGER NOT NULL DEFAULT 0,
    cli_fail INTEGER NOT NULL DEFAULT 0,
    cli_skip INTEGER NOT NULL DEFAULT 0,
    mcp_found INTEGER NOT NULL DEFAULT 0,
    mcp_missing INTEGER NOT NULL DEFAULT 0,
    mcp_extra INTEGER NOT NULL DEFAULT 0,
    overall_status TEXT NOT NULL,
    vcs_commit TEXT,
    duration_ms INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tool_verifications_tool ON tool_verifications(tool_id);
CREATE INDEX IF NOT EXISTS idx_tool_verifications_at ON tool_verifications(verified_at);

CREATE TABLE IF NOT EXISTS circular_deps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    cycle TEXT NOT NULL,
    detected_at TEXT NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0
);
"#;

/// Aggregate registry counts, for the stats surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub tool_count: usize,
    pub stub_count: usize,
    pub edge_count: usize,
    pub contract_count: usize,
    pub unresolved_cycle_count: usize,
}

/// Handle to the registry's SQLite file.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Opens (or creates) the store at `path` and bootstraps the schema.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Store`] when the file cannot be opened or
    /// the bootstrap fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened registry store");
        Self::bootstrap(conn)
    }

    /// Opens the store at the default user-scoped path, honoring the
    /// `PAI_DEPS_DB` override.
    pub fn open_default() -> Result<Self> {
        Self::open(&Self::default_path())
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::bootstrap(conn)
    }

    /// The platform default store path: `<config dir>/pai-deps/registry.db`,
    /// overridable via [`DB_ENV_VAR`].
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(DB_ENV_VAR) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pai-deps")
            .join("registry.db")
    }

    fn bootstrap(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    // ── tools ────────────────────────────────────────────────────────

    pub fn get_tool(&self, id: &str) -> Result<Option<Tool>> {
        self.conn
            .query_row(
                "SELECT id, display_name, filesystem_path, kind, version, reliability,
                        debt_score, manifest_path, manifest_hash, is_stub,
                        last_verified_at, created_at, updated_at
                 FROM tools WHERE id = ?1",
                params![id],
                tool_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, filesystem_path, kind, version, reliability,
                    debt_score, manifest_path, manifest_hash, is_stub,
                    last_verified_at, created_at, updated_at
             FROM tools ORDER BY id",
        )?;
        let rows = stmt.query_map([], tool_from_row)?;
        collect(rows)
    }

    pub fn list_tools_by_kind(&self, kind: ToolKind) -> Result<Vec<Tool>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, filesystem_path, kind, version, reliability,
                    debt_score, manifest_path, manifest_hash, is_stub,
                    last_verified_at, created_at, updated_at
             FROM tools WHERE kind = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], tool_from_row)?;
        collect(rows)
    }

    pub fn list_stubs(&self) -> Result<Vec<Tool>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_name, filesystem_path, kind, version, reliability,
                    debt_score, manifest_path, manifest_hash, is_stub,
                    last_verified_at, created_at, updated_at
             FROM tools WHERE is_stub = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map([], tool_from_row)?;
        collect(rows)
    }

    /// Deletes a tool; cascades to contracts, verifications, summaries,
    /// and every incident edge. Returns false when the tool was absent.
    pub fn delete_tool(&mut self, id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM tools WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    pub fn set_tool_last_verified(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE tools SET last_verified_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    // ── dependency edges ─────────────────────────────────────────────

    pub fn list_edges(&self) -> Result<Vec<DependencyEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, consumer_id, provider_id, kind, version_constraint, optional, created_at
             FROM dependency_edges ORDER BY id",
        )?;
        let rows = stmt.query_map([], edge_from_row)?;
        collect(rows)
    }

    /// Edges where `id` is the consumer (its providers).
    pub fn edges_from(&self, id: &str) -> Result<Vec<DependencyEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, consumer_id, provider_id, kind, version_constraint, optional, created_at
             FROM dependency_edges WHERE consumer_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id], edge_from_row)?;
        collect(rows)
    }

    /// Edges where `id` is the provider (its consumers).
    pub fn edges_to(&self, id: &str) -> Result<Vec<DependencyEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, consumer_id, provider_id, kind, version_constraint, optional, created_at
             FROM dependency_edges WHERE provider_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id], edge_from_row)?;
        collect(rows)
    }

    // ── contracts ────────────────────────────────────────────────────

    pub fn get_contract(&self, id: i64) -> Result<Option<Contract>> {
        self.conn
            .query_row(
                "SELECT id, tool_id, kind, name, schema_path, schema_hash,
                        schema_snapshot, last_verified_at, status
                 FROM contracts WHERE id = ?1",
                params![id],
                contract_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn find_contract(
        &self,
        tool_id: &str,
        kind: ContractKind,
        name: &str,
    ) -> Result<Option<Contract>> {
        self.conn
            .query_row(
                "SELECT id, tool_id, kind, name, schema_path, schema_hash,
                        schema_snapshot, last_verified_at, status
                 FROM contracts WHERE tool_id = ?1 AND kind = ?2 AND name = ?3",
                params![tool_id, kind.as_str(), name],
                contract_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn contracts_for(&self, tool_id: &str) -> Result<Vec<Contract>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tool_id, kind, name, schema_path, schema_hash,
                    schema_snapshot, last_verified_at, status
             FROM contracts WHERE tool_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![tool_id], contract_from_row)?;
        collect(rows)
    }

    pub fn list_contracts(&self) -> Result<Vec<Contract>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tool_id, kind, name, schema_path, schema_hash,
                    schema_snapshot, last_verified_at, status
             FROM contracts ORDER BY id",
        )?;
        let rows = stmt.query_map([], contract_from_row)?;
        collect(rows)
    }

    /// Persists a freshly computed schema hash and status stamp.
    pub fn update_contract_hash(
        &self,
        contract_id: i64,
        hash: Option<&str>,
        snapshot: Option<&str>,
        status: ContractStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE contracts SET schema_hash = ?2, schema_snapshot = ?3, status = ?4,
                    last_verified_at = ?5
             WHERE id = ?1",
            params![contract_id, hash, snapshot, status.as_str(), at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(RegistryError::contract_not_found(contract_id));
        }
        Ok(())
    }

    pub fn set_contract_status(
        &self,
        contract_id: i64,
        status: ContractStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE contracts SET status = ?2, last_verified_at = ?3 WHERE id = ?1",
            params![contract_id, status.as_str(), at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(RegistryError::contract_not_found(contract_id));
        }
        Ok(())
    }

    // ── verifications ────────────────────────────────────────────────

    /// Records one verification attempt. A single insert is its own
    /// transaction.
    pub fn insert_verification(
        &self,
        contract_id: i64,
        status: VerifyStatus,
        details: &serde_json::Value,
        vcs_commit: Option<&str>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO verifications (contract_id, verified_at, status, details, vcs_commit)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                contract_id,
                Utc::now().to_rfc3339(),
                status.as_str(),
                details.to_string(),
                vcs_commit
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn verifications_for(&self, contract_id: i64) -> Result<Vec<Verification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, contract_id, verified_at, status, details, vcs_commit
             FROM verifications WHERE contract_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![contract_id], verification_from_row)?;
        collect(rows)
    }

    pub fn insert_tool_verification(&self, summary: &ToolVerification) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO tool_verifications
                (tool_id, verified_at, cli_pass, cli_fail, cli_skip,
                 mcp_found, mcp_missing, mcp_extra, overall_status, vcs_commit, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                summary.tool_id,
                summary.verified_at.to_rfc3339(),
                summary.cli_pass,
                summary.cli_fail,
                summary.cli_skip,
                summary.mcp_found,
                summary.mcp_missing,
                summary.mcp_extra,
                summary.overall_status.as_str(),
                summary.vcs_commit,
                summary.duration_ms as i64
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn tool_verifications_for(&self, tool_id: &str) -> Result<Vec<ToolVerification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tool_id, verified_at, cli_pass, cli_fail, cli_skip,
                    mcp_found, mcp_missing, mcp_extra, overall_status, vcs_commit, duration_ms
             FROM tool_verifications WHERE tool_id = ?1 ORDER BY verified_at",
        )?;
        let rows = stmt.query_map(params![tool_id], tool_verification_from_row)?;
        collect(rows)
    }

    // ── circular dependency records ──────────────────────────────────

    /// Appends a cycle record. The member list is serialized as JSON.
    pub fn insert_cycle_record(&self, cycle: &[String]) -> Result<i64> {
        let serialized = serde_json::to_string(cycle)
            .expect("string list serialization cannot fail");
        self.conn.execute(
            "INSERT INTO circular_deps (cycle, detected_at, resolved) VALUES (?1, ?2, 0)",
            params![serialized, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_cycle_records(&self, unresolved_only: bool) -> Result<Vec<CircularDepRecord>> {
        let sql = if unresolved_only {
            "SELECT id, cycle, detected_at, resolved FROM circular_deps
             WHERE resolved = 0 ORDER BY id"
        } else {
            "SELECT id, cycle, detected_at, resolved FROM circular_deps ORDER BY id"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], cycle_from_row)?;
        collect(rows)
    }

    /// True when an identical unresolved cycle is already on record.
    pub fn has_unresolved_cycle(&self, cycle: &[String]) -> Result<bool> {
        let serialized = serde_json::to_string(cycle)
            .expect("string list serialization cannot fail");
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM circular_deps WHERE cycle = ?1 AND resolved = 0",
            params![serialized],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Flags a cycle record as resolved. Returns false when absent.
    pub fn resolve_cycle(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("UPDATE circular_deps SET resolved = 1 WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ── aggregates ───────────────────────────────────────────────────

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            tool_count: count("SELECT COUNT(*) FROM tools")?,
            stub_count: count("SELECT COUNT(*) FROM tools WHERE is_stub = 1")?,
            edge_count: count("SELECT COUNT(*) FROM dependency_edges")?,
            contract_count: count("SELECT COUNT(*) FROM contracts")?,
            unresolved_cycle_count: count(
                "SELECT COUNT(*) FROM circular_deps WHERE resolved = 0",
            )?,
        })
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

// ── row mapping ──────────────────────────────────────────────────────

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_ts_opt(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        None => Ok(None),
        Some(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

fn bad_enum(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unrecognized enum value '{value}'").into(),
    )
}

fn tool_from_row(row: &Row<'_>) -> rusqlite::Result<Tool> {
    let kind_text: String = row.get(3)?;
    let kind = ToolKind::parse(&kind_text).ok_or_else(|| bad_enum(3, &kind_text))?;
    Ok(Tool {
        id: row.get(0)?,
        display_name: row.get(1)?,
        filesystem_path: row.get(2)?,
        kind,
        version: row.get(4)?,
        reliability: row.get(5)?,
        debt_score: row.get(6)?,
        manifest_path: row.get(7)?,
        manifest_hash: row.get(8)?,
        is_stub: row.get::<_, i64>(9)? != 0,
        last_verified_at: parse_ts_opt(row, 10)?,
        created_at: parse_ts(row, 11)?,
        updated_at: parse_ts(row, 12)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<DependencyEdge> {
    let kind_text: String = row.get(3)?;
    let kind = DependencyKind::parse(&kind_text).ok_or_else(|| bad_enum(3, &kind_text))?;
    Ok(DependencyEdge {
        id: row.get(0)?,
        consumer_id: row.get(1)?,
        provider_id: row.get(2)?,
        kind,
        version_constraint: row.get(4)?,
        optional: row.get::<_, i64>(5)? != 0,
        created_at: parse_ts(row, 6)?,
    })
}

fn contract_from_row(row: &Row<'_>) -> rusqlite::Result<Contract> {
    let kind_text: String = row.get(2)?;
    let kind = ContractKind::parse(&kind_text).ok_or_else(|| bad_enum(2, &kind_text))?;
    let status_text: String = row.get(8)?;
    let status = ContractStatus::parse(&status_text).ok_or_else(|| bad_enum(8, &status_text))?;
    Ok(Contract {
        id: row.get(0)?,
        tool_id: row.get(1)?,
        kind,
        name: row.get(3)?,
        schema_path: row.get(4)?,
        schema_hash: row.get(5)?,
        schema_snapshot: row.get(6)?,
        last_verified_at: parse_ts_opt(row, 7)?,
        status,
    })
}

fn verification_from_row(row: &Row<'_>) -> rusqlite::Result<Verification> {
    let status_text: String = row.get(3)?;
    let status = VerifyStatus::parse(&status_text).ok_or_else(|| bad_enum(3, &status_text))?;
    let details_text: String = row.get(4)?;
    let details = serde_json::from_str(&details_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Verification {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        verified_at: parse_ts(row, 2)?,
        status,
        details,
        vcs_commit: row.get(5)?,
    })
}

fn tool_verification_from_row(row: &Row<'_>) -> rusqlite::Result<ToolVerification> {
    let status_text: String = row.get(9)?;
    let overall_status =
        OverallStatus::parse(&status_text).ok_or_else(|| bad_enum(9, &status_text))?;
    Ok(ToolVerification {
        id: row.get(0)?,
        tool_id: row.get(1)?,
        verified_at: parse_ts(row, 2)?,
        cli_pass: row.get(3)?,
        cli_fail: row.get(4)?,
        cli_skip: row.get(5)?,
        mcp_found: row.get(6)?,
        mcp_missing: row.get(7)?,
        mcp_extra: row.get(8)?,
        overall_status,
        vcs_commit: row.get(10)?,
        duration_ms: row.get::<_, i64>(11)? as u64,
    })
}

fn cycle_from_row(row: &Row<'_>) -> rusqlite::Result<CircularDepRecord> {
    let serialized: String = row.get(1)?;
    let cycle: Vec<String> = serde_json::from_str(&serialized).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(CircularDepRecord {
        id: row.get(0)?,
        cycle,
        detected_at: parse_ts(row, 2)?,
        resolved: row.get::<_, i64>(3)? != 0,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    rows.collect::<rusqlite::Result<Vec<T>>>().map_err(Into::into)
}
