//! Schema drift detection.
//!
//! A contract's declared schema file is loaded, canonicalized, and
//! hashed; the hash is compared with the recorded baseline. Outcomes:
//!
//! | Stored hash | Schema file | State |
//! |-------------|-------------|-----------|
//! | absent | present | `new` |
//! | present | missing | `missing` |
//! | absent | missing | `error` |
//! | equal | present | `unchanged` |
//! | differs | present | `drift` |
//!
//! On drift the top-level field diff is the symmetric difference of the
//! old and new top-level object keys; deeper diffs are out of scope.
//! Nothing is persisted unless the caller asks for `update`, which
//! accepts the current schema as the new baseline and records a
//! verification row.

use crate::error::VerifyError;
use chrono::Utc;
use pai_manifest::{canonicalize, hash_canonical};
use pai_registry::{Contract, ContractStatus, Store, Tool, VerifyStatus};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Drift comparison result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriftState {
    /// No baseline recorded yet; the current hash would become it.
    #[serde(rename = "new")]
    New,
    /// A baseline exists but the schema file is gone.
    #[serde(rename = "missing")]
    Missing,
    /// Neither baseline nor file: nothing to compare.
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "unchanged")]
    Unchanged,
    #[serde(rename = "drift")]
    Drift,
}

/// Outcome of one drift check.
#[derive(Debug, Clone, Serialize)]
pub struct DriftOutcome {
    pub contract_id: i64,
    pub contract_name: String,
    pub state: DriftState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hash: Option<String>,
    /// Top-level keys present now but not in the baseline.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    /// Top-level keys present in the baseline but gone now.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    /// True when this check persisted a new baseline.
    pub updated: bool,
}

impl DriftOutcome {
    pub fn details(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("outcome serialization cannot fail")
    }
}

/// Resolves a contract's schema path against its tool's directory.
pub fn resolve_schema_path(tool: &Tool, schema_path: &str) -> PathBuf {
    let raw = Path::new(schema_path);
    if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        Path::new(&tool.filesystem_path).join(raw)
    }
}

/// Checks one contract for schema drift.
///
/// With `update`, the current hash (and canonical snapshot) become the
/// stored baseline, `last_verified_at` is stamped, and a verification
/// row records the event: `pass` for new/unchanged baselines, `drift`
/// when the hash moved, `fail` when there was nothing to compare.
pub fn check_drift(
    store: &Store,
    tool: &Tool,
    contract: &Contract,
    update: bool,
) -> Result<DriftOutcome, VerifyError> {
    let mut outcome = DriftOutcome {
        contract_id: contract.id,
        contract_name: contract.name.clone(),
        state: DriftState::Error,
        stored_hash: contract.schema_hash.clone(),
        current_hash: None,
        added: Vec::new(),
        removed: Vec::new(),
        updated: false,
    };

    let Some(declared) = contract.schema_path.as_deref() else {
        // No declared schema: nothing to compare against.
        return Ok(outcome);
    };
    let schema_file = resolve_schema_path(tool, declared);

    let current: Option<serde_json::Value> = match std::fs::read_to_string(&schema_file) {
        Ok(text) => Some(serde_json::from_str(&text).map_err(|source| {
            VerifyError::SchemaParse {
                path: schema_file.display().to_string(),
                source,
            }
        })?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(VerifyError::SchemaRead {
                path: schema_file.display().to_string(),
                source,
            })
        }
    };

    let snapshot = current.as_ref().map(canonicalize);
    outcome.current_hash = current.as_ref().map(hash_canonical);

    outcome.state = match (&contract.schema_hash, &outcome.current_hash) {
        (None, Some(_)) => DriftState::New,
        (Some(_), None) => DriftState::Missing,
        (None, None) => DriftState::Error,
        (Some(stored), Some(current_hash)) if stored == current_hash => DriftState::Unchanged,
        (Some(_), Some(_)) => DriftState::Drift,
    };

    if outcome.state == DriftState::Drift {
        let old: Option<serde_json::Value> = contract
            .schema_snapshot
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok());
        let (added, removed) = top_level_diff(old.as_ref(), current.as_ref());
        outcome.added = added;
        outcome.removed = removed;
        info!(
            contract = %contract.name,
            stored = ?outcome.stored_hash,
            current = ?outcome.current_hash,
            "schema drift detected"
        );
    } else {
        debug!(contract = %contract.name, state = ?outcome.state, "drift check");
    }

    if update {
        apply_update(store, contract, &mut outcome, snapshot.as_deref())?;
    }

    Ok(outcome)
}

fn apply_update(
    store: &Store,
    contract: &Contract,
    outcome: &mut DriftOutcome,
    snapshot: Option<&str>,
) -> Result<(), VerifyError> {
    let now = Utc::now();
    let (row_status, contract_status) = match outcome.state {
        DriftState::New | DriftState::Unchanged => (VerifyStatus::Pass, ContractStatus::Valid),
        // The caller accepted the moved schema as the new baseline.
        DriftState::Drift => (VerifyStatus::Drift, ContractStatus::Valid),
        DriftState::Missing => (VerifyStatus::Fail, ContractStatus::Broken),
        DriftState::Error => (VerifyStatus::Fail, ContractStatus::Unknown),
    };

    match outcome.state {
        DriftState::New | DriftState::Unchanged | DriftState::Drift => {
            store.update_contract_hash(
                contract.id,
                outcome.current_hash.as_deref(),
                snapshot,
                contract_status,
                now,
            )?;
            outcome.updated = true;
        }
        DriftState::Missing | DriftState::Error => {
            store.set_contract_status(contract.id, contract_status, now)?;
        }
    }

    store.insert_verification(contract.id, row_status, &outcome.details(), None)?;
    Ok(())
}

/// Symmetric difference of top-level object keys. Non-objects diff as
/// empty.
fn top_level_diff(
    old: Option<&serde_json::Value>,
    new: Option<&serde_json::Value>,
) -> (Vec<String>, Vec<String>) {
    let keys = |value: Option<&serde_json::Value>| -> Vec<String> {
        value
            .and_then(|v| v.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default()
    };
    let old_keys = keys(old);
    let new_keys = keys(new);
    let added = new_keys
        .iter()
        .filter(|k| !old_keys.contains(k))
        .cloned()
        .collect();
    let removed = old_keys
        .iter()
        .filter(|k| !new_keys.contains(k))
        .cloned()
        .collect();
    (added, removed)
}
