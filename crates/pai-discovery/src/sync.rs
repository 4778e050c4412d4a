//! Idempotent bulk registration of discovered manifests.
//!
//! Each discovered manifest is classified against stored state by its
//! canonical content hash: `new` (never registered, or only a stub),
//! `updated` (hash differs), `unchanged` (hash matches), or `error`
//! (unreadable or invalid). Only `new` and `updated` manifests pass
//! through the registrar, unless `force` re-registers everything.
//! Running sync twice over the same tree classifies every item
//! `unchanged` on the second run.

use crate::walker::DiscoveredManifest;
use pai_manifest::load_manifest;
use pai_registry::{register_manifest, Store};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Classification of one manifest during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncStatus {
    #[serde(rename = "new")]
    New,
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "unchanged")]
    Unchanged,
    #[serde(rename = "error")]
    Error,
}

/// Per-manifest sync outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SyncItem {
    pub manifest_path: PathBuf,
    /// Tool id, when the manifest parsed far enough to know it.
    pub tool_id: Option<String>,
    pub status: SyncStatus,
    /// Error text for `error` items.
    pub detail: Option<String>,
    /// Registrar warnings (stubs, duplicates) for registered items.
    pub warnings: Vec<String>,
}

/// Result of one sync run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub items: Vec<SyncItem>,
    pub new_count: usize,
    pub updated_count: usize,
    pub unchanged_count: usize,
    pub error_count: usize,
}

impl SyncReport {
    /// Ids of tools that were actually (re-)registered this run.
    pub fn registered_ids(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| matches!(item.status, SyncStatus::New | SyncStatus::Updated))
            .filter_map(|item| item.tool_id.as_deref())
            .collect()
    }
}

/// Registers every discovered manifest that is new or changed.
///
/// Each registration is its own transaction; a failure on one manifest
/// becomes an `error` item and the run continues.
pub fn sync_manifests(
    store: &mut Store,
    discovered: &[DiscoveredManifest],
    force: bool,
) -> SyncReport {
    let mut report = SyncReport::default();

    for found in discovered {
        let item = sync_one(store, found, force);
        match item.status {
            SyncStatus::New => report.new_count += 1,
            SyncStatus::Updated => report.updated_count += 1,
            SyncStatus::Unchanged => report.unchanged_count += 1,
            SyncStatus::Error => report.error_count += 1,
        }
        report.items.push(item);
    }

    info!(
        new = report.new_count,
        updated = report.updated_count,
        unchanged = report.unchanged_count,
        errors = report.error_count,
        "sync finished"
    );
    report
}

fn sync_one(store: &mut Store, found: &DiscoveredManifest, force: bool) -> SyncItem {
    let manifest = match load_manifest(&found.manifest_path) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!(path = %found.manifest_path.display(), error = %e, "sync skipping manifest");
            return SyncItem {
                manifest_path: found.manifest_path.clone(),
                tool_id: None,
                status: SyncStatus::Error,
                detail: Some(e.to_string()),
                warnings: Vec::new(),
            };
        }
    };

    let hash = manifest.canonical_hash();
    let status = match store.get_tool(&manifest.name) {
        Ok(Some(stored)) if !stored.is_stub => {
            if stored.manifest_hash.as_deref() == Some(hash.as_str()) {
                SyncStatus::Unchanged
            } else {
                SyncStatus::Updated
            }
        }
        Ok(_) => SyncStatus::New,
        Err(e) => {
            return SyncItem {
                manifest_path: found.manifest_path.clone(),
                tool_id: Some(manifest.name),
                status: SyncStatus::Error,
                detail: Some(e.to_string()),
                warnings: Vec::new(),
            };
        }
    };

    let mut warnings = Vec::new();
    if force || matches!(status, SyncStatus::New | SyncStatus::Updated) {
        match register_manifest(store, &manifest, &found.manifest_path) {
            Ok(outcome) => warnings = outcome.warnings,
            Err(e) => {
                return SyncItem {
                    manifest_path: found.manifest_path.clone(),
                    tool_id: Some(manifest.name),
                    status: SyncStatus::Error,
                    detail: Some(e.to_string()),
                    warnings: Vec::new(),
                };
            }
        }
    }

    SyncItem {
        manifest_path: found.manifest_path.clone(),
        tool_id: Some(manifest.name),
        status,
        detail: None,
        warnings,
    }
}
