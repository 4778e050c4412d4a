//! Recursive manifest discovery.
//!
//! A directory is a tool root iff it directly contains
//! `pai-manifest.yaml`; the walk records it and does not descend further
//! (no nested manifests within a tool). The walk always skips a fixed
//! set of build/VCS directories, honors `.gitignore` files accumulated
//! from each ancestor, caps depth, refuses oversized directories, and
//! tracks canonical paths so symlink loops terminate.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory names that are never descended into.
const DEFAULT_SKIP: &[&str] = &["node_modules", ".git", "dist", "build", ".cache", "coverage"];

/// Knobs for a discovery walk.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum directory depth below each root.
    pub max_depth: usize,
    /// Honor `.gitignore` files found along the walk.
    pub honor_gitignore: bool,
    /// Directories with more entries than this are skipped outright.
    pub max_entries_per_dir: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            honor_gitignore: true,
            max_entries_per_dir: 1000,
        }
    }
}

/// One discovered tool root.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredManifest {
    /// The tool's directory.
    pub tool_dir: PathBuf,
    /// The manifest file inside it.
    pub manifest_path: PathBuf,
}

/// Result of a discovery walk.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DiscoveryReport {
    pub manifests: Vec<DiscoveredManifest>,
    /// Per-file problems encountered and skipped.
    pub warnings: Vec<String>,
}

/// Walks `roots` and collects every tool root underneath them.
pub fn discover(roots: &[PathBuf], options: &DiscoveryOptions) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    let mut visited: HashSet<PathBuf> = HashSet::new();

    for root in roots {
        if !root.is_dir() {
            report
                .warnings
                .push(format!("{}: not a directory", root.display()));
            continue;
        }
        let mut ignores: Vec<Gitignore> = Vec::new();
        walk(root, 0, options, &mut ignores, &mut visited, &mut report);
    }

    for warning in &report.warnings {
        warn!("discovery: {warning}");
    }
    debug!(
        manifests = report.manifests.len(),
        warnings = report.warnings.len(),
        "discovery walk finished"
    );
    report
}

fn walk(
    dir: &Path,
    depth: usize,
    options: &DiscoveryOptions,
    ignores: &mut Vec<Gitignore>,
    visited: &mut HashSet<PathBuf>,
    report: &mut DiscoveryReport,
) {
    // Symlink-loop protection: one visit per real path.
    match dir.canonicalize() {
        Ok(real) => {
            if !visited.insert(real) {
                return;
            }
        }
        Err(e) => {
            report
                .warnings
                .push(format!("{}: cannot resolve: {e}", dir.display()));
            return;
        }
    }

    let manifest = dir.join(pai_manifest::MANIFEST_FILE_NAME);
    if manifest.is_file() {
        report.manifests.push(DiscoveredManifest {
            tool_dir: dir.to_path_buf(),
            manifest_path: manifest,
        });
        // A tool root terminates the walk: no nested manifests.
        return;
    }

    if depth >= options.max_depth {
        return;
    }

    let mut pushed_ignore = false;
    if options.honor_gitignore {
        let gitignore_file = dir.join(".gitignore");
        if gitignore_file.is_file() {
            let mut builder = GitignoreBuilder::new(dir);
            if let Some(e) = builder.add(&gitignore_file) {
                report
                    .warnings
                    .push(format!("{}: bad .gitignore: {e}", gitignore_file.display()));
            }
            match builder.build() {
                Ok(gitignore) => {
                    ignores.push(gitignore);
                    pushed_ignore = true;
                }
                Err(e) => report
                    .warnings
                    .push(format!("{}: bad .gitignore: {e}", gitignore_file.display())),
            }
        }
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report
                .warnings
                .push(format!("{}: cannot read: {e}", dir.display()));
            if pushed_ignore {
                ignores.pop();
            }
            return;
        }
    };

    let mut subdirs: Vec<PathBuf> = Vec::new();
    let mut entry_count = 0usize;
    let mut oversized = false;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report
                    .warnings
                    .push(format!("{}: unreadable entry: {e}", dir.display()));
                continue;
            }
        };
        entry_count += 1;
        if entry_count > options.max_entries_per_dir {
            oversized = true;
            break;
        }
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
        }
    }

    if oversized {
        // Safety valve for vendored trees the skip list missed.
        report.warnings.push(format!(
            "{}: more than {} entries, skipped",
            dir.display(),
            options.max_entries_per_dir
        ));
        if pushed_ignore {
            ignores.pop();
        }
        return;
    }

    subdirs.sort();
    for subdir in subdirs {
        let name = subdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if DEFAULT_SKIP.contains(&name.as_str()) {
            continue;
        }
        if ignores
            .iter()
            .any(|gi| gi.matched(&subdir, true).is_ignore())
        {
            continue;
        }
        walk(&subdir, depth + 1, options, ignores, visited, report);
    }

    if pushed_ignore {
        ignores.pop();
    }
}
