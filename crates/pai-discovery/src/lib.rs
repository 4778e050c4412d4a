//! # pai-discovery
//!
//! Finds `pai-manifest.yaml` files under one or more roots, maps
//! arbitrary file paths back to their owning tool, and bulk-registers
//! discovered manifests idempotently.
//!
//! Walk failures never abort a discovery run: unreadable directories,
//! broken symlinks, and malformed manifests are demoted to warnings and
//! the walk continues.

mod mapper;
mod sync;
mod walker;

pub use mapper::FileToolMapper;
pub use sync::{sync_manifests, SyncItem, SyncReport, SyncStatus};
pub use walker::{discover, DiscoveredManifest, DiscoveryOptions, DiscoveryReport};
