//! # pai-manifest
//!
//! The manifest layer of pai-deps: the canonical schema for
//! `pai-manifest.yaml` documents, a deterministic parse/validate pipeline,
//! and the canonical JSON hashing used everywhere a stable content hash is
//! needed (schema drift, sync change detection).
//!
//! ## Document shape
//!
//! ```yaml
//! name: email
//! version: 1.2.0
//! kind: cli+mcp
//! description: Email search and send
//! provides:
//!   cli:
//!     - command: "email search --json"
//!       output_schema: schemas/search.json
//!   mcp:
//!     - tool: email_search
//!       schema: schemas/email_search.json
//! depends_on:
//!   - name: resona
//!     kind: library
//! reliability: 0.95
//! debt_score: 0
//! ```
//!
//! ## Validation philosophy
//!
//! Parsing never stops at the first violation: every failed constraint is
//! collected with a dotted field path (`depends_on.2.kind`) and reported
//! in one [`ManifestError::Invalid`]. Unknown top-level keys are rejected,
//! enum values are case-sensitive, and relative schema paths are preserved
//! verbatim (resolution happens later against the owning tool's path).

mod canonical;
mod error;
mod model;
mod parse;

pub use canonical::{canonicalize, hash_canonical, hash_str, yaml_to_json};
pub use error::{FieldError, ManifestError};
pub use model::{
    CliFacet, DatabaseFacet, Dependency, DependencyKind, LibraryFacet, Manifest, McpFacet,
    Provides, ToolKind, DEFAULT_RELIABILITY, MANIFEST_FILE_NAME,
};
pub use parse::{load_manifest, parse_manifest};

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;
