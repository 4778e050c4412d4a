//! Typed manifest schema.
//!
//! These types are the in-memory form of a `pai-manifest.yaml` document.
//! They are never persisted verbatim; the registrar projects them onto
//! tool rows, dependency edges, and contracts.

use serde::{Deserialize, Serialize};

/// File name that marks a directory as a tool root.
pub const MANIFEST_FILE_NAME: &str = "pai-manifest.yaml";

/// Default reliability for tools that do not declare one.
pub const DEFAULT_RELIABILITY: f64 = 0.95;

/// What a registered tool fundamentally is.
///
/// Values are case-sensitive in the YAML document (`cli+mcp`, not
/// `CLI+MCP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "cli")]
    Cli,
    #[serde(rename = "mcp")]
    Mcp,
    #[serde(rename = "library")]
    Library,
    #[serde(rename = "workflow")]
    Workflow,
    #[serde(rename = "hook")]
    Hook,
    #[serde(rename = "cli+mcp")]
    CliMcp,
}

impl ToolKind {
    /// The canonical string form, as it appears in manifests and at rest.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Cli => "cli",
            ToolKind::Mcp => "mcp",
            ToolKind::Library => "library",
            ToolKind::Workflow => "workflow",
            ToolKind::Hook => "hook",
            ToolKind::CliMcp => "cli+mcp",
        }
    }

    /// Case-sensitive parse of the canonical string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cli" => Some(ToolKind::Cli),
            "mcp" => Some(ToolKind::Mcp),
            "library" => Some(ToolKind::Library),
            "workflow" => Some(ToolKind::Workflow),
            "hook" => Some(ToolKind::Hook),
            "cli+mcp" => Some(ToolKind::CliMcp),
            _ => None,
        }
    }

    /// True for kinds that expose an MCP server surface.
    pub fn has_mcp_surface(&self) -> bool {
        matches!(self, ToolKind::Mcp | ToolKind::CliMcp)
    }

    /// True for kinds that expose a CLI surface.
    pub fn has_cli_surface(&self) -> bool {
        matches!(self, ToolKind::Cli | ToolKind::CliMcp)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    #[serde(rename = "cli")]
    Cli,
    #[serde(rename = "mcp")]
    Mcp,
    #[serde(rename = "library")]
    Library,
    #[serde(rename = "database")]
    Database,
    #[serde(rename = "npm")]
    Npm,
    #[serde(rename = "implicit")]
    Implicit,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Cli => "cli",
            DependencyKind::Mcp => "mcp",
            DependencyKind::Library => "library",
            DependencyKind::Database => "database",
            DependencyKind::Npm => "npm",
            DependencyKind::Implicit => "implicit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cli" => Some(DependencyKind::Cli),
            "mcp" => Some(DependencyKind::Mcp),
            "library" => Some(DependencyKind::Library),
            "database" => Some(DependencyKind::Database),
            "npm" => Some(DependencyKind::Npm),
            "implicit" => Some(DependencyKind::Implicit),
            _ => None,
        }
    }

    /// Tool kind to assign when synthesizing a stub provider for this
    /// dependency kind.
    pub fn stub_tool_kind(&self) -> ToolKind {
        match self {
            DependencyKind::Cli => ToolKind::Cli,
            DependencyKind::Mcp => ToolKind::Mcp,
            DependencyKind::Library
            | DependencyKind::Npm
            | DependencyKind::Database
            | DependencyKind::Implicit => ToolKind::Library,
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared CLI command contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliFacet {
    /// Full command signature, e.g. `email search --json <query>`.
    pub command: String,
    /// Relative path to a JSON Schema describing the command's stdout.
    pub output_schema: Option<String>,
}

/// A declared MCP tool or resource contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpFacet {
    /// MCP tool name, if this facet declares a tool.
    pub tool: Option<String>,
    /// MCP resource name, if this facet declares a resource.
    pub resource: Option<String>,
    /// Relative path to the facet's JSON Schema.
    pub schema: Option<String>,
}

impl McpFacet {
    /// The contract name: the tool name, or the resource name.
    ///
    /// Validation guarantees exactly one of the two is present.
    pub fn name(&self) -> &str {
        self.tool
            .as_deref()
            .or(self.resource.as_deref())
            .unwrap_or_default()
    }
}

/// A declared library export contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryFacet {
    /// Exported symbol or module name.
    pub export: String,
    /// Relative path the export lives at.
    pub path: Option<String>,
}

/// A declared database schema contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseFacet {
    /// Relative path to the database file.
    pub path: String,
    /// Relative path to a JSON Schema describing the database shape.
    pub schema: Option<String>,
}

/// Everything a tool provides, grouped by facet.
///
/// Sequences keep document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provides {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cli: Vec<CliFacet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mcp: Vec<McpFacet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub library: Vec<LibraryFacet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub database: Vec<DatabaseFacet>,
}

impl Provides {
    /// True when no facet of any kind is declared.
    pub fn is_empty(&self) -> bool {
        self.cli.is_empty()
            && self.mcp.is_empty()
            && self.library.is_empty()
            && self.database.is_empty()
    }

    /// Names of all declared MCP tools (resources excluded).
    pub fn mcp_tool_names(&self) -> Vec<&str> {
        self.mcp
            .iter()
            .filter_map(|f| f.tool.as_deref())
            .collect()
    }
}

/// A single `depends_on` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the provider tool or external package.
    pub name: String,
    /// Dependency kind.
    pub kind: DependencyKind,
    /// Optional version constraint, preserved verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Import path for library dependencies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<String>,
    /// Specific commands used, for cli dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Whether the dependency is optional. Defaults to false.
    #[serde(default)]
    pub optional: bool,
}

/// A fully validated manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Stable tool identifier.
    pub name: String,
    /// Optional semver string, preserved verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// What the tool is.
    pub kind: ToolKind,
    /// Free-form description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Outward contracts, grouped by facet.
    #[serde(default, skip_serializing_if = "Provides::is_empty")]
    pub provides: Provides,
    /// Declared dependencies, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<Dependency>,
    /// Self-assessed reliability in [0, 1]. Defaults to 0.95.
    pub reliability: f64,
    /// Self-assessed technical-debt score. Defaults to 0.
    pub debt_score: u32,
}

impl Manifest {
    /// Canonical content hash of the manifest document.
    ///
    /// Stable across key reordering and formatting changes in the YAML
    /// source; this is the basis for sync change-classification.
    pub fn canonical_hash(&self) -> String {
        let value = serde_json::to_value(self).expect("manifest serialization cannot fail");
        crate::canonical::hash_canonical(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ToolKind::Cli,
            ToolKind::Mcp,
            ToolKind::Library,
            ToolKind::Workflow,
            ToolKind::Hook,
            ToolKind::CliMcp,
        ] {
            assert_eq!(ToolKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ToolKind::parse("CLI"), None);
        assert_eq!(ToolKind::parse("cli+MCP"), None);
    }

    #[test]
    fn test_stub_kind_mapping() {
        assert_eq!(DependencyKind::Cli.stub_tool_kind(), ToolKind::Cli);
        assert_eq!(DependencyKind::Mcp.stub_tool_kind(), ToolKind::Mcp);
        assert_eq!(DependencyKind::Library.stub_tool_kind(), ToolKind::Library);
        assert_eq!(DependencyKind::Npm.stub_tool_kind(), ToolKind::Library);
        assert_eq!(DependencyKind::Database.stub_tool_kind(), ToolKind::Library);
        assert_eq!(DependencyKind::Implicit.stub_tool_kind(), ToolKind::Library);
    }

    #[test]
    fn test_canonical_hash_ignores_field_order() {
        let manifest = Manifest {
            name: "email".into(),
            version: Some("1.2.0".into()),
            kind: ToolKind::CliMcp,
            description: None,
            provides: Provides::default(),
            depends_on: vec![],
            reliability: 0.95,
            debt_score: 0,
        };
        // Hash is deterministic across calls.
        assert_eq!(manifest.canonical_hash(), manifest.canonical_hash());
        assert_eq!(manifest.canonical_hash().len(), 64);
    }

    #[test]
    fn test_mcp_facet_name() {
        let tool = McpFacet {
            tool: Some("email_search".into()),
            resource: None,
            schema: None,
        };
        assert_eq!(tool.name(), "email_search");

        let resource = McpFacet {
            tool: None,
            resource: Some("inbox".into()),
            schema: None,
        };
        assert_eq!(resource.name(), "inbox");
    }
}
