//! Configuration types for the pai-deps engine.

use pai_discovery::DiscoveryOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the whole engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Store location.
    pub store: StoreConfig,

    /// Discovery walk behavior.
    pub discovery: DiscoveryOptions,

    /// Verification behavior.
    pub verify: VerifyConfig,
}

/// Store location configuration.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    /// Explicit database path. When absent the user-scoped default is
    /// used, honoring the `PAI_DEPS_DB` environment override.
    pub db_path: Option<PathBuf>,
}

/// Verification configuration.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Deadline per child-process interaction.
    pub timeout: Duration,

    /// Treat undeclared MCP tools reported by a server as failures.
    pub strict_mcp_extras: bool,

    /// Presence-only CLI checks by default.
    pub quick: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            strict_mcp_extras: false,
            quick: false,
        }
    }
}
