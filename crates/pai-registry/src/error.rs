//! Error types for store and registrar operations.

use thiserror::Error;

/// Errors produced by the persistent registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The manifest failed to parse or validate; nothing was written.
    #[error(transparent)]
    Manifest(#[from] pai_manifest::ManifestError),

    /// Backing-store failure; the enclosing transaction was rolled back.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem failure while locating or creating the store file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unregistering a tool that other tools still depend on.
    #[error("tool '{id}' has {} dependent(s): {}", dependents.len(), dependents.join(", "))]
    Conflict { id: String, dependents: Vec<String> },
}

impl RegistryError {
    pub fn tool_not_found(id: impl Into<String>) -> Self {
        RegistryError::NotFound {
            entity: "tool",
            id: id.into(),
        }
    }

    pub fn contract_not_found(id: impl std::fmt::Display) -> Self {
        RegistryError::NotFound {
            entity: "contract",
            id: id.to_string(),
        }
    }
}
