//! Aggregated error type for the engine facade.

use thiserror::Error;

/// Engine error: every component failure mode, in one place.
///
/// Manifest violations and store failures abort the enclosing
/// operation. Cycle detection, drift computation, and analytics never
/// do; they surface as warnings on otherwise-successful results.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid manifest; carries every failed constraint.
    #[error(transparent)]
    Manifest(#[from] pai_manifest::ManifestError),

    /// Store or registrar failure (includes NotFound and Conflict).
    #[error(transparent)]
    Registry(#[from] pai_registry::RegistryError),

    /// Graph load or query failure.
    #[error(transparent)]
    Graph(#[from] pai_graph::GraphError),

    /// Verifier machinery failure.
    #[error(transparent)]
    Verify(#[from] pai_verify::VerifyError),

    /// Async runtime could not be created.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl CoreError {
    /// True for errors that indicate a caller mistake (bad manifest,
    /// missing entity, conflicting unregister) rather than an internal
    /// failure.
    pub fn is_user_error(&self) -> bool {
        match self {
            CoreError::Manifest(_) => true,
            CoreError::Registry(e) => matches!(
                e,
                pai_registry::RegistryError::NotFound { .. }
                    | pai_registry::RegistryError::Conflict { .. }
                    | pai_registry::RegistryError::Manifest(_)
            ),
            CoreError::Graph(e) => matches!(e, pai_graph::GraphError::NodeNotFound(_)),
            _ => false,
        }
    }
}
