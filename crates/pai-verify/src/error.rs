//! Error types for the verification pipeline.

use thiserror::Error;

/// Hard failures in the verifier machinery.
///
/// Per-contract problems (command failed, server missing a tool, schema
/// drifted) are not errors; they are recorded outcomes. This type covers
/// the cases where the verifier itself cannot proceed.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Store read or write failed.
    #[error(transparent)]
    Registry(#[from] pai_registry::RegistryError),

    /// A schema file could not be read.
    #[error("cannot read schema {path}: {source}")]
    SchemaRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A schema file is not valid JSON.
    #[error("schema {path} is not valid JSON: {source}")]
    SchemaParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// A schema file does not compile as JSON Schema draft-07.
    #[error("schema {path} does not compile: {message}")]
    SchemaCompile { path: String, message: String },
}
