//! Error types for manifest loading and validation.

use thiserror::Error;

/// A single failed validation constraint.
///
/// `path` is dotted and zero-indexed into the document, e.g.
/// `depends_on.2.kind` or `provides.cli.0.command`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// Dotted path to the offending field.
    pub path: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors produced while loading or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The document violated one or more schema constraints.
    ///
    /// Carries every failed constraint, not just the first.
    #[error("invalid manifest: {}", format_errors(.0))]
    Invalid(Vec<FieldError>),

    /// The file could not be read.
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed YAML.
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value could not be represented as JSON (tagged YAML, non-string key).
    #[error("unrepresentable value at {path}: {message}")]
    Unrepresentable { path: String, message: String },
}

fn format_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lists_every_error() {
        let err = ManifestError::Invalid(vec![
            FieldError::new("name", "required"),
            FieldError::new("depends_on.2.kind", "required"),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("name: required"));
        assert!(rendered.contains("depends_on.2.kind: required"));
    }
}
