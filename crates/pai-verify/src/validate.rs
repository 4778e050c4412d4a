//! JSON Schema output validation.
//!
//! Draft-07 semantics with format assertions (email, uri, date-time and
//! the rest of the common set) enabled. Compiled validators are cached
//! by schema path for the lifetime of one [`SchemaValidator`], which in
//! practice means one process.

use crate::error::VerifyError;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One flattened validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Slash-delimited JSON Pointer into the instance ("" for the root).
    pub path: String,
    /// The violated schema keyword (`required`, `type`, `format`, …).
    pub keyword: String,
    pub message: String,
}

/// Validates decoded JSON values against schema files.
pub struct SchemaValidator {
    cache: HashMap<PathBuf, jsonschema::Validator>,
}

impl SchemaValidator {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Validates `instance` against the schema at `schema_path`.
    ///
    /// Returns the flattened issue list; empty means valid.
    ///
    /// # Errors
    ///
    /// [`VerifyError::SchemaRead`] / [`VerifyError::SchemaParse`] /
    /// [`VerifyError::SchemaCompile`] when the schema itself is broken.
    pub fn validate(
        &mut self,
        schema_path: &Path,
        instance: &serde_json::Value,
    ) -> Result<Vec<ValidationIssue>, VerifyError> {
        if !self.cache.contains_key(schema_path) {
            let validator = compile(schema_path)?;
            debug!(schema = %schema_path.display(), "compiled schema");
            self.cache.insert(schema_path.to_path_buf(), validator);
        }
        let validator = self
            .cache
            .get(schema_path)
            .expect("inserted above");

        Ok(validator
            .iter_errors(instance)
            .map(|err| ValidationIssue {
                path: err.instance_path.to_string(),
                keyword: keyword_of(&err.schema_path.to_string()),
                message: err.to_string(),
            })
            .collect())
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(schema_path: &Path) -> Result<jsonschema::Validator, VerifyError> {
    let text = std::fs::read_to_string(schema_path).map_err(|source| VerifyError::SchemaRead {
        path: schema_path.display().to_string(),
        source,
    })?;
    let schema: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| VerifyError::SchemaParse {
            path: schema_path.display().to_string(),
            source,
        })?;
    jsonschema::options()
        .with_draft(jsonschema::Draft::Draft7)
        .should_validate_formats(true)
        .build(&schema)
        .map_err(|e| VerifyError::SchemaCompile {
            path: schema_path.display().to_string(),
            message: e.to_string(),
        })
}

/// The final segment of a schema pointer is the violated keyword.
fn keyword_of(schema_pointer: &str) -> String {
    schema_pointer
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("schema")
        .to_string()
}
