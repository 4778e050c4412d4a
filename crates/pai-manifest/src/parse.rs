//! Deterministic manifest parsing and validation.
//!
//! The pipeline is: read file → YAML decode → structural validation.
//! Structural validation walks the decoded document by hand so that every
//! failed constraint is collected; a manifest with a missing `name` and a
//! bad `depends_on.2.kind` reports both in one error.

use crate::error::{FieldError, ManifestError};
use crate::model::{
    CliFacet, DatabaseFacet, Dependency, DependencyKind, LibraryFacet, Manifest, McpFacet,
    Provides, ToolKind, DEFAULT_RELIABILITY,
};
use serde_yaml::Value;
use std::path::Path;
use tracing::debug;

const TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "version",
    "kind",
    "description",
    "provides",
    "depends_on",
    "reliability",
    "debt_score",
];

const FACET_KEYS: &[&str] = &["cli", "mcp", "library", "database"];

/// Mapping lookup by string key.
fn lookup<'a>(map: &'a serde_yaml::Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

/// Reads and validates a manifest file.
///
/// `path` may be the manifest itself or a directory containing
/// `pai-manifest.yaml`.
///
/// # Errors
///
/// [`ManifestError::Io`] when the file cannot be read,
/// [`ManifestError::Yaml`] when it is not well-formed YAML, and
/// [`ManifestError::Invalid`] carrying every failed constraint otherwise.
pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let file = if path.is_dir() {
        path.join(crate::model::MANIFEST_FILE_NAME)
    } else {
        path.to_path_buf()
    };
    let text = std::fs::read_to_string(&file).map_err(|source| ManifestError::Io {
        path: file.display().to_string(),
        source,
    })?;
    debug!(path = %file.display(), "parsing manifest");
    parse_manifest(&text)
}

/// Validates a manifest document from its YAML text.
pub fn parse_manifest(text: &str) -> Result<Manifest, ManifestError> {
    let doc: Value = serde_yaml::from_str(text)?;
    let mut errors = Vec::new();

    let map = match doc.as_mapping() {
        Some(m) => m,
        None => {
            return Err(ManifestError::Invalid(vec![FieldError::new(
                "",
                "document must be a mapping",
            )]))
        }
    };

    // Unknown top-level keys are rejected outright.
    for key in map.keys() {
        match key.as_str() {
            Some(k) if TOP_LEVEL_KEYS.contains(&k) => {}
            Some(k) => errors.push(FieldError::new(k, "unknown key")),
            None => errors.push(FieldError::new("", "non-string top-level key")),
        }
    }

    let name = required_string(map, "name", &mut errors);
    let version = optional_string(map, "version", &mut errors);
    let description = optional_string(map, "description", &mut errors);

    let kind = match lookup(map, "kind") {
        None => {
            errors.push(FieldError::new("kind", "required"));
            None
        }
        Some(v) => match v.as_str() {
            Some(s) => {
                let parsed = ToolKind::parse(s);
                if parsed.is_none() {
                    errors.push(FieldError::new(
                        "kind",
                        format!("must be one of cli, mcp, library, workflow, hook, cli+mcp (got '{s}')"),
                    ));
                }
                parsed
            }
            None => {
                errors.push(FieldError::new("kind", "must be a string"));
                None
            }
        },
    };

    let reliability = match lookup(map, "reliability") {
        None => DEFAULT_RELIABILITY,
        Some(v) => match v.as_f64() {
            Some(r) if (0.0..=1.0).contains(&r) => r,
            Some(r) => {
                errors.push(FieldError::new(
                    "reliability",
                    format!("must be within [0, 1] (got {r})"),
                ));
                DEFAULT_RELIABILITY
            }
            None => {
                errors.push(FieldError::new("reliability", "must be a number"));
                DEFAULT_RELIABILITY
            }
        },
    };

    let debt_score = match lookup(map, "debt_score") {
        None => 0,
        Some(v) => match v.as_u64() {
            Some(d) if d <= u32::MAX as u64 => d as u32,
            _ => {
                errors.push(FieldError::new(
                    "debt_score",
                    "must be a non-negative integer",
                ));
                0
            }
        },
    };

    let provides = match lookup(map, "provides") {
        None => Provides::default(),
        Some(v) => parse_provides(v, &mut errors),
    };

    let depends_on = match lookup(map, "depends_on") {
        None => Vec::new(),
        Some(v) => parse_depends_on(v, &mut errors),
    };

    if !errors.is_empty() {
        return Err(ManifestError::Invalid(errors));
    }

    Ok(Manifest {
        // Guarded by the error check above: a missing name or kind
        // already pushed an error.
        name: name.unwrap_or_default(),
        version,
        kind: kind.unwrap_or(ToolKind::Library),
        description,
        provides,
        depends_on,
        reliability,
        debt_score,
    })
}

fn parse_provides(value: &Value, errors: &mut Vec<FieldError>) -> Provides {
    let mut provides = Provides::default();
    let map = match value.as_mapping() {
        Some(m) => m,
        None => {
            errors.push(FieldError::new("provides", "must be a mapping"));
            return provides;
        }
    };

    for (key, entries) in map {
        let facet = match key.as_str() {
            Some(f) if FACET_KEYS.contains(&f) => f,
            Some(f) => {
                errors.push(FieldError::new(
                    format!("provides.{f}"),
                    "unknown facet (expected cli, mcp, library, or database)",
                ));
                continue;
            }
            None => {
                errors.push(FieldError::new("provides", "non-string facet key"));
                continue;
            }
        };

        let seq = match entries.as_sequence() {
            Some(s) => s,
            None => {
                errors.push(FieldError::new(
                    format!("provides.{facet}"),
                    "must be a sequence",
                ));
                continue;
            }
        };

        for (i, entry) in seq.iter().enumerate() {
            let path = format!("provides.{facet}.{i}");
            let record = match entry.as_mapping() {
                Some(m) => m,
                None => {
                    errors.push(FieldError::new(path, "must be a mapping"));
                    continue;
                }
            };
            match facet {
                "cli" => {
                    if let Some(command) = record_string(record, &path, "command", true, errors) {
                        provides.cli.push(CliFacet {
                            command,
                            output_schema: record_string(record, &path, "output_schema", false, errors),
                        });
                    }
                }
                "mcp" => {
                    let tool = record_string(record, &path, "tool", false, errors);
                    let resource = record_string(record, &path, "resource", false, errors);
                    match (&tool, &resource) {
                        (None, None) => errors.push(FieldError::new(
                            path,
                            "requires either 'tool' or 'resource'",
                        )),
                        (Some(_), Some(_)) => errors.push(FieldError::new(
                            path,
                            "'tool' and 'resource' are mutually exclusive",
                        )),
                        _ => provides.mcp.push(McpFacet {
                            tool,
                            resource,
                            schema: record_string(record, &path, "schema", false, errors),
                        }),
                    }
                }
                "library" => {
                    if let Some(export) = record_string(record, &path, "export", true, errors) {
                        provides.library.push(LibraryFacet {
                            export,
                            path: record_string(record, &path, "path", false, errors),
                        });
                    }
                }
                "database" => {
                    if let Some(db_path) = record_string(record, &path, "path", true, errors) {
                        provides.database.push(DatabaseFacet {
                            path: db_path,
                            schema: record_string(record, &path, "schema", false, errors),
                        });
                    }
                }
                _ => unreachable!("facet keys are filtered above"),
            }
        }
    }

    provides
}

fn parse_depends_on(value: &Value, errors: &mut Vec<FieldError>) -> Vec<Dependency> {
    let mut deps = Vec::new();
    let seq = match value.as_sequence() {
        Some(s) => s,
        None => {
            errors.push(FieldError::new("depends_on", "must be a sequence"));
            return deps;
        }
    };

    for (i, entry) in seq.iter().enumerate() {
        let path = format!("depends_on.{i}");
        let record = match entry.as_mapping() {
            Some(m) => m,
            None => {
                errors.push(FieldError::new(path, "must be a mapping"));
                continue;
            }
        };

        let name = record_string(record, &path, "name", true, errors);

        let kind = match lookup(record, "kind") {
            None => {
                errors.push(FieldError::new(format!("{path}.kind"), "required"));
                None
            }
            Some(v) => match v.as_str() {
                Some(s) => {
                    let parsed = DependencyKind::parse(s);
                    if parsed.is_none() {
                        errors.push(FieldError::new(
                            format!("{path}.kind"),
                            format!(
                                "must be one of cli, mcp, library, database, npm, implicit (got '{s}')"
                            ),
                        ));
                    }
                    parsed
                }
                None => {
                    errors.push(FieldError::new(format!("{path}.kind"), "must be a string"));
                    None
                }
            },
        };

        let commands = match lookup(record, "commands") {
            None => Vec::new(),
            Some(v) => match v.as_sequence() {
                Some(seq) => seq
                    .iter()
                    .enumerate()
                    .filter_map(|(j, item)| match item.as_str() {
                        Some(s) => Some(s.to_string()),
                        None => {
                            errors.push(FieldError::new(
                                format!("{path}.commands.{j}"),
                                "must be a string",
                            ));
                            None
                        }
                    })
                    .collect(),
                None => {
                    errors.push(FieldError::new(
                        format!("{path}.commands"),
                        "must be a sequence",
                    ));
                    Vec::new()
                }
            },
        };

        let optional = match lookup(record, "optional") {
            None => false,
            Some(v) => match v.as_bool() {
                Some(b) => b,
                None => {
                    errors.push(FieldError::new(
                        format!("{path}.optional"),
                        "must be a boolean",
                    ));
                    false
                }
            },
        };

        if let (Some(name), Some(kind)) = (name, kind) {
            deps.push(Dependency {
                name,
                kind,
                version: record_string(record, &path, "version", false, errors),
                import: record_string(record, &path, "import", false, errors),
                commands,
                optional,
            });
        }
    }

    deps
}

fn required_string(
    map: &serde_yaml::Mapping,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match lookup(map, key) {
        None => {
            errors.push(FieldError::new(key, "required"));
            None
        }
        Some(v) => match v.as_str() {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            Some(_) => {
                errors.push(FieldError::new(key, "must be nonempty"));
                None
            }
            None => {
                errors.push(FieldError::new(key, "must be a string"));
                None
            }
        },
    }
}

fn optional_string(
    map: &serde_yaml::Mapping,
    key: &str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match lookup(map, key) {
        None => None,
        Some(v) => match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => {
                errors.push(FieldError::new(key, "must be a string"));
                None
            }
        },
    }
}

fn record_string(
    record: &serde_yaml::Mapping,
    path: &str,
    key: &str,
    required: bool,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match lookup(record, key) {
        None => {
            if required {
                errors.push(FieldError::new(format!("{path}.{key}"), "required"));
            }
            None
        }
        Some(v) => match v.as_str() {
            Some(s) if !s.is_empty() => Some(s.to_string()),
            Some(_) if !required => None,
            Some(_) => {
                errors.push(FieldError::new(format!("{path}.{key}"), "must be nonempty"));
                None
            }
            None => {
                errors.push(FieldError::new(
                    format!("{path}.{key}"),
                    "must be a string",
                ));
                None
            }
        },
    }
}
