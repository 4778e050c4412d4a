//! Uniform JSON result envelope.
//!
//! The machine-facing output path wraps every result in
//! `{ success, data?, error?, warnings? }`; the human path renders
//! one-line messages and leaves this alone.

use serde::Serialize;

/// The JSON envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Envelope {
    /// Successful result with a data payload.
    pub fn ok<T: Serialize>(data: &T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Successful result carrying warnings.
    pub fn ok_with_warnings<T: Serialize>(data: &T, warnings: Vec<String>) -> Self {
        Self {
            warnings,
            ..Self::ok(data)
        }
    }

    /// Failed result.
    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            warnings: Vec::new(),
        }
    }
}
