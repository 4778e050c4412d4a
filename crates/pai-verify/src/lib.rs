//! # pai-verify
//!
//! Executes the promises tools make in their manifests and records what
//! actually happened:
//!
//! - **CLI contracts**: resolve the declared command on PATH, run it
//!   under a deadline, check the exit code, and validate JSON output
//!   against the declared schema.
//! - **MCP contracts**: spawn the server, speak JSON-RPC 2.0 over its
//!   stdio (`initialize`, then `tools/list`), and compare the reported
//!   tool set with the declared one.
//! - **Schema drift**: canonical-hash declared schema files and compare
//!   against the recorded baseline, with a top-level field diff.
//! - **Output validation**: JSON Schema draft-07 with format assertions,
//!   errors flattened to pointer paths.
//!
//! Verification failures never escape a contract: each becomes a
//! recorded verification row and the pipeline moves on to the next
//! contract. Every child process is killed and reaped before the
//! verifier returns, deadline or not.

mod command;
mod drift;
mod error;
mod mcp;
mod pipeline;
mod report;
mod validate;

pub use command::{check_cli_contract, parse_command_signature, resolve_executable, CommandPlan};
pub use drift::{check_drift, DriftOutcome, DriftState};
pub use error::VerifyError;
pub use mcp::{probe_mcp_server, verify_mcp_tools, McpCheckOutcome, McpFailure};
pub use pipeline::{verify_tool, VerifyOptions};
pub use report::{CliCheckOutcome, ToolVerifyReport};
pub use validate::{SchemaValidator, ValidationIssue};

/// Result type for verifier operations.
pub type Result<T> = std::result::Result<T, VerifyError>;
