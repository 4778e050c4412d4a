//! # pai-core
//!
//! Unified engine for the pai-deps dependency and contract registry.
//! Orchestrates the component crates behind one facade:
//!
//! ```text
//!                      ┌──────────────────┐
//!                      │    DepsEngine    │
//!                      └────────┬─────────┘
//!                               │
//!      ┌──────────┬─────────────┼────────────┬───────────┐
//!      ▼          ▼             ▼            ▼           ▼
//! ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌─────────┐ ┌─────────┐
//! │manifest │ │registry │ │   graph   │ │discovery│ │ verify  │
//! │ (C1,C2) │ │ (C3,C4) │ │ (C5,C12)  │ │ (C6,C7) │ │(C8–C11) │
//! └─────────┘ └─────────┘ └───────────┘ └─────────┘ └─────────┘
//! ```
//!
//! The engine owns the store (single process, single writer) and an
//! async runtime for child-process verification; everything else is
//! synchronous. Results are structured values; rendering and exit
//! codes are the CLI wrapper's concern.

mod config;
mod engine;
mod envelope;
mod error;

pub use config::{EngineConfig, StoreConfig, VerifyConfig};
pub use engine::{
    AffectedByFiles, DepsEngine, DriftItem, DriftSummary, SyncSummary, ToolDetails,
    VerifyAllSummary,
};
pub use envelope::Envelope;
pub use error::CoreError;

// Re-export component types that appear in the engine's results.
pub use pai_discovery::{DiscoveryOptions, DiscoveryReport, SyncStatus};
pub use pai_graph::{AffectedTool, BlastRadius, CompoundReliability, RiskLevel};
pub use pai_manifest::{Manifest, ManifestError, ToolKind};
pub use pai_registry::{
    CircularDepRecord, Contract, ContractStatus, OverallStatus, RegisterAction, RegisterOutcome,
    Tool, UnregisterOutcome, VerifyStatus,
};
pub use pai_verify::{DriftOutcome, DriftState, ToolVerifyReport, VerifyOptions};

/// Core result type for engine operations.
pub type Result<T> = std::result::Result<T, CoreError>;
