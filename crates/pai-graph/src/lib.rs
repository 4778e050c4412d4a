//! # pai-graph
//!
//! In-memory dependency graph over the registry. A [`DepGraph`] is a
//! consistent snapshot of tools and edges loaded from the store;
//! mutations to the store do not propagate, callers reload when they
//! need fresh state.
//!
//! Cycles are data here, not a pathology: the graph is represented with
//! id-keyed maps and adjacency sets, every traversal carries a visited
//! set, and detected cycles are returned as ordered id lists for the
//! registry to record.

mod analysis;
mod graph;

pub use analysis::{
    affected_by, affected_set, blast_radius, compound_reliability, risk_level, risk_score,
    AffectedTool, BlastRadius, CompoundReliability, ReliabilityLink, RiskLevel,
};
pub use graph::{normalize_cycle, DepGraph, Direction, GraphError};

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
