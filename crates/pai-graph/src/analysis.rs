//! Impact analysis over the dependency graph.
//!
//! Three derived views:
//!
//! - **Compound reliability**: the product of a tool's reliability and
//!   the reliability of every distinct transitive provider. Diamond
//!   dependencies count once.
//! - **Affected set**: everything transitively depending on a tool, with
//!   minimum hop distance and the shortest chain it is reached through.
//! - **Blast radius**: the affected set plus risk metrics:
//!
//!   ```text
//!   risk_score = affected_count
//!              * (1 + avg_debt / 10)
//!              * (1 / max(chain_reliability, 0.1))
//!              + 5 * critical_count
//!   ```
//!
//!   banded LOW (< 20), MEDIUM (20–50), HIGH (50–100), CRITICAL (>= 100).
//!
//! The formulas are a portable contract; identical inputs must produce
//! identical numbers across implementations.

use crate::graph::{DepGraph, Direction, GraphError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

/// One link in a reliability chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityLink {
    pub tool_id: String,
    pub depth: usize,
    pub reliability: f64,
}

/// Compound reliability of a tool and its transitive providers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompoundReliability {
    pub tool_id: String,
    /// Product over the tool and every distinct transitive provider.
    pub compound: f64,
    /// Contributing links ordered by depth (the tool itself at depth 0).
    pub chain: Vec<ReliabilityLink>,
}

/// A tool reached by reverse traversal from a changed tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffectedTool {
    pub tool_id: String,
    /// Minimum hop distance from the source.
    pub depth: usize,
    /// Intermediate tools on the shortest chain from the source,
    /// endpoints excluded.
    pub via: Vec<String>,
}

/// Risk band for a blast radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

/// Affected set plus derived risk metrics for one source tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlastRadius {
    pub tool_id: String,
    pub affected_count: usize,
    pub affected: Vec<AffectedTool>,
    /// Dependent counts grouped by tool kind.
    pub by_kind: BTreeMap<String, usize>,
    /// Dependent counts grouped by hop distance.
    pub depth_histogram: BTreeMap<usize, usize>,
    pub avg_debt: f64,
    pub chain_reliability: f64,
    /// Dependents whose kind exposes an MCP surface (mcp, cli+mcp).
    pub critical_count: usize,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

/// Computes compound reliability for `id`.
///
/// Each distinct provider counts once regardless of how many dependency
/// paths reach it, so diamonds do not double-weight.
pub fn compound_reliability(graph: &DepGraph, id: &str) -> Result<CompoundReliability, GraphError> {
    let tool = graph
        .node(id)
        .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

    let mut chain = vec![ReliabilityLink {
        tool_id: id.to_string(),
        depth: 0,
        reliability: tool.reliability,
    }];
    let mut compound = tool.reliability;

    for (provider, depth) in graph.traverse(id, Direction::Forward, None)? {
        let reliability = graph
            .node(&provider)
            .map(|t| t.reliability)
            .unwrap_or(pai_manifest::DEFAULT_RELIABILITY);
        compound *= reliability;
        chain.push(ReliabilityLink {
            tool_id: provider,
            depth,
            reliability,
        });
    }

    Ok(CompoundReliability {
        tool_id: id.to_string(),
        compound,
        chain,
    })
}

/// The affected set of `id`: every transitive consumer with its minimum
/// hop distance and shortest via-chain, in breadth-first order.
pub fn affected_set(graph: &DepGraph, id: &str) -> Result<Vec<AffectedTool>, GraphError> {
    affected_by(graph, std::slice::from_ref(&id.to_string()))
}

/// Multi-source affected set, the CI-facing contract: reverse BFS from
/// every source at once, each affected tool reported once at its
/// nearest source's distance.
pub fn affected_by(graph: &DepGraph, sources: &[String]) -> Result<Vec<AffectedTool>, GraphError> {
    for source in sources {
        if !graph.contains(source) {
            return Err(GraphError::NodeNotFound(source.clone()));
        }
    }

    let mut parent: HashMap<String, String> = HashMap::new();
    let mut depth_of: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    let mut out = Vec::new();

    for source in sources {
        if depth_of.insert(source.clone(), 0).is_none() {
            queue.push_back((source.clone(), 0));
        }
    }

    while let Some((node, depth)) = queue.pop_front() {
        for consumer in graph.consumers(&node) {
            if depth_of.contains_key(consumer) {
                continue;
            }
            depth_of.insert(consumer.to_string(), depth + 1);
            parent.insert(consumer.to_string(), node.clone());

            let mut via = Vec::new();
            let mut cursor = node.clone();
            while depth_of.get(&cursor).copied().unwrap_or(0) > 0 {
                via.push(cursor.clone());
                cursor = match parent.get(&cursor) {
                    Some(p) => p.clone(),
                    None => break,
                };
            }
            via.reverse();

            out.push(AffectedTool {
                tool_id: consumer.to_string(),
                depth: depth + 1,
                via,
            });
            queue.push_back((consumer.to_string(), depth + 1));
        }
    }

    Ok(out)
}

/// Risk of breaking dependents: affected volume amplified by their
/// debt, divided by the source's chain reliability, plus a fixed
/// penalty per MCP-surface dependent.
pub fn risk_score(
    affected_count: usize,
    avg_debt: f64,
    chain_reliability: f64,
    critical_count: usize,
) -> f64 {
    affected_count as f64 * (1.0 + avg_debt / 10.0) * (1.0 / chain_reliability.max(0.1))
        + 5.0 * critical_count as f64
}

/// Bands a risk score.
pub fn risk_level(score: f64) -> RiskLevel {
    if score >= 100.0 {
        RiskLevel::Critical
    } else if score >= 50.0 {
        RiskLevel::High
    } else if score >= 20.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Computes the blast radius of `id`, optionally capped at `max_depth`
/// hops in both the affected expansion and the reliability chain.
pub fn blast_radius(
    graph: &DepGraph,
    id: &str,
    max_depth: Option<usize>,
) -> Result<BlastRadius, GraphError> {
    if !graph.contains(id) {
        return Err(GraphError::NodeNotFound(id.to_string()));
    }

    let affected: Vec<AffectedTool> = affected_set(graph, id)?
        .into_iter()
        .filter(|t| max_depth.map_or(true, |cap| t.depth <= cap))
        .collect();
    let affected_count = affected.len();

    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut depth_histogram: BTreeMap<usize, usize> = BTreeMap::new();
    let mut debt_total = 0u64;
    let mut critical_count = 0usize;
    for entry in &affected {
        let tool = graph
            .node(&entry.tool_id)
            .expect("affected tools come from the snapshot");
        *by_kind.entry(tool.kind.as_str().to_string()).or_default() += 1;
        *depth_histogram.entry(entry.depth).or_default() += 1;
        debt_total += tool.debt_score as u64;
        if tool.kind.has_mcp_surface() {
            critical_count += 1;
        }
    }
    let avg_debt = if affected_count == 0 {
        0.0
    } else {
        debt_total as f64 / affected_count as f64
    };

    // Chain reliability: the source's compound reliability, capped at
    // the same depth as the affected expansion.
    let source = graph.node(id).expect("checked above");
    let mut chain_reliability = source.reliability;
    for (provider, _) in graph.traverse(id, Direction::Forward, max_depth)? {
        chain_reliability *= graph
            .node(&provider)
            .map(|t| t.reliability)
            .unwrap_or(pai_manifest::DEFAULT_RELIABILITY);
    }

    let score = risk_score(affected_count, avg_debt, chain_reliability, critical_count);
    debug!(
        tool = %id,
        affected = affected_count,
        score,
        "computed blast radius"
    );

    Ok(BlastRadius {
        tool_id: id.to_string(),
        affected_count,
        affected,
        by_kind,
        depth_histogram,
        avg_debt,
        chain_reliability,
        critical_count,
        risk_score: score,
        risk_level: risk_level(score),
    })
}
