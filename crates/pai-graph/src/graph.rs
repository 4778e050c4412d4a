//! Snapshot graph structure and traversals.

use chrono::{DateTime, Utc};
use pai_registry::{DependencyEdge, RegistryError, Store, Tool};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors produced by graph loading and queries.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Snapshot load failed against the store.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A queried node is not in the snapshot.
    #[error("tool not in graph: {0}")]
    NodeNotFound(String),
}

/// Traversal direction.
///
/// `Forward` follows consumer → provider (what a tool depends on);
/// `Reverse` follows provider → consumer (what depends on a tool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// A consistent snapshot of the dependency graph.
///
/// Node lookup is O(1); adjacency is kept as ordered sets so iteration
/// order is stable within one load. Edges whose endpoints are missing a
/// node are dropped at load time.
pub struct DepGraph {
    nodes: HashMap<String, Tool>,
    edges: HashMap<(String, String), DependencyEdge>,
    forward: HashMap<String, BTreeSet<String>>,
    reverse: HashMap<String, BTreeSet<String>>,
    loaded_at: DateTime<Utc>,
}

impl DepGraph {
    /// Loads a snapshot from the store.
    pub fn load(store: &Store) -> Result<Self, GraphError> {
        let tools = store.list_tools()?;
        let edges = store.list_edges()?;
        Ok(Self::from_parts(tools, edges))
    }

    /// Builds a graph from already-fetched rows. Dangling edges are
    /// filtered out.
    pub fn from_parts(tools: Vec<Tool>, edge_rows: Vec<DependencyEdge>) -> Self {
        let mut nodes = HashMap::with_capacity(tools.len());
        let mut forward: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut reverse: HashMap<String, BTreeSet<String>> = HashMap::new();
        for tool in tools {
            forward.entry(tool.id.clone()).or_default();
            reverse.entry(tool.id.clone()).or_default();
            nodes.insert(tool.id.clone(), tool);
        }

        let mut edges = HashMap::with_capacity(edge_rows.len());
        for edge in edge_rows {
            if !nodes.contains_key(&edge.consumer_id) || !nodes.contains_key(&edge.provider_id) {
                warn!(
                    consumer = %edge.consumer_id,
                    provider = %edge.provider_id,
                    "dropping dangling edge"
                );
                continue;
            }
            forward
                .entry(edge.consumer_id.clone())
                .or_default()
                .insert(edge.provider_id.clone());
            reverse
                .entry(edge.provider_id.clone())
                .or_default()
                .insert(edge.consumer_id.clone());
            edges.insert((edge.consumer_id.clone(), edge.provider_id.clone()), edge);
        }

        let graph = DepGraph {
            nodes,
            edges,
            forward,
            reverse,
            loaded_at: Utc::now(),
        };
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded graph snapshot"
        );
        graph
    }

    pub fn node(&self, id: &str) -> Option<&Tool> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&DependencyEdge> {
        self.edges.get(&(from.to_string(), to.to_string()))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// All node ids, sorted.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Direct providers of `id` (what it depends on).
    pub fn providers(&self, id: &str) -> Vec<&str> {
        self.forward
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Direct consumers of `id` (what depends on it).
    pub fn consumers(&self, id: &str) -> Vec<&str> {
        self.reverse
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn adjacency(&self, direction: Direction) -> &HashMap<String, BTreeSet<String>> {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }

    /// BFS from `start`, excluding the start node itself. Returns
    /// `(id, depth)` pairs in breadth-first order, so each node carries
    /// its minimum hop distance. `max_depth` caps the expansion.
    pub fn traverse(
        &self,
        start: &str,
        direction: Direction,
        max_depth: Option<usize>,
    ) -> Result<Vec<(String, usize)>, GraphError> {
        if !self.contains(start) {
            return Err(GraphError::NodeNotFound(start.to_string()));
        }
        let adjacency = self.adjacency(direction);
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<(&str, usize)> = VecDeque::from([(start, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if let Some(cap) = max_depth {
                if depth >= cap {
                    continue;
                }
            }
            if let Some(neighbors) = adjacency.get(node) {
                for next in neighbors {
                    if visited.insert(next.as_str()) {
                        out.push((next.clone(), depth + 1));
                        queue.push_back((next.as_str(), depth + 1));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Transitive closure of providers, excluding `id` itself.
    pub fn transitive_forward(&self, id: &str) -> Result<Vec<String>, GraphError> {
        Ok(self
            .traverse(id, Direction::Forward, None)?
            .into_iter()
            .map(|(node, _)| node)
            .collect())
    }

    /// Transitive closure of consumers, excluding `id` itself.
    pub fn transitive_reverse(&self, id: &str) -> Result<Vec<String>, GraphError> {
        Ok(self
            .traverse(id, Direction::Reverse, None)?
            .into_iter()
            .map(|(node, _)| node)
            .collect())
    }

    /// Shortest path from `from` to `to` over forward edges, endpoints
    /// included. Returns `None` when unreachable; `[from]` when the
    /// endpoints coincide.
    pub fn find_path(&self, from: &str, to: &str) -> Result<Option<Vec<String>>, GraphError> {
        if !self.contains(from) {
            return Err(GraphError::NodeNotFound(from.to_string()));
        }
        if !self.contains(to) {
            return Err(GraphError::NodeNotFound(to.to_string()));
        }
        if from == to {
            return Ok(Some(vec![from.to_string()]));
        }

        let mut parent: HashMap<&str, &str> = HashMap::new();
        let mut visited: HashSet<&str> = HashSet::from([from]);
        let mut queue: VecDeque<&str> = VecDeque::from([from]);

        while let Some(node) = queue.pop_front() {
            if let Some(neighbors) = self.forward.get(node) {
                for next in neighbors {
                    if !visited.insert(next.as_str()) {
                        continue;
                    }
                    parent.insert(next.as_str(), node);
                    if next == to {
                        let mut path = vec![to.to_string()];
                        let mut cursor = to;
                        while let Some(&prev) = parent.get(cursor) {
                            path.push(prev.to_string());
                            cursor = prev;
                        }
                        path.reverse();
                        return Ok(Some(path));
                    }
                    queue.push_back(next.as_str());
                }
            }
        }
        Ok(None)
    }

    /// Every simple path from `from` to `to` over forward edges, in
    /// discovery order, capped at `max` results. No node repeats within
    /// a single path, so cycles cannot explode the enumeration.
    pub fn all_paths(
        &self,
        from: &str,
        to: &str,
        max: usize,
    ) -> Result<Vec<Vec<String>>, GraphError> {
        if !self.contains(from) {
            return Err(GraphError::NodeNotFound(from.to_string()));
        }
        if !self.contains(to) {
            return Err(GraphError::NodeNotFound(to.to_string()));
        }

        let mut results = Vec::new();
        if from == to {
            results.push(vec![from.to_string()]);
            return Ok(results);
        }
        let mut path = vec![from.to_string()];
        let mut on_path: HashSet<String> = HashSet::from([from.to_string()]);
        self.paths_dfs(from, to, max, &mut path, &mut on_path, &mut results);
        Ok(results)
    }

    fn paths_dfs(
        &self,
        node: &str,
        to: &str,
        max: usize,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
        results: &mut Vec<Vec<String>>,
    ) {
        if results.len() >= max {
            return;
        }
        let Some(neighbors) = self.forward.get(node) else {
            return;
        };
        for next in neighbors {
            if results.len() >= max {
                return;
            }
            if next == to {
                let mut found = path.clone();
                found.push(to.to_string());
                results.push(found);
                continue;
            }
            if on_path.contains(next) {
                continue;
            }
            path.push(next.clone());
            on_path.insert(next.clone());
            self.paths_dfs(next, to, max, path, on_path, results);
            on_path.remove(next);
            path.pop();
        }
    }

    /// Enumerates cycles over the whole graph.
    ///
    /// DFS with an explicit recursion stack; every back edge into the
    /// current path emits the slice `[v, …, v]`. The scan covers all
    /// nodes so components unreachable from any particular start are
    /// included. Rotations of the same cycle are reported once.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut normalized: HashSet<Vec<String>> = HashSet::new();
        let mut results = Vec::new();

        for start in self.node_ids() {
            if visited.contains(start) {
                continue;
            }
            let mut stack: Vec<&str> = Vec::new();
            let mut on_stack: HashSet<&str> = HashSet::new();
            self.cycles_dfs(start, &mut visited, &mut stack, &mut on_stack, &mut normalized, &mut results);
        }
        results
    }

    fn cycles_dfs<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        on_stack: &mut HashSet<&'a str>,
        normalized: &mut HashSet<Vec<String>>,
        results: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        if let Some(neighbors) = self.forward.get(node) {
            for next in neighbors {
                if on_stack.contains(next.as_str()) {
                    // Back edge: the slice from `next` to the top of the
                    // stack, closed with `next` again.
                    let pos = stack
                        .iter()
                        .position(|&n| n == next.as_str())
                        .expect("on_stack member is on the stack");
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|&n| n.to_string()).collect();
                    cycle.push(next.clone());
                    if normalized.insert(normalize_cycle(&cycle)) {
                        results.push(cycle);
                    }
                } else if !visited.contains(next.as_str()) {
                    self.cycles_dfs(next, visited, stack, on_stack, normalized, results);
                }
            }
        }

        stack.pop();
        on_stack.remove(node);
    }

    /// Cycles that pass through `id`.
    pub fn cycles_through(&self, id: &str) -> Vec<Vec<String>> {
        self.cycles()
            .into_iter()
            .filter(|cycle| cycle.iter().any(|n| n == id))
            .collect()
    }

    pub fn has_cycle(&self) -> bool {
        !self.cycles().is_empty()
    }

    /// Kahn's algorithm over forward edges read as "consumer depends on
    /// provider": providers come before their consumers. On a cyclic
    /// graph the result is a prefix omitting every node whose provider
    /// count never drains; callers consult [`DepGraph::cycles`].
    pub fn topological_sort(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| {
                let providers = self.forward.get(id.as_str()).map_or(0, |s| {
                    // A self-loop never drains; counting it excludes the
                    // node from the order, which is what a cycle gets.
                    s.len()
                });
                (id.as_str(), providers)
            })
            .collect();

        let mut queue: VecDeque<&str> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::new();

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(consumers) = self.reverse.get(node) {
                for consumer in consumers {
                    if consumer == node {
                        continue;
                    }
                    if let Some(count) = remaining.get_mut(consumer.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(consumer.as_str());
                        }
                    }
                }
            }
        }
        order
    }

    /// JSON summary of the snapshot.
    pub fn serialize(&self) -> serde_json::Value {
        let mut nodes: Vec<&Tool> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<&DependencyEdge> = self.edges.values().collect();
        edges.sort_by_key(|e| e.id);
        json!({
            "nodes": nodes,
            "edges": edges,
            "metadata": {
                "node_count": self.node_count(),
                "edge_count": self.edge_count(),
                "loaded_at": self.loaded_at.to_rfc3339(),
            }
        })
    }
}

/// Rotates a cycle (first == last) to its smallest member so rotations
/// compare equal. Used both for in-load dedup and for keeping the
/// registry's cycle records free of rotated duplicates.
pub fn normalize_cycle(cycle: &[String]) -> Vec<String> {
    let body = &cycle[..cycle.len() - 1];
    if body.is_empty() {
        return cycle.to_vec();
    }
    let min_pos = body
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated: Vec<String> = body[min_pos..]
        .iter()
        .chain(body[..min_pos].iter())
        .cloned()
        .collect();
    rotated.push(rotated[0].clone());
    rotated
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pai_manifest::{DependencyKind, ToolKind};

    fn tool(id: &str, kind: ToolKind) -> Tool {
        let now = Utc::now();
        Tool {
            id: id.to_string(),
            display_name: id.to_string(),
            filesystem_path: format!("/tools/{id}"),
            kind,
            version: None,
            reliability: 0.95,
            debt_score: 0,
            manifest_path: None,
            manifest_hash: None,
            is_stub: false,
            last_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn edge(id: i64, consumer: &str, provider: &str) -> DependencyEdge {
        DependencyEdge {
            id,
            consumer_id: consumer.to_string(),
            provider_id: provider.to_string(),
            kind: DependencyKind::Library,
            version_constraint: None,
            optional: false,
            created_at: Utc::now(),
        }
    }

    fn graph(nodes: &[&str], edges_spec: &[(&str, &str)]) -> DepGraph {
        let tools = nodes.iter().map(|id| tool(id, ToolKind::Library)).collect();
        let edges = edges_spec
            .iter()
            .enumerate()
            .map(|(i, (c, p))| edge(i as i64 + 1, c, p))
            .collect();
        DepGraph::from_parts(tools, edges)
    }

    #[test]
    fn test_dangling_edges_filtered() {
        let g = graph(&["a"], &[("a", "ghost")]);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.edge_count(), 0);
        assert!(g.providers("a").is_empty());
    }

    #[test]
    fn test_adjacency_consistency() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);
        assert_eq!(g.providers("a"), vec!["b", "c"]);
        assert_eq!(g.consumers("c"), vec!["a", "b"]);
        // Incident edges of b: one out (b->c), one in (a->b).
        assert_eq!(g.providers("b").len() + g.consumers("b").len(), 2);
    }

    #[test]
    fn test_transitive_closures_exclude_start() {
        let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c"), ("c", "d")]);
        assert_eq!(g.transitive_forward("a").unwrap(), vec!["b", "c", "d"]);
        assert_eq!(g.transitive_reverse("d").unwrap(), vec!["c", "b", "a"]);
        assert!(g.transitive_forward("d").unwrap().is_empty());
    }

    #[test]
    fn test_traverse_reports_minimum_depth() {
        // Diamond: a -> b -> d, a -> c -> d.
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        let depths = g.traverse("a", Direction::Forward, None).unwrap();
        let d_depth = depths.iter().find(|(n, _)| n == "d").unwrap().1;
        assert_eq!(d_depth, 2);
        assert_eq!(depths.len(), 3);
    }

    #[test]
    fn test_traverse_depth_cap() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let capped = g.traverse("a", Direction::Forward, Some(1)).unwrap();
        assert_eq!(capped, vec![("b".to_string(), 1)]);
    }

    #[test]
    fn test_traverse_missing_node() {
        let g = graph(&["a"], &[]);
        assert!(matches!(
            g.traverse("ghost", Direction::Forward, None),
            Err(GraphError::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_find_path_shortest() {
        // Scenario: daily-briefing -> email -> resona, with a longer
        // route through calendar.
        let g = graph(
            &["daily-briefing", "email", "resona", "calendar"],
            &[
                ("daily-briefing", "email"),
                ("email", "resona"),
                ("daily-briefing", "calendar"),
                ("calendar", "email"),
            ],
        );
        let path = g.find_path("daily-briefing", "resona").unwrap().unwrap();
        assert_eq!(path, vec!["daily-briefing", "email", "resona"]);
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_find_path_contract() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let path = g.find_path("a", "c").unwrap().unwrap();
        assert_eq!(path.first().map(String::as_str), Some("a"));
        assert_eq!(path.last().map(String::as_str), Some("c"));
        for pair in path.windows(2) {
            assert!(g.edge(&pair[0], &pair[1]).is_some());
        }
    }

    #[test]
    fn test_find_path_unreachable_and_identity() {
        let g = graph(&["a", "b"], &[]);
        assert_eq!(g.find_path("a", "b").unwrap(), None);
        assert_eq!(g.find_path("a", "a").unwrap(), Some(vec!["a".to_string()]));
    }

    #[test]
    fn test_all_paths_enumeration() {
        let g = graph(
            &["daily-briefing", "email", "resona", "calendar"],
            &[
                ("daily-briefing", "email"),
                ("email", "resona"),
                ("daily-briefing", "calendar"),
                ("calendar", "email"),
            ],
        );
        let paths = g.all_paths("daily-briefing", "resona", 10).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&vec![
            "daily-briefing".to_string(),
            "email".to_string(),
            "resona".to_string()
        ]));
        assert!(paths.contains(&vec![
            "daily-briefing".to_string(),
            "calendar".to_string(),
            "email".to_string(),
            "resona".to_string()
        ]));
    }

    #[test]
    fn test_all_paths_cap() {
        let g = graph(
            &["s", "m1", "m2", "m3", "t"],
            &[("s", "m1"), ("s", "m2"), ("s", "m3"), ("m1", "t"), ("m2", "t"), ("m3", "t")],
        );
        assert_eq!(g.all_paths("s", "t", 2).unwrap().len(), 2);
        assert_eq!(g.all_paths("s", "t", 100).unwrap().len(), 3);
    }

    #[test]
    fn test_all_paths_do_not_loop() {
        // a <-> b plus a -> t: the cycle must not explode enumeration.
        let g = graph(&["a", "b", "t"], &[("a", "b"), ("b", "a"), ("a", "t")]);
        let paths = g.all_paths("a", "t", 100).unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0], vec!["a".to_string(), "t".to_string()]);
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let cycles = g.cycles();
        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
        for pair in cycle.windows(2) {
            assert!(g.edge(&pair[0], &pair[1]).is_some());
        }
        assert!(g.has_cycle());
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let g = graph(&["a"], &[("a", "a")]);
        let cycles = g.cycles();
        assert_eq!(cycles, vec![vec!["a".to_string(), "a".to_string()]]);
    }

    #[test]
    fn test_cycles_in_disconnected_components() {
        let g = graph(
            &["a", "b", "x", "y"],
            &[("a", "b"), ("b", "a"), ("x", "y"), ("y", "x")],
        );
        assert_eq!(g.cycles().len(), 2);
    }

    #[test]
    fn test_cycles_through_filters_by_member() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "a")]);
        assert_eq!(g.cycles_through("a").len(), 1);
        assert!(g.cycles_through("c").is_empty());
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("a", "c")]);
        assert!(g.cycles().is_empty());
    }

    #[test]
    fn test_topological_sort_providers_first() {
        let g = graph(&["app", "lib", "base"], &[("app", "lib"), ("lib", "base")]);
        let order = g.topological_sort();
        assert_eq!(order, vec!["base", "lib", "app"]);
    }

    #[test]
    fn test_topological_sort_respects_every_edge() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        let order = g.topological_sort();
        assert_eq!(order.len(), 4);
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        // consumer -> provider means provider sorts earlier.
        assert!(pos("b") < pos("a"));
        assert!(pos("c") < pos("a"));
        assert!(pos("d") < pos("b"));
        assert!(pos("d") < pos("c"));
    }

    #[test]
    fn test_topological_sort_omits_cyclic_nodes() {
        let g = graph(&["a", "b", "free"], &[("a", "b"), ("b", "a")]);
        let order = g.topological_sort();
        assert_eq!(order, vec!["free"]);
    }

    #[test]
    fn test_serialize_summary() {
        let g = graph(&["a", "b"], &[("a", "b")]);
        let value = g.serialize();
        assert_eq!(value["metadata"]["node_count"], 2);
        assert_eq!(value["metadata"]["edge_count"], 1);
        assert_eq!(value["nodes"][0]["id"], "a");
        assert_eq!(value["edges"][0]["consumer_id"], "a");
        assert!(value["metadata"]["loaded_at"].is_string());
    }

    #[test]
    fn test_normalize_cycle_rotations_match() {
        let a = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        let b = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(normalize_cycle(&a), normalize_cycle(&b));
    }

    #[test]
    fn test_load_from_store() {
        let mut store = Store::open_in_memory().unwrap();
        let manifest = pai_manifest::parse_manifest(
            "name: app\nkind: cli\ndepends_on:\n  - name: lib\n    kind: library\n",
        )
        .unwrap();
        pai_registry::register_manifest(
            &mut store,
            &manifest,
            std::path::Path::new("/tools/app/pai-manifest.yaml"),
        )
        .unwrap();

        let g = DepGraph::load(&store).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
        assert!(g.node("lib").unwrap().is_stub);
    }
}
