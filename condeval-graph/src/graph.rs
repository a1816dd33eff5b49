use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::node::{Edge, Node};

/// One elementary cycle found by [`DependencyGraph::detect_cycles`].
///
/// `path` is closed: the first and last elements are the same node.
#[derive(Clone, Debug)]
pub struct CycleInfo {
    pub path: Vec<String>,
    pub description: String,
}

/// The outcome of a cycle scan.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub has_cycles: bool,
    pub cycles: Vec<CycleInfo>,
    pub cycle_count: usize,
}

/// The outcome of a topological sort.
///
/// On failure `remaining_nodes` holds every node still carrying a
/// positive in-degree once the sort stalled.
#[derive(Clone, Debug)]
pub struct TopoResult {
    pub success: bool,
    pub order: Vec<String>,
    pub remaining_nodes: Vec<String>,
    pub error: Option<String>,
}

/// An in-memory directed multigraph with adjacency kept in both
/// directions. All queries are O(V+E); per-node lookups are O(1)
/// amortized.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<String, Node>,
    outgoing: HashMap<String, Vec<Edge>>,
    incoming: HashMap<String, Vec<Edge>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node by id, initialising empty adjacency.
    pub fn add_node(&mut self, node: Node) {
        self.outgoing.entry(node.id.clone()).or_default();
        self.incoming.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
    }

    /// Remove a node and every edge touching it, from both sides.
    pub fn remove_node(&mut self, id: &str) {
        if self.nodes.remove(id).is_none() {
            return;
        }
        if let Some(edges) = self.outgoing.remove(id) {
            for edge in edges {
                if let Some(incoming) = self.incoming.get_mut(&edge.to) {
                    incoming.retain(|e| e.from != id);
                }
            }
        }
        if let Some(edges) = self.incoming.remove(id) {
            for edge in edges {
                if let Some(outgoing) = self.outgoing.get_mut(&edge.from) {
                    outgoing.retain(|e| e.to != id);
                }
            }
        }
    }

    /// Insert an edge between two existing nodes. Duplicates are allowed;
    /// callers deduplicate if they need to.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&edge.from) {
            return Err(GraphError::MissingSource(edge.from));
        }
        if !self.nodes.contains_key(&edge.to) {
            return Err(GraphError::MissingTarget(edge.to));
        }
        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .push(edge.clone());
        self.incoming.entry(edge.to.clone()).or_default().push(edge);
        Ok(())
    }

    /// Remove every edge from → to, across both adjacency maps.
    pub fn remove_edge(&mut self, from: &str, to: &str) {
        if let Some(edges) = self.outgoing.get_mut(from) {
            edges.retain(|e| e.to != to);
        }
        if let Some(edges) = self.incoming.get_mut(to) {
            edges.retain(|e| e.from != from);
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.outgoing.values().flatten()
    }

    pub fn outgoing(&self, id: &str) -> &[Edge] {
        self.outgoing.get(id).map_or(&[], Vec::as_slice)
    }

    pub fn incoming(&self, id: &str) -> &[Edge] {
        self.incoming.get(id).map_or(&[], Vec::as_slice)
    }

    /// BFS reachability over outgoing edges. A node reaches itself iff it
    /// exists.
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        if !self.nodes.contains_key(source) {
            return false;
        }
        if source == target {
            return true;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(source);
        queue.push_back(source);
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(current) {
                if edge.to == target {
                    return true;
                }
                if seen.insert(edge.to.as_str()) {
                    queue.push_back(edge.to.as_str());
                }
            }
        }
        false
    }

    /// Would inserting from → to close a cycle? True exactly when `to`
    /// already reaches `from`.
    pub fn would_create_cycle(&self, from: &str, to: &str) -> bool {
        self.has_path(to, from)
    }

    /// Find every cycle reachable by DFS with three-colour marking.
    ///
    /// Each back-edge to a gray node yields one [`CycleInfo`] whose path
    /// is read off the gray stack and closed with the rediscovered node.
    pub fn detect_cycles(&self) -> CycleReport {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let adjacency = self.sorted_adjacency();
        let mut ids: Vec<&String> = self.nodes.keys().collect();
        ids.sort();

        let mut color: HashMap<&str, Color> =
            ids.iter().map(|id| (id.as_str(), Color::White)).collect();
        let mut cycles = Vec::new();

        for start in ids {
            if color[start.as_str()] != Color::White {
                continue;
            }
            // (node, index of the next outgoing edge to follow)
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            color.insert(start.as_str(), Color::Gray);

            while let Some(top) = stack.last_mut() {
                let node = top.0;
                let targets = adjacency.get(node).map_or(&[][..], Vec::as_slice);
                if top.1 < targets.len() {
                    let target = targets[top.1];
                    top.1 += 1;
                    match color[target] {
                        Color::White => {
                            color.insert(target, Color::Gray);
                            stack.push((target, 0));
                        }
                        Color::Gray => {
                            // The gray stack is the current path; slice it
                            // from the rediscovered node and close the loop.
                            let from = stack
                                .iter()
                                .position(|(id, _)| *id == target)
                                .unwrap_or(0);
                            let mut path: Vec<String> = stack[from..]
                                .iter()
                                .map(|(id, _)| (*id).to_string())
                                .collect();
                            path.push(target.to_string());
                            let description = path.join(" -> ");
                            cycles.push(CycleInfo { path, description });
                        }
                        Color::Black => {}
                    }
                } else {
                    color.insert(node, Color::Black);
                    stack.pop();
                }
            }
        }

        CycleReport {
            has_cycles: !cycles.is_empty(),
            cycle_count: cycles.len(),
            cycles,
        }
    }

    /// Kahn's algorithm with ascending-lexicographic tie-breaking, so the
    /// order is stable across runs. The raw order lists a node before the
    /// nodes it depends on; because evaluation wants dependencies handled
    /// under the documented convention, the list is reversed before
    /// returning.
    pub fn topological_sort(&self) -> TopoResult {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| (id.as_str(), self.incoming(id).len()))
            .collect();

        let mut ready: BinaryHeap<Reverse<&str>> = BinaryHeap::new();
        for (&id, &degree) in &in_degree {
            if degree == 0 {
                ready.push(Reverse(id));
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id.to_string());
            for edge in self.outgoing(id) {
                if let Some(degree) = in_degree.get_mut(edge.to.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(edge.to.as_str()));
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            order.reverse();
            TopoResult {
                success: true,
                order,
                remaining_nodes: Vec::new(),
                error: None,
            }
        } else {
            let mut remaining: Vec<String> = Vec::new();
            for (&id, &degree) in &in_degree {
                if degree > 0 {
                    remaining.push(id.to_string());
                }
            }
            remaining.sort();
            let error = format!(
                "Cycle detected: {} nodes could not be sorted",
                remaining.len()
            );
            order.reverse();
            TopoResult {
                success: false,
                order,
                remaining_nodes: remaining,
                error: Some(error),
            }
        }
    }

    /// Outgoing targets per node, lexicographically sorted and deduplicated
    /// so traversal order (and thus cycle reporting) is deterministic.
    fn sorted_adjacency(&self) -> HashMap<&str, Vec<&str>> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, edges) in &self.outgoing {
            let mut targets: Vec<&str> = edges.iter().map(|e| e.to.as_str()).collect();
            targets.sort();
            targets.dedup();
            adjacency.insert(id.as_str(), targets);
        }
        adjacency
    }
}
