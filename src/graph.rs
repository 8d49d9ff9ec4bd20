//! Dependency graph builder (spec §4.5, first half): per-frame node array,
//! access-derived edges, topological sort, and criticality.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{GraphError, Result};
use crate::queue::QueueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// `Write` dominates `Read` when merging duplicate references.
    fn merge(self, other: AccessKind) -> AccessKind {
        if self == AccessKind::Write || other == AccessKind::Write {
            AccessKind::Write
        } else {
            AccessKind::Read
        }
    }
}

/// One node per pass in the merged, per-frame pass list (including splits
/// produced by immediate/retained state conflicts).
#[derive(Debug, Clone)]
pub struct Node {
    pub pass_index: usize,
    pub queue_kind: QueueKind,
    pub original_order: usize,
    pub touched_ids: HashSet<u64>,
    pub uav_ids: HashSet<u64>,
    pub access_by_id: HashMap<u64, AccessKind>,
    pub out: Vec<usize>,
    pub in_: Vec<usize>,
    pub indegree: usize,
    pub criticality: u32,
}

impl Node {
    pub fn new(pass_index: usize, queue_kind: QueueKind, original_order: usize) -> Self {
        Self {
            pass_index,
            queue_kind,
            original_order,
            touched_ids: HashSet::new(),
            uav_ids: HashSet::new(),
            access_by_id: HashMap::new(),
            out: Vec::new(),
            in_: Vec::new(),
            indegree: 0,
            criticality: 0,
        }
    }

    pub fn record_access(&mut self, resource_id: u64, kind: AccessKind, is_uav: bool) {
        self.touched_ids.insert(resource_id);
        if is_uav {
            self.uav_ids.insert(resource_id);
        }
        let merged = match self.access_by_id.get(&resource_id) {
            Some(&existing) => existing.merge(kind),
            None => kind,
        };
        self.access_by_id.insert(resource_id, merged);
    }
}

/// Builds per-frame nodes into a DAG: access-derived RAW/WAR/WAW edges plus
/// explicit `After(anchor)` edges, then topologically sorts with
/// criticality (longest path to a sink).
#[derive(Default)]
pub struct DependencyGraphBuilder {
    nodes: Vec<Node>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Scheduling-equivalent expansion: for each node, a caller may widen
    /// `touched_ids` to the set of ids sharing overlapping alias bytes
    /// before calling this (spec §4.5 "scheduling-equivalent set").
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Derive RAW/WAR/WAW edges from `access_by_id`, processing nodes in
    /// original order.
    pub fn derive_access_edges(&mut self) {
        let mut last_writer: HashMap<u64, usize> = HashMap::new();
        let mut reads_since_write: HashMap<u64, Vec<usize>> = HashMap::new();

        let order: Vec<usize> = {
            let mut idx: Vec<usize> = (0..self.nodes.len()).collect();
            idx.sort_by_key(|&i| self.nodes[i].original_order);
            idx
        };

        for node_idx in order {
            let accesses: Vec<(u64, AccessKind)> = self.nodes[node_idx]
                .access_by_id
                .iter()
                .map(|(&id, &kind)| (id, kind))
                .collect();

            for (id, kind) in accesses {
                match kind {
                    AccessKind::Read => {
                        if let Some(&writer) = last_writer.get(&id) {
                            if writer != node_idx {
                                self.add_edge(writer, node_idx);
                            }
                        }
                        reads_since_write.entry(id).or_default().push(node_idx);
                    }
                    AccessKind::Write => {
                        if let Some(&writer) = last_writer.get(&id) {
                            if writer != node_idx {
                                self.add_edge(writer, node_idx);
                            }
                        }
                        if let Some(readers) = reads_since_write.get(&id) {
                            for &reader in readers {
                                if reader != node_idx {
                                    self.add_edge(reader, node_idx);
                                }
                            }
                        }
                        reads_since_write.insert(id, Vec::new());
                        last_writer.insert(id, node_idx);
                    }
                }
            }
        }
    }

    /// Add an explicit edge, e.g. from a per-frame extension's
    /// `After(anchor)` constraint. Added after access-derived edges.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if self.nodes[from].out.contains(&to) {
            return;
        }
        self.nodes[from].out.push(to);
        self.nodes[to].in_.push(from);
        self.nodes[to].indegree += 1;
    }

    /// Kahn's algorithm; rejects cycles. Returns the topological order.
    pub fn topological_sort(&self) -> Result<Vec<usize>> {
        let mut indegree: Vec<usize> = self.nodes.iter().map(|n| n.indegree).collect();
        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| indegree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &v in &self.nodes[u].out {
                indegree[v] -= 1;
                if indegree[v] == 0 {
                    queue.push_back(v);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::CyclicDependency);
        }
        Ok(order)
    }

    /// Criticality(u) = max over successors v of (1 + criticality(v));
    /// sinks have criticality 0. Requires a valid topological order.
    pub fn compute_criticality(&mut self, topo_order: &[usize]) {
        for &u in topo_order.iter().rev() {
            let crit = self.nodes[u]
                .out
                .iter()
                .map(|&v| 1 + self.nodes[v].criticality)
                .max()
                .unwrap_or(0);
            self.nodes[u].criticality = crit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(order: usize) -> Node {
        Node::new(order, QueueKind::Graphics, order)
    }

    #[test]
    fn read_after_write_edge_exists() {
        let mut b = DependencyGraphBuilder::new();
        let a = b.push_node(node(0));
        let c = b.push_node(node(1));
        b.nodes_mut()[a].record_access(1, AccessKind::Write, false);
        b.nodes_mut()[c].record_access(1, AccessKind::Read, false);
        b.derive_access_edges();
        assert!(b.nodes()[a].out.contains(&c));
    }

    #[test]
    fn write_after_read_batching_resets_predecessors() {
        let mut b = DependencyGraphBuilder::new();
        let reader = b.push_node(node(0));
        let writer = b.push_node(node(1));
        let later_reader = b.push_node(node(2));
        b.nodes_mut()[reader].record_access(1, AccessKind::Read, false);
        b.nodes_mut()[writer].record_access(1, AccessKind::Write, false);
        b.nodes_mut()[later_reader].record_access(1, AccessKind::Read, false);
        b.derive_access_edges();
        assert!(b.nodes()[reader].out.contains(&writer));
        assert!(b.nodes()[writer].out.contains(&later_reader));
        assert!(!b.nodes()[reader].out.contains(&later_reader));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut b = DependencyGraphBuilder::new();
        let a = b.push_node(node(0));
        let c = b.push_node(node(1));
        b.add_edge(a, c);
        b.add_edge(c, a);
        assert!(matches!(b.topological_sort(), Err(GraphError::CyclicDependency)));
    }

    #[test]
    fn criticality_is_monotonic_across_edges() {
        let mut b = DependencyGraphBuilder::new();
        let a = b.push_node(node(0));
        let c = b.push_node(node(1));
        let d = b.push_node(node(2));
        b.add_edge(a, c);
        b.add_edge(c, d);
        let topo = b.topological_sort().unwrap();
        b.compute_criticality(&topo);
        assert!(b.nodes()[a].criticality >= b.nodes()[c].criticality);
        assert!(b.nodes()[c].criticality >= b.nodes()[d].criticality);
        assert_eq!(b.nodes()[d].criticality, 0);
    }
}
