use crate::error::{Error, Result};

pub type NodeIndex = usize;
pub type EdgeIndex = usize;

/// A directed capacitated link in the allocation graph.
///
/// Every edge is stored next to its mirror: edge `e` and edge `e ^ 1` form a
/// residual pair, and `flow(e) + flow(e ^ 1) == 0` holds after any sequence
/// of augmentations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEdge {
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub capacity: i64,
    pub flow: i64,
}

impl FlowEdge {
    /// Slots still assignable across this edge.
    pub fn remaining(&self) -> i64 {
        self.capacity - self.flow
    }
}

/// The per-round slot allocation graph.
///
/// Nodes are created explicitly so callers can map storage elements and VOs
/// onto stable indices; edges are kept in insertion order, which is what
/// makes the solver deterministic for identical builds.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    edges: Vec<FlowEdge>,
    adjacency: Vec<Vec<EdgeIndex>>,
}

impl FlowGraph {
    pub fn new() -> Self {
        FlowGraph::default()
    }

    pub fn add_node(&mut self) -> NodeIndex {
        self.adjacency.push(Vec::new());
        self.adjacency.len() - 1
    }

    /// Adds a directed edge and its residual mirror.
    ///
    /// The mirror is created with the *same* capacity as the forward edge,
    /// not zero: the allocation graph treats a link as a bidirectional slot
    /// pool, reproducing the legacy scheduler's convention (see DESIGN.md).
    ///
    /// Fails with [`Error::InvalidCapacity`] for non-positive capacities,
    /// aborting the scheduling round before any flow is computed.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, capacity: i64) -> Result<EdgeIndex> {
        if from >= self.adjacency.len() {
            return Err(Error::UnknownNode(from));
        }
        if to >= self.adjacency.len() {
            return Err(Error::UnknownNode(to));
        }
        if capacity <= 0 {
            return Err(Error::InvalidCapacity { from, to, capacity });
        }

        let forward = self.edges.len();
        self.edges.push(FlowEdge { from, to, capacity, flow: 0 });
        self.edges.push(FlowEdge { from: to, to: from, capacity, flow: 0 });

        self.adjacency[from].push(forward);
        self.adjacency[to].push(forward + 1);

        Ok(forward)
    }

    /// Index of the residual mirror of `edge`.
    pub fn mirror(edge: EdgeIndex) -> EdgeIndex {
        edge ^ 1
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, index: EdgeIndex) -> &FlowEdge {
        &self.edges[index]
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub(crate) fn edge_mut(&mut self, index: EdgeIndex) -> &mut FlowEdge {
        &mut self.edges[index]
    }

    pub(crate) fn outgoing(&self, node: NodeIndex) -> &[EdgeIndex] {
        &self.adjacency[node]
    }
}
