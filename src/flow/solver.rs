use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::flow::graph::{EdgeIndex, FlowGraph, NodeIndex};

const UNREACHED: i32 = -1;

/// Computes the maximum feasible slot allocation across the round's
/// capacity graph using Dinic's algorithm.
///
/// The solver runs at most once per instance. After [`MaximumFlowSolver::solve`]
/// the per-edge flows read through [`MaximumFlowSolver::graph`] are the
/// admitted-slot counts for the scheduling round.
///
/// Determinism: BFS assigns levels in edge-insertion order and the DFS walks
/// each node's edge list through a monotone cursor, so identical graphs
/// always produce identical per-edge flows.
#[derive(Debug)]
pub struct MaximumFlowSolver {
    graph: FlowGraph,
    source: NodeIndex,
    sink: NodeIndex,

    /// BFS level of each node, rebuilt once per phase.
    level: Vec<i32>,

    /// Per-node cursor into the adjacency list. Edges left behind by the
    /// cursor are saturated or dead ends for the rest of the phase, which is
    /// what keeps a phase linear in the number of edges.
    next: Vec<usize>,

    max_flow: i64,
    solved: bool,
}

impl MaximumFlowSolver {
    pub fn new(graph: FlowGraph, source: NodeIndex, sink: NodeIndex) -> Result<Self> {
        if source >= graph.node_count() {
            return Err(Error::UnknownNode(source));
        }
        if sink >= graph.node_count() {
            return Err(Error::UnknownNode(sink));
        }

        let node_count = graph.node_count();
        Ok(MaximumFlowSolver {
            graph,
            source,
            sink,
            level: vec![UNREACHED; node_count],
            next: vec![0; node_count],
            max_flow: 0,
            solved: false,
        })
    }

    /// Runs Dinic's algorithm: alternate BFS level-graph construction with
    /// blocking-flow DFS phases until the sink becomes unreachable.
    ///
    /// Idempotent: a second call returns the already computed value.
    pub fn solve(&mut self) -> i64 {
        if self.solved {
            return self.max_flow;
        }

        while self.build_level_graph() {
            self.next.fill(0);

            loop {
                let pushed = self.augment(self.source, i64::MAX);
                if pushed == 0 {
                    break;
                }
                self.max_flow += pushed;
            }
        }

        self.solved = true;
        log::debug!("Flow solver finished: maximum flow {} over {} edge pair(s)", self.max_flow, self.graph.edge_count() / 2);
        self.max_flow
    }

    /// The computed maximum flow. Meaningful only after [`MaximumFlowSolver::solve`].
    pub fn maximum_flow(&self) -> i64 {
        self.max_flow
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// Read access to the graph, including the per-edge flow assignment.
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// Hands the graph back to the caller, e.g. to translate edge flows into
    /// per-pair admission counts.
    pub fn into_graph(self) -> FlowGraph {
        self.graph
    }

    /// BFS from the source over edges with remaining capacity, assigning
    /// `level[v] = level[u] + 1` on first reach. Returns false once the sink
    /// is unreachable, which terminates the outer loop.
    fn build_level_graph(&mut self) -> bool {
        self.level.fill(UNREACHED);
        self.level[self.source] = 0;

        let mut frontier = VecDeque::new();
        frontier.push_back(self.source);

        while let Some(node) = frontier.pop_front() {
            for &edge_index in self.graph.outgoing(node) {
                let edge = self.graph.edge(edge_index);
                if self.level[edge.to] == UNREACHED && edge.remaining() > 0 {
                    self.level[edge.to] = self.level[node] + 1;
                    frontier.push_back(edge.to);
                }
            }
        }

        self.level[self.sink] != UNREACHED
    }

    /// DFS for one augmenting path inside the current level graph, pushing
    /// at most `limit` flow. Augments by the path bottleneck and decrements
    /// the mirror edge by the same amount.
    fn augment(&mut self, node: NodeIndex, limit: i64) -> i64 {
        if node == self.sink {
            return limit;
        }

        while self.next[node] < self.graph.outgoing(node).len() {
            let edge_index: EdgeIndex = self.graph.outgoing(node)[self.next[node]];
            let (to, remaining) = {
                let edge = self.graph.edge(edge_index);
                (edge.to, edge.remaining())
            };

            if remaining > 0 && self.level[to] == self.level[node] + 1 {
                let pushed = self.augment(to, limit.min(remaining));
                if pushed > 0 {
                    self.graph.edge_mut(edge_index).flow += pushed;
                    self.graph.edge_mut(FlowGraph::mirror(edge_index)).flow -= pushed;
                    return pushed;
                }
            }

            // Saturated or dead end: never look at this edge again this phase.
            self.next[node] += 1;
        }

        0
    }
}
