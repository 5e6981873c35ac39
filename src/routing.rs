use ordered_float::OrderedFloat;
use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
};

use crate::network::{EdgeId, NetworkEdge, NetworkGraph, NodeId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct State {
    cost: OrderedFloat<f64>,
    node: NodeId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost, ties broken by node id for reproducible paths
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A walk through the graph, `edges[i]` joins `nodes[i]` and `nodes[i + 1]`
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub cost: f64,
}

/// Result of a single-source Dijkstra search
#[derive(Clone, Debug)]
pub struct ShortestPaths {
    source: NodeId,
    costs: HashMap<NodeId, f64>,
    predecessors: HashMap<NodeId, (NodeId, EdgeId)>,
}

impl ShortestPaths {
    /// Runs Dijkstra from `source` over every edge for which `cost` returns a
    /// weight. Edges mapped to `None`, negative or NaN weights are not traversed.
    pub fn from_source<F>(graph: &NetworkGraph, source: NodeId, cost: F) -> Self
    where
        F: Fn(&NetworkEdge) -> Option<f64>,
    {
        search(graph, source, None, cost)
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn cost_to(&self, target: NodeId) -> Option<f64> {
        self.costs.get(&target).copied()
    }

    pub fn path_to(&self, target: NodeId) -> Option<Path> {
        let cost = self.cost_to(target)?;

        let mut nodes = vec![target];
        let mut edges = Vec::new();
        let mut current = target;
        while current != self.source {
            let (previous, edge) = self.predecessors.get(&current)?;
            edges.push(*edge);
            nodes.push(*previous);
            current = *previous;
        }
        nodes.reverse();
        edges.reverse();

        Some(Path { nodes, edges, cost })
    }
}

/// Cheapest path from `from` to `to`, stopping as soon as `to` is settled.
pub fn shortest_path<F>(graph: &NetworkGraph, from: NodeId, to: NodeId, cost: F) -> Option<Path>
where
    F: Fn(&NetworkEdge) -> Option<f64>,
{
    search(graph, from, Some(to), cost).path_to(to)
}

fn search<F>(graph: &NetworkGraph, source: NodeId, target: Option<NodeId>, cost: F) -> ShortestPaths
where
    F: Fn(&NetworkEdge) -> Option<f64>,
{
    let mut costs: HashMap<NodeId, f64> = HashMap::new();
    let mut predecessors: HashMap<NodeId, (NodeId, EdgeId)> = HashMap::new();
    let mut settled: HashSet<NodeId> = HashSet::new();
    let mut heap = BinaryHeap::new();

    costs.insert(source, 0.0);
    heap.push(State {
        cost: OrderedFloat(0.0),
        node: source,
    });

    while let Some(State { cost: current, node }) = heap.pop() {
        if !settled.insert(node) {
            continue;
        }
        if target == Some(node) {
            break;
        }

        for edge_id in graph.incident_edges(node) {
            let Some(edge) = graph.edge(*edge_id) else {
                continue;
            };
            let Some(weight) = cost(edge) else {
                continue;
            };
            if weight.is_nan() || weight < 0.0 {
                continue;
            }

            let next = edge.other(node);
            if settled.contains(&next) {
                continue;
            }

            let next_cost = current.0 + weight;
            let improves = costs.get(&next).is_none_or(|&known| next_cost < known);
            if improves {
                costs.insert(next, next_cost);
                predecessors.insert(next, (node, *edge_id));
                heap.push(State {
                    cost: OrderedFloat(next_cost),
                    node: next,
                });
            }
        }
    }

    ShortestPaths {
        source,
        costs,
        predecessors,
    }
}
