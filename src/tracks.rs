use geo::Coord;
use log::{debug, warn};
use std::collections::{BTreeMap, HashSet};

use crate::geometry::signed_curvature;
use crate::network::{EdgeId, NetworkGraph, NetworkRelation, NodeId, RelationId, WayId};
use crate::routing::{Path, ShortestPaths};

/// One simple path between two endpoints of a relation
#[derive(Clone, Debug)]
pub struct Track {
    pub relation: RelationId,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    /// Planar vertices in the graph's projection
    pub xy: Vec<Coord<f64>>,
    /// Cumulative geodesic distance in meters, `s[0] == 0`
    pub s: Vec<f64>,
    /// Signed curvature in 1/m per vertex, zero at both ends
    pub curvature: Vec<f64>,
}

impl Track {
    fn from_path(relation: RelationId, path: Path, graph: &NetworkGraph) -> Self {
        let xy: Vec<Coord<f64>> = path
            .nodes
            .iter()
            .filter_map(|id| graph.node(*id).map(|node| node.xy))
            .collect();

        let mut s = Vec::with_capacity(path.nodes.len());
        s.push(0.0);
        for edge in &path.edges {
            let length = graph.edge(*edge).map_or(0.0, |e| e.length);
            s.push(s.last().copied().unwrap_or_default() + length);
        }

        let mut curvature = vec![0.0; xy.len()];
        for i in 1..xy.len().saturating_sub(1) {
            curvature[i] = signed_curvature(xy[i - 1], xy[i], xy[i + 1]);
        }

        Self {
            relation,
            nodes: path.nodes,
            edges: path.edges,
            xy,
            s,
            curvature,
        }
    }

    /// Total length in meters
    pub fn length(&self) -> f64 {
        self.s.last().copied().unwrap_or_default()
    }

    pub fn start(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn end(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

/// Extracts every track of `relation`.
///
/// Each unordered pair of endpoints of the relation's own subgraph is joined by
/// its geodesically shortest path through the relation's ways. Pairs that are not
/// connected inside the relation (double track, branches) yield no track.
pub fn build_tracks(relation: &NetworkRelation, graph: &NetworkGraph) -> Vec<Track> {
    let members: HashSet<WayId> = relation.ways.iter().copied().collect();

    // Degree of each node counted over the relation's edges only
    let mut degree: BTreeMap<NodeId, usize> = BTreeMap::new();
    for edge in graph.edges().iter().filter(|e| members.contains(&e.way)) {
        *degree.entry(edge.from).or_default() += 1;
        *degree.entry(edge.to).or_default() += 1;
    }
    let endpoints: Vec<NodeId> = degree
        .into_iter()
        .filter(|(_, d)| *d == 1)
        .map(|(id, _)| id)
        .collect();

    if endpoints.len() < 2 {
        warn!(
            "Relation {} ({}) has {} endpoints, no tracks built",
            relation.id,
            relation.name(),
            endpoints.len()
        );
        return Vec::new();
    }

    let mut tracks = Vec::new();
    for (i, source) in endpoints.iter().enumerate() {
        let tree = ShortestPaths::from_source(graph, *source, |e| {
            members.contains(&e.way).then_some(e.length)
        });
        for target in &endpoints[i + 1..] {
            match tree.path_to(*target) {
                Some(path) => tracks.push(Track::from_path(relation.id, path, graph)),
                None => debug!(
                    "Relation {}: endpoints {} and {} are not connected",
                    relation.id,
                    tree.source(),
                    target
                ),
            }
        }
    }

    debug!(
        "Relation {} ({}): {} endpoints, {} tracks",
        relation.id,
        relation.name(),
        endpoints.len(),
        tracks.len()
    );

    tracks
}
