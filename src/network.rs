//! Rail network graph built from materialized OSM nodes, ways and relations.
//!
//! The graph is an undirected multigraph stored arena style: edges live in a
//! vector and are addressed by [`EdgeId`], nodes and ways are addressed by
//! their OSM ids. Nothing in the graph changes once it is built, so a single
//! instance can be shared by any number of concurrent matches.

use geo::{Coord, Point};
use log::{debug, info, warn};
use petgraph::unionfind::UnionFind;
use rstar::{AABB, PointDistance, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;

use crate::error::MatchError;
use crate::geometry::{UtmProjection, geodesic_distance};
use crate::tracks::{Track, build_tracks};

pub type NodeId = u64;
pub type WayId = u64;
pub type RelationId = u64;
pub type Tags = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

/// Node as delivered by the network data provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OsmNode {
    pub id: NodeId,
    pub lon: f64,
    pub lat: f64,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OsmWay {
    pub id: WayId,
    pub nodes: Vec<NodeId>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OsmRelation {
    pub id: RelationId,
    #[serde(alias = "members")]
    pub ways: Vec<WayId>,
    #[serde(default)]
    pub tags: Tags,
}

/// A materialized batch of network elements for one region
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkData {
    pub nodes: Vec<OsmNode>,
    pub ways: Vec<OsmWay>,
    #[serde(default)]
    pub relations: Vec<OsmRelation>,
}

#[derive(Clone, Debug)]
pub struct NetworkNode {
    pub id: NodeId,
    /// Geographic position (x = lon, y = lat)
    pub position: Point<f64>,
    /// Planar position in the graph's projection
    pub xy: Coord<f64>,
    /// Ways passing through this node
    pub ways: Vec<WayId>,
    pub tags: Tags,
}

impl NetworkNode {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Clone, Debug)]
pub struct NetworkWay {
    pub id: WayId,
    pub nodes: Vec<NodeId>,
    pub tags: Tags,
}

impl NetworkWay {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkEdge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub way: WayId,
    /// Geodesic length in meters
    pub length: f64,
}

impl NetworkEdge {
    /// The opposite end of the edge as seen from `node`.
    pub fn other(&self, node: NodeId) -> NodeId {
        if node == self.from { self.to } else { self.from }
    }

    pub fn connects(&self, a: NodeId, b: NodeId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// A named rail line made up of several ways
#[derive(Clone, Debug)]
pub struct NetworkRelation {
    pub id: RelationId,
    pub ways: Vec<WayId>,
    pub tags: Tags,
}

impl NetworkRelation {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn name(&self) -> &str {
        self.tag("name").unwrap_or_default()
    }

    pub fn colour(&self) -> Option<&str> {
        self.tag("colour")
    }

    /// Route type, e.g. `tram` or `train`
    pub fn route(&self) -> Option<&str> {
        self.tag("route")
    }
}

// Wrapper for node positions to make them compatible with RTree
#[derive(Clone, Debug)]
struct IndexedNode {
    id: NodeId,
    xy: [f64; 2],
}

impl RTreeObject for IndexedNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xy)
    }
}

impl PointDistance for IndexedNode {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.xy[0] - point[0];
        let dy = self.xy[1] - point[1];
        dx * dx + dy * dy
    }
}

pub struct NetworkGraph {
    nodes: HashMap<NodeId, NetworkNode>,
    ways: HashMap<WayId, NetworkWay>,
    relations: Vec<NetworkRelation>,
    edges: Vec<NetworkEdge>,
    adjacency: HashMap<NodeId, Vec<EdgeId>>,
    endpoints: BTreeSet<NodeId>,
    components: HashMap<NodeId, usize>,
    tracks: Vec<Track>,
    projection: UtmProjection,
    index: RTree<IndexedNode>,
}

/// Builds the network graph, its spatial index and the tracks of every relation.
pub fn build_network_graph(data: &NetworkData) -> Result<NetworkGraph, MatchError> {
    NetworkGraph::build(data)
}

impl NetworkGraph {
    pub fn build(data: &NetworkData) -> Result<Self, MatchError> {
        let start_time = Instant::now();

        let mut osm_nodes: HashMap<NodeId, &OsmNode> = HashMap::with_capacity(data.nodes.len());
        for node in &data.nodes {
            if !node.lon.is_finite() || !node.lat.is_finite() {
                return Err(MatchError::InvalidData(format!(
                    "Node {} has a non-finite position",
                    node.id
                )));
            }
            osm_nodes.entry(node.id).or_insert(node);
        }

        // Register every referenced node once, in order of first appearance
        let mut ways: HashMap<WayId, NetworkWay> = HashMap::with_capacity(data.ways.len());
        let mut way_order = Vec::with_capacity(data.ways.len());
        let mut referenced: Vec<&OsmNode> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        for way in &data.ways {
            if ways.contains_key(&way.id) {
                warn!("Way {} appears more than once, keeping the first", way.id);
                continue;
            }
            for node_id in &way.nodes {
                let node = osm_nodes
                    .get(node_id)
                    .ok_or(MatchError::UnknownNode {
                        way: way.id,
                        node: *node_id,
                    })?;
                if seen.insert(*node_id) {
                    referenced.push(*node);
                }
            }
            way_order.push(way.id);
            ways.insert(
                way.id,
                NetworkWay {
                    id: way.id,
                    nodes: way.nodes.clone(),
                    tags: way.tags.clone(),
                },
            );
        }

        let projection = projection_for(&referenced);
        let mut nodes: HashMap<NodeId, NetworkNode> = referenced
            .iter()
            .map(|node| {
                Ok((
                    node.id,
                    NetworkNode {
                        id: node.id,
                        position: Point::new(node.lon, node.lat),
                        xy: projection.project(node.lon, node.lat)?,
                        ways: Vec::new(),
                        tags: node.tags.clone(),
                    },
                ))
            })
            .collect::<Result<_, MatchError>>()?;

        let mut edges: Vec<NetworkEdge> = Vec::new();
        let mut adjacency: HashMap<NodeId, Vec<EdgeId>> = HashMap::with_capacity(nodes.len());
        for way_id in &way_order {
            let way = &ways[way_id];
            for node_id in &way.nodes {
                if let Some(node) = nodes.get_mut(node_id) {
                    if !node.ways.contains(way_id) {
                        node.ways.push(*way_id);
                    }
                }
            }

            if way.nodes.len() < 2 {
                warn!("Way {} has fewer than two nodes, no edges added", way.id);
                continue;
            }

            for pair in way.nodes.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if a == b {
                    debug!("Skipping repeated node {} in way {}", a, way.id);
                    continue;
                }
                let (pa, pb) = (nodes[&a].position, nodes[&b].position);
                let id = EdgeId(edges.len());
                edges.push(NetworkEdge {
                    id,
                    from: a,
                    to: b,
                    way: way.id,
                    length: geodesic_distance(pa.x(), pa.y(), pb.x(), pb.y()),
                });
                adjacency.entry(a).or_default().push(id);
                adjacency.entry(b).or_default().push(id);
            }
        }

        let endpoints: BTreeSet<NodeId> = adjacency
            .iter()
            .filter(|(_, incident)| incident.len() == 1)
            .map(|(id, _)| *id)
            .collect();

        let components = label_components(&referenced, &edges);

        let mut relations = Vec::with_capacity(data.relations.len());
        for relation in &data.relations {
            let (present, missing): (Vec<WayId>, Vec<WayId>) =
                relation.ways.iter().partition(|id| ways.contains_key(*id));
            if !missing.is_empty() {
                warn!(
                    "Relation {} references {} ways outside the network: {:?}",
                    relation.id,
                    missing.len(),
                    missing
                );
            }
            relations.push(NetworkRelation {
                id: relation.id,
                ways: present,
                tags: relation.tags.clone(),
            });
        }

        let index = RTree::bulk_load(
            nodes
                .values()
                .map(|node| IndexedNode {
                    id: node.id,
                    xy: [node.xy.x, node.xy.y],
                })
                .collect(),
        );

        let mut graph = Self {
            nodes,
            ways,
            relations,
            edges,
            adjacency,
            endpoints,
            components,
            tracks: Vec::new(),
            projection,
            index,
        };

        let tracks: Vec<Track> = graph
            .relations
            .iter()
            .flat_map(|relation| build_tracks(relation, &graph))
            .collect();
        graph.tracks = tracks;

        info!(
            "Network graph built with {} nodes, {} edges, {} endpoints, {} relations and {} tracks in {:?}",
            graph.nodes.len(),
            graph.edges.len(),
            graph.endpoints.len(),
            graph.relations.len(),
            graph.tracks.len(),
            start_time.elapsed()
        );

        Ok(graph)
    }

    pub fn node(&self, id: NodeId) -> Option<&NetworkNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NetworkNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&NetworkEdge> {
        self.edges.get(id.0)
    }

    pub fn edges(&self) -> &[NetworkEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn way(&self, id: WayId) -> Option<&NetworkWay> {
        self.ways.get(&id)
    }

    pub fn relation(&self, id: RelationId) -> Option<&NetworkRelation> {
        self.relations.iter().find(|relation| relation.id == id)
    }

    pub fn relations(&self) -> &[NetworkRelation] {
        &self.relations
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_of(&self, relation: RelationId) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.relation == relation)
    }

    /// Nodes with exactly one incident edge
    pub fn endpoints(&self) -> &BTreeSet<NodeId> {
        &self.endpoints
    }

    pub fn incident_edges(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency.get(&node).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.incident_edges(node).len()
    }

    /// Edges joining `a` and `b`, in insertion order
    pub fn edges_between(&self, a: NodeId, b: NodeId) -> impl Iterator<Item = &NetworkEdge> {
        self.incident_edges(a)
            .iter()
            .filter_map(|id| self.edge(*id))
            .filter(move |edge| edge.connects(a, b))
    }

    pub fn projection(&self) -> UtmProjection {
        self.projection
    }

    /// Nodes whose planar position lies within `radius` meters of `xy`.
    pub fn nodes_within(&self, xy: Coord<f64>, radius: f64) -> impl Iterator<Item = NodeId> {
        self.index
            .locate_within_distance([xy.x, xy.y], radius * radius)
            .map(|indexed| indexed.id)
    }

    pub fn component(&self, node: NodeId) -> Option<usize> {
        self.components.get(&node).copied()
    }

    pub fn same_component(&self, a: NodeId, b: NodeId) -> bool {
        match (self.component(a), self.component(b)) {
            (Some(ca), Some(cb)) => ca == cb,
            _ => false,
        }
    }
}

fn projection_for(nodes: &[&OsmNode]) -> UtmProjection {
    if nodes.is_empty() {
        return UtmProjection::for_position(0.0, 0.0);
    }

    let (mut min_lon, mut min_lat) = (f64::MAX, f64::MAX);
    let (mut max_lon, mut max_lat) = (f64::MIN, f64::MIN);
    for node in nodes {
        min_lon = min_lon.min(node.lon);
        min_lat = min_lat.min(node.lat);
        max_lon = max_lon.max(node.lon);
        max_lat = max_lat.max(node.lat);
    }

    UtmProjection::for_position((min_lon + max_lon) / 2.0, (min_lat + max_lat) / 2.0)
}

fn label_components(nodes: &[&OsmNode], edges: &[NetworkEdge]) -> HashMap<NodeId, usize> {
    let index: HashMap<NodeId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id, i))
        .collect();

    let mut union_find = UnionFind::<usize>::new(nodes.len());
    for edge in edges {
        union_find.union(index[&edge.from], index[&edge.to]);
    }

    union_find
        .into_labeling()
        .into_iter()
        .enumerate()
        .map(|(i, label)| (nodes[i].id, label))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId, lon: f64, lat: f64) -> OsmNode {
        OsmNode {
            id,
            lon,
            lat,
            tags: Tags::new(),
        }
    }

    fn way(id: WayId, nodes: &[NodeId]) -> OsmWay {
        OsmWay {
            id,
            nodes: nodes.to_vec(),
            tags: Tags::new(),
        }
    }

    fn line_data() -> NetworkData {
        NetworkData {
            nodes: (0..5).map(|i| node(i, 9.73, 52.37 + i as f64 * 0.001)).collect(),
            ways: vec![way(100, &[0, 1, 2]), way(101, &[2, 3, 4])],
            relations: vec![OsmRelation {
                id: 7,
                ways: vec![100, 101, 999],
                tags: Tags::from([("name".to_string(), "Linie 10".to_string())]),
            }],
        }
    }

    #[test]
    fn builds_nodes_edges_and_endpoints() {
        let graph = build_network_graph(&line_data()).unwrap();
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.endpoints().iter().copied().collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(graph.node(2).unwrap().ways, vec![100, 101]);
        assert_eq!(graph.degree(2), 2);

        let edge = graph.edge(EdgeId(0)).unwrap();
        assert_eq!((edge.from, edge.to, edge.way), (0, 1, 100));
        assert!((edge.length - 111.2).abs() < 0.5);
    }

    #[test]
    fn unknown_node_is_reported() {
        let mut data = line_data();
        data.ways.push(way(102, &[4, 42]));
        match build_network_graph(&data) {
            Err(MatchError::UnknownNode { way, node }) => assert_eq!((way, node), (102, 42)),
            other => panic!("unexpected result: {:?}", other.map(|g| g.node_count())),
        }
    }

    #[test]
    fn parallel_ways_produce_parallel_edges() {
        let mut data = line_data();
        data.ways.push(way(200, &[0, 1]));
        let graph = build_network_graph(&data).unwrap();
        let between: Vec<WayId> = graph.edges_between(1, 0).map(|e| e.way).collect();
        assert_eq!(between, vec![100, 200]);
        // Node 0 now has two incident edges and is no longer an endpoint
        assert!(!graph.endpoints().contains(&0));
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let data = line_data();
        let a = build_network_graph(&data).unwrap();
        let b = build_network_graph(&data).unwrap();
        assert_eq!(a.node_count(), b.node_count());
        assert_eq!(a.edge_count(), b.edge_count());
        assert_eq!(a.endpoints(), b.endpoints());
    }

    #[test]
    fn relation_members_outside_network_are_dropped() {
        let graph = build_network_graph(&line_data()).unwrap();
        let relation = graph.relation(7).unwrap();
        assert_eq!(relation.ways, vec![100, 101]);
        assert_eq!(relation.name(), "Linie 10");
        assert_eq!(relation.colour(), None);
        assert_eq!(graph.tracks_of(7).count(), 1);
    }

    #[test]
    fn components_and_spatial_queries() {
        let mut data = line_data();
        data.nodes.push(node(10, 9.80, 52.37));
        data.nodes.push(node(11, 9.801, 52.37));
        data.ways.push(way(300, &[10, 11]));
        let graph = build_network_graph(&data).unwrap();

        assert!(graph.same_component(0, 4));
        assert!(!graph.same_component(0, 10));
        assert!(!graph.same_component(0, 12345));

        let xy = graph.node(2).unwrap().xy;
        let mut near: Vec<NodeId> = graph.nodes_within(xy, 150.0).collect();
        near.sort();
        assert_eq!(near, vec![1, 2, 3]);
    }

    #[test]
    fn repeated_nodes_do_not_create_self_loops() {
        let data = NetworkData {
            nodes: vec![node(1, 9.73, 52.37), node(2, 9.731, 52.37)],
            ways: vec![way(1, &[1, 1, 2])],
            relations: Vec::new(),
        };
        let graph = build_network_graph(&data).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.endpoints().len(), 2);
    }
}
