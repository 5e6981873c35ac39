//! Point features of the rail network, identified by their `railway` tag.
//!
//! See <https://wiki.openstreetmap.org/wiki/Key:railway> for the tag values.

use geo::Point;
use serde::Serialize;
use std::collections::HashSet;

use crate::error::MatchError;
use crate::mapmatcher::MatchResult;
use crate::network::{NetworkGraph, NetworkNode, NodeId, RelationId, Tags};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ElementKind {
    Switch,
    Signal,
    LevelCrossing,
    /// Kilometre post, `position` in km along the line if tagged
    Milestone { position: Option<f64> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RailwayElement {
    pub node: NodeId,
    pub position: Point<f64>,
    pub kind: ElementKind,
    pub tags: Tags,
}

impl RailwayElement {
    pub fn from_node(node: &NetworkNode) -> Option<Self> {
        let kind = match node.tag("railway")? {
            "switch" => ElementKind::Switch,
            "signal" => ElementKind::Signal,
            "level_crossing" => ElementKind::LevelCrossing,
            "milestone" => ElementKind::Milestone {
                position: node.tag("railway:position").and_then(parse_position),
            },
            _ => return None,
        };

        Some(Self {
            node: node.id,
            position: node.position,
            kind,
            tags: node.tags.clone(),
        })
    }
}

/// Parses a `railway:position` value such as `12.3` or `12,3`.
pub fn parse_position(value: &str) -> Option<f64> {
    value.trim().replace(',', ".").parse().ok()
}

/// All railway elements of the graph, ordered by node id
pub fn railway_elements(graph: &NetworkGraph) -> Vec<RailwayElement> {
    let mut elements: Vec<RailwayElement> =
        graph.nodes().filter_map(RailwayElement::from_node).collect();
    elements.sort_by_key(|e| e.node);
    elements
}

/// Railway elements on any way of a relation, ordered by node id
pub fn elements_on_relation(
    graph: &NetworkGraph,
    relation: RelationId,
) -> Result<Vec<RailwayElement>, MatchError> {
    let relation = graph
        .relation(relation)
        .ok_or(MatchError::UnknownRelation(relation))?;

    let nodes: HashSet<NodeId> = relation
        .ways
        .iter()
        .filter_map(|id| graph.way(*id))
        .flat_map(|way| way.nodes.iter().copied())
        .collect();

    let mut elements: Vec<RailwayElement> = nodes
        .into_iter()
        .filter_map(|id| graph.node(id))
        .filter_map(RailwayElement::from_node)
        .collect();
    elements.sort_by_key(|e| e.node);
    Ok(elements)
}

/// Railway elements passed by a matched path, in travel order
pub fn elements_along(graph: &NetworkGraph, result: &MatchResult) -> Vec<RailwayElement> {
    result
        .nodes
        .iter()
        .filter_map(|id| graph.node(*id))
        .filter_map(RailwayElement::from_node)
        .collect()
}
