use thiserror::Error;

use crate::network::{NodeId, RelationId, WayId};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Line has two identical end points at ({x}, {y})")]
    DegenerateLine { x: f64, y: f64 },
    #[error("No start or end node found near the trajectory")]
    NoCandidateFound,
    #[error("No path between node {from} and node {to}")]
    NoPath { from: NodeId, to: NodeId },
    #[error("Nodes {from} and {to} share no edge of way {way}")]
    AmbiguousEdgeResolution {
        from: NodeId,
        to: NodeId,
        way: WayId,
    },
    #[error("Way {way} references unknown node {node}")]
    UnknownNode { way: WayId, node: NodeId },
    #[error("Unknown relation {0}")]
    UnknownRelation(RelationId),
    #[error("Coordinate transformation failed: {0}")]
    Projection(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
