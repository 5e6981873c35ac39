use geo::{Coord, Line, Point};
use log::{debug, trace, warn};
use std::collections::BTreeSet;

use crate::error::MatchError;
use crate::geometry::{is_point_within_segment_projection, project_point_onto_line};
use crate::network::{EdgeId, NetworkGraph, NodeId, WayId};

/// Default radius around a fix in which network nodes are looked up (meters)
pub const DEFAULT_SEARCH_RADIUS: f64 = 100.0;

/// The closest acceptable segment of one way for one trajectory point
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Index of the point in the searched sequence
    pub point: usize,
    pub way: WayId,
    pub edge: EdgeId,
    /// Segment start in way order
    pub from: NodeId,
    /// Segment end in way order
    pub to: NodeId,
    /// Foot of the perpendicular (lon/lat)
    pub projection: Point<f64>,
    /// Perpendicular distance in meters
    pub distance: f64,
    /// Horizontal accuracy of the fix, used as the emission scale
    pub accuracy: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCandidates {
    pub point: usize,
    /// Ways passing through a node within the search radius
    pub nearby_ways: Vec<WayId>,
    /// At most one candidate per nearby way
    pub candidates: Vec<Candidate>,
}

impl PointCandidates {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidate with the smallest perpendicular distance
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Finds candidate edges for every planar trajectory point.
///
/// Only ways with a node within `search_radius` of a point are considered. A
/// segment is accepted when the point's perpendicular foot falls inside it and
/// lies closer than the point's horizontal accuracy; of the accepted segments of
/// one way only the closest is kept.
pub fn find_candidates(
    graph: &NetworkGraph,
    points: &[Coord<f64>],
    accuracies: &[f64],
    search_radius: f64,
    strict_edge_resolution: bool,
) -> Result<Vec<PointCandidates>, MatchError> {
    if points.len() != accuracies.len() {
        return Err(MatchError::InvalidData(format!(
            "{} points but {} accuracies",
            points.len(),
            accuracies.len()
        )));
    }

    let mut result = Vec::with_capacity(points.len());
    for (i, (&point, &accuracy)) in points.iter().zip(accuracies).enumerate() {
        let nearby_ways: BTreeSet<WayId> = graph
            .nodes_within(point, search_radius)
            .filter_map(|id| graph.node(id))
            .flat_map(|node| node.ways.iter().copied())
            .collect();

        let mut candidates = Vec::new();
        for way_id in &nearby_ways {
            if let Some(candidate) =
                closest_segment(graph, *way_id, i, point, accuracy, strict_edge_resolution)?
            {
                candidates.push(candidate);
            }
        }

        trace!(
            "Point {}: {} nearby ways, {} candidates",
            i,
            nearby_ways.len(),
            candidates.len()
        );

        result.push(PointCandidates {
            point: i,
            nearby_ways: nearby_ways.into_iter().collect(),
            candidates,
        });
    }

    debug!(
        "Candidate search: {} of {} points have candidates",
        result.iter().filter(|p| !p.is_empty()).count(),
        result.len()
    );

    Ok(result)
}

fn closest_segment(
    graph: &NetworkGraph,
    way_id: WayId,
    point_index: usize,
    point: Coord<f64>,
    accuracy: f64,
    strict_edge_resolution: bool,
) -> Result<Option<Candidate>, MatchError> {
    let Some(way) = graph.way(way_id) else {
        return Ok(None);
    };

    // (distance, from, to, planar foot)
    let mut best: Option<(f64, NodeId, NodeId, Coord<f64>)> = None;
    for pair in way.nodes.windows(2) {
        let (Some(n1), Some(n2)) = (graph.node(pair[0]), graph.node(pair[1])) else {
            continue;
        };
        if n1.xy == n2.xy {
            continue;
        }

        let line = Line::new(n1.xy, n2.xy);
        if !is_point_within_segment_projection(line, point) {
            continue;
        }

        let (foot, d) = project_point_onto_line(line, point)?;
        if d >= accuracy {
            continue;
        }
        if best.is_none_or(|(best_d, ..)| d < best_d) {
            best = Some((d, n1.id, n2.id, foot));
        }
    }

    let Some((distance, from, to, foot)) = best else {
        return Ok(None);
    };

    let edge = resolve_edge(graph, from, to, way_id, strict_edge_resolution)?;
    let projection = graph.projection().inverse(foot)?;

    Ok(Some(Candidate {
        point: point_index,
        way: way_id,
        edge,
        from,
        to,
        projection,
        distance,
        accuracy,
    }))
}

/// Resolves a segment of `way` to a concrete graph edge.
///
/// Parallel edges between `from` and `to` are told apart by their owning way.
/// Without an edge of that way, `strict` raises
/// [`MatchError::AmbiguousEdgeResolution`]; otherwise any edge joining both nodes
/// is used, then the first edge incident to `from`.
pub fn resolve_edge(
    graph: &NetworkGraph,
    from: NodeId,
    to: NodeId,
    way: WayId,
    strict: bool,
) -> Result<EdgeId, MatchError> {
    if let Some(edge) = graph.edges_between(from, to).find(|e| e.way == way) {
        return Ok(edge.id);
    }

    let ambiguous = MatchError::AmbiguousEdgeResolution { from, to, way };
    if strict {
        return Err(ambiguous);
    }

    if let Some(edge) = graph.edges_between(from, to).next() {
        warn!(
            "No edge of way {} between {} and {}, using edge {:?} of way {}",
            way, from, to, edge.id, edge.way
        );
        return Ok(edge.id);
    }

    match graph.incident_edges(from).first() {
        Some(edge) => {
            warn!(
                "Nodes {} and {} are not adjacent, using edge {:?} incident to {}",
                from, to, edge, from
            );
            Ok(*edge)
        }
        None => Err(ambiguous),
    }
}
