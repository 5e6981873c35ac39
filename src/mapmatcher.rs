use geo::Coord;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::candidates::{DEFAULT_SEARCH_RADIUS, PointCandidates, find_candidates};
use crate::emission::EdgeWeights;
use crate::error::MatchError;
use crate::network::{EdgeId, NetworkGraph, NodeId, RelationId, WayId};
use crate::routing::shortest_path;
use crate::trajectory::Trajectory;

/// Core map matching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapMatcherConfig {
    /// Samples at or below this speed (m/s) are ignored
    pub speed_threshold: f64,
    /// Radius around each sample for the network node lookup (meters)
    pub search_radius: f64,
    /// Fail instead of falling back when a segment cannot be tied to an edge of its way
    pub strict_edge_resolution: bool,
    /// Look up the relation and track the matched ways belong to
    pub resolve_line: bool,
}

impl Default for MapMatcherConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 1.0,
            search_radius: DEFAULT_SEARCH_RADIUS,
            strict_edge_resolution: false,
            resolve_line: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MatchResult {
    /// Matched node ids from start to end
    pub nodes: Vec<NodeId>,
    /// Edges joining consecutive matched nodes
    pub edges: Vec<EdgeId>,
    /// Distinct way ids in order of first traversal
    pub ways: Vec<WayId>,
    /// Summed emission weight along the path
    pub cost: f64,
    /// Relation sharing the most ways with the match
    pub relation: Option<RelationId>,
    /// Index into [`NetworkGraph::tracks`]
    pub track: Option<usize>,
    /// Samples that produced at least one candidate
    pub matched_samples: usize,
    /// Weight overlay the path was searched with
    pub weights: EdgeWeights,
}

impl MatchResult {
    /// Geodesic length of the matched path in meters
    pub fn length(&self, graph: &NetworkGraph) -> f64 {
        self.edges
            .iter()
            .filter_map(|id| graph.edge(*id))
            .map(|edge| edge.length)
            .sum()
    }
}

/// Matches trajectories against a prebuilt network graph
pub struct MapMatcher {
    config: MapMatcherConfig,
}

impl MapMatcher {
    pub fn new(config: MapMatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MapMatcherConfig {
        &self.config
    }

    pub fn match_trajectory(
        &self,
        graph: &NetworkGraph,
        trajectory: &Trajectory,
    ) -> Result<MatchResult, MatchError> {
        let start_time = Instant::now();
        let samples = trajectory.moving_samples(self.config.speed_threshold);
        debug!(
            "({}) {} of {} samples above {:.1} m/s",
            trajectory.name,
            samples.len(),
            trajectory.len(),
            self.config.speed_threshold
        );

        let projection = graph.projection();
        let points: Vec<Coord<f64>> = samples
            .iter()
            .map(|s| projection.project(s.lon, s.lat))
            .collect::<Result<_, _>>()?;
        let accuracies: Vec<f64> = samples.iter().map(|s| s.horizontal_accuracy).collect();

        let candidates = find_candidates(
            graph,
            &points,
            &accuracies,
            self.config.search_radius,
            self.config.strict_edge_resolution,
        )?;
        let weights = EdgeWeights::from_candidates(&candidates);
        debug!(
            "({}) {} edges supported by GPS fixes",
            trajectory.name,
            weights.len()
        );

        let Some((start, end)) = start_and_end(&candidates) else {
            warn!(
                "({}) Map matching failed, no start or end node found",
                trajectory.name
            );
            return Err(MatchError::NoCandidateFound);
        };

        let no_path = MatchError::NoPath {
            from: start,
            to: end,
        };
        if !graph.same_component(start, end) {
            warn!(
                "({}) Start node {} and end node {} are not connected",
                trajectory.name, start, end
            );
            return Err(no_path);
        }

        let path = shortest_path(graph, start, end, |edge| Some(weights.weight(edge.id)))
            .ok_or(no_path)?;

        let mut ways = Vec::new();
        let mut seen = HashSet::new();
        for edge in path.edges.iter().filter_map(|id| graph.edge(*id)) {
            if seen.insert(edge.way) {
                ways.push(edge.way);
            }
        }

        let (relation, track) = if self.config.resolve_line {
            resolve_line(graph, &path.nodes, &ways)
        } else {
            (None, None)
        };

        let result = MatchResult {
            nodes: path.nodes,
            edges: path.edges,
            ways,
            cost: path.cost,
            relation,
            track,
            matched_samples: candidates.iter().filter(|p| !p.is_empty()).count(),
            weights,
        };

        info!(
            "({}) Found {} nodes on {} ways that match the GPS track in {:?}",
            trajectory.name,
            result.nodes.len(),
            result.ways.len(),
            start_time.elapsed()
        );
        if let Some(relation) = result.relation.and_then(|id| graph.relation(id)) {
            info!(
                "({}) Matched line {} ({})",
                trajectory.name,
                relation.id,
                relation.name()
            );
        }

        Ok(result)
    }

    /// Matches every trajectory independently on the rayon thread pool.
    ///
    /// Results keep the input order; a failed trajectory does not affect the others.
    /// `progress` advances once per finished trajectory.
    pub fn match_batch(
        &self,
        graph: &NetworkGraph,
        trajectories: &[Trajectory],
        progress: Option<&ProgressBar>,
    ) -> Vec<Result<MatchResult, MatchError>> {
        let results: Vec<Result<MatchResult, MatchError>> = trajectories
            .par_iter()
            .map(|trajectory| {
                let result = self.match_trajectory(graph, trajectory);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                result
            })
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            "Batch matching completed: {} matched, {} failed",
            results.len() - failed,
            failed
        );

        results
    }
}

/// Matches one trajectory with default settings apart from the given threshold and radius.
pub fn match_trajectory(
    graph: &NetworkGraph,
    trajectory: &Trajectory,
    speed_threshold: f64,
    search_radius: f64,
) -> Result<MatchResult, MatchError> {
    MapMatcher::new(MapMatcherConfig {
        speed_threshold,
        search_radius,
        ..MapMatcherConfig::default()
    })
    .match_trajectory(graph, trajectory)
}

/// Start node: segment start of the closest candidate of the first point with
/// candidates. End node: segment end of the closest candidate of the last one.
fn start_and_end(candidates: &[PointCandidates]) -> Option<(NodeId, NodeId)> {
    let start = candidates.iter().find_map(|p| p.best())?.from;
    let end = candidates.iter().rev().find_map(|p| p.best())?.to;
    Some((start, end))
}

/// Finds the relation sharing most ways with a match and, within it, the track
/// containing most matched nodes. Ties go to the lower relation id and the
/// earlier track.
pub fn resolve_line(
    graph: &NetworkGraph,
    nodes: &[NodeId],
    ways: &[WayId],
) -> (Option<RelationId>, Option<usize>) {
    let matched_ways: HashSet<WayId> = ways.iter().copied().collect();
    let mut overlaps: HashMap<RelationId, usize> = HashMap::new();
    for relation in graph.relations() {
        let overlap = relation
            .ways
            .iter()
            .filter(|w| matched_ways.contains(*w))
            .count();
        if overlap > 0 {
            let entry = overlaps.entry(relation.id).or_default();
            *entry = (*entry).max(overlap);
        }
    }

    let Some(relation) = overlaps
        .into_iter()
        .max_by(|(id_a, a), (id_b, b)| a.cmp(b).then_with(|| id_b.cmp(id_a)))
        .map(|(id, _)| id)
    else {
        return (None, None);
    };

    let matched_nodes: HashSet<NodeId> = nodes.iter().copied().collect();
    let mut best: Option<(usize, usize)> = None;
    for (i, track) in graph.tracks().iter().enumerate() {
        if track.relation != relation {
            continue;
        }
        let overlap = matched_nodes
            .iter()
            .filter(|n| track.contains_node(**n))
            .count();
        if overlap > 0 && best.is_none_or(|(_, best_overlap)| overlap > best_overlap) {
            best = Some((i, overlap));
        }
    }

    (Some(relation), best.map(|(i, _)| i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: MapMatcherConfig = serde_json::from_str(r#"{"speed_threshold": 2.5}"#).unwrap();
        assert_eq!(config.speed_threshold, 2.5);
        assert_eq!(config.search_radius, DEFAULT_SEARCH_RADIUS);
        assert!(!config.strict_edge_resolution);
        assert!(config.resolve_line);
    }

    #[test]
    fn start_and_end_skip_points_without_candidates() {
        use crate::candidates::Candidate;
        use geo::Point;

        let candidate = |point, from, to, distance| Candidate {
            point,
            way: 1,
            edge: EdgeId(0),
            from,
            to,
            projection: Point::new(0.0, 0.0),
            distance,
            accuracy: 5.0,
        };
        let points = vec![
            PointCandidates::default(),
            PointCandidates {
                point: 1,
                nearby_ways: vec![1, 2],
                candidates: vec![candidate(1, 10, 11, 3.0), candidate(1, 20, 21, 1.0)],
            },
            PointCandidates {
                point: 2,
                nearby_ways: vec![1],
                candidates: vec![candidate(2, 30, 31, 2.0)],
            },
            PointCandidates::default(),
        ];
        assert_eq!(start_and_end(&points), Some((20, 31)));
        assert_eq!(start_and_end(&[PointCandidates::default()]), None);
    }
}
