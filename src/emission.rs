//! Emission scores and the per-match edge weight overlay.
//!
//! Every candidate contributes a zero-mean Gaussian density of its perpendicular
//! distance, scaled by the fix's horizontal accuracy. Scores of one edge add up
//! and turn into the traversal weight `1 / (1 + sum)`; edges without any score
//! keep the baseline weight of 1. The overlay belongs to a single match and is
//! never written back into the graph.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::candidates::PointCandidates;
use crate::network::EdgeId;

/// Weight of an edge without GPS support
pub const BASELINE_WEIGHT: f64 = 1.0;

/// Normal density `N(distance; 0, accuracy)`. Zero for a non-positive accuracy.
pub fn emission_score(distance: f64, accuracy: f64) -> f64 {
    if accuracy.is_nan() || accuracy <= 0.0 {
        return 0.0;
    }
    let z = distance / accuracy;
    (-0.5 * z * z).exp() / (accuracy * (2.0 * PI).sqrt())
}

/// Emission scores collected for one edge from different trajectory points
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateEdge {
    pub edge: EdgeId,
    pub scores: Vec<f64>,
}

impl CandidateEdge {
    pub fn support(&self) -> f64 {
        self.scores.iter().sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeWeights {
    candidates: HashMap<EdgeId, CandidateEdge>,
}

impl EdgeWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scores every candidate of every point.
    pub fn from_candidates(points: &[PointCandidates]) -> Self {
        let mut weights = Self::new();
        for candidate in points.iter().flat_map(|p| &p.candidates) {
            weights.add_score(
                candidate.edge,
                emission_score(candidate.distance, candidate.accuracy),
            );
        }
        weights
    }

    pub fn add_score(&mut self, edge: EdgeId, score: f64) {
        self.candidates
            .entry(edge)
            .or_insert_with(|| CandidateEdge {
                edge,
                scores: Vec::new(),
            })
            .scores
            .push(score);
    }

    pub fn candidate(&self, edge: EdgeId) -> Option<&CandidateEdge> {
        self.candidates.get(&edge)
    }

    /// Summed emission score of `edge`, zero when unsupported
    pub fn support(&self, edge: EdgeId) -> f64 {
        self.candidate(edge).map_or(0.0, CandidateEdge::support)
    }

    pub fn weight(&self, edge: EdgeId) -> f64 {
        match self.candidates.get(&edge) {
            Some(candidate) => 1.0 / (1.0 + candidate.support()),
            None => BASELINE_WEIGHT,
        }
    }

    /// Edges with at least one score, in id order
    pub fn supported_edges(&self) -> Vec<EdgeId> {
        let mut edges: Vec<EdgeId> = self.candidates.keys().copied().collect();
        edges.sort();
        edges
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::Candidate;
    use geo::Point;

    fn candidate(point: usize, edge: usize, distance: f64, accuracy: f64) -> Candidate {
        Candidate {
            point,
            way: 1,
            edge: EdgeId(edge),
            from: 1,
            to: 2,
            projection: Point::new(0.0, 0.0),
            distance,
            accuracy,
        }
    }

    #[test]
    fn score_is_a_normal_density() {
        let peak = 1.0 / (5.0 * (2.0 * PI).sqrt());
        assert!((emission_score(0.0, 5.0) - peak).abs() < 1e-12);
        assert!((emission_score(5.0, 5.0) - peak * (-0.5_f64).exp()).abs() < 1e-12);
        assert!(emission_score(1.0, 5.0) > emission_score(2.0, 5.0));
        assert_eq!(emission_score(1.0, 0.0), 0.0);
    }

    #[test]
    fn scores_accumulate_per_edge() {
        let points = vec![
            PointCandidates {
                point: 0,
                nearby_ways: vec![1],
                candidates: vec![candidate(0, 3, 1.0, 5.0)],
            },
            PointCandidates::default(),
            PointCandidates {
                point: 2,
                nearby_ways: vec![1],
                candidates: vec![candidate(2, 3, 2.0, 5.0), candidate(2, 4, 0.5, 3.0)],
            },
        ];
        let weights = EdgeWeights::from_candidates(&points);

        assert_eq!(weights.len(), 2);
        assert_eq!(weights.supported_edges(), vec![EdgeId(3), EdgeId(4)]);
        assert_eq!(weights.candidate(EdgeId(3)).unwrap().scores.len(), 2);

        let sum = emission_score(1.0, 5.0) + emission_score(2.0, 5.0);
        assert!((weights.support(EdgeId(3)) - sum).abs() < 1e-12);
        assert!((weights.weight(EdgeId(3)) - 1.0 / (1.0 + sum)).abs() < 1e-12);
        assert!(weights.weight(EdgeId(3)) < 1.0);
        assert_eq!(weights.weight(EdgeId(99)), BASELINE_WEIGHT);
        assert_eq!(weights.support(EdgeId(99)), 0.0);
    }

    #[test]
    fn more_support_means_cheaper_edges() {
        let mut weak = EdgeWeights::new();
        weak.add_score(EdgeId(0), 0.05);
        let mut strong = weak.clone();
        strong.add_score(EdgeId(0), 0.05);
        assert!(strong.weight(EdgeId(0)) < weak.weight(EdgeId(0)));
        assert!(weak.weight(EdgeId(0)) < BASELINE_WEIGHT);
    }
}
