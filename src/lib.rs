//! Map matching of rail GPS trajectories onto an OpenStreetMap rail network.
//!
//! The network is loaded once into a [`NetworkGraph`]; every trajectory is then
//! matched independently with a [`MapMatcher`], which scores nearby edges by
//! their distance to the GPS fixes and routes a weighted shortest path through
//! the graph.

pub mod candidates;
pub mod elements;
pub mod emission;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mapmatcher;
pub mod network;
pub mod routing;
pub mod tracks;
pub mod trajectory;

pub use error::MatchError;
pub use mapmatcher::{MapMatcher, MapMatcherConfig, MatchResult, match_trajectory};
pub use network::{NetworkData, NetworkGraph, build_network_graph};
pub use trajectory::{Trajectory, TrajectorySample};
