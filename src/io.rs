use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::elements::elements_along;
use crate::error::MatchError;
use crate::mapmatcher::MatchResult;
use crate::network::{NetworkData, NetworkGraph};
use crate::trajectory::{Trajectory, TrajectorySample};

pub(crate) mod input {
    use serde::Deserialize;

    use crate::trajectory::TrajectorySample;

    /// Trajectory files hold either a named object or a bare sample list
    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    pub enum TrajectoryFile {
        Named {
            #[serde(default)]
            name: String,
            samples: Vec<TrajectorySample>,
        },
        Samples(Vec<TrajectorySample>),
    }
}

pub fn load_network(path: &Path) -> Result<NetworkData> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let data: NetworkData = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid network data in {:?}", path))?;
    info!(
        "Loaded {} nodes, {} ways and {} relations from {:?}",
        data.nodes.len(),
        data.ways.len(),
        data.relations.len(),
        path
    );
    Ok(data)
}

/// Loads a trajectory and sorts its samples by time. Unnamed trajectories are
/// named after the file stem.
pub fn load_trajectory(path: &Path) -> Result<Trajectory> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let parsed: input::TrajectoryFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid trajectory in {:?}", path))?;

    let (name, samples): (String, Vec<TrajectorySample>) = match parsed {
        input::TrajectoryFile::Named { name, samples } => (name, samples),
        input::TrajectoryFile::Samples(samples) => (String::new(), samples),
    };
    let name = if name.is_empty() {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("Trajectory path {:?} has no file name", path))?
    } else {
        name
    };

    Ok(Trajectory::new(name, samples))
}

/// Converts a match into a GeoJSON feature collection with one LineString
/// through the matched nodes and one Point per railway element passed.
pub fn match_result_to_geojson(
    graph: &NetworkGraph,
    trajectory: &Trajectory,
    result: &MatchResult,
) -> Value {
    let coordinates: Vec<[f64; 2]> = result
        .nodes
        .iter()
        .filter_map(|id| graph.node(*id))
        .map(|node| [node.position.x(), node.position.y()])
        .collect();

    let relation = result.relation.and_then(|id| graph.relation(id));
    let mut features = vec![json!({
        "type": "Feature",
        "properties": {
            "trajectory": trajectory.name,
            "ways": result.ways,
            "relation": result.relation,
            "line": relation.map(|r| r.name()),
            "colour": relation.and_then(|r| r.colour()),
            "length_m": result.length(graph),
            "cost": result.cost,
            "matched_samples": result.matched_samples,
        },
        "geometry": {
            "type": "LineString",
            "coordinates": coordinates
        }
    })];

    for element in elements_along(graph, result) {
        features.push(json!({
            "type": "Feature",
            "properties": {
                "node": element.node,
                "kind": element.kind,
            },
            "geometry": {
                "type": "Point",
                "coordinates": [element.position.x(), element.position.y()]
            }
        }));
    }

    json!({
        "type": "FeatureCollection",
        "features": features
    })
}

pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

/// GeoJSON file names for trajectory inputs, one per input and all distinct.
///
/// Names follow the input file stem; a repeated stem gets a `_1`, `_2`, ...
/// suffix and a path without a stem falls back to `trajectory_<index>`.
pub fn output_file_names(inputs: &[&Path]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("trajectory_{i}"));
            let mut name = stem.clone();
            let mut n = 1;
            while !used.insert(name.clone()) {
                name = format!("{stem}_{n}");
                n += 1;
            }
            format!("{name}.geojson")
        })
        .collect()
}

/// Writes one GeoJSON file into `dir` per successful match.
///
/// `inputs`, `trajectories` and `results` are parallel slices. Failed matches and
/// failed writes are logged and skipped. Returns the number of files written.
pub fn write_match_results(
    dir: &Path,
    graph: &NetworkGraph,
    inputs: &[&Path],
    trajectories: &[Trajectory],
    results: &[Result<MatchResult, MatchError>],
) -> usize {
    let names = output_file_names(inputs);
    let mut written = 0;
    for ((name, trajectory), result) in names.iter().zip(trajectories).zip(results) {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!("({}) Map matching failed: {}", trajectory.name, e);
                continue;
            }
        };

        let path = dir.join(name);
        match write_json(&path, &match_result_to_geojson(graph, trajectory, result)) {
            Ok(()) => {
                info!("({}) Written to {:?}", trajectory.name, path);
                written += 1;
            }
            Err(e) => warn!("({}) Could not write result: {:#}", trajectory.name, e),
        }
    }
    written
}
