use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use railmatch::io::{load_network, load_trajectory, write_match_results};
use railmatch::{MapMatcher, MapMatcherConfig, NetworkGraph, Trajectory};

#[derive(Parser, Debug)]
#[command(version, about = "Match rail GPS trajectories onto an OSM rail network")]
struct Args {
    /// Network JSON with nodes, ways and relations
    #[arg(short, long)]
    network: PathBuf,

    /// Trajectory JSON files, one match per file
    #[arg(short, long, required = true, num_args = 1..)]
    trajectory: Vec<PathBuf>,

    /// Matcher configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory the GeoJSON results are written to
    #[arg(short, long, default_value = "matched")]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let contents =
                fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
            serde_json::from_str(&contents).with_context(|| format!("Invalid config {:?}", path))?
        }
        None => MapMatcherConfig::default(),
    };
    info!("Using {:?}", config);

    let data = load_network(&args.network)?;
    let graph = NetworkGraph::build(&data)?;
    info!(
        "Network graph has {} nodes, {} edges and {} tracks",
        graph.node_count(),
        graph.edge_count(),
        graph.tracks().len()
    );

    let mut inputs: Vec<&Path> = Vec::with_capacity(args.trajectory.len());
    let mut trajectories: Vec<Trajectory> = Vec::with_capacity(args.trajectory.len());
    for path in &args.trajectory {
        match load_trajectory(path) {
            Ok(trajectory) => {
                inputs.push(path);
                trajectories.push(trajectory);
            }
            Err(e) => warn!("Skipping {:?}: {:#}", path, e),
        }
    }
    info!("Loaded {} trajectories", trajectories.len());

    let pb = ProgressBar::new(trajectories.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    pb.set_message("Matching trajectories");

    let matcher = MapMatcher::new(config);
    let results = matcher.match_batch(&graph, &trajectories, Some(&pb));
    pb.finish_with_message("All trajectories processed");

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {:?}", args.output))?;
    let written = write_match_results(&args.output, &graph, &inputs, &trajectories, &results);
    info!(
        "Wrote {} of {} results to {:?}",
        written,
        args.trajectory.len(),
        args.output
    );

    Ok(())
}
