#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use railmatch::network::{NetworkData, OsmNode, OsmRelation, OsmWay, Tags};
use railmatch::trajectory::{Trajectory, TrajectorySample};

const ORIGIN: (f64, f64) = (9.73, 52.37);
const LAT_DEGREE: f64 = 111_320.0;

/// Longitude and latitude of a point `east` and `north` meters from the origin
pub fn lon_lat(east: f64, north: f64) -> (f64, f64) {
    let (lon0, lat0) = ORIGIN;
    (
        lon0 + east / (LAT_DEGREE * lat0.to_radians().cos()),
        lat0 + north / LAT_DEGREE,
    )
}

pub fn node(id: u64, east: f64, north: f64) -> OsmNode {
    let (lon, lat) = lon_lat(east, north);
    OsmNode {
        id,
        lon,
        lat,
        tags: Tags::new(),
    }
}

pub fn way(id: u64, nodes: &[u64]) -> OsmWay {
    OsmWay {
        id,
        nodes: nodes.to_vec(),
        tags: Tags::new(),
    }
}

pub fn sample(second: i64, east: f64, north: f64, accuracy: f64) -> TrajectorySample {
    let (lon, lat) = lon_lat(east, north);
    TrajectorySample {
        timestamp: Utc.timestamp_opt(1_700_000_000 + second, 0).unwrap(),
        lon,
        lat,
        horizontal_accuracy: accuracy,
        speed: 12.0,
    }
}

/// A main line (way 10) running north along x = 0 with a passing loop
/// (way 20) 10 m to the east between nodes 0 and 9. Both belong to relation 100.
///
/// ```text
///  91
///   |
///   9
///   | \
///   4  14
///   3  13
///   2  12
///   1  11
///   | /
///   0
///   |
///  90
/// ```
pub fn double_track() -> NetworkData {
    let mut tags = Tags::new();
    tags.insert("name".to_string(), "S1".to_string());
    tags.insert("colour".to_string(), "#00A650".to_string());
    tags.insert("route".to_string(), "train".to_string());

    NetworkData {
        nodes: vec![
            node(90, 0.0, -150.0),
            node(0, 0.0, -50.0),
            node(1, 0.0, 0.0),
            node(2, 0.0, 100.0),
            node(3, 0.0, 200.0),
            node(4, 0.0, 300.0),
            node(9, 0.0, 350.0),
            node(91, 0.0, 450.0),
            node(11, 10.0, 0.0),
            node(12, 10.0, 100.0),
            node(13, 10.0, 200.0),
            node(14, 10.0, 300.0),
        ],
        ways: vec![
            way(10, &[90, 0, 1, 2, 3, 4, 9, 91]),
            way(20, &[0, 11, 12, 13, 14, 9]),
        ],
        relations: vec![OsmRelation {
            id: 100,
            ways: vec![10, 20],
            tags,
        }],
    }
}

/// Samples every 20 m northwards along x = `east`, between the loop's switches
pub fn hugging(name: &str, east: f64, accuracy: f64) -> Trajectory {
    let samples = (1..=14)
        .map(|i| sample(i, east, 20.0 * i as f64, accuracy))
        .collect();
    Trajectory::new(name, samples)
}
