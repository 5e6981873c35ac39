use geo::{Coord, Haversine, Line, Point, algorithm::Distance};
use proj::Proj;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::MatchError;

/// Projects `point` perpendicularly onto the infinite line through `line`.
///
/// Returns the foot of the perpendicular together with its distance to `point`.
/// Both inputs must be planar (e.g. UTM) coordinates.
pub fn project_point_onto_line(
    line: Line<f64>,
    point: Coord<f64>,
) -> Result<(Coord<f64>, f64), MatchError> {
    let s = line.delta();
    let length_2 = dot(s, s);
    if length_2 == 0.0 {
        return Err(MatchError::DegenerateLine {
            x: line.start.x,
            y: line.start.y,
        });
    }

    let t = dot(point - line.start, s) / length_2;
    let foot = line.start + s * t;
    let d = point - foot;

    Ok((foot, dot(d, d).sqrt()))
}

/// True iff the perpendicular foot of `point` lies between the end points of
/// `line` (inclusive), i.e. `0 <= (p - p1)·(p2 - p1) <= |p2 - p1|²`.
pub fn is_point_within_segment_projection(line: Line<f64>, point: Coord<f64>) -> bool {
    let s = line.delta();
    let v = point - line.start;
    let inner = dot(v, s);

    0.0 <= inner && inner <= dot(s, s)
}

/// Great circle distance in meters between two lon/lat positions.
pub fn geodesic_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2))
}

/// Signed curvature (1/m) of the circle through three planar points.
///
/// Positive when the path turns left at `b`, zero for collinear or coincident points.
pub fn signed_curvature(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> f64 {
    let ab = b - a;
    let bc = c - b;
    let ac = c - a;
    let denominator = norm(ab) * norm(bc) * norm(ac);
    if denominator == 0.0 {
        return 0.0;
    }

    2.0 * cross(ab, bc) / denominator
}

fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

fn cross(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

fn norm(a: Coord<f64>) -> f64 {
    dot(a, a).sqrt()
}

const WGS84: &str = "EPSG:4326";

thread_local! {
    // Proj handles are not Sync, every thread keeps its own per (EPSG code, direction)
    static TRANSFORMS: RefCell<HashMap<(u32, bool), Proj>> = RefCell::new(HashMap::new());
}

/// Universal Transverse Mercator zone on WGS84.
///
/// Distances and angles in the projected plane are locally Euclidean, which is
/// what the perpendicular projection tests rely on. Zone exceptions around
/// Norway and Svalbard are not applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtmProjection {
    pub zone: u8,
    pub north: bool,
}

impl UtmProjection {
    pub fn new(zone: u8, north: bool) -> Self {
        Self {
            zone: zone.clamp(1, 60),
            north,
        }
    }

    /// Zone and hemisphere containing the given position.
    pub fn for_position(lon: f64, lat: f64) -> Self {
        let zone = ((lon + 180.0) / 6.0).floor() as i32 + 1;
        Self::new(zone.clamp(1, 60) as u8, lat >= 0.0)
    }

    pub fn central_meridian(&self) -> f64 {
        f64::from(self.zone) * 6.0 - 183.0
    }

    /// `EPSG:326zz` in the northern hemisphere, `EPSG:327zz` in the southern.
    pub fn epsg(&self) -> u32 {
        let base = if self.north { 32_600 } else { 32_700 };
        base + u32::from(self.zone)
    }

    /// Lon/lat (degrees) to easting/northing (meters).
    pub fn project(&self, lon: f64, lat: f64) -> Result<Coord<f64>, MatchError> {
        let (x, y) = self.transform(false, (lon, lat))?;
        Ok(Coord { x, y })
    }

    pub fn project_point(&self, point: Point<f64>) -> Result<Coord<f64>, MatchError> {
        self.project(point.x(), point.y())
    }

    /// Easting/northing (meters) back to lon/lat (degrees).
    pub fn inverse(&self, xy: Coord<f64>) -> Result<Point<f64>, MatchError> {
        let (lon, lat) = self.transform(true, (xy.x, xy.y))?;
        Ok(Point::new(lon, lat))
    }

    fn transform(&self, inverse: bool, coord: (f64, f64)) -> Result<(f64, f64), MatchError> {
        TRANSFORMS.with(|transforms| {
            let mut transforms = transforms.borrow_mut();
            let proj = match transforms.entry((self.epsg(), inverse)) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let utm = format!("EPSG:{}", self.epsg());
                    let (from, to) = if inverse {
                        (utm.as_str(), WGS84)
                    } else {
                        (WGS84, utm.as_str())
                    };
                    let proj = Proj::new_known_crs(from, to, None)
                        .map_err(|e| MatchError::Projection(format!("{from} -> {to}: {e}")))?;
                    entry.insert(proj)
                }
            };
            proj.convert(coord)
                .map_err(|e| MatchError::Projection(e.to_string()))
        })
    }
}
