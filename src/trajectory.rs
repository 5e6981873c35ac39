use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

/// A single GPS fix recorded aboard the vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub timestamp: DateTime<Utc>,
    pub lon: f64,
    pub lat: f64,
    /// 1-sigma horizontal accuracy in meters
    #[serde(alias = "hor_acc")]
    pub horizontal_accuracy: f64,
    /// Speed over ground in m/s
    pub speed: f64,
}

impl TrajectorySample {
    pub fn position(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }

    /// Finite position, speed and a non-negative accuracy
    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && self.speed.is_finite()
            && self.horizontal_accuracy.is_finite()
            && self.horizontal_accuracy >= 0.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    #[serde(default)]
    pub name: String,
    pub samples: Vec<TrajectorySample>,
}

impl Trajectory {
    /// Creates a trajectory with its samples in ascending time order.
    pub fn new(name: impl Into<String>, mut samples: Vec<TrajectorySample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self {
            name: name.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Valid samples recorded faster than `speed_threshold` (m/s).
    pub fn moving_samples(&self, speed_threshold: f64) -> Vec<&TrajectorySample> {
        self.samples
            .iter()
            .filter(|s| s.is_valid() && s.speed > speed_threshold)
            .collect()
    }
}
