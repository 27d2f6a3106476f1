//! Tracker miscalibration check.
//!
//! A recording session places the probe tip on one fixed point and captures
//! several samples at different orientations.  If the tip offset is
//! calibrated correctly every sample reports (nearly) the same position.  The
//! samples are split into two groups (e.g. before and after rotating the
//! probe on the point); the distance between the two group means is the
//! headline miscalibration figure.
//!
//! Each sample is a JSON file `<i>.json` whose `state.agent_id_0.position`
//! is `[x, y, z]` in metres.  Reports are in centimetres.
//!
//! # Example
//!
//! ```rust
//! use sensorbridge_perception::CalibrationReport;
//! use sensorbridge_types::Vec3;
//!
//! let samples = [
//!     Vec3::new(0.10, 0.0, 0.0),
//!     Vec3::new(0.10, 0.0, 0.0),
//!     Vec3::new(0.11, 0.0, 0.0),
//! ];
//! let report = CalibrationReport::analyze(&samples, 2).unwrap();
//! assert!((report.group_distance_cm - 1.0).abs() < 1e-9);
//! ```

use std::fs;
use std::path::Path;

use sensorbridge_types::{BridgeError, Vec3};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const METRES_TO_CM: f64 = 100.0;

/// Summary statistics of one calibration recording, in centimetres.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub samples: usize,
    pub first_group: usize,
    pub mean_cm: Vec3,
    /// Mean of the first group minus mean of the second, per axis.
    pub group_difference_cm: Vec3,
    /// Euclidean distance between the two group means.
    pub group_distance_cm: f64,
    /// Largest distance of any single sample from `mean_cm`.
    pub max_deviation_cm: f64,
}

impl CalibrationReport {
    /// Analyse `positions_m` (metres), treating the first `first_group`
    /// samples as one group and the rest as the other.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Calibration`] when either group would be empty
    /// or a position is not finite.
    pub fn analyze(positions_m: &[Vec3], first_group: usize) -> Result<Self, BridgeError> {
        if first_group == 0 || first_group >= positions_m.len() {
            return Err(BridgeError::Calibration(format!(
                "first group of {first_group} leaves an empty group out of {} samples",
                positions_m.len()
            )));
        }
        if let Some(i) = positions_m.iter().position(|p| !p.is_finite()) {
            return Err(BridgeError::Calibration(format!(
                "sample {i} has a non-finite position"
            )));
        }

        let cm: Vec<Vec3> = positions_m.iter().map(|p| p.scale(METRES_TO_CM)).collect();
        let mean_cm = mean(&cm);
        let (head, tail) = cm.split_at(first_group);
        let group_difference_cm = mean(head).sub(mean(tail));
        let max_deviation_cm = cm
            .iter()
            .map(|p| p.sub(mean_cm).norm())
            .fold(0.0, f64::max);

        Ok(Self {
            samples: cm.len(),
            first_group,
            mean_cm,
            group_difference_cm,
            group_distance_cm: group_difference_cm.norm(),
            max_deviation_cm,
        })
    }
}

fn mean(points: &[Vec3]) -> Vec3 {
    let sum = points.iter().fold(Vec3::zero(), |acc, p| acc.add(*p));
    sum.scale(1.0 / points.len() as f64)
}

/// Read the probe position (metres) from one recorded sample file.
///
/// # Errors
///
/// Returns [`BridgeError::Calibration`] when the file cannot be read, is
/// not JSON, or lacks a three-element numeric `state.agent_id_0.position`.
pub fn load_position(path: &Path) -> Result<Vec3, BridgeError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| BridgeError::Calibration(format!("failed to read {}: {e}", path.display())))?;
    let json: Value = serde_json::from_str(&raw)
        .map_err(|e| BridgeError::Calibration(format!("failed to parse {}: {e}", path.display())))?;
    // Every element must be numeric; a single non-number rejects the sample.
    let coords: Vec<f64> = json
        .pointer("/state/agent_id_0/position")
        .and_then(Value::as_array)
        .and_then(|a| a.iter().map(Value::as_f64).collect::<Option<Vec<_>>>())
        .unwrap_or_default();
    match coords.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(BridgeError::Calibration(format!(
            "{} has no [x, y, z] position at state.agent_id_0.position",
            path.display()
        ))),
    }
}

/// Load samples `0.json ..= (count - 1).json` from `dir`.
pub fn load_dataset(dir: &Path, count: usize) -> Result<Vec<Vec3>, BridgeError> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("{i}.json"));
            debug!(path = %path.display(), "loading calibration sample");
            load_position(&path)
        })
        .collect()
}
