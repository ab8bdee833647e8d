use serde::{Deserialize, Serialize};
use crate::models::error::LocationError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Builds a coordinate, rejecting values outside latitude [-90, 90] and
    /// longitude [-180, 180] (and NaN).
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, LocationError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationError::InvalidCoordinate { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    /// Set when the position came from the fallback geocoder instead of the device.
    pub is_approximate: bool,
}

impl PositionFix {
    pub fn device(coordinate: Coordinate) -> Self {
        Self { coordinate, is_approximate: false }
    }

    pub fn approximate(coordinate: Coordinate) -> Self {
        Self { coordinate, is_approximate: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProximityResult {
    pub distance_m: f64,
    pub within_threshold: bool,
}

/// Options forwarded to the device for a position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
}

impl PositionOptions {
    /// Relaxed settings used for the first fix and the standard watch.
    pub const STANDARD: PositionOptions = PositionOptions {
        enable_high_accuracy: false,
        maximum_age_ms: 60_000,
        timeout_ms: 10_000,
    };

    /// Fresh fixes only, longer timeout.
    pub const HIGH_ACCURACY: PositionOptions = PositionOptions {
        enable_high_accuracy: true,
        maximum_age_ms: 0,
        timeout_ms: 15_000,
    };
}
