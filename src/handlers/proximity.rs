use crate::models::position::{Coordinate, ProximityResult};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1 for antipodal points.
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Classifies fixes against the user's assigned center.
#[derive(Debug, Clone, Copy)]
pub struct ProximityEvaluator {
    reference: Coordinate,
    threshold_m: f64,
}

impl ProximityEvaluator {
    pub fn new(reference: Coordinate, threshold_m: f64) -> Self {
        Self { reference, threshold_m }
    }

    pub fn evaluate(&self, current: Coordinate) -> ProximityResult {
        let distance_m = haversine_m(current, self.reference);
        ProximityResult {
            distance_m,
            within_threshold: distance_m <= self.threshold_m,
        }
    }
}
