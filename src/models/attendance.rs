use serde::{Deserialize, Serialize};
use crate::models::position::Coordinate;

/// Body of the attendance POST. The backend expects `[latitude, longitude]`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRequest {
    pub current_location: [f64; 2],
}

impl AttendanceRequest {
    pub fn new(coordinate: Coordinate) -> Self {
        Self { current_location: [coordinate.latitude, coordinate.longitude] }
    }
}

/// Loose view of whatever the backend sends back, success or not.
#[derive(Debug, Default, Deserialize)]
pub struct BackendResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum AttendanceOutcome {
    Marked(String),
    AlreadyMarked(String),
    Failed(String),
}
