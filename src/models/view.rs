use serde::Serialize;
use crate::models::error::{LocationError, LocationErrorKind, Severity};
use crate::models::position::{Coordinate, PositionFix, ProximityResult};
use crate::models::session::{Center, Role};

/// Where the position source is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPhase {
    Idle,
    AwaitingFirstFix,
    MonitoringStandard,
    MonitoringHighAccuracy,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBanner {
    pub kind: LocationErrorKind,
    pub severity: Severity,
    pub message: String,
    pub retryable: bool,
}

impl From<&LocationError> for ErrorBanner {
    fn from(e: &LocationError) -> Self {
        let severity = e.severity();
        Self {
            kind: e.kind(),
            severity,
            message: e.to_string(),
            retryable: severity == Severity::Recoverable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Notice {
    AttendanceMarked(String),
    /// Shown as a modal: "request denied, already marked".
    AlreadyMarked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraMove {
    pub center: Coordinate,
    /// `true` for the one-time fly-to, `false` for plain re-centering.
    pub animate: bool,
    pub seq: u64,
}

/// Snapshot of the check-in screen, republished after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInView {
    pub role: Role,
    pub center: Center,
    pub threshold_m: f64,
    pub phase: MonitorPhase,
    pub fix: Option<PositionFix>,
    pub proximity: Option<ProximityResult>,
    pub location_error: Option<ErrorBanner>,
    pub submit_error: Option<String>,
    pub notice: Option<Notice>,
    pub attendance_marked_today: bool,
    pub rest_day: bool,
    pub submitting: bool,
    pub can_submit: bool,
    pub camera: Option<CameraMove>,
}

impl CheckInView {
    pub fn new(role: Role, center: Center, threshold_m: f64) -> Self {
        Self {
            role,
            center,
            threshold_m,
            phase: MonitorPhase::Idle,
            fix: None,
            proximity: None,
            location_error: None,
            submit_error: None,
            notice: None,
            attendance_marked_today: false,
            rest_day: false,
            submitting: false,
            can_submit: false,
            camera: None,
        }
    }
}
