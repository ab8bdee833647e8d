use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Location permission denied. Allow location access in your browser or device settings and reload the page.")]
    PermissionDenied,

    #[error("Location information is unavailable. Check that GPS is enabled.")]
    PositionUnavailable,

    #[error("Location request timed out. Please try again.")]
    Timeout,

    #[error("An unknown error occurred while getting location: {0}")]
    Unknown(String),

    #[error("Geolocation is not supported by this device")]
    Unsupported,

    #[error("Unable to determine location. Please try again later.")]
    Unresolved,

    /// No device capability and the fallback failed too; nothing left to retry.
    #[error("Location is not available on this device and the center could not be located.")]
    NoLocationSource,

    #[error("Invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

impl LocationError {
    /// Maps a W3C `GeolocationPositionError` code.
    pub fn from_code(code: u16, message: Option<String>) -> Self {
        match code {
            1 => LocationError::PermissionDenied,
            2 => LocationError::PositionUnavailable,
            3 => LocationError::Timeout,
            _ => LocationError::Unknown(message.unwrap_or_else(|| format!("code {}", code))),
        }
    }

    pub fn kind(&self) -> LocationErrorKind {
        match self {
            LocationError::PermissionDenied => LocationErrorKind::PermissionDenied,
            LocationError::PositionUnavailable => LocationErrorKind::PositionUnavailable,
            LocationError::Timeout => LocationErrorKind::Timeout,
            LocationError::Unknown(_) | LocationError::InvalidCoordinate { .. } => LocationErrorKind::Unknown,
            LocationError::Unsupported => LocationErrorKind::Unsupported,
            LocationError::Unresolved | LocationError::NoLocationSource => LocationErrorKind::Unresolved,
        }
    }

    /// The one place deciding whether the fallback geocoder may run.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self,
            LocationError::PermissionDenied | LocationError::Unresolved | LocationError::NoLocationSource)
    }

    pub fn severity(&self) -> Severity {
        match self {
            LocationError::PermissionDenied | LocationError::NoLocationSource => Severity::Terminal,
            _ => Severity::Recoverable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Unknown,
    Unsupported,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Recoverable,
    Terminal,
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    /// No API key configured; fallback is simply not available.
    #[error("Fallback geocoding is not configured")]
    Unavailable,

    #[error("Geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("No geocoding result for {0:?}")]
    NoResult(String),
}
