use serde::{Deserialize, Serialize};
use crate::models::position::PositionOptions;
use crate::models::view::CheckInView;

/// Messages the browser sends over the check-in socket.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// A fix answering a `get_current_position` or `watch_position` request.
    Position {
        id: u64,
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy: Option<f64>,
    },
    /// A `GeolocationPositionError` answering request `id`.
    PositionError {
        id: u64,
        code: u16,
        #[serde(default)]
        message: Option<String>,
    },
    Submit,
    Retry,
    DismissError,
    DismissNotice,
}

/// Messages the service sends to the browser.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    GetCurrentPosition { id: u64, options: PositionOptions },
    WatchPosition { id: u64, options: PositionOptions },
    ClearWatch { id: u64 },
    State { view: CheckInView },
    Error { message: String },
}
