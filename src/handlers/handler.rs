use tracing::trace;
use crate::handlers::events::Command;
use crate::models::error::LocationError;
use crate::models::position::Coordinate;
use crate::models::updates::InboundMessage;

/// Where an inbound socket message goes.
#[derive(Debug, PartialEq)]
pub enum Routed {
    /// An answer to a device request, for the geolocation bridge.
    Device { id: u64, reply: Result<Coordinate, LocationError> },
    /// A user action, for the check-in actor.
    Command(Command),
}

pub fn route_inbound(text: &str) -> serde_json::Result<Routed> {
    let routed = match serde_json::from_str::<InboundMessage>(text)? {
        InboundMessage::Position { id, latitude, longitude, accuracy } => {
            if let Some(accuracy) = accuracy {
                trace!("Fix for request {} accurate to {:.0} m", id, accuracy);
            }
            Routed::Device { id, reply: Coordinate::new(latitude, longitude) }
        }
        InboundMessage::PositionError { id, code, message } => Routed::Device {
            id,
            reply: Err(LocationError::from_code(code, message)),
        },
        InboundMessage::Submit => Routed::Command(Command::Submit),
        InboundMessage::Retry => Routed::Command(Command::Retry),
        InboundMessage::DismissError => Routed::Command(Command::DismissError),
        InboundMessage::DismissNotice => Routed::Command(Command::DismissNotice),
    };
    Ok(routed)
}
