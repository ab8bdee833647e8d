pub mod attendance;
pub mod event_actor;
pub mod events;
pub mod geocoder;
pub mod geolocation;
pub mod handler;
pub mod position_source;
pub mod proximity;
pub mod task;
pub mod throttle;
pub mod websocket_actor;
