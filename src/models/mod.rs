pub mod attendance;
pub mod error;
pub mod position;
pub mod session;
pub mod updates;
pub mod view;
