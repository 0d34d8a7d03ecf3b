//! Broadcast relay WebSocket endpoint

pub mod handler;
pub mod protocol;

pub use handler::ws_handler;
pub use protocol::{ClientFrame, RelayFrame};
