//! Editor channel: message contract and WebSocket listener.

pub mod message;
pub mod server;

pub use message::{ClientMessage, ErrorPayload, RequestId, SaveTarget, ServerMessage};
pub use server::start_ws_server;
