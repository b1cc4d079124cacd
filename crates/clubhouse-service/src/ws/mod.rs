//! Real-time delivery over WebSocket.

pub mod handler;
pub mod registry;

pub use handler::ws_upgrade;
pub use registry::{ConnectionHandle, ConnectionRegistry, RegistrationGuard};
