//! Background tasks for the Clubhouse service.
//!
//! # Tasks
//!
//! - `event_relay` - Forwards per-user broker events to live WebSockets

pub mod event_relay;

pub use event_relay::start_event_relay;
