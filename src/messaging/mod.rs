// Messaging - Lock-free bridge between the control thread and the audio thread

pub mod channels;
pub mod command;
pub mod notification;
pub mod status;

pub use channels::{create_transport_bridge, AudioBridge, BridgeCapacities, ControlBridge, Drain};
pub use command::{CoalesceKey, Command, EngineCommand, Retired};
pub use notification::{EngineEvent, Notification, NotificationCategory, NotificationLevel};
pub use status::TransportStatusSnapshot;

use thiserror::Error;

/// Bridge errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The command queue is full; the command was dropped
    #[error("Command queue full ({capacity} pending), command dropped")]
    Backpressure { capacity: usize },
}
