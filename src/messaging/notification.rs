// Notifications - Problems reported by the audio thread, surfaced by the control thread

use crate::sequencer::timeline::SamplePosition;
use std::time::{SystemTime, UNIX_EPOCH};

/// Problem detected on the audio thread
///
/// Small and `Copy` so it can be pushed through a ring buffer without
/// allocating or formatting anything in the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A seek beyond the project end was clamped
    InconsistentTransition {
        requested: SamplePosition,
        clamped_to: SamplePosition,
    },
    /// A replacement tempo map failed validation and was not adopted
    TimelineRejected,
    /// A computed time snapshot was invalid; the last good one was reused
    SnapshotFallback { block_index: u64 },
    /// A plugin panicked and is bypassed from now on
    PluginFault { index: usize },
    /// The retire queue was full; a value was released on the audio thread
    RetireQueueFull,
}

/// Severity level of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationLevel {
    Warning,
    Error,
}

/// Notification category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Transport,
    Timeline,
    Plugin,
    Bridge,
}

/// Notification with timestamp and metadata
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub message: String,
    pub timestamp: u64, // Unix timestamp in milliseconds
}

impl Notification {
    /// Creates a new notification with the current timestamp
    pub fn new(level: NotificationLevel, category: NotificationCategory, message: String) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            level,
            category,
            message,
            timestamp,
        }
    }

    pub fn warning(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Warning, category, message)
    }

    pub fn error(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Error, category, message)
    }

    /// Forward to the `log` facade at the matching level
    pub fn log(&self) {
        match self.level {
            NotificationLevel::Warning => log::warn!("[{:?}] {}", self.category, self.message),
            NotificationLevel::Error => log::error!("[{:?}] {}", self.category, self.message),
        }
    }
}

impl From<EngineEvent> for Notification {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::InconsistentTransition {
                requested,
                clamped_to,
            } => Notification::warning(
                NotificationCategory::Transport,
                format!(
                    "Seek to sample {} is past the project end, clamped to {}",
                    requested, clamped_to
                ),
            ),
            EngineEvent::TimelineRejected => Notification::error(
                NotificationCategory::Timeline,
                "Tempo map update failed validation and was ignored".to_string(),
            ),
            EngineEvent::SnapshotFallback { block_index } => Notification::warning(
                NotificationCategory::Timeline,
                format!(
                    "Invalid time snapshot at block {}, reused the last good one",
                    block_index
                ),
            ),
            EngineEvent::PluginFault { index } => Notification::error(
                NotificationCategory::Plugin,
                format!("Plugin #{} panicked and has been bypassed", index),
            ),
            EngineEvent::RetireQueueFull => Notification::warning(
                NotificationCategory::Bridge,
                "Retire queue full, memory was released on the audio thread".to_string(),
            ),
        }
    }
}
