// DAW Transport - Sample-accurate transport and timeline scheduling

pub mod audio;
pub mod config;
pub mod control;
pub mod logging;
pub mod messaging;
pub mod plugin;
pub mod project;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::{AudioStream, DeadlineMonitor, StreamError, TransportEngine};
pub use config::{ConfigError, EngineConfig};
pub use control::{
    create_transport, create_transport_from_document, ControlError, Quantizer, RecordedNote,
    TransportController,
};
pub use messaging::{
    BridgeError, Command, EngineEvent, Notification, NotificationLevel, TransportStatusSnapshot,
};
pub use plugin::{MetronomePlugin, PluginHost, TimeSnapshot, TimeSyncPlugin};
pub use project::{ProjectError, ProjectManager, TimelineDocument};
pub use sequencer::{
    GrooveSettings, LoopRegion, MusicalClock, MusicalPosition, SamplePosition, Tempo, TempoMap,
    TimeSignature, TimelineError, Transport, TransportState, TICKS_PER_BEAT,
};
