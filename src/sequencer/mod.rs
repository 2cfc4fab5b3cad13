// Sequencer module
// Musical time, tempo map, clock, groove and the transport state machine

pub mod clock;
pub mod groove;
pub mod playhead;
pub mod tempo_map;
pub mod timeline;
pub mod transport;

pub use clock::MusicalClock;
pub use groove::{apply_groove, quantize_note, Accent, GrooveSettings, QuantizedNote};
pub use playhead::{LoopBack, LoopRegion, Playhead};
pub use tempo_map::{TempoEvent, TempoMap, TimeSignatureEvent, TimelineEvent};
pub use timeline::{
    MusicalPosition, SamplePosition, Tempo, TimeSignature, MAX_BPM, MIN_BPM, TICKS_PER_BEAT,
};
pub use transport::{Transport, TransportState};

use thiserror::Error;

/// Rejected timeline edits
///
/// Raised synchronously at the API boundary; the map or setting the edit was
/// aimed at is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("Invalid event placement: {0}")]
    InvalidEventPlacement(String),
}
