// Quantizer - Grid snapping for recorded notes on the control thread

use crate::sequencer::groove::{quantize_note, GrooveSettings, QuantizedNote};
use crate::sequencer::tempo_map::TempoMap;
use crate::sequencer::timeline::SamplePosition;

/// A note as captured during recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedNote {
    pub sample: SamplePosition,
    pub velocity: u8,
    /// Only quantizable notes receive swing and accents
    pub quantizable: bool,
}

impl RecordedNote {
    pub fn new(sample: SamplePosition, velocity: u8) -> Self {
        Self {
            sample,
            velocity,
            quantizable: true,
        }
    }
}

/// Snaps notes to a subdivision of the beat
///
/// `subdivision` counts grid steps per beat: 1 = quarter notes in 4/4,
/// 2 = eighths, 4 = sixteenths.
pub struct Quantizer<'a> {
    timeline: &'a TempoMap,
    groove: &'a GrooveSettings,
    subdivision: u32,
}

impl<'a> Quantizer<'a> {
    pub fn new(timeline: &'a TempoMap, groove: &'a GrooveSettings, subdivision: u32) -> Self {
        Self {
            timeline,
            groove,
            subdivision: subdivision.max(1),
        }
    }

    pub fn subdivision(&self) -> u32 {
        self.subdivision
    }

    pub fn quantize(&self, note: RecordedNote) -> QuantizedNote {
        quantize_note(
            &self.timeline.clock(),
            self.groove,
            note.sample,
            note.velocity,
            self.subdivision,
            note.quantizable,
        )
    }

    /// Quantize a take, keeping the input order
    pub fn quantize_all(&self, notes: &[RecordedNote]) -> Vec<QuantizedNote> {
        notes.iter().map(|&note| self.quantize(note)).collect()
    }
}
