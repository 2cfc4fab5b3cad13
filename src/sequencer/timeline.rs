// Timeline - Musical time representation
// Sample positions, bar/beat/tick positions, tempo and meter values

use super::TimelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute position in samples since the project origin
pub type SamplePosition = u64;

/// Ticks per beat (PPQN - Pulses Per Quarter Note)
/// Standard MIDI resolution
pub const TICKS_PER_BEAT: u32 = 480;

/// Lowest tempo accepted by the tempo map
pub const MIN_BPM: f64 = 1.0;

/// Highest tempo accepted by the tempo map
pub const MAX_BPM: f64 = 999.0;

/// Time signature (beats per bar / beat unit)
/// Example: 4/4 time = TimeSignature { beats_per_bar: 4, beat_unit: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub beats_per_bar: u8, // Beats per bar (typically 3, 4, 5, 6, 7)
    pub beat_unit: u8,     // Note value of one beat (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature, rejecting zero fields
    pub fn new(beats_per_bar: u8, beat_unit: u8) -> Result<Self, TimelineError> {
        let time_signature = Self {
            beats_per_bar,
            beat_unit,
        };
        if !time_signature.is_valid() {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "time signature {}/{} must have positive fields",
                beats_per_bar, beat_unit
            )));
        }
        Ok(time_signature)
    }

    /// Common 4/4 time signature
    pub const fn four_four() -> Self {
        Self {
            beats_per_bar: 4,
            beat_unit: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub const fn three_four() -> Self {
        Self {
            beats_per_bar: 3,
            beat_unit: 4,
        }
    }

    /// Common 6/8 time signature
    pub const fn six_eight() -> Self {
        Self {
            beats_per_bar: 6,
            beat_unit: 8,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.beats_per_bar > 0 && self.beat_unit > 0
    }

    /// Number of ticks in one bar
    pub fn ticks_per_bar(&self) -> u64 {
        self.beats_per_bar as u64 * TICKS_PER_BEAT as u64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

/// Tempo in BPM (Beats Per Minute)
///
/// A beat is one unit of the active time signature (a quarter note in 4/4,
/// an eighth note in 6/8).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    /// Creates a new tempo
    /// BPM must be finite and in range [MIN_BPM, MAX_BPM]
    pub fn new(bpm: f64) -> Result<Self, TimelineError> {
        if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "bpm {} outside [{}, {}]",
                bpm, MIN_BPM, MAX_BPM
            )));
        }
        Ok(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn is_valid(&self) -> bool {
        self.bpm.is_finite() && (MIN_BPM..=MAX_BPM).contains(&self.bpm)
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one beat in samples at given sample rate
    pub fn beat_duration_samples(&self, sample_rate: f64) -> f64 {
        self.beat_duration_seconds() * sample_rate
    }

    /// Beats elapsed per sample at given sample rate
    pub fn beats_per_sample(&self, sample_rate: f64) -> f64 {
        self.bpm / (60.0 * sample_rate)
    }

    /// Duration of one bar in samples at given sample rate and time signature
    pub fn bar_duration_samples(&self, sample_rate: f64, time_signature: &TimeSignature) -> f64 {
        self.beat_duration_samples(sample_rate) * time_signature.beats_per_bar as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120.0 }
    }
}

impl TryFrom<f64> for Tempo {
    type Error = TimelineError;

    fn try_from(bpm: f64) -> Result<Self, Self::Error> {
        Self::new(bpm)
    }
}

impl From<Tempo> for f64 {
    fn from(tempo: Tempo) -> Self {
        tempo.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Musical position (bar, beat, tick), all 0-based
///
/// Always a projection of a sample position through a tempo map; it is never
/// stored on its own in the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32, // In [0, beats_per_bar)
    pub tick: u32, // In [0, TICKS_PER_BEAT)
}

impl MusicalPosition {
    pub const fn new(bar: u32, beat: u32, tick: u32) -> Self {
        Self { bar, beat, tick }
    }

    /// Project origin (first bar, first beat)
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }

    /// Ticks from the start of the bar
    pub fn ticks_into_bar(&self) -> u64 {
        self.beat as u64 * TICKS_PER_BEAT as u64 + self.tick as u64
    }

    /// True when the position sits exactly on a bar line
    pub fn is_bar_start(&self) -> bool {
        self.beat == 0 && self.tick == 0
    }

    /// Quantize to nearest subdivision of a beat
    /// Example: subdivision = 4 for sixteenth notes in x/4
    ///
    /// Rounding past the last grid line of the bar carries into the next bar.
    pub fn quantize_to_subdivision(&self, time_signature: &TimeSignature, subdivision: u32) -> Self {
        let subdivision = subdivision.clamp(1, TICKS_PER_BEAT) as u64;
        let grid = TICKS_PER_BEAT as u64 / subdivision;
        let ticks_per_bar = time_signature.ticks_per_bar().max(1);

        let ticks = self.ticks_into_bar();
        let quantized = ((ticks + grid / 2) / grid) * grid;

        let bar = self.bar as u64 + quantized / ticks_per_bar;
        let within_bar = quantized % ticks_per_bar;
        Self::new(
            bar.min(u32::MAX as u64) as u32,
            (within_bar / TICKS_PER_BEAT as u64) as u32,
            (within_bar % TICKS_PER_BEAT as u64) as u32,
        )
    }
}

impl fmt::Display for MusicalPosition {
    /// Musician-facing, 1-based bars and beats
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02}:{:03}",
            self.bar as u64 + 1,
            self.beat as u64 + 1,
            self.tick
        )
    }
}
