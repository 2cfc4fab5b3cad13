// Groove - Swing and accent offsets for quantized notes
//
// Groove only ever touches quantizable musical events. The transport's own
// sample clock never passes through here.

use super::clock::MusicalClock;
use super::timeline::{MusicalPosition, SamplePosition, TICKS_PER_BEAT};
use super::TimelineError;
use serde::{Deserialize, Serialize};

/// Tick at which the off-beat eighth sits when there is no swing
const STRAIGHT_SPLIT: f64 = TICKS_PER_BEAT as f64 / 2.0;

/// Extra delay of the off-beat eighth at full swing (dotted-eighth feel)
const MAX_SWING_DELAY: f64 = TICKS_PER_BEAT as f64 / 4.0;

/// Velocity scale for one beat of the bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accent {
    pub beat_index: u32,
    pub velocity_scale: f32,
}

impl Accent {
    pub fn new(beat_index: u32, velocity_scale: f32) -> Result<Self, TimelineError> {
        let accent = Self {
            beat_index,
            velocity_scale,
        };
        if !accent.is_valid() {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "accent scale {} on beat {} must be finite and non-negative",
                velocity_scale, beat_index
            )));
        }
        Ok(accent)
    }

    fn is_valid(&self) -> bool {
        self.velocity_scale.is_finite() && self.velocity_scale >= 0.0
    }
}

/// Swing amount and accent pattern
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "GrooveState", into = "GrooveState")]
pub struct GrooveSettings {
    swing_amount: f64,
    accent_pattern: Vec<Accent>,
}

impl GrooveSettings {
    /// Swing must lie in [0, 1]; accents are kept in the given order
    pub fn new(swing_amount: f64, accent_pattern: Vec<Accent>) -> Result<Self, TimelineError> {
        if !swing_amount.is_finite() || !(0.0..=1.0).contains(&swing_amount) {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "swing amount {} outside [0, 1]",
                swing_amount
            )));
        }
        if let Some(bad) = accent_pattern.iter().find(|accent| !accent.is_valid()) {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "accent scale {} on beat {} must be finite and non-negative",
                bad.velocity_scale, bad.beat_index
            )));
        }
        Ok(Self {
            swing_amount,
            accent_pattern,
        })
    }

    /// No swing, no accents
    pub fn straight() -> Self {
        Self::default()
    }

    pub fn swing_amount(&self) -> f64 {
        self.swing_amount
    }

    pub fn accent_pattern(&self) -> &[Accent] {
        &self.accent_pattern
    }

    /// Velocity multiplier for a beat of the bar (1.0 when unaccented)
    pub fn velocity_scale(&self, beat: u32) -> f32 {
        self.accent_pattern
            .iter()
            .find(|accent| accent.beat_index == beat)
            .map_or(1.0, |accent| accent.velocity_scale)
    }

    pub fn is_straight(&self) -> bool {
        self.swing_amount == 0.0 && self.accent_pattern.is_empty()
    }
}

/// Shift a position's tick by the swing warp
///
/// The warp is piecewise linear inside the beat: the first half is stretched
/// and the second half compressed, so beat starts stay put and the result
/// never crosses into the next beat.
pub fn apply_groove(position: MusicalPosition, settings: &GrooveSettings) -> MusicalPosition {
    if settings.swing_amount == 0.0 {
        return position;
    }

    let tick = position.tick.min(TICKS_PER_BEAT - 1) as f64;
    let split = STRAIGHT_SPLIT + settings.swing_amount * MAX_SWING_DELAY;
    let warped = if tick < STRAIGHT_SPLIT {
        tick * split / STRAIGHT_SPLIT
    } else {
        split
            + (tick - STRAIGHT_SPLIT) * (TICKS_PER_BEAT as f64 - split)
                / (TICKS_PER_BEAT as f64 - STRAIGHT_SPLIT)
    };

    MusicalPosition {
        tick: (warped.round() as u32).min(TICKS_PER_BEAT - 1),
        ..position
    }
}

/// A recorded note snapped to the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedNote {
    pub position: MusicalPosition,
    pub sample: SamplePosition,
    pub velocity: u8,
}

/// Snap a recorded sample position to a subdivision grid
///
/// Groove (swing and accents) is applied only when `quantizable` is set.
pub fn quantize_note(
    clock: &MusicalClock<'_>,
    groove: &GrooveSettings,
    sample: SamplePosition,
    velocity: u8,
    subdivision: u32,
    quantizable: bool,
) -> QuantizedNote {
    let time_signature = clock.map().time_signature_at(sample);
    let mut position = clock
        .position_to_musical(sample)
        .quantize_to_subdivision(&time_signature, subdivision);
    let mut velocity = velocity.min(127);

    if quantizable {
        position = apply_groove(position, groove);
        let scaled = velocity as f32 * groove.velocity_scale(position.beat);
        velocity = scaled.round().clamp(1.0, 127.0) as u8;
    }

    QuantizedNote {
        position,
        sample: clock.musical_to_position(position),
        velocity,
    }
}

/// On-disk shape of groove settings
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GrooveState {
    swing_amount: f64,
    #[serde(default)]
    accent_pattern: Vec<Accent>,
}

impl TryFrom<GrooveState> for GrooveSettings {
    type Error = TimelineError;

    fn try_from(state: GrooveState) -> Result<Self, Self::Error> {
        GrooveSettings::new(state.swing_amount, state.accent_pattern)
    }
}

impl From<GrooveSettings> for GrooveState {
    fn from(settings: GrooveSettings) -> Self {
        Self {
            swing_amount: settings.swing_amount,
            accent_pattern: settings.accent_pattern,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::tempo_map::TempoMap;

    fn swung(amount: f64) -> GrooveSettings {
        GrooveSettings::new(amount, Vec::new()).unwrap()
    }

    #[test]
    fn test_swing_range_validated() {
        assert!(GrooveSettings::new(-0.1, Vec::new()).is_err());
        assert!(GrooveSettings::new(1.5, Vec::new()).is_err());
        assert!(GrooveSettings::new(f64::NAN, Vec::new()).is_err());
        assert!(GrooveSettings::new(1.0, Vec::new()).is_ok());
        assert!(GrooveSettings::new(0.5, vec![Accent { beat_index: 0, velocity_scale: -1.0 }]).is_err());
    }

    #[test]
    fn test_straight_groove_is_identity() {
        let pos = MusicalPosition::new(3, 1, 240);
        assert_eq!(apply_groove(pos, &GrooveSettings::straight()), pos);
    }

    #[test]
    fn test_swing_delays_off_beat_eighth() {
        let groove = swung(1.0);

        // Beat starts never move
        let on_beat = MusicalPosition::new(0, 2, 0);
        assert_eq!(apply_groove(on_beat, &groove), on_beat);

        // The off-beat eighth moves from 240 to 360 at full swing
        let off_beat = MusicalPosition::new(0, 2, 240);
        assert_eq!(apply_groove(off_beat, &groove), MusicalPosition::new(0, 2, 360));

        let half = swung(0.5);
        assert_eq!(apply_groove(off_beat, &half).tick, 300);
    }

    #[test]
    fn test_swing_never_crosses_beat() {
        let groove = swung(1.0);
        let mut previous = 0;
        for tick in 0..TICKS_PER_BEAT {
            let pos = apply_groove(MusicalPosition::new(5, 3, tick), &groove);
            assert_eq!(pos.bar, 5);
            assert_eq!(pos.beat, 3);
            assert!(pos.tick < TICKS_PER_BEAT);
            assert!(pos.tick >= previous, "warp must be monotonic");
            previous = pos.tick;
        }
    }

    #[test]
    fn test_accent_lookup() {
        let groove = GrooveSettings::new(
            0.0,
            vec![Accent::new(0, 1.2).unwrap(), Accent::new(2, 0.8).unwrap()],
        )
        .unwrap();

        assert_eq!(groove.velocity_scale(0), 1.2);
        assert_eq!(groove.velocity_scale(1), 1.0);
        assert_eq!(groove.velocity_scale(2), 0.8);
    }

    #[test]
    fn test_quantize_note_applies_groove_only_when_quantizable() {
        let map = TempoMap::new(48000.0).unwrap();
        let clock = map.clock();
        let groove = GrooveSettings::new(1.0, vec![Accent::new(0, 0.5).unwrap()]).unwrap();

        // 12100 samples at 120 BPM = tick 242, which snaps to the off-beat eighth
        let plain = quantize_note(&clock, &groove, 12100, 100, 2, false);
        assert_eq!(plain.position, MusicalPosition::new(0, 0, 240));
        assert_eq!(plain.sample, 12000);
        assert_eq!(plain.velocity, 100);

        let grooved = quantize_note(&clock, &groove, 12100, 100, 2, true);
        assert_eq!(grooved.position, MusicalPosition::new(0, 0, 360));
        assert_eq!(grooved.sample, 18000);
        assert_eq!(grooved.velocity, 50);
    }

    #[test]
    fn test_groove_serde_validates() {
        let groove = GrooveSettings::new(0.25, vec![Accent::new(1, 1.1).unwrap()]).unwrap();
        let text = ron::to_string(&groove).unwrap();
        let restored: GrooveSettings = ron::from_str(&text).unwrap();
        assert_eq!(restored, groove);

        assert!(ron::from_str::<GrooveSettings>("(swing_amount: 2.0)").is_err());
    }
}
