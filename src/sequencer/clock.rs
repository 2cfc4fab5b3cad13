// Musical clock - Sample <-> musical time conversions over a tempo map
//
// Every query starts from the absolute sample position and the segment starts
// cached in the map, so repeated queries never accumulate drift.

use super::tempo_map::TempoMap;
use super::timeline::{MusicalPosition, SamplePosition, TICKS_PER_BEAT};

/// Tolerance applied before flooring fractional ticks
const TICK_EPSILON: f64 = 1e-6;

/// Read-only view converting between sample, musical and wall-clock time
#[derive(Debug, Clone, Copy)]
pub struct MusicalClock<'a> {
    map: &'a TempoMap,
}

impl<'a> MusicalClock<'a> {
    pub fn new(map: &'a TempoMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &'a TempoMap {
        self.map
    }

    /// Fractional beats elapsed from the origin (the plugin "ppq position")
    pub fn position_to_beats(&self, position: SamplePosition) -> f64 {
        let segment = self.map.tempo_segment_at(position);
        let elapsed = (position - segment.event.at_sample) as f64;
        segment.start_beats + elapsed * segment.event.tempo.beats_per_sample(self.map.sample_rate())
    }

    /// Sample position of a fractional beat count, rounded to the nearest sample
    pub fn beats_to_position(&self, beats: f64) -> SamplePosition {
        if beats.is_nan() || beats <= 0.0 {
            return 0;
        }
        let segment = self.map.tempo_segment_at_beats(beats);
        let beats_per_sample = segment
            .event
            .tempo
            .beats_per_sample(self.map.sample_rate());
        let offset = ((beats - segment.start_beats) / beats_per_sample).round();
        segment.event.at_sample.saturating_add(offset.max(0.0) as u64)
    }

    /// Greatest tick whose start sample is at or before `position`
    pub fn position_to_ticks(&self, position: SamplePosition) -> u64 {
        let beats = self.position_to_beats(position);
        let mut ticks = (beats * TICKS_PER_BEAT as f64 + TICK_EPSILON).floor().max(0.0) as u64;

        // Absorb floating point error so that tick-aligned positions round trip
        if self.ticks_to_position(ticks + 1) <= position {
            ticks += 1;
        } else if ticks > 0 && self.ticks_to_position(ticks) > position {
            ticks -= 1;
        }
        ticks
    }

    /// Start sample of a tick counted from the origin
    pub fn ticks_to_position(&self, ticks: u64) -> SamplePosition {
        self.beats_to_position(ticks as f64 / TICKS_PER_BEAT as f64)
    }

    /// Project a sample position onto bars, beats and ticks
    pub fn position_to_musical(&self, position: SamplePosition) -> MusicalPosition {
        let ticks = self.position_to_ticks(position);
        let segment = self.map.meter_segment_at_ticks(ticks);
        let ticks_per_bar = segment.event.time_signature.ticks_per_bar().max(1);

        let into_segment = ticks.saturating_sub(segment.start_ticks);
        let bar = segment.start_bar + into_segment / ticks_per_bar;
        let within_bar = into_segment % ticks_per_bar;

        MusicalPosition::new(
            bar.min(u32::MAX as u64) as u32,
            (within_bar / TICKS_PER_BEAT as u64) as u32,
            (within_bar % TICKS_PER_BEAT as u64) as u32,
        )
    }

    /// Sample position at which a musical position starts
    ///
    /// Beats or ticks past the end of their bar carry forward.
    pub fn musical_to_position(&self, musical: MusicalPosition) -> SamplePosition {
        let bar = musical.bar as u64;
        let segment = self.map.meter_segment_for_bar(bar);
        let ticks_per_bar = segment.event.time_signature.ticks_per_bar();

        let ticks = segment.start_ticks
            + (bar - segment.start_bar) * ticks_per_bar
            + musical.ticks_into_bar();
        self.ticks_to_position(ticks)
    }

    /// Wall-clock seconds from the origin
    pub fn position_to_seconds(&self, position: SamplePosition) -> f64 {
        position as f64 / self.map.sample_rate()
    }

    /// Sample position at wall-clock seconds from the origin
    pub fn seconds_to_position(&self, seconds: f64) -> SamplePosition {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        (seconds * self.map.sample_rate()).round() as SamplePosition
    }

    /// Sample position of the first beat of a bar
    pub fn bar_start(&self, bar: u32) -> SamplePosition {
        self.musical_to_position(MusicalPosition::new(bar, 0, 0))
    }

    /// `position` itself if it is a bar line, otherwise the next bar line
    pub fn next_bar_boundary(&self, position: SamplePosition) -> SamplePosition {
        let bar = self.position_to_musical(position).bar;
        let start = self.bar_start(bar);
        if start == position {
            position
        } else {
            self.bar_start(bar.saturating_add(1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::tempo_map::TempoEvent;
    use crate::sequencer::timeline::TimeSignature;

    const SAMPLE_RATE: f64 = 48000.0;

    fn constant_map() -> TempoMap {
        TempoMap::new(SAMPLE_RATE).unwrap()
    }

    #[test]
    fn test_one_bar_takes_two_seconds_at_120() {
        let map = constant_map();
        let clock = map.clock();

        let pos = clock.position_to_musical((SAMPLE_RATE * 2.0) as u64);
        assert_eq!(pos, MusicalPosition::new(1, 0, 0));
        assert_eq!(clock.bar_start(1), 96000);
    }

    #[test]
    fn test_constant_tempo_conversions() {
        let map = constant_map();
        let clock = map.clock();

        // At 120 BPM, one beat = 0.5s = 24000 samples, one tick = 50 samples
        assert_eq!(clock.position_to_musical(24000), MusicalPosition::new(0, 1, 0));
        assert_eq!(clock.position_to_musical(24049), MusicalPosition::new(0, 1, 0));
        assert_eq!(clock.position_to_musical(24050), MusicalPosition::new(0, 1, 1));
        assert_eq!(clock.musical_to_position(MusicalPosition::new(0, 2, 0)), 48000);
        assert_eq!(clock.position_to_beats(36000), 1.5);
    }

    #[test]
    fn test_tempo_change_is_integrated_per_segment() {
        let mut map = constant_map();
        // 60 BPM from bar 1: one beat = 48000 samples
        map.insert_tempo(TempoEvent::new(96000, 60.0).unwrap());
        let clock = map.clock();

        assert_eq!(clock.position_to_musical(144000), MusicalPosition::new(1, 1, 0));
        assert_eq!(clock.musical_to_position(MusicalPosition::new(1, 2, 0)), 192000);
        assert_eq!(clock.position_to_beats(144000), 5.0);
    }

    #[test]
    fn test_extrapolates_past_last_event() {
        let mut map = constant_map();
        map.insert_tempo(TempoEvent::new(96000, 240.0).unwrap());
        let clock = map.clock();

        // 240 BPM, 4/4: one bar = 48000 samples; bar 100 starts far past the event
        let bar_100 = 96000 + 99 * 48000;
        assert_eq!(clock.bar_start(100), bar_100);
        assert_eq!(clock.position_to_musical(bar_100), MusicalPosition::new(100, 0, 0));
    }

    #[test]
    fn test_time_signature_change_moves_bar_lines() {
        let mut map = constant_map();
        map.insert_time_signature(96000, TimeSignature::three_four()).unwrap();
        let clock = map.clock();

        // Bar 1 is a 3/4 bar of 72000 samples
        assert_eq!(clock.bar_start(2), 168000);
        assert_eq!(clock.position_to_musical(168000), MusicalPosition::new(2, 0, 0));
        assert_eq!(clock.position_to_musical(167999), MusicalPosition::new(1, 2, 479));
    }

    #[test]
    fn test_next_bar_boundary() {
        let map = constant_map();
        let clock = map.clock();

        assert_eq!(clock.next_bar_boundary(0), 0);
        assert_eq!(clock.next_bar_boundary(1), 96000);
        assert_eq!(clock.next_bar_boundary(96000), 96000);
        assert_eq!(clock.next_bar_boundary(96001), 192000);
    }

    #[test]
    fn test_seconds() {
        let map = constant_map();
        let clock = map.clock();

        assert_eq!(clock.position_to_seconds(48000), 1.0);
        assert_eq!(clock.seconds_to_position(2.5), 120000);
        assert_eq!(clock.seconds_to_position(-1.0), 0);
    }

    #[test]
    fn test_tick_aligned_round_trip_with_odd_tempo() {
        let mut map = constant_map();
        map.insert_tempo(TempoEvent::new(12345, 97.3).unwrap());
        map.insert_tempo(TempoEvent::new(400000, 171.9).unwrap());
        let clock = map.clock();

        for ticks in (0..20_000u64).step_by(7) {
            let position = clock.ticks_to_position(ticks);
            let musical = clock.position_to_musical(position);
            assert_eq!(clock.musical_to_position(musical), position, "tick {}", ticks);
        }
    }
}
