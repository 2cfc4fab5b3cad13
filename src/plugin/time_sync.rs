// Time sync - Per-block time snapshot handed to hosted plugins
//
// The snapshot is built by the transport once per block and only ever lent
// to plugins by shared reference. It is neither Clone nor Copy:
// a plugin can read any field during the callback but cannot keep the
// snapshot itself around.

use crate::sequencer::playhead::{LoopBack, LoopRegion};
use crate::sequencer::tempo_map::TempoMap;
use crate::sequencer::timeline::{
    MusicalPosition, SamplePosition, Tempo, TimeSignature, TICKS_PER_BEAT,
};
use crate::sequencer::transport::TransportState;

/// Transport and musical time at the first frame of a block
#[derive(Debug, PartialEq)]
pub struct TimeSnapshot {
    sample_rate: f64,
    block_start_sample: SamplePosition,
    block_frames: usize,
    block_start_musical: MusicalPosition,
    block_start_beats: f64,
    block_start_seconds: f64,
    tempo: Tempo,
    time_signature: TimeSignature,
    state: TransportState,
    is_looping: bool,
    loop_region: Option<LoopRegion>,
    loop_back: Option<LoopBack>,
    loop_start_beats: f64,
    loop_start_musical: MusicalPosition,
}

impl TimeSnapshot {
    /// Read the map at the block start; O(log n) in the number of map events
    pub(crate) fn capture(
        map: &TempoMap,
        block_start_sample: SamplePosition,
        block_frames: usize,
        state: TransportState,
        is_looping: bool,
        loop_region: Option<LoopRegion>,
        loop_back: Option<LoopBack>,
    ) -> Self {
        let clock = map.clock();
        // Only resolved when the block wraps, so plugins can restart their grid
        let (loop_start_beats, loop_start_musical) = match loop_back {
            Some(loop_back) => (
                clock.position_to_beats(loop_back.loop_start),
                clock.position_to_musical(loop_back.loop_start),
            ),
            None => (0.0, MusicalPosition::origin()),
        };
        Self {
            sample_rate: map.sample_rate(),
            block_start_sample,
            block_frames,
            block_start_musical: clock.position_to_musical(block_start_sample),
            block_start_beats: clock.position_to_beats(block_start_sample),
            block_start_seconds: clock.position_to_seconds(block_start_sample),
            tempo: map.tempo_at(block_start_sample),
            time_signature: map.time_signature_at(block_start_sample),
            state,
            is_looping,
            loop_region,
            loop_back,
            loop_start_beats,
            loop_start_musical,
        }
    }

    /// Snapshot for an idle engine before the first block
    pub(crate) fn initial(map: &TempoMap) -> Self {
        Self::capture(map, 0, 0, TransportState::Stopped, false, None, None)
    }

    /// Repeat this snapshot for another block, keeping every timing field
    pub(crate) fn reissue(&self, block_frames: usize) -> Self {
        Self {
            block_frames,
            loop_back: None,
            ..*self
        }
    }

    /// Sanity check run by the engine before publishing
    pub fn is_consistent(&self) -> bool {
        self.sample_rate.is_finite()
            && self.sample_rate > 0.0
            && self.block_start_beats.is_finite()
            && self.block_start_beats >= 0.0
            && self.block_start_seconds.is_finite()
            && self.tempo.is_valid()
            && self.time_signature.is_valid()
            && self.block_start_musical.beat < self.time_signature.beats_per_bar as u32
            && self.block_start_musical.tick < TICKS_PER_BEAT
            && self.loop_start_beats.is_finite()
            && self
                .loop_back
                .is_none_or(|loop_back| loop_back.frames_before_wrap <= self.block_frames)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn block_start_sample(&self) -> SamplePosition {
        self.block_start_sample
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    pub fn block_start_musical(&self) -> MusicalPosition {
        self.block_start_musical
    }

    /// Fractional beats from the origin (ppq position)
    pub fn block_start_beats(&self) -> f64 {
        self.block_start_beats
    }

    pub fn block_start_seconds(&self) -> f64 {
        self.block_start_seconds
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    /// Set when the block crosses the loop end
    pub fn loop_back(&self) -> Option<LoopBack> {
        self.loop_back
    }

    /// Beat position of the loop start, when the block wraps
    pub fn loop_start_beats(&self) -> Option<f64> {
        self.loop_back.map(|_| self.loop_start_beats)
    }

    /// Musical position of the loop start, when the block wraps
    pub fn loop_start_musical(&self) -> Option<MusicalPosition> {
        self.loop_back.map(|_| self.loop_start_musical)
    }

    /// Samples per beat at the block start tempo
    pub fn samples_per_beat(&self) -> f64 {
        self.tempo.beat_duration_samples(self.sample_rate)
    }

    /// Timeline position of a frame inside the block, following the loop wrap
    pub fn frame_position(&self, frame: usize) -> SamplePosition {
        match self.loop_back {
            Some(loop_back) if frame >= loop_back.frames_before_wrap => {
                let into_loop = (frame - loop_back.frames_before_wrap) as u64;
                let len = loop_back.loop_end - loop_back.loop_start;
                loop_back.loop_start + into_loop % len
            }
            _ if self.state.is_playing() => self.block_start_sample + frame as u64,
            _ => self.block_start_sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_reads_map_at_block_start() {
        let map = TempoMap::new(48000.0).unwrap();
        let snapshot = TimeSnapshot::capture(
            &map,
            96000,
            512,
            TransportState::Playing,
            false,
            None,
            None,
        );

        assert_eq!(snapshot.block_start_musical(), MusicalPosition::new(1, 0, 0));
        assert_eq!(snapshot.block_start_beats(), 4.0);
        assert_eq!(snapshot.block_start_seconds(), 2.0);
        assert_eq!(snapshot.bpm(), 120.0);
        assert_eq!(snapshot.time_signature(), TimeSignature::four_four());
        assert!(snapshot.is_playing());
        assert!(!snapshot.is_recording());
        assert!(snapshot.is_consistent());
    }

    #[test]
    fn test_frame_position_follows_wrap() {
        let map = TempoMap::new(48000.0).unwrap();
        let region = LoopRegion::new(1000, 2000).unwrap();
        let snapshot = TimeSnapshot::capture(
            &map,
            1995,
            10,
            TransportState::Playing,
            true,
            Some(region),
            Some(LoopBack {
                frames_before_wrap: 5,
                loop_start: 1000,
                loop_end: 2000,
            }),
        );

        let loop_start_beats = snapshot.loop_start_beats().unwrap();
        assert!((loop_start_beats - 1000.0 / 24000.0).abs() < 1e-12);
        assert_eq!(snapshot.frame_position(0), 1995);
        assert_eq!(snapshot.frame_position(4), 1999);
        assert_eq!(snapshot.frame_position(5), 1000);
        assert_eq!(snapshot.frame_position(9), 1004);
    }

    #[test]
    fn test_frozen_transport_frame_position() {
        let map = TempoMap::new(48000.0).unwrap();
        let snapshot =
            TimeSnapshot::capture(&map, 4800, 64, TransportState::Paused, false, None, None);
        assert_eq!(snapshot.frame_position(63), 4800);
    }

    #[test]
    fn test_non_finite_snapshot_is_inconsistent() {
        let map = TempoMap::new(48000.0).unwrap();
        let mut snapshot = TimeSnapshot::initial(&map);
        assert!(snapshot.is_consistent());

        snapshot.block_start_beats = f64::NAN;
        assert!(!snapshot.is_consistent());
    }

    #[test]
    fn test_reissue_keeps_timing() {
        let map = TempoMap::new(44100.0).unwrap();
        let snapshot =
            TimeSnapshot::capture(&map, 44100, 128, TransportState::Recording, false, None, None);
        let again = snapshot.reissue(256);

        assert_eq!(again.block_start_sample(), 44100);
        assert_eq!(again.block_frames(), 256);
        assert!(again.is_recording());
    }
}
