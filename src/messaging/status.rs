// Transport status - Read-only snapshot published to the control thread
//
// The audio thread overwrites a single slot of atomics guarded by a sequence
// counter; the control thread always reads the newest complete snapshot, no
// matter how long it went without polling.

use crate::sequencer::playhead::LoopRegion;
use crate::sequencer::timeline::{MusicalPosition, SamplePosition, Tempo, TimeSignature};
use crate::sequencer::transport::{Transport, TransportState};
use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// What the UI needs to draw the transport bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportStatusSnapshot {
    pub state: TransportState,
    pub musical_position: MusicalPosition,
    pub sample_position: SamplePosition,
    pub tempo: Tempo,
    pub time_signature: TimeSignature,
    pub loop_enabled: bool,
    pub loop_region: Option<LoopRegion>,
    /// Index of the block after which this status was taken
    pub block_index: u64,
}

impl TransportStatusSnapshot {
    /// Read the transport after a block has been processed
    pub fn capture(transport: &Transport, block_index: u64) -> Self {
        let position = transport.position();
        let timeline = transport.timeline();
        Self {
            state: transport.state(),
            musical_position: transport.current_musical_position(),
            sample_position: position,
            tempo: timeline.tempo_at(position),
            time_signature: timeline.time_signature_at(position),
            loop_enabled: transport.playhead().loop_enabled(),
            loop_region: transport.playhead().loop_region(),
            block_index,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.tempo.bpm()
    }
}

impl Default for TransportStatusSnapshot {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            musical_position: MusicalPosition::origin(),
            sample_position: 0,
            tempo: Tempo::default(),
            time_signature: TimeSignature::default(),
            loop_enabled: false,
            loop_region: None,
            block_index: 0,
        }
    }
}

/// Latest-wins status slot shared by both ends of the bridge
///
/// Odd sequence numbers mark a write in progress. Readers retry when the
/// sequence moved under them.
#[derive(Debug, Default)]
pub struct StatusCell {
    sequence: AtomicU64,
    state: AtomicU8,
    bar: AtomicU32,
    beat: AtomicU32,
    tick: AtomicU32,
    sample_position: AtomicU64,
    bpm_bits: AtomicU64,
    beats_per_bar: AtomicU8,
    beat_unit: AtomicU8,
    loop_enabled: AtomicBool,
    has_loop_region: AtomicBool,
    loop_start: AtomicU64,
    loop_end: AtomicU64,
    block_index: AtomicU64,
}

const READ_ATTEMPTS: usize = 64;

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot; single writer only (the audio thread)
    pub fn store(&self, status: &TransportStatusSnapshot) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.state.store(state_to_u8(status.state), Ordering::Relaxed);
        self.bar.store(status.musical_position.bar, Ordering::Relaxed);
        self.beat.store(status.musical_position.beat, Ordering::Relaxed);
        self.tick.store(status.musical_position.tick, Ordering::Relaxed);
        self.sample_position
            .store(status.sample_position, Ordering::Relaxed);
        self.bpm_bits
            .store(status.tempo.bpm().to_bits(), Ordering::Relaxed);
        self.beats_per_bar
            .store(status.time_signature.beats_per_bar, Ordering::Relaxed);
        self.beat_unit
            .store(status.time_signature.beat_unit, Ordering::Relaxed);
        self.loop_enabled
            .store(status.loop_enabled, Ordering::Relaxed);
        self.has_loop_region
            .store(status.loop_region.is_some(), Ordering::Relaxed);
        if let Some(region) = status.loop_region {
            self.loop_start.store(region.start(), Ordering::Relaxed);
            self.loop_end.store(region.end(), Ordering::Relaxed);
        }
        self.block_index
            .store(status.block_index, Ordering::Relaxed);

        self.sequence
            .store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Number of completed stores so far
    pub fn version(&self) -> u64 {
        self.sequence.load(Ordering::Acquire) / 2
    }

    /// Newest complete snapshot, or `None` before the first store
    ///
    /// Gives up after a bounded number of torn reads; the writer stores at
    /// most once per audio block, so that only happens under heavy
    /// preemption.
    pub fn load(&self) -> Option<TransportStatusSnapshot> {
        for _ in 0..READ_ATTEMPTS {
            let before = self.sequence.load(Ordering::Acquire);
            if before == 0 {
                return None;
            }
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let state = self.state.load(Ordering::Relaxed);
            let musical_position = MusicalPosition::new(
                self.bar.load(Ordering::Relaxed),
                self.beat.load(Ordering::Relaxed),
                self.tick.load(Ordering::Relaxed),
            );
            let sample_position = self.sample_position.load(Ordering::Relaxed);
            let bpm = f64::from_bits(self.bpm_bits.load(Ordering::Relaxed));
            let beats_per_bar = self.beats_per_bar.load(Ordering::Relaxed);
            let beat_unit = self.beat_unit.load(Ordering::Relaxed);
            let loop_enabled = self.loop_enabled.load(Ordering::Relaxed);
            let has_loop_region = self.has_loop_region.load(Ordering::Relaxed);
            let loop_start = self.loop_start.load(Ordering::Relaxed);
            let loop_end = self.loop_end.load(Ordering::Relaxed);
            let block_index = self.block_index.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) != before {
                std::hint::spin_loop();
                continue;
            }

            // A consistent read always holds values that were valid when stored
            let loop_region = if has_loop_region {
                Some(LoopRegion::new(loop_start, loop_end).ok()?)
            } else {
                None
            };
            return Some(TransportStatusSnapshot {
                state: state_from_u8(state)?,
                musical_position,
                sample_position,
                tempo: Tempo::new(bpm).ok()?,
                time_signature: TimeSignature::new(beats_per_bar, beat_unit).ok()?,
                loop_enabled,
                loop_region,
                block_index,
            });
        }
        None
    }
}

fn state_to_u8(state: TransportState) -> u8 {
    match state {
        TransportState::Stopped => 0,
        TransportState::Playing => 1,
        TransportState::Paused => 2,
        TransportState::Recording => 3,
    }
}

fn state_from_u8(value: u8) -> Option<TransportState> {
    match value {
        0 => Some(TransportState::Stopped),
        1 => Some(TransportState::Playing),
        2 => Some(TransportState::Paused),
        3 => Some(TransportState::Recording),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::tempo_map::TempoMap;

    #[test]
    fn test_capture() {
        let mut transport = Transport::new(Box::new(TempoMap::new(48000.0).unwrap()));
        transport.seek(96000);
        transport.play();

        let status = TransportStatusSnapshot::capture(&transport, 7);
        assert_eq!(status.state, TransportState::Playing);
        assert_eq!(status.sample_position, 96000);
        assert_eq!(status.musical_position, MusicalPosition::new(1, 0, 0));
        assert_eq!(status.bpm(), 120.0);
        assert_eq!(status.block_index, 7);
        assert!(!status.loop_enabled);
    }

    #[test]
    fn test_status_cell_round_trip() {
        let cell = StatusCell::new();
        assert!(cell.load().is_none());
        assert_eq!(cell.version(), 0);

        let status = TransportStatusSnapshot {
            state: TransportState::Recording,
            musical_position: MusicalPosition::new(3, 2, 240),
            sample_position: 123_456,
            tempo: Tempo::new(97.5).unwrap(),
            time_signature: TimeSignature::new(7, 8).unwrap(),
            loop_enabled: true,
            loop_region: Some(LoopRegion::new(1000, 2000).unwrap()),
            block_index: 42,
        };
        cell.store(&status);
        assert_eq!(cell.load(), Some(status));
        assert_eq!(cell.version(), 1);

        let cleared = TransportStatusSnapshot {
            loop_region: None,
            block_index: 43,
            ..status
        };
        cell.store(&cleared);
        assert_eq!(cell.load(), Some(cleared));
        assert_eq!(cell.version(), 2);
    }

    #[test]
    fn test_status_cell_reader_sees_whole_snapshots() {
        use std::sync::Arc;

        let cell = Arc::new(StatusCell::new());
        let writer = {
            let cell = cell.clone();
            std::thread::spawn(move || {
                let mut status = TransportStatusSnapshot::default();
                for block_index in 1..=20_000u64 {
                    status.block_index = block_index;
                    status.sample_position = block_index * 64;
                    cell.store(&status);
                }
            })
        };

        let mut last_block = 0;
        while !writer.is_finished() {
            if let Some(status) = cell.load() {
                assert_eq!(status.sample_position, status.block_index * 64);
                assert!(status.block_index >= last_block);
                last_block = status.block_index;
            }
        }
        writer.join().unwrap();
        assert_eq!(cell.load().map(|s| s.block_index), Some(20_000));
    }
}
