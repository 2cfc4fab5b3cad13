// Transport - Playback state machine and per-block clock advance
//
// Owned by the audio thread. The control thread never touches it directly;
// it sends commands through the bridge and reads status snapshots back.

use super::clock::MusicalClock;
use super::playhead::{LoopRegion, Playhead};
use super::tempo_map::TempoMap;
use super::timeline::{MusicalPosition, SamplePosition};
use crate::plugin::time_sync::TimeSnapshot;

/// Transport state (play/stop/record)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Recording,
}

impl TransportState {
    /// Check if transport is in a playing state (Playing or Recording)
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing | TransportState::Recording)
    }

    /// Check if transport is recording
    pub fn is_recording(&self) -> bool {
        matches!(self, TransportState::Recording)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransportState::Stopped => "stopped",
            TransportState::Playing => "playing",
            TransportState::Paused => "paused",
            TransportState::Recording => "recording",
        }
    }
}

/// Transport state machine
///
/// Redundant or invalid transitions are no-ops: commands arrive
/// asynchronously and duplicates are expected.
#[derive(Debug)]
pub struct Transport {
    state: TransportState,
    playhead: Playhead,
    timeline: Box<TempoMap>,
    max_position: Option<SamplePosition>,
}

impl Transport {
    /// Create a stopped transport at sample 0
    pub fn new(timeline: Box<TempoMap>) -> Self {
        Self {
            state: TransportState::Stopped,
            playhead: Playhead::new(),
            timeline,
            max_position: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn playhead(&self) -> &Playhead {
        &self.playhead
    }

    pub fn timeline(&self) -> &TempoMap {
        &self.timeline
    }

    pub fn clock(&self) -> MusicalClock<'_> {
        self.timeline.clock()
    }

    pub fn sample_rate(&self) -> f64 {
        self.timeline.sample_rate()
    }

    pub fn position(&self) -> SamplePosition {
        self.playhead.position()
    }

    pub fn most_recent_seek(&self) -> SamplePosition {
        self.playhead.most_recent_seek()
    }

    /// Last valid seek target (project end), if bounded
    pub fn max_position(&self) -> Option<SamplePosition> {
        self.max_position
    }

    pub fn set_max_position(&mut self, max_position: Option<SamplePosition>) {
        self.max_position = max_position;
    }

    /// Stopped starts from the most recent seek; Paused resumes in place
    pub fn play(&mut self) {
        match self.state {
            TransportState::Stopped => {
                self.playhead.return_to_seek();
                self.state = TransportState::Playing;
            }
            TransportState::Paused => self.state = TransportState::Playing,
            TransportState::Playing | TransportState::Recording => {}
        }
    }

    /// Freeze the position
    pub fn pause(&mut self) {
        if self.state.is_playing() {
            self.state = TransportState::Paused;
        }
    }

    /// Stop and return to the most recently seeked position
    pub fn stop(&mut self) {
        if self.state != TransportState::Stopped {
            self.state = TransportState::Stopped;
            self.playhead.return_to_seek();
        }
    }

    /// Start recording from Stopped or Paused
    ///
    /// Stopped starts from the most recent seek like `play`. Recording
    /// while already Playing is left alone (no punch-in).
    pub fn record(&mut self) {
        match self.state {
            TransportState::Stopped => {
                self.playhead.return_to_seek();
                self.state = TransportState::Recording;
            }
            TransportState::Paused => self.state = TransportState::Recording,
            TransportState::Playing | TransportState::Recording => {}
        }
    }

    /// Recording drops back to Playing; any other state behaves like `record`
    pub fn record_toggle(&mut self) {
        if self.state == TransportState::Recording {
            self.state = TransportState::Playing;
        } else {
            self.record();
        }
    }

    /// Move the playhead without changing state
    ///
    /// A seek beyond the project end is clamped to it; the clamped position is
    /// returned so the caller can report it.
    pub fn seek(&mut self, position: SamplePosition) -> Option<SamplePosition> {
        match self.max_position {
            Some(max) if position > max => {
                self.playhead.seek(max);
                Some(max)
            }
            _ => {
                self.playhead.seek(position);
                None
            }
        }
    }

    /// Takes effect at the next block boundary
    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.playhead.set_loop_enabled(enabled);
    }

    /// Takes effect at the next block boundary
    pub fn toggle_loop(&mut self) {
        self.playhead.toggle_loop();
    }

    /// Takes effect at the next block boundary
    pub fn set_loop_region(&mut self, region: LoopRegion) {
        self.playhead.set_loop_region(region);
    }

    /// Swap in a new tempo map between blocks, handing back the old one
    pub fn replace_timeline(&mut self, timeline: Box<TempoMap>) -> Box<TempoMap> {
        std::mem::replace(&mut self.timeline, timeline)
    }

    pub fn current_musical_position(&self) -> MusicalPosition {
        self.playhead.current_musical_position(&self.timeline.clock())
    }

    /// Advance by one block
    ///
    /// The returned snapshot describes the first frame of the block; the
    /// playhead then moves past it. Stopped and Paused leave the position
    /// frozen. Never allocates.
    pub fn advance(&mut self, frames: usize) -> TimeSnapshot {
        self.playhead.latch();

        let block_start = self.playhead.position();
        let loop_back = if self.state.is_playing() {
            self.playhead.advance(frames)
        } else {
            None
        };

        TimeSnapshot::capture(
            &self.timeline,
            block_start,
            frames,
            self.state,
            self.playhead.is_looping(),
            self.playhead.loop_region(),
            loop_back,
        )
    }
}
