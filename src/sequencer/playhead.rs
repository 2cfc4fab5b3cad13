// Playhead - Current position, seek memory and loop wrap

use super::clock::MusicalClock;
use super::timeline::{MusicalPosition, SamplePosition};
use super::TimelineError;
use serde::{Deserialize, Serialize};

/// Half-open loop interval `[start, end)` in samples, `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "LoopRegionState", into = "LoopRegionState")]
pub struct LoopRegion {
    start: SamplePosition,
    end: SamplePosition,
}

impl LoopRegion {
    pub fn new(start: SamplePosition, end: SamplePosition) -> Result<Self, TimelineError> {
        if start >= end {
            return Err(TimelineError::InvalidEventPlacement(format!(
                "loop region start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> SamplePosition {
        self.start
    }

    pub fn end(&self) -> SamplePosition {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, position: SamplePosition) -> bool {
        (self.start..self.end).contains(&position)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct LoopRegionState {
    start: SamplePosition,
    end: SamplePosition,
}

impl TryFrom<LoopRegionState> for LoopRegion {
    type Error = TimelineError;

    fn try_from(state: LoopRegionState) -> Result<Self, Self::Error> {
        LoopRegion::new(state.start, state.end)
    }
}

impl From<LoopRegion> for LoopRegionState {
    fn from(region: LoopRegion) -> Self {
        Self {
            start: region.start,
            end: region.end,
        }
    }
}

/// Where a block crossed the loop end
///
/// The first `frames_before_wrap` frames of the block play up to
/// `loop_end`; the rest continue from `loop_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBack {
    pub frames_before_wrap: usize,
    pub loop_start: SamplePosition,
    pub loop_end: SamplePosition,
}

/// Playhead state owned by the transport
///
/// Loop changes are requested at any time but only latched at the start of
/// the next block, so a block never straddles two loop settings.
#[derive(Debug, Clone, Default)]
pub struct Playhead {
    position: SamplePosition,
    most_recent_seek: SamplePosition,
    loop_enabled: bool,
    loop_region: Option<LoopRegion>,
    requested_loop_enabled: bool,
    requested_loop_region: Option<LoopRegion>,
}

impl Playhead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> SamplePosition {
        self.position
    }

    pub fn most_recent_seek(&self) -> SamplePosition {
        self.most_recent_seek
    }

    /// Move the playhead and remember the position for stop/restart
    pub fn seek(&mut self, position: SamplePosition) {
        self.position = position;
        self.most_recent_seek = position;
    }

    /// Jump back to the most recently seeked position
    pub fn return_to_seek(&mut self) {
        self.position = self.most_recent_seek;
    }

    /// Loop flag in effect for the current block
    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Loop region in effect for the current block
    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    /// Loop flag as it will be from the next block on
    pub fn requested_loop_enabled(&self) -> bool {
        self.requested_loop_enabled
    }

    /// True when the playhead will wrap at the loop end
    pub fn is_looping(&self) -> bool {
        self.loop_enabled && self.loop_region.is_some()
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.requested_loop_enabled = enabled;
    }

    pub fn toggle_loop(&mut self) {
        self.requested_loop_enabled = !self.requested_loop_enabled;
    }

    pub fn set_loop_region(&mut self, region: LoopRegion) {
        self.requested_loop_region = Some(region);
    }

    /// Adopt pending loop requests; called at block boundaries only
    pub fn latch(&mut self) {
        self.loop_enabled = self.requested_loop_enabled;
        self.loop_region = self.requested_loop_region;
    }

    /// Move forward by a block, wrapping at the loop end
    ///
    /// A block that starts before the loop end and reaches it wraps to
    /// `start + overflow % len`. A block starting at or past the end (after
    /// a seek out of the region) plays on.
    pub fn advance(&mut self, frames: usize) -> Option<LoopBack> {
        let start = self.position;
        let end = start.saturating_add(frames as u64);

        let region = self.loop_region.filter(|_| self.loop_enabled);
        match region {
            Some(region) if start < region.end && end >= region.end => {
                let overflow = end - region.end;
                self.position = region.start + overflow % region.len();
                Some(LoopBack {
                    frames_before_wrap: (region.end - start) as usize,
                    loop_start: region.start,
                    loop_end: region.end,
                })
            }
            _ => {
                self.position = end;
                None
            }
        }
    }

    /// Bar/beat/tick reading of the current position
    pub fn current_musical_position(&self, clock: &MusicalClock<'_>) -> MusicalPosition {
        clock.position_to_musical(self.position)
    }
}
