// Command types - Control → Audio communication

use crate::sequencer::groove::GrooveSettings;
use crate::sequencer::playhead::LoopRegion;
use crate::sequencer::tempo_map::TempoMap;
use crate::sequencer::timeline::SamplePosition;

/// Commands issued by the control surface
///
/// These are validated by the controller and turned into `EngineCommand`s
/// before they cross the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    RecordToggle,
    Seek(SamplePosition),
    SetTempo {
        bpm: f64,
        at_sample: SamplePosition,
    },
    SetTimeSignature {
        beats_per_bar: u8,
        beat_unit: u8,
        at_sample: SamplePosition,
    },
    RemoveTempo(SamplePosition),
    RemoveTimeSignature(SamplePosition),
    LoopToggle,
    SetLoopRegion {
        start: SamplePosition,
        end: SamplePosition,
    },
    SetGroove(GrooveSettings),
}

/// Validated command as carried by the bridge queue
///
/// Tempo and groove edits travel as whole replacement values, built on the
/// control thread, so the audio thread only swaps pointers.
#[derive(Debug)]
pub enum EngineCommand {
    Play,
    Pause,
    Stop,
    RecordToggle,
    Seek(SamplePosition),
    LoopToggle,
    SetLoopRegion(LoopRegion),
    ReplaceTimeline(Box<TempoMap>),
    ReplaceGroove(Box<GrooveSettings>),
}

/// Commands sharing a key supersede one another while still queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
    Seek,
    LoopRegion,
    Timeline,
    Groove,
}

impl EngineCommand {
    /// Kinds whose latest queued value fully determines the outcome
    ///
    /// Toggles and state transitions are never coalesced: two queued toggles
    /// cancel out, they do not collapse into one.
    pub fn coalesce_key(&self) -> Option<CoalesceKey> {
        match self {
            EngineCommand::Seek(_) => Some(CoalesceKey::Seek),
            EngineCommand::SetLoopRegion(_) => Some(CoalesceKey::LoopRegion),
            EngineCommand::ReplaceTimeline(_) => Some(CoalesceKey::Timeline),
            EngineCommand::ReplaceGroove(_) => Some(CoalesceKey::Groove),
            EngineCommand::Play
            | EngineCommand::Pause
            | EngineCommand::Stop
            | EngineCommand::RecordToggle
            | EngineCommand::LoopToggle => None,
        }
    }

    /// Hand any owned allocation back for release off the audio thread
    pub fn into_retired(self) -> Option<Retired> {
        match self {
            EngineCommand::ReplaceTimeline(map) => Some(Retired::Timeline(map)),
            EngineCommand::ReplaceGroove(groove) => Some(Retired::Groove(groove)),
            _ => None,
        }
    }
}

/// Heap values the audio thread is done with
///
/// They are sent back over the bridge and dropped by the control thread so
/// the audio thread never frees memory.
#[derive(Debug)]
pub enum Retired {
    Timeline(Box<TempoMap>),
    Groove(Box<GrooveSettings>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_keys() {
        assert_eq!(EngineCommand::Seek(10).coalesce_key(), Some(CoalesceKey::Seek));
        assert_eq!(EngineCommand::LoopToggle.coalesce_key(), None);
        assert_eq!(EngineCommand::Play.coalesce_key(), None);

        let map = Box::new(TempoMap::new(48000.0).unwrap());
        assert_eq!(
            EngineCommand::ReplaceTimeline(map).coalesce_key(),
            Some(CoalesceKey::Timeline)
        );
    }

    #[test]
    fn test_into_retired() {
        let groove = Box::new(GrooveSettings::straight());
        assert!(matches!(
            EngineCommand::ReplaceGroove(groove).into_retired(),
            Some(Retired::Groove(_))
        ));
        assert!(EngineCommand::Stop.into_retired().is_none());
    }
}
