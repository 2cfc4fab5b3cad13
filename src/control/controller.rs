// TransportController - Control-thread handle on the transport
//
// Validates commands, builds replacement tempo maps and groove settings,
// and pushes them over the bridge. Keeps a mirror of what it has sent so
// edits are always made against the latest submitted map.

use super::quantize::Quantizer;
use super::ControlError;
use crate::messaging::channels::ControlBridge;
use crate::messaging::command::{Command, EngineCommand};
use crate::messaging::notification::Notification;
use crate::messaging::status::TransportStatusSnapshot;
use crate::messaging::BridgeError;
use crate::project::TimelineDocument;
use crate::sequencer::groove::GrooveSettings;
use crate::sequencer::playhead::LoopRegion;
use crate::sequencer::tempo_map::{TempoEvent, TempoMap};
use crate::sequencer::timeline::{SamplePosition, TimeSignature};
use crate::sequencer::TimelineError;
use std::collections::VecDeque;

/// Default maximum number of notifications kept until taken
const DEFAULT_MAX_NOTIFICATIONS: usize = 128;

pub struct TransportController {
    bridge: ControlBridge,
    timeline: TempoMap,
    groove: GrooveSettings,
    loop_region: Option<LoopRegion>,
    loop_enabled: bool,
    latest_status: Option<TransportStatusSnapshot>,
    notifications: VecDeque<Notification>,
    max_notifications: usize,
}

impl TransportController {
    pub(crate) fn new(
        bridge: ControlBridge,
        timeline: TempoMap,
        groove: GrooveSettings,
        loop_region: Option<LoopRegion>,
        loop_enabled: bool,
    ) -> Self {
        Self {
            bridge,
            timeline,
            groove,
            loop_region,
            loop_enabled,
            latest_status: None,
            notifications: VecDeque::with_capacity(DEFAULT_MAX_NOTIFICATIONS),
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
        }
    }

    /// Validate a command and queue it for the audio thread
    ///
    /// # Errors
    /// `InvalidEventPlacement` for malformed edits, `Backpressure` when the
    /// queue is full. Either way nothing was queued and the local mirror is
    /// unchanged; the caller may retry.
    pub fn submit(&mut self, command: Command) -> Result<(), ControlError> {
        match command {
            Command::Play => self.bridge.submit(EngineCommand::Play)?,
            Command::Pause => self.bridge.submit(EngineCommand::Pause)?,
            Command::Stop => self.bridge.submit(EngineCommand::Stop)?,
            Command::RecordToggle => self.bridge.submit(EngineCommand::RecordToggle)?,
            Command::Seek(position) => self.bridge.submit(EngineCommand::Seek(position))?,
            Command::LoopToggle => {
                self.bridge.submit(EngineCommand::LoopToggle)?;
                self.loop_enabled = !self.loop_enabled;
            }
            Command::SetLoopRegion { start, end } => {
                let region = LoopRegion::new(start, end)?;
                self.bridge.submit(EngineCommand::SetLoopRegion(region))?;
                self.loop_region = Some(region);
            }
            Command::SetTempo { bpm, at_sample } => {
                let event = TempoEvent::new(at_sample, bpm)?;
                let mut next = self.timeline.clone();
                next.insert_tempo(event);
                self.replace_timeline(next)?;
                log::debug!("Tempo {} BPM at sample {}", bpm, at_sample);
            }
            Command::SetTimeSignature {
                beats_per_bar,
                beat_unit,
                at_sample,
            } => {
                let time_signature = TimeSignature::new(beats_per_bar, beat_unit)?;
                let mut next = self.timeline.clone();
                let stored = next.insert_time_signature(at_sample, time_signature)?;
                self.replace_timeline(next)?;
                log::debug!(
                    "Time signature {} requested at sample {}, placed at {}",
                    time_signature,
                    at_sample,
                    stored.at_sample
                );
            }
            Command::RemoveTempo(at_sample) => {
                let mut next = self.timeline.clone();
                next.remove_tempo(at_sample)
                    .ok_or_else(|| no_event_at("tempo", at_sample))?;
                self.replace_timeline(next)?;
            }
            Command::RemoveTimeSignature(at_sample) => {
                let mut next = self.timeline.clone();
                next.remove_time_signature(at_sample)
                    .ok_or_else(|| no_event_at("time signature", at_sample))?;
                self.replace_timeline(next)?;
            }
            Command::SetGroove(groove) => {
                self.bridge
                    .submit(EngineCommand::ReplaceGroove(Box::new(groove.clone())))?;
                self.groove = groove;
            }
        }
        Ok(())
    }

    /// Queue an already-built engine command
    ///
    /// Bypasses validation and does not update the local mirror.
    pub fn submit_engine_command(&mut self, command: EngineCommand) -> Result<(), BridgeError> {
        self.bridge.submit(command)
    }

    fn replace_timeline(&mut self, next: TempoMap) -> Result<(), BridgeError> {
        self.bridge
            .submit(EngineCommand::ReplaceTimeline(Box::new(next.clone())))?;
        self.timeline = next;
        Ok(())
    }

    /// Service the bridge; call once per UI frame
    ///
    /// Frees retired values, turns engine events into logged notifications
    /// and returns the newest status published since the last poll.
    pub fn poll(&mut self) -> Option<TransportStatusSnapshot> {
        let released = self.bridge.release_retired();
        if released > 0 {
            log::trace!("Released {} retired values", released);
        }

        while let Some(event) = self.bridge.pop_event() {
            let notification = Notification::from(event);
            notification.log();
            if self.notifications.len() == self.max_notifications {
                self.notifications.pop_front();
            }
            self.notifications.push_back(notification);
        }

        let status = self.bridge.latest_status();
        if status.is_some() {
            self.latest_status = status;
        }
        status
    }

    /// Last status received, however old
    pub fn latest_status(&self) -> Option<TransportStatusSnapshot> {
        self.latest_status
    }

    /// Notifications gathered by `poll`, oldest first
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// The map as of the last accepted edit
    pub fn timeline(&self) -> &TempoMap {
        &self.timeline
    }

    pub fn groove(&self) -> &GrooveSettings {
        &self.groove
    }

    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn pending_commands(&self) -> usize {
        self.bridge.pending()
    }

    pub fn queue_capacity(&self) -> usize {
        self.bridge.capacity()
    }

    /// Quantizer over the current map and groove
    pub fn quantizer(&self, subdivision: u32) -> Quantizer<'_> {
        Quantizer::new(&self.timeline, &self.groove, subdivision)
    }

    /// Capture the current timeline state as a saveable document
    pub fn document(&self, name: &str) -> TimelineDocument {
        TimelineDocument::new(
            name,
            self.timeline.clone(),
            self.groove.clone(),
            self.loop_enabled,
            self.loop_region,
        )
    }
}

fn no_event_at(lane: &str, at_sample: SamplePosition) -> TimelineError {
    TimelineError::InvalidEventPlacement(format!("no {} event at sample {}", lane, at_sample))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::control::create_transport;

    fn controller_with_capacity(commands: usize) -> (TransportController, crate::audio::TransportEngine) {
        let mut config = EngineConfig::default();
        config.command_queue_capacity = commands;
        create_transport(
            &config,
            TempoMap::new(48000.0).unwrap(),
            GrooveSettings::straight(),
        )
    }

    #[test]
    fn test_invalid_tempo_rejected_before_queueing() {
        let (mut controller, _engine) = controller_with_capacity(8);
        let result = controller.submit(Command::SetTempo {
            bpm: 0.0,
            at_sample: 0,
        });
        assert!(matches!(result, Err(ControlError::Timeline(_))));
        assert_eq!(controller.pending_commands(), 0);
        assert_eq!(controller.timeline().tempo_at(0).bpm(), 120.0);
    }

    #[test]
    fn test_malformed_loop_region_rejected() {
        let (mut controller, _engine) = controller_with_capacity(8);
        let result = controller.submit(Command::SetLoopRegion {
            start: 2000,
            end: 2000,
        });
        assert!(result.is_err());
        assert_eq!(controller.loop_region(), None);
    }

    #[test]
    fn test_mirror_tracks_accepted_edits() {
        let (mut controller, _engine) = controller_with_capacity(8);
        controller
            .submit(Command::SetTempo {
                bpm: 90.0,
                at_sample: 0,
            })
            .unwrap();
        controller
            .submit(Command::SetTimeSignature {
                beats_per_bar: 3,
                beat_unit: 4,
                at_sample: 1000,
            })
            .unwrap();

        assert_eq!(controller.timeline().tempo_at(0).bpm(), 90.0);
        // Snapped to the next bar line: 4 beats at 90 BPM
        let events: Vec<_> = controller.timeline().time_signature_events().copied().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].at_sample, 128_000);
        assert_eq!(controller.pending_commands(), 2);
    }

    #[test]
    fn test_backpressure_leaves_mirror_unchanged() {
        let (mut controller, _engine) = controller_with_capacity(2);
        controller.submit(Command::Play).unwrap();
        controller.submit(Command::Pause).unwrap();

        let result = controller.submit(Command::SetTempo {
            bpm: 150.0,
            at_sample: 0,
        });
        assert!(matches!(
            result,
            Err(ControlError::Bridge(BridgeError::Backpressure { capacity: 2 }))
        ));
        assert_eq!(controller.timeline().tempo_at(0).bpm(), 120.0);
        assert_eq!(controller.pending_commands(), 2);
    }

    #[test]
    fn test_remove_missing_event_is_an_error() {
        let (mut controller, _engine) = controller_with_capacity(8);
        assert!(controller.submit(Command::RemoveTempo(12345)).is_err());
        assert!(controller.submit(Command::RemoveTempo(0)).is_ok());
    }

    #[test]
    fn test_document_captures_mirror() {
        let (mut controller, _engine) = controller_with_capacity(8);
        controller
            .submit(Command::SetLoopRegion {
                start: 0,
                end: 96000,
            })
            .unwrap();
        controller.submit(Command::LoopToggle).unwrap();

        let document = controller.document("Loop sketch");
        assert_eq!(document.metadata.name, "Loop sketch");
        assert!(document.loop_enabled);
        assert_eq!(document.loop_region, controller.loop_region());
    }
}
