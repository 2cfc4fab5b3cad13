// Transport engine - Audio-thread side of the transport
//
// process_block() runs inside the device callback:
// no allocations, no I/O, no locks, no logging.

use super::deadline::DeadlineMonitor;
use crate::messaging::channels::AudioBridge;
use crate::messaging::command::{EngineCommand, Retired};
use crate::messaging::notification::EngineEvent;
use crate::messaging::status::TransportStatusSnapshot;
use crate::plugin::time_sync::TimeSnapshot;
use crate::plugin::{PluginHost, TimeSyncPlugin};
use crate::sequencer::groove::{quantize_note, GrooveSettings, QuantizedNote};
use crate::sequencer::timeline::SamplePosition;
use crate::sequencer::transport::Transport;

/// Owns the transport, its tempo map and groove, and the hosted plugins
pub struct TransportEngine {
    transport: Transport,
    groove: Box<GrooveSettings>,
    bridge: AudioBridge,
    plugins: PluginHost,
    last_good: TimeSnapshot,
    deadline: DeadlineMonitor,
    status_interval: u64,
    block_index: u64,
}

impl TransportEngine {
    pub(crate) fn new(
        transport: Transport,
        groove: Box<GrooveSettings>,
        bridge: AudioBridge,
        status_interval: u32,
    ) -> Self {
        let last_good = TimeSnapshot::initial(transport.timeline());
        let deadline = DeadlineMonitor::new(transport.sample_rate());
        Self {
            transport,
            groove,
            bridge,
            plugins: PluginHost::new(),
            last_good,
            deadline,
            status_interval: status_interval.max(1) as u64,
            block_index: 0,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn groove(&self) -> &GrooveSettings {
        &self.groove
    }

    pub fn sample_rate(&self) -> f64 {
        self.transport.sample_rate()
    }

    /// Add a plugin before the engine moves to the audio thread
    pub fn add_plugin(&mut self, plugin: Box<dyn TimeSyncPlugin>) -> usize {
        self.plugins.add(plugin)
    }

    pub fn plugins(&self) -> &PluginHost {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginHost {
        &mut self.plugins
    }

    /// Handle for reading block timing from another thread
    pub fn deadline_monitor(&self) -> DeadlineMonitor {
        self.deadline.clone()
    }

    /// Blocks processed so far
    pub fn block_index(&self) -> u64 {
        self.block_index
    }

    /// Snapshot published with the most recent block
    pub fn last_snapshot(&self) -> &TimeSnapshot {
        &self.last_good
    }

    /// Process one interleaved block
    ///
    /// Order per block: apply queued commands, advance the transport, check
    /// the snapshot, hand it to plugins, let them render, publish status.
    pub fn process_block(&mut self, output: &mut [f32], channels: usize) {
        // ========== SACRED ZONE ==========
        // No allocations, No I/O, No blocking locks
        let started = self.deadline.start();
        let channels = channels.max(1);
        let frames = output.len() / channels;
        output.fill(0.0);

        if self.apply_commands() {
            let bridge = &mut self.bridge;
            self.plugins
                .reset(|index| bridge.emit(EngineEvent::PluginFault { index }));
        }

        let snapshot = self.transport.advance(frames);
        if snapshot.is_consistent() {
            self.last_good = snapshot;
        } else {
            self.last_good = self.last_good.reissue(frames);
            self.bridge.emit(EngineEvent::SnapshotFallback {
                block_index: self.block_index,
            });
        }

        let bridge = &mut self.bridge;
        self.plugins.run_block(&self.last_good, output, channels, |index| {
            bridge.emit(EngineEvent::PluginFault { index })
        });

        self.block_index += 1;
        if self.block_index % self.status_interval == 0 {
            self.publish_status();
        }

        self.deadline.finish(started, frames);
        // ========== SACRED ZONE END ==========
    }

    /// Push a status snapshot now, regardless of the publish interval
    pub fn publish_status(&mut self) {
        let status = TransportStatusSnapshot::capture(&self.transport, self.block_index);
        self.bridge.publish_status(status);
    }

    /// Snap a note recorded at `sample` to the grid, with groove when `quantizable`
    pub fn quantize_recorded(
        &self,
        sample: SamplePosition,
        velocity: u8,
        subdivision: u32,
        quantizable: bool,
    ) -> QuantizedNote {
        quantize_note(
            &self.transport.clock(),
            &self.groove,
            sample,
            velocity,
            subdivision,
            quantizable,
        )
    }

    /// Apply everything queued since the last block, in submission order
    ///
    /// Returns true when plugins should drop in-flight state (seek or stop).
    fn apply_commands(&mut self) -> bool {
        let transport = &mut self.transport;
        let groove = &mut self.groove;
        let mut discontinuity = false;

        let mut drain = self.bridge.drain();
        while let Some(command) = drain.next() {
            match command {
                EngineCommand::Play => transport.play(),
                EngineCommand::Pause => transport.pause(),
                EngineCommand::Stop => {
                    transport.stop();
                    discontinuity = true;
                }
                EngineCommand::RecordToggle => transport.record_toggle(),
                EngineCommand::Seek(position) => {
                    if let Some(clamped_to) = transport.seek(position) {
                        drain.emit(EngineEvent::InconsistentTransition {
                            requested: position,
                            clamped_to,
                        });
                    }
                    discontinuity = true;
                }
                EngineCommand::LoopToggle => transport.toggle_loop(),
                EngineCommand::SetLoopRegion(region) => transport.set_loop_region(region),
                EngineCommand::ReplaceTimeline(timeline) => {
                    if timeline.is_consistent() && timeline.sample_rate() == transport.sample_rate()
                    {
                        let previous = transport.replace_timeline(timeline);
                        drain.retire(Retired::Timeline(previous));
                    } else {
                        drain.emit(EngineEvent::TimelineRejected);
                        drain.retire(Retired::Timeline(timeline));
                    }
                }
                EngineCommand::ReplaceGroove(new_groove) => {
                    let previous = std::mem::replace(groove, new_groove);
                    drain.retire(Retired::Groove(previous));
                }
            }
        }

        discontinuity
    }
}
