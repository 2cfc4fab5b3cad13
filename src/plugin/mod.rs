// Plugin module - Time sync interface for hosted plugins

pub mod host;
pub mod metronome;
pub mod time_sync;

pub use host::PluginHost;
pub use metronome::{ClickType, MetronomePlugin, MetronomeSound};
pub use time_sync::TimeSnapshot;

/// Capability interface of a time-synced plugin
///
/// A plugin only ever sees the transport through the snapshot lent to
/// `receive_time_snapshot`; the borrow ends with the call, so timing data
/// cannot be retained or mutated from plugin code.
pub trait TimeSyncPlugin: Send {
    fn name(&self) -> &str;

    /// Called once per block, before `process_block`
    fn receive_time_snapshot(&mut self, snapshot: &TimeSnapshot);

    /// Render or mix into an interleaved block of `channels` channels
    fn process_block(&mut self, output: &mut [f32], channels: usize);

    /// Drop any in-flight state (after a seek or stop)
    fn reset(&mut self) {}
}
