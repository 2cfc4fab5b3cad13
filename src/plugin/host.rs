// Plugin host - Publishes the block snapshot and runs time-synced plugins
//
// Plugin code is untrusted: each call runs under catch_unwind and a plugin
// that panics is bypassed for the rest of the session.

use super::time_sync::TimeSnapshot;
use super::TimeSyncPlugin;
use std::panic::{catch_unwind, AssertUnwindSafe};

struct PluginSlot {
    plugin: Box<dyn TimeSyncPlugin>,
    faulted: bool,
}

/// Ordered set of hosted plugins
#[derive(Default)]
pub struct PluginHost {
    slots: Vec<PluginSlot>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin; returns its index
    ///
    /// Plugins are added before the engine is handed to the audio thread.
    pub fn add(&mut self, plugin: Box<dyn TimeSyncPlugin>) -> usize {
        self.slots.push(PluginSlot {
            plugin,
            faulted: false,
        });
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(|slot| slot.plugin.name())
    }

    pub fn is_faulted(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.faulted)
    }

    /// Plugins still being called
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.faulted).count()
    }

    /// Lend the snapshot to every plugin, then let each render the block
    ///
    /// `on_fault` is called with the index of each plugin that panics during
    /// this block.
    pub fn run_block(
        &mut self,
        snapshot: &TimeSnapshot,
        output: &mut [f32],
        channels: usize,
        mut on_fault: impl FnMut(usize),
    ) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.faulted {
                continue;
            }
            let plugin = &mut slot.plugin;
            let result = catch_unwind(AssertUnwindSafe(|| plugin.receive_time_snapshot(snapshot)));
            if result.is_err() {
                slot.faulted = true;
                on_fault(index);
            }
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.faulted {
                continue;
            }
            let plugin = &mut slot.plugin;
            let result =
                catch_unwind(AssertUnwindSafe(|| plugin.process_block(output, channels)));
            if result.is_err() {
                slot.faulted = true;
                on_fault(index);
            }
        }
    }

    /// Reset every healthy plugin (after a seek or stop)
    pub fn reset(&mut self, mut on_fault: impl FnMut(usize)) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.faulted {
                continue;
            }
            let plugin = &mut slot.plugin;
            if catch_unwind(AssertUnwindSafe(|| plugin.reset())).is_err() {
                slot.faulted = true;
                on_fault(index);
            }
        }
    }
}
