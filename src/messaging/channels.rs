// Communication channels lock-free
//
// Three single-producer/single-consumer ring buffers and one status slot
// connect the control thread and the audio thread:
//   commands  control → audio
//   retired   audio → control (boxes to free off the audio thread)
//   events    audio → control
//   status    audio → control, latest wins (see `StatusCell`)

use super::command::{EngineCommand, Retired};
use super::notification::EngineEvent;
use super::status::{StatusCell, TransportStatusSnapshot};
use super::BridgeError;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::Arc;

pub type CommandProducer = ringbuf::HeapProd<EngineCommand>;
pub type CommandConsumer = ringbuf::HeapCons<EngineCommand>;
pub type RetiredProducer = ringbuf::HeapProd<Retired>;
pub type RetiredConsumer = ringbuf::HeapCons<Retired>;
pub type EventProducer = ringbuf::HeapProd<EngineEvent>;
pub type EventConsumer = ringbuf::HeapCons<EngineEvent>;

/// Ring buffer capacities for one bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeCapacities {
    pub commands: usize,
    pub events: usize,
}

impl Default for BridgeCapacities {
    fn default() -> Self {
        Self {
            commands: 256,
            events: 64,
        }
    }
}

/// Create both ends of the transport bridge
pub fn create_transport_bridge(capacities: BridgeCapacities) -> (ControlBridge, AudioBridge) {
    let commands = capacities.commands.max(1);
    let (command_tx, command_rx) = HeapRb::<EngineCommand>::new(commands).split();
    // Every queued command may retire a box, plus the one it replaces
    let (retired_tx, retired_rx) = HeapRb::<Retired>::new(commands * 2).split();
    let status = Arc::new(StatusCell::new());
    let (event_tx, event_rx) = HeapRb::<EngineEvent>::new(capacities.events.max(1)).split();

    let control = ControlBridge {
        commands: command_tx,
        retired: retired_rx,
        status: status.clone(),
        status_seen: 0,
        events: event_rx,
        capacity: commands,
    };
    let audio = AudioBridge {
        commands: command_rx,
        retired: retired_tx,
        status,
        events: event_tx,
        drained: Vec::with_capacity(commands),
        superseded: Vec::with_capacity(commands),
        seen: [false; COALESCE_KINDS],
        dropped_events: 0,
    };
    (control, audio)
}

/// Control-thread end of the bridge
pub struct ControlBridge {
    commands: CommandProducer,
    retired: RetiredConsumer,
    status: Arc<StatusCell>,
    /// Status version already handed out by `latest_status`
    status_seen: u64,
    events: EventConsumer,
    capacity: usize,
}

impl ControlBridge {
    /// Enqueue a command without blocking
    ///
    /// A full queue rejects the command with `Backpressure` and leaves the
    /// queue unchanged; the command is dropped here on the control thread.
    pub fn submit(&mut self, command: EngineCommand) -> Result<(), BridgeError> {
        self.release_retired();
        self.commands
            .try_push(command)
            .map_err(|_rejected| BridgeError::Backpressure {
                capacity: self.capacity,
            })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commands waiting for the audio thread
    pub fn pending(&self) -> usize {
        self.commands.occupied_len()
    }

    pub fn is_full(&self) -> bool {
        self.commands.is_full()
    }

    /// Drop everything the audio thread handed back; returns how many
    pub fn release_retired(&mut self) -> usize {
        let mut released = 0;
        while self.retired.try_pop().is_some() {
            released += 1;
        }
        released
    }

    /// Newest status published since the last call, if any
    ///
    /// Statuses published in between are skipped; after a long pause in
    /// polling this is still the most recent one.
    pub fn latest_status(&mut self) -> Option<TransportStatusSnapshot> {
        let version = self.status.version();
        if version == self.status_seen {
            return None;
        }
        let status = self.status.load()?;
        self.status_seen = version;
        Some(status)
    }

    pub fn pop_event(&mut self) -> Option<EngineEvent> {
        self.events.try_pop()
    }
}

const COALESCE_KINDS: usize = 4;

fn coalesce_slot(command: &EngineCommand) -> Option<usize> {
    use super::command::CoalesceKey;
    command.coalesce_key().map(|key| match key {
        CoalesceKey::Seek => 0,
        CoalesceKey::LoopRegion => 1,
        CoalesceKey::Timeline => 2,
        CoalesceKey::Groove => 3,
    })
}

/// Audio-thread end of the bridge
///
/// All buffers are preallocated; nothing here allocates after construction.
pub struct AudioBridge {
    commands: CommandConsumer,
    retired: RetiredProducer,
    status: Arc<StatusCell>,
    events: EventProducer,
    drained: Vec<EngineCommand>,
    superseded: Vec<bool>,
    seen: [bool; COALESCE_KINDS],
    dropped_events: u64,
}

impl AudioBridge {
    /// Take every queued command, in submission order
    ///
    /// A command followed later in the same batch by one with the same
    /// coalesce key is superseded: it is not yielded, and any box it owns is
    /// retired instead. Relative order of the surviving commands is kept.
    pub fn drain(&mut self) -> Drain<'_> {
        self.drained.clear();
        self.superseded.clear();
        while let Some(command) = self.commands.try_pop() {
            self.drained.push(command);
            self.superseded.push(false);
        }

        self.seen = [false; COALESCE_KINDS];
        for (command, superseded) in self.drained.iter().zip(self.superseded.iter_mut()).rev() {
            if let Some(slot) = coalesce_slot(command) {
                *superseded = self.seen[slot];
                self.seen[slot] = true;
            }
        }

        Drain {
            commands: self.drained.drain(..),
            superseded: self.superseded.iter(),
            retired: &mut self.retired,
            events: &mut self.events,
            dropped_events: &mut self.dropped_events,
        }
    }

    /// Hand a box back to the control thread for release
    pub fn retire(&mut self, retired: Retired) {
        retire_into(&mut self.retired, &mut self.events, &mut self.dropped_events, retired);
    }

    /// Publish a status snapshot, replacing any the control thread has not read
    pub fn publish_status(&mut self, status: TransportStatusSnapshot) {
        self.status.store(&status);
    }

    pub fn emit(&mut self, event: EngineEvent) {
        emit_into(&mut self.events, &mut self.dropped_events, event);
    }

    /// Events lost because the event queue was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }
}

fn emit_into(events: &mut EventProducer, dropped: &mut u64, event: EngineEvent) {
    if events.try_push(event).is_err() {
        *dropped += 1;
    }
}

fn retire_into(
    retired: &mut RetiredProducer,
    events: &mut EventProducer,
    dropped: &mut u64,
    value: Retired,
) {
    if let Err(value) = retired.try_push(value) {
        // Last resort: release here rather than leak
        drop(value);
        emit_into(events, dropped, EngineEvent::RetireQueueFull);
    }
}

/// Commands of one drain, superseded ones already filtered out
///
/// Dropping the iterator early retires whatever was not consumed.
pub struct Drain<'a> {
    commands: std::vec::Drain<'a, EngineCommand>,
    superseded: std::slice::Iter<'a, bool>,
    retired: &'a mut RetiredProducer,
    events: &'a mut EventProducer,
    dropped_events: &'a mut u64,
}

impl Drain<'_> {
    /// Hand a box released while applying a command back to the control thread
    pub fn retire(&mut self, value: Retired) {
        retire_into(self.retired, self.events, self.dropped_events, value);
    }

    /// Report a problem found while applying a command
    pub fn emit(&mut self, event: EngineEvent) {
        emit_into(self.events, self.dropped_events, event);
    }
}

impl Iterator for Drain<'_> {
    type Item = EngineCommand;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let command = self.commands.next()?;
            let superseded = self.superseded.next().copied().unwrap_or(false);
            if !superseded {
                return Some(command);
            }
            if let Some(value) = command.into_retired() {
                self.retire(value);
            }
        }
    }
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        while let Some(command) = self.commands.next() {
            if let Some(value) = command.into_retired() {
                retire_into(self.retired, self.events, self.dropped_events, value);
            }
        }
    }
}
