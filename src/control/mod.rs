// Control module - Control-thread side of the transport

pub mod controller;
pub mod quantize;

pub use controller::TransportController;
pub use quantize::{Quantizer, RecordedNote};

use crate::audio::TransportEngine;
use crate::config::EngineConfig;
use crate::messaging::channels::create_transport_bridge;
use crate::messaging::BridgeError;
use crate::project::TimelineDocument;
use crate::sequencer::groove::GrooveSettings;
use crate::sequencer::tempo_map::TempoMap;
use crate::sequencer::transport::Transport;
use crate::sequencer::TimelineError;
use thiserror::Error;

/// Errors returned to the submitter of a command
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Build a connected controller and engine
///
/// The engine goes to the audio thread (see `AudioStream::start`), the
/// controller stays with the UI.
pub fn create_transport(
    config: &EngineConfig,
    timeline: TempoMap,
    groove: GrooveSettings,
) -> (TransportController, TransportEngine) {
    build(config, timeline, groove, None, false)
}

/// Build a controller and engine restored from a saved document
pub fn create_transport_from_document(
    config: &EngineConfig,
    document: TimelineDocument,
) -> (TransportController, TransportEngine) {
    let TimelineDocument {
        timeline,
        groove,
        loop_enabled,
        loop_region,
        ..
    } = document;
    build(config, timeline, groove, loop_region, loop_enabled)
}

fn build(
    config: &EngineConfig,
    timeline: TempoMap,
    groove: GrooveSettings,
    loop_region: Option<crate::sequencer::LoopRegion>,
    loop_enabled: bool,
) -> (TransportController, TransportEngine) {
    let (control_bridge, audio_bridge) = create_transport_bridge(config.bridge_capacities());

    let mut transport = Transport::new(Box::new(timeline.clone()));
    transport.set_max_position(config.max_position(timeline.sample_rate()));
    if let Some(region) = loop_region {
        transport.set_loop_region(region);
    }
    transport.set_loop_enabled(loop_enabled);

    let engine = TransportEngine::new(
        transport,
        Box::new(groove.clone()),
        audio_bridge,
        config.status_interval_blocks,
    );
    let controller =
        TransportController::new(control_bridge, timeline, groove, loop_region, loop_enabled);

    log::debug!(
        "Transport created at {} Hz, {} command slots",
        config.sample_rate,
        config.command_queue_capacity
    );
    (controller, engine)
}
