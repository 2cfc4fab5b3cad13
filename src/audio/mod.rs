// Module audio - Real-time engine and CPAL backend

pub mod deadline;
pub mod engine;
pub mod stream;

pub use deadline::{DeadlineLoad, DeadlineMonitor};
pub use engine::TransportEngine;
pub use stream::{default_output_sample_rate, AudioStream, StreamError};
