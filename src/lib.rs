//! Real-time microphone denoising pipeline.
//!
//! Captures fixed 20 ms PCM frames from the microphone, runs them through an
//! RNNoise state instance on a dedicated thread, and delivers both raw and
//! denoised frames to the consumer without ever blocking the audio hardware
//! callback. Lifecycle (create/start/stop/destroy) is driven through
//! [`registry::ProcessorRegistry`] or the JSON [`bridge`].

pub mod bridge;
pub mod capture;
pub mod config;
pub mod denoise;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod telemetry;

pub use capture::{CaptureFactory, CaptureSource, CpalCaptureSource, ReadOutcome};
pub use config::{AppConfig, PipelineConfig};
pub use denoise::{DenoiseEngine, DenoiserHandle, PassthroughEngine, RnnoiseEngine};
pub use error::ProcessorError;
pub use frame::{FRAME_MS, FRAME_SAMPLES, SAMPLE_RATE};
pub use pipeline::{start_session, LoopPhase, ProcessingSession, SessionStatus};
pub use registry::{CaptureBackend, ProcessorId, ProcessorRegistry};
pub use sink::{ChannelSink, FrameSink, SinkEvent};
