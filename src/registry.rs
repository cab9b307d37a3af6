//! Process-wide processor lifecycle.
//!
//! One registry instance owns at most one denoiser handle and at most one
//! processing session at a time. Control calls arrive on the host dispatch
//! thread; the registry is the single place that wires the capture backend,
//! the denoiser, and the consumer sink together.

use crate::capture::{CaptureFactory, CaptureSource, CpalCaptureSource};
use crate::config::PipelineConfig;
use crate::denoise::DenoiserHandle;
use crate::error::ProcessorError;
use crate::pipeline::{start_session, ProcessingSession};
use crate::sink::FrameSink;
use std::sync::{Arc, Mutex};

/// Opaque identifier handed to the host for a live denoiser instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProcessorId(u64);

impl ProcessorId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Builds the capture factory for a session; swappable so embedders and tests
/// can run the pipeline against something other than a physical microphone.
pub type CaptureBackend = Box<dyn Fn(&PipelineConfig) -> CaptureFactory + Send>;

fn cpal_backend() -> CaptureBackend {
    Box::new(|config: &PipelineConfig| {
        let config = config.clone();
        Box::new(move || {
            CpalCaptureSource::open(&config).map(|source| Box::new(source) as Box<dyn CaptureSource>)
        })
    })
}

pub struct ProcessorRegistry {
    config: PipelineConfig,
    backend: CaptureBackend,
    sink: Option<Arc<dyn FrameSink>>,
    denoiser: Option<Arc<Mutex<DenoiserHandle>>>,
    active_id: Option<ProcessorId>,
    session: Option<ProcessingSession>,
    next_id: u64,
}

impl ProcessorRegistry {
    /// Registry backed by the system microphone.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_backend(config, cpal_backend())
    }

    /// Registry with a custom capture backend.
    pub fn with_backend(config: PipelineConfig, backend: CaptureBackend) -> Self {
        Self {
            config,
            backend,
            sink: None,
            denoiser: None,
            active_id: None,
            session: None,
            next_id: 1,
        }
    }

    /// Wire up the consumer context. Without a sink, start requests fail with
    /// `INIT_ERROR`.
    pub fn attach_sink(&mut self, sink: Arc<dyn FrameSink>) {
        self.sink = Some(sink);
    }

    pub fn has_processor(&self) -> bool {
        self.denoiser.is_some()
    }

    pub fn active_id(&self) -> Option<ProcessorId> {
        self.active_id
    }

    pub fn is_processing(&self) -> bool {
        self.session
            .as_ref()
            .map(ProcessingSession::is_running)
            .unwrap_or(false)
    }

    /// Create the denoiser instance. If one already exists it is destroyed
    /// first, so the process-wide single-instance invariant holds.
    pub fn create_processor(&mut self) -> Result<ProcessorId, ProcessorError> {
        if let Some(old) = self.active_id {
            tracing::warn!(old_id = old.value(), "replacing existing denoiser instance");
            self.destroy_processor();
        }
        let handle = DenoiserHandle::create()?;
        let id = ProcessorId(self.next_id);
        self.next_id += 1;
        self.denoiser = Some(Arc::new(Mutex::new(handle)));
        self.active_id = Some(id);
        tracing::info!(id = id.value(), "denoiser instance created");
        Ok(id)
    }

    /// Destroy the denoiser, stopping any running session first. Idempotent.
    pub fn destroy_processor(&mut self) {
        self.stop_processing();
        if let Some(denoiser) = self.denoiser.take() {
            denoiser
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .destroy();
            tracing::info!(id = self.active_id.map(|id| id.value()), "denoiser instance destroyed");
        }
        self.active_id = None;
    }

    /// Begin a session. Idempotent while one is already running. Backend-init
    /// failures are surfaced to the sink as an error event, not returned here;
    /// the registry simply stays idle.
    pub fn start_processing(&mut self) -> Result<(), ProcessorError> {
        let denoiser = self
            .denoiser
            .clone()
            .ok_or(ProcessorError::InvalidState(
                "no denoiser instance; call create_processor first",
            ))?;
        let sink = self
            .sink
            .clone()
            .ok_or(ProcessorError::Init("no consumer sink attached"))?;

        if self.is_processing() {
            tracing::debug!("start requested while already running; ignoring");
            return Ok(());
        }
        // A previous session that ended on its own still owns a thread handle.
        self.stop_processing();

        let factory = (self.backend)(&self.config);
        match start_session(factory, denoiser, sink) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                // The loop thread already emitted the error event.
                tracing::error!(error = %format!("{err:#}"), "session failed to start");
                Ok(())
            }
        }
    }

    /// Stop the session if one is running. Idempotent.
    pub fn stop_processing(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }
}

impl Drop for ProcessorRegistry {
    fn drop(&mut self) {
        self.destroy_processor();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;

    fn registry() -> ProcessorRegistry {
        ProcessorRegistry::new(PipelineConfig::default())
    }

    #[test]
    fn double_create_leaves_exactly_one_instance() {
        let mut registry = registry();
        let first = registry.create_processor().unwrap();
        let second = registry.create_processor().unwrap();
        assert_ne!(first, second);
        assert!(registry.has_processor());
        assert_eq!(registry.active_id(), Some(second));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut registry = registry();
        registry.destroy_processor();
        registry.create_processor().unwrap();
        registry.destroy_processor();
        registry.destroy_processor();
        assert!(!registry.has_processor());
    }

    #[test]
    fn start_without_processor_is_state_error() {
        let mut registry = registry();
        let (sink, _receiver) = ChannelSink::unbounded();
        registry.attach_sink(Arc::new(sink));
        let err = registry.start_processing().unwrap_err();
        assert_eq!(err.code(), "STATE_ERROR");
    }

    #[test]
    fn start_without_sink_is_init_error() {
        let mut registry = registry();
        registry.create_processor().unwrap();
        let err = registry.start_processing().unwrap_err();
        assert_eq!(err.code(), "INIT_ERROR");
    }

    #[test]
    fn stop_without_start_is_a_no_op() {
        let mut registry = registry();
        registry.stop_processing();
        registry.stop_processing();
        assert!(!registry.is_processing());
    }
}
