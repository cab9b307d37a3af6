//! Denoiser state ownership and the RNNoise engine wrapper.
//!
//! The filter itself is opaque: a stateful transform over fixed-size float
//! frames, mutated on every call. `DenoiserHandle` is the single owner of one
//! such instance and enforces the create/process/destroy lifecycle; calls for
//! a given handle must be strictly sequential because the underlying state is
//! not safe for concurrent mutation.

use crate::error::ProcessorError;
use crate::frame::FRAME_SAMPLES;
use nnnoiseless::DenoiseState;

/// A stateful noise-suppression engine over normalized float frames.
///
/// # Frame Size Contract
/// Both slices must hold exactly [`FRAME_SAMPLES`] samples. Engines keep
/// internal filter state across calls, so a single engine must never be
/// driven from two threads.
pub trait DenoiseEngine: Send {
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]);
    fn name(&self) -> &'static str {
        "unknown_denoiser"
    }
}

/// RNNoise via the `nnnoiseless` crate.
///
/// `nnnoiseless` operates on floats at i16 magnitude, while the pipeline
/// carries normalized samples, so the wrapper rescales on both sides.
pub struct RnnoiseEngine {
    state: Box<DenoiseState<'static>>,
    scaled_in: Vec<f32>,
    scaled_out: Vec<f32>,
}

impl RnnoiseEngine {
    pub fn new() -> Self {
        Self {
            state: DenoiseState::new(),
            scaled_in: vec![0.0; FRAME_SAMPLES],
            scaled_out: vec![0.0; FRAME_SAMPLES],
        }
    }
}

impl Default for RnnoiseEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DenoiseEngine for RnnoiseEngine {
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) {
        for (dst, &sample) in self.scaled_in.iter_mut().zip(input) {
            *dst = sample * 32_768.0;
        }
        let _vad = self.state.process_frame(&mut self.scaled_out, &self.scaled_in);
        for (dst, &sample) in output.iter_mut().zip(&self.scaled_out) {
            *dst = sample / 32_768.0;
        }
    }

    fn name(&self) -> &'static str {
        "rnnoise"
    }
}

/// Identity engine: leaves frames untouched. Useful for plumbing checks and
/// for hosts that want the frame-delivery path without suppression.
pub struct PassthroughEngine;

impl DenoiseEngine for PassthroughEngine {
    fn process_frame(&mut self, output: &mut [f32], input: &[f32]) {
        output.copy_from_slice(input);
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

/// Owns one denoiser instance and tracks its validity.
///
/// After [`destroy`](Self::destroy) the handle stays around but every
/// `process` call fails with `InvalidState`; there is no sentinel integer
/// standing in for "no state".
pub struct DenoiserHandle {
    engine: Option<Box<dyn DenoiseEngine>>,
    frame_samples: usize,
}

impl DenoiserHandle {
    /// Allocate a fresh RNNoise instance.
    pub fn create() -> Result<Self, ProcessorError> {
        Ok(Self::with_engine(Box::new(RnnoiseEngine::new())))
    }

    /// Wrap an externally supplied engine.
    pub fn with_engine(engine: Box<dyn DenoiseEngine>) -> Self {
        Self {
            engine: Some(engine),
            frame_samples: FRAME_SAMPLES,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine
            .as_ref()
            .map(|engine| engine.name())
            .unwrap_or("destroyed")
    }

    /// Run the stateful transform for one frame.
    ///
    /// The frame length is fixed at construction; passing any other length is
    /// a contract violation and is rejected before touching filter state.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) -> Result<(), ProcessorError> {
        if input.len() != self.frame_samples || output.len() != self.frame_samples {
            return Err(ProcessorError::InvalidState(
                "frame length does not match denoiser frame size",
            ));
        }
        let engine = self
            .engine
            .as_mut()
            .ok_or(ProcessorError::InvalidState("denoiser handle destroyed"))?;
        engine.process_frame(output, input);
        Ok(())
    }

    /// Release the filter state. Subsequent `process` calls fail.
    pub fn destroy(&mut self) {
        self.engine = None;
    }
}
