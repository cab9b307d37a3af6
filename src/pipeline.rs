//! The capture → convert → denoise → convert-back → emit loop.
//!
//! The `Running` body executes on one dedicated thread. The atomic running
//! flag is the only shared mutable state between that thread and control
//! callers; stop is cooperative and the loop observes it within one frame
//! period. The capture backend is released on every exit path, including
//! panics, which are caught at the thread boundary and turned into an error
//! event.

use crate::capture::{CaptureFactory, CaptureSource, ReadOutcome};
use crate::denoise::DenoiserHandle;
use crate::frame::{self, FRAME_SAMPLES};
use crate::sink::FrameSink;
use anyhow::{anyhow, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Log raw/denoised sample diagnostics every this many frames (~1 s).
const DIAG_FRAME_INTERVAL: u64 = 50;

/// How long a start request waits for the loop thread to confirm that the
/// capture backend opened. Generous; real init takes a few milliseconds.
const STARTUP_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Observable lifecycle of the loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl LoopPhase {
    fn as_u8(self) -> u8 {
        match self {
            LoopPhase::Idle => 0,
            LoopPhase::Starting => 1,
            LoopPhase::Running => 2,
            LoopPhase::Stopping => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoopPhase::Starting,
            2 => LoopPhase::Running,
            3 => LoopPhase::Stopping,
            _ => LoopPhase::Idle,
        }
    }
}

/// Cross-thread view of a session: the running flag plus the current phase.
pub struct SessionStatus {
    running: AtomicBool,
    phase: AtomicU8,
}

impl SessionStatus {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            phase: AtomicU8::new(LoopPhase::Idle.as_u8()),
        }
    }

    /// The sole gate for loop continuation.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> LoopPhase {
        LoopPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Release);
    }

    fn set_phase(&self, phase: LoopPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}

/// One active capture+denoise run. Dropping the session stops it.
pub struct ProcessingSession {
    status: Arc<SessionStatus>,
    handle: Option<JoinHandle<()>>,
}

impl ProcessingSession {
    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Cooperative stop: clear the flag and wait for the loop to exit.
    /// Idempotent; stopping an already-stopped session is a no-op.
    pub fn stop(&mut self) {
        self.status.set_running(false);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                // The loop already reported the panic through the sink.
                tracing::error!("processing thread terminated by panic");
            }
        }
    }
}

impl Drop for ProcessingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start a session: spawn the loop thread, let it open the capture backend,
/// and wait for the init confirmation.
///
/// On backend-init failure the error has already been delivered to the sink
/// as an event; the returned `Err` lets the caller log it and stay idle.
pub fn start_session(
    make_source: CaptureFactory,
    denoiser: Arc<Mutex<DenoiserHandle>>,
    sink: Arc<dyn FrameSink>,
) -> Result<ProcessingSession> {
    let status = Arc::new(SessionStatus::new());
    status.set_phase(LoopPhase::Starting);

    let (ack_tx, ack_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
    let thread_status = status.clone();
    let thread_sink = sink.clone();

    let handle = thread::Builder::new()
        .name("rnnoise-loop".to_string())
        .spawn(move || {
            // The CPAL stream is not Send, so the backend opens here, on the
            // thread that will own it.
            let mut source = match make_source() {
                Ok(source) => source,
                Err(err) => {
                    let message = format!("audio capture failed to start: {err:#}");
                    thread_sink.emit_error(message.clone());
                    thread_status.set_phase(LoopPhase::Idle);
                    let _ = ack_tx.send(Err(message));
                    return;
                }
            };

            thread_status.set_running(true);
            thread_status.set_phase(LoopPhase::Running);
            let _ = ack_tx.send(Ok(()));

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                run_loop(&mut *source, &denoiser, &*thread_sink, &thread_status);
            }));

            thread_status.set_phase(LoopPhase::Stopping);
            source.close();
            if outcome.is_err() {
                thread_sink
                    .emit_error("internal error in audio processing; session stopped".to_string());
            }
            thread_status.set_running(false);
            thread_status.set_phase(LoopPhase::Idle);
        })
        .map_err(|err| anyhow!("failed to spawn processing thread: {err}"))?;

    match ack_rx.recv_timeout(STARTUP_ACK_TIMEOUT) {
        Ok(Ok(())) => Ok(ProcessingSession {
            status,
            handle: Some(handle),
        }),
        Ok(Err(message)) => {
            let _ = handle.join();
            Err(anyhow!(message))
        }
        Err(_) => {
            // Thread is wedged or dead; make sure it cannot keep running.
            status.set_running(false);
            let _ = handle.join();
            Err(anyhow!("processing thread did not confirm startup"))
        }
    }
}

/// The `Running` state body. Returns when the running flag clears or a fatal
/// read error terminates the session.
fn run_loop(
    source: &mut dyn CaptureSource,
    denoiser: &Mutex<DenoiserHandle>,
    sink: &dyn FrameSink,
    status: &SessionStatus,
) {
    let mut pcm = vec![0i16; FRAME_SAMPLES];
    let mut float_in = vec![0.0f32; FRAME_SAMPLES];
    let mut float_out = vec![0.0f32; FRAME_SAMPLES];
    let mut denoised = vec![0i16; FRAME_SAMPLES];
    let mut frames_read: u64 = 0;

    while status.is_running() {
        match source.read(&mut pcm) {
            ReadOutcome::Frame(samples_read) => {
                frames_read += 1;
                let raw = &pcm[..samples_read];
                sink.emit_raw(frame::encode_le(raw));

                frame::to_float(raw, &mut float_in);
                if samples_read < FRAME_SAMPLES {
                    // Partial read: the denoiser still needs a full frame.
                    float_in[samples_read..].fill(0.0);
                }

                let processed = {
                    let mut guard = denoiser
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    guard.process(&float_in, &mut float_out)
                };
                if let Err(err) = processed {
                    // Degraded fallback: pass the frame through unfiltered
                    // rather than failing the session.
                    tracing::warn!(frames_read, error = %err, "denoiser unavailable; bypassing");
                    float_out.copy_from_slice(&float_in);
                }

                frame::to_pcm(&float_out[..samples_read], &mut denoised[..samples_read]);
                sink.emit_denoised(frame::encode_le(&denoised[..samples_read]));

                if frames_read % DIAG_FRAME_INTERVAL == 0 {
                    log_frame_diagnostics(frames_read, raw, &denoised[..samples_read]);
                }
            }
            ReadOutcome::Empty => {
                // Transient: the read already waited one frame period.
                continue;
            }
            ReadOutcome::Fatal(message) => {
                tracing::error!(frames_read, error = %message, "fatal capture read error");
                sink.emit_error(message);
                break;
            }
        }
    }

    tracing::debug!(frames_read, "processing loop exited");
}

/// Periodic health snapshot of the streams, mirroring what operators need
/// when a microphone is silent or suppression is eating the signal.
fn log_frame_diagnostics(frames_read: u64, raw: &[i16], denoised: &[i16]) {
    let raw_non_zero = frame::non_zero_samples(raw);
    let denoised_non_zero = frame::non_zero_samples(denoised);
    tracing::debug!(frames_read, raw_non_zero, denoised_non_zero, "frame diagnostics");
    if raw_non_zero == 0 {
        tracing::warn!(frames_read, "raw frames are all zero; check microphone input");
    } else if denoised_non_zero == 0 {
        tracing::warn!(
            frames_read,
            "denoised frames are all zero despite input; suppression may be too aggressive"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips_through_u8() {
        for phase in [
            LoopPhase::Idle,
            LoopPhase::Starting,
            LoopPhase::Running,
            LoopPhase::Stopping,
        ] {
            assert_eq!(LoopPhase::from_u8(phase.as_u8()), phase);
        }
    }

    #[test]
    fn status_starts_idle_and_not_running() {
        let status = SessionStatus::new();
        assert!(!status.is_running());
        assert_eq!(status.phase(), LoopPhase::Idle);
    }
}
