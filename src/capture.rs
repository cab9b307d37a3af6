//! Microphone frame acquisition via CPAL.
//!
//! The hardware callback thread never blocks: samples are downmixed to mono,
//! chopped into fixed 480-sample PCM frames, and handed to the processing
//! loop over a bounded channel. A full channel drops the frame and counts it
//! rather than stalling the callback.

use crate::config::PipelineConfig;
use crate::frame::{frame_period, FRAME_SAMPLES, SAMPLE_RATE};
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of a single capture read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A frame with this many valid samples was written into the buffer.
    Frame(usize),
    /// No data yet; transient, the loop keeps going.
    Empty,
    /// Unrecoverable backend failure; the session must terminate.
    Fatal(String),
}

/// A source of fixed-size integer PCM frames.
///
/// Implementations live on the processing thread for their whole life, so the
/// trait itself carries no `Send` bound; only the factory that builds one
/// crosses threads.
pub trait CaptureSource {
    /// Read one frame into the prefix of `frame`.
    ///
    /// Blocks for at most one frame period before reporting
    /// [`ReadOutcome::Empty`].
    fn read(&mut self, frame: &mut [i16]) -> ReadOutcome;

    /// Release the backend resource. Safe to call more than once.
    fn close(&mut self);
}

/// Builds a capture source on the processing thread.
///
/// CPAL streams are not `Send`, so the source is constructed where it will be
/// used; construction failure is the backend-init error checked once at
/// session start.
pub type CaptureFactory = Box<dyn FnOnce() -> Result<Box<dyn CaptureSource>> + Send>;

/// List input device names for operator diagnostics.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("no input devices available")?;
    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            names.push(name);
        }
    }
    Ok(names)
}

/// Callback-side accumulator: downmixes to mono, converts to i16, and emits
/// whole frames into the channel without ever blocking.
struct FramePump {
    pending: Vec<f32>,
    sender: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
}

impl FramePump {
    fn new(sender: Sender<Vec<i16>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            pending: Vec::with_capacity(FRAME_SAMPLES * 2),
            sender,
            dropped,
        }
    }

    fn push<T, F>(&mut self, data: &[T], channels: usize, mut convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        if channels <= 1 {
            self.pending.extend(data.iter().copied().map(&mut convert));
        } else {
            // Average each interleaved group to produce mono.
            let mut acc = 0.0f32;
            let mut count = 0usize;
            for sample in data.iter().copied() {
                acc += convert(sample);
                count += 1;
                if count == channels {
                    self.pending.push(acc / channels as f32);
                    acc = 0.0;
                    count = 0;
                }
            }
            if count > 0 {
                self.pending.push(acc / count as f32);
            }
        }

        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<i16> = self
                .pending
                .drain(..FRAME_SAMPLES)
                .map(|sample| (sample * 32_768.0).round().clamp(-32_768.0, 32_767.0) as i16)
                .collect();
            if let Err(err) = self.sender.try_send(frame) {
                match err {
                    TrySendError::Full(_) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    TrySendError::Disconnected(_) => break,
                }
            }
        }
    }
}

/// Loop-side receiver: turns channel traffic into [`ReadOutcome`]s.
///
/// Split out of the CPAL source so the read policy (timeout, oversize,
/// disconnect, deferred stream errors) is testable without audio hardware.
pub(crate) struct FrameReceiver {
    receiver: Receiver<Vec<i16>>,
    stream_error: Arc<Mutex<Option<String>>>,
    wait: Duration,
}

impl FrameReceiver {
    pub(crate) fn new(
        receiver: Receiver<Vec<i16>>,
        stream_error: Arc<Mutex<Option<String>>>,
        wait: Duration,
    ) -> Self {
        Self {
            receiver,
            stream_error,
            wait,
        }
    }

    pub(crate) fn read_into(&mut self, frame: &mut [i16]) -> ReadOutcome {
        if let Some(message) = self
            .stream_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            return ReadOutcome::Fatal(format!("audio stream error: {message}"));
        }
        match self.receiver.recv_timeout(self.wait) {
            Ok(samples) => {
                if samples.len() > frame.len() {
                    // Backend contract violation, not something to truncate away.
                    return ReadOutcome::Fatal(format!(
                        "capture produced {} samples for a {}-sample frame",
                        samples.len(),
                        frame.len()
                    ));
                }
                frame[..samples.len()].copy_from_slice(&samples);
                ReadOutcome::Frame(samples.len())
            }
            Err(RecvTimeoutError::Timeout) => ReadOutcome::Empty,
            Err(RecvTimeoutError::Disconnected) => {
                ReadOutcome::Fatal("audio capture channel disconnected".to_string())
            }
        }
    }
}

/// CPAL-backed capture source at the fixed session rate.
pub struct CpalCaptureSource {
    stream: Option<cpal::Stream>,
    frames: FrameReceiver,
    dropped: Arc<AtomicUsize>,
}

impl CpalCaptureSource {
    /// Open the preferred (or default) input device at 24 kHz and start the
    /// stream. Every failure here is terminal for the start request.
    pub fn open(config: &PipelineConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = match config.input_device.as_deref() {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        let device_name = device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string());

        let default_config = device
            .default_input_config()
            .context("input device rejected format query")?;
        let format = default_config.sample_format();
        let channels = usize::from(default_config.channels().max(1));
        let stream_config = StreamConfig {
            channels: default_config.channels().max(1),
            sample_rate: SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        tracing::debug!(
            device = %device_name,
            ?format,
            channels,
            sample_rate = SAMPLE_RATE,
            "opening capture stream"
        );

        let (sender, receiver) = bounded::<Vec<i16>>(config.channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let pump = Arc::new(Mutex::new(FramePump::new(sender, dropped.clone())));
        let stream_error = Arc::new(Mutex::new(None::<String>));

        let err_slot = stream_error.clone();
        let err_fn = move |err: cpal::StreamError| {
            let mut slot = err_slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(err.to_string());
        };

        let stream = match format {
            SampleFormat::F32 => {
                let pump = pump.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = pump.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let pump = pump.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = pump.try_lock() {
                            pump.push(data, channels, |sample| f32::from(sample) / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let pump = pump.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = pump.try_lock() {
                            pump.push(data, channels, |sample| {
                                (f32::from(sample) - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play().context("failed to start capture stream")?;

        Ok(Self {
            stream: Some(stream),
            frames: FrameReceiver::new(receiver, stream_error, frame_period()),
            dropped,
        })
    }

    /// Frames discarded because the loop fell behind the hardware callback.
    pub fn dropped_frames(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl CaptureSource for CpalCaptureSource {
    fn read(&mut self, frame: &mut [i16]) -> ReadOutcome {
        self.frames.read_into(frame)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                tracing::debug!(error = %err, "failed to pause capture stream");
            }
            drop(stream);
        }
    }
}

impl Drop for CpalCaptureSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn receiver_with(
        frames: Vec<Vec<i16>>,
        error: Option<&str>,
        disconnect: bool,
    ) -> FrameReceiver {
        let (tx, rx) = unbounded();
        for frame in frames {
            tx.send(frame).unwrap();
        }
        if disconnect {
            drop(tx);
        } else {
            std::mem::forget(tx);
        }
        FrameReceiver::new(
            rx,
            Arc::new(Mutex::new(error.map(str::to_string))),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn read_copies_frame_into_prefix() {
        let mut frames = receiver_with(vec![vec![1, 2, 3]], None, false);
        let mut buf = [0i16; 5];
        assert_eq!(frames.read_into(&mut buf), ReadOutcome::Frame(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn read_times_out_as_empty() {
        let mut frames = receiver_with(Vec::new(), None, false);
        let mut buf = [0i16; 4];
        assert_eq!(frames.read_into(&mut buf), ReadOutcome::Empty);
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let mut frames = receiver_with(vec![vec![0; 6]], None, false);
        let mut buf = [0i16; 4];
        match frames.read_into(&mut buf) {
            ReadOutcome::Fatal(msg) => assert!(msg.contains("6 samples")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_is_fatal() {
        let mut frames = receiver_with(Vec::new(), None, true);
        let mut buf = [0i16; 4];
        match frames.read_into(&mut buf) {
            ReadOutcome::Fatal(msg) => assert!(msg.contains("disconnected")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn stream_error_reported_before_pending_frames() {
        let mut frames = receiver_with(vec![vec![1, 2]], Some("device unplugged"), false);
        let mut buf = [0i16; 4];
        match frames.read_into(&mut buf) {
            ReadOutcome::Fatal(msg) => assert!(msg.contains("device unplugged")),
            other => panic!("expected fatal, got {other:?}"),
        }
    }

    #[test]
    fn pump_emits_fixed_frames_and_counts_drops() {
        let (tx, rx) = bounded::<Vec<i16>>(1);
        let dropped = Arc::new(AtomicUsize::new(0));
        let mut pump = FramePump::new(tx, dropped.clone());

        let block = vec![0.25f32; FRAME_SAMPLES * 3];
        pump.push(&block, 1, |sample| sample);

        let first = rx.recv().unwrap();
        assert_eq!(first.len(), FRAME_SAMPLES);
        assert_eq!(first[0], 8192);
        // Capacity one: the second and third frames were dropped, not blocked on.
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn pump_downmixes_interleaved_channels() {
        let (tx, rx) = bounded::<Vec<i16>>(4);
        let mut pump = FramePump::new(tx, Arc::new(AtomicUsize::new(0)));

        let mut block = Vec::with_capacity(FRAME_SAMPLES * 2);
        for _ in 0..FRAME_SAMPLES {
            block.push(1.0f32);
            block.push(-1.0f32);
        }
        pump.push(&block, 2, |sample| sample);

        let frame = rx.recv().unwrap();
        assert!(frame.iter().all(|&sample| sample == 0));
    }
}
