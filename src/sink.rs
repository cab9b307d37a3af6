//! Asynchronous delivery of frames and error events to the consumer.
//!
//! The processing loop fires events and moves on; consumer-side slowness must
//! never translate into audio dropouts. Per-stream ordering (raw, denoised,
//! error) is preserved by channel FIFO order.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One delivery to the consumer. Frame payloads are little-endian 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    RawFrame(Vec<u8>),
    DenoisedFrame(Vec<u8>),
    Error(String),
}

/// Fire-and-forget event consumer.
///
/// Every method must return without blocking; implementations that cannot
/// accept an event drop it rather than stall the loop.
pub trait FrameSink: Send + Sync {
    fn emit_raw(&self, frame: Vec<u8>);
    fn emit_denoised(&self, frame: Vec<u8>);
    fn emit_error(&self, message: String);
}

/// Channel-backed sink: the consumer drains a [`Receiver`] on its own
/// execution context, decoupled from the audio thread.
#[derive(Clone)]
pub struct ChannelSink {
    sender: Sender<SinkEvent>,
    dropped: Arc<AtomicUsize>,
}

impl ChannelSink {
    /// Bounded variant: overflow drops the event and counts it.
    pub fn bounded(capacity: usize) -> (Self, Receiver<SinkEvent>) {
        let (sender, receiver) = bounded(capacity.max(1));
        (
            Self {
                sender,
                dropped: Arc::new(AtomicUsize::new(0)),
            },
            receiver,
        )
    }

    /// Unbounded variant: never drops; sends never block.
    pub fn unbounded() -> (Self, Receiver<SinkEvent>) {
        let (sender, receiver) = unbounded();
        (
            Self {
                sender,
                dropped: Arc::new(AtomicUsize::new(0)),
            },
            receiver,
        )
    }

    /// Events discarded because the consumer fell behind.
    pub fn dropped_events(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, event: SinkEvent) {
        if let Err(err) = self.sender.try_send(event) {
            match err {
                TrySendError::Full(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                // Consumer went away; nothing useful left to do with events.
                TrySendError::Disconnected(_) => {}
            }
        }
    }
}

impl FrameSink for ChannelSink {
    fn emit_raw(&self, frame: Vec<u8>) {
        self.push(SinkEvent::RawFrame(frame));
    }

    fn emit_denoised(&self, frame: Vec<u8>) {
        self.push(SinkEvent::DenoisedFrame(frame));
    }

    fn emit_error(&self, message: String) {
        self.push(SinkEvent::Error(message));
    }
}
