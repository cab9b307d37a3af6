//! Error taxonomy for processor lifecycle and the host-facing bridge.
//!
//! Transient conditions (an empty capture read) are handled inside the loop
//! and never appear here. Everything else maps onto one of the bridge error
//! codes so host runtimes can branch on a stable string.

use std::fmt;

/// Errors surfaced synchronously by registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// The denoiser state could not be allocated.
    Allocation(String),
    /// An operation was attempted on a missing or destroyed handle.
    InvalidState(&'static str),
    /// The consumer context is not wired up (no sink attached).
    Init(&'static str),
    /// The capture backend could not be opened or negotiated.
    BackendInit(String),
}

impl ProcessorError {
    /// Stable error code exposed over the bridge.
    pub fn code(&self) -> &'static str {
        match self {
            ProcessorError::Allocation(_) => "RNNOISE_ERROR",
            ProcessorError::InvalidState(_) => "STATE_ERROR",
            ProcessorError::Init(_) => "INIT_ERROR",
            ProcessorError::BackendInit(_) => "AUDIO_ERROR",
        }
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessorError::Allocation(msg) => write!(f, "denoiser allocation failed: {msg}"),
            ProcessorError::InvalidState(msg) => write!(f, "invalid processor state: {msg}"),
            ProcessorError::Init(msg) => write!(f, "bridge not initialized: {msg}"),
            ProcessorError::BackendInit(msg) => write!(f, "capture backend failed: {msg}"),
        }
    }
}

impl std::error::Error for ProcessorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_bridge_contract() {
        assert_eq!(
            ProcessorError::Allocation("oom".into()).code(),
            "RNNOISE_ERROR"
        );
        assert_eq!(ProcessorError::InvalidState("no handle").code(), "STATE_ERROR");
        assert_eq!(ProcessorError::Init("no sink").code(), "INIT_ERROR");
        assert_eq!(
            ProcessorError::BackendInit("device busy".into()).code(),
            "AUDIO_ERROR"
        );
    }

    #[test]
    fn display_includes_detail() {
        let err = ProcessorError::BackendInit("no default input device".into());
        assert!(err.to_string().contains("no default input device"));
    }
}
