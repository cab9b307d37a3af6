//! JSON protocol for driving the processor from a host runtime.
//!
//! Commands and events are newline-delimited JSON with a tag field, so any
//! embedding (Flutter method channel, Electron, a plain socket) can speak to
//! the registry without linking against the crate's types.

use crate::error::ProcessorError;
use crate::registry::ProcessorRegistry;
use crate::sink::SinkEvent;
use serde::{Deserialize, Serialize};

/// Commands received from the host (host → processor).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    #[serde(rename = "create_processor")]
    CreateProcessor,

    #[serde(rename = "destroy_processor")]
    DestroyProcessor,

    #[serde(rename = "start_processing")]
    StartProcessing,

    #[serde(rename = "stop_processing")]
    StopProcessing,
}

/// Events emitted to the host (processor → host).
///
/// Frame payloads are little-endian 16-bit PCM bytes of exactly one frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    #[serde(rename = "created")]
    Created { processor_id: u64 },

    #[serde(rename = "destroyed")]
    Destroyed,

    #[serde(rename = "started")]
    Started,

    #[serde(rename = "stopped")]
    Stopped,

    #[serde(rename = "raw_audio_frame")]
    RawAudioFrame { bytes: Vec<u8> },

    #[serde(rename = "denoised_audio_frame")]
    DenoisedAudioFrame { bytes: Vec<u8> },

    #[serde(rename = "audio_error")]
    AudioError { message: String },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl From<ProcessorError> for Event {
    fn from(err: ProcessorError) -> Self {
        Event::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Translate loop-side sink traffic into host events.
impl From<SinkEvent> for Event {
    fn from(event: SinkEvent) -> Self {
        match event {
            SinkEvent::RawFrame(bytes) => Event::RawAudioFrame { bytes },
            SinkEvent::DenoisedFrame(bytes) => Event::DenoisedAudioFrame { bytes },
            SinkEvent::Error(message) => Event::AudioError { message },
        }
    }
}

/// Apply one command to the registry and produce the reply event.
pub fn handle_command(registry: &mut ProcessorRegistry, command: Command) -> Event {
    match command {
        Command::CreateProcessor => match registry.create_processor() {
            Ok(id) => Event::Created {
                processor_id: id.value(),
            },
            Err(err) => err.into(),
        },
        Command::DestroyProcessor => {
            registry.destroy_processor();
            Event::Destroyed
        }
        Command::StartProcessing => match registry.start_processing() {
            Ok(()) => Event::Started,
            Err(err) => err.into(),
        },
        Command::StopProcessing => {
            registry.stop_processing();
            Event::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    #[test]
    fn commands_deserialize_from_tagged_json() {
        let command: Command = serde_json::from_str(r#"{"cmd":"create_processor"}"#).unwrap();
        assert!(matches!(command, Command::CreateProcessor));
        let command: Command = serde_json::from_str(r#"{"cmd":"stop_processing"}"#).unwrap();
        assert!(matches!(command, Command::StopProcessing));
    }

    #[test]
    fn events_serialize_with_tag_and_payload() {
        let json = serde_json::to_string(&Event::RawAudioFrame {
            bytes: vec![1, 2],
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"raw_audio_frame","bytes":[1,2]}"#);

        let json = serde_json::to_string(&Event::AudioError {
            message: "mic gone".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"audio_error","message":"mic gone"}"#);
    }

    #[test]
    fn error_event_carries_bridge_code() {
        let event: Event = ProcessorError::InvalidState("no handle").into();
        match event {
            Event::Error { code, .. } => assert_eq!(code, "STATE_ERROR"),
            other => panic!("expected error event, got {other:?}"),
        }
    }

    #[test]
    fn lifecycle_commands_round_trip_through_registry() {
        let mut registry = ProcessorRegistry::new(PipelineConfig::default());

        // Start before create reports the missing-handle state error.
        match handle_command(&mut registry, Command::StartProcessing) {
            Event::Error { code, .. } => assert_eq!(code, "STATE_ERROR"),
            other => panic!("expected error, got {other:?}"),
        }

        match handle_command(&mut registry, Command::CreateProcessor) {
            Event::Created { processor_id } => assert!(processor_id > 0),
            other => panic!("expected created, got {other:?}"),
        }
        assert!(matches!(
            handle_command(&mut registry, Command::StopProcessing),
            Event::Stopped
        ));
        assert!(matches!(
            handle_command(&mut registry, Command::DestroyProcessor),
            Event::Destroyed
        ));
    }
}
