//! CLI options and pipeline parameters.

use clap::Parser;

/// Frames buffered between the hardware callback and the processing loop.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Events buffered between the processing loop and the consumer.
pub const DEFAULT_SINK_CAPACITY: usize = 256;

/// CLI options for the demo binary.
#[derive(Debug, Parser, Clone)]
#[command(about = "Real-time RNNoise microphone denoising", version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// How long to run the capture session, in seconds
    #[arg(long = "duration-secs", default_value_t = 5)]
    pub duration_secs: u64,

    /// Emit newline-delimited JSON events instead of a summary
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Write a JSON trace log (path from RNNOISE_STREAM_TRACE_LOG)
    #[arg(long, default_value_t = false)]
    pub logs: bool,

    /// Capture frame channel capacity
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl AppConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            input_device: self.input_device.clone(),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Library-facing pipeline parameters. Sample rate, channel count, and frame
/// length are fixed by the session format and are not configurable here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Preferred input device; `None` uses the system default.
    pub input_device: Option<String>,
    /// Capacity of the callback → loop frame channel.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_and_map_to_pipeline_config() {
        let config = AppConfig::parse_from(["rnnoise-stream"]);
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.input_device, None);
        assert_eq!(pipeline.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn device_flag_is_forwarded() {
        let config = AppConfig::parse_from(["rnnoise-stream", "--input-device", "USB Mic"]);
        assert_eq!(
            config.pipeline_config().input_device.as_deref(),
            Some("USB Mic")
        );
    }
}
