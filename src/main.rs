//! Demo binary: run the denoising pipeline against the system microphone and
//! report what the consumer would have received.

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use rnnoise_stream::bridge::Event;
use rnnoise_stream::config::{AppConfig, DEFAULT_SINK_CAPACITY};
use rnnoise_stream::sink::{ChannelSink, SinkEvent};
use rnnoise_stream::{capture, telemetry, ProcessorRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    let config = AppConfig::parse();
    telemetry::init_tracing(config.logs);

    if config.list_input_devices {
        for name in capture::list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    let (sink, events) = ChannelSink::bounded(DEFAULT_SINK_CAPACITY);
    let mut registry = ProcessorRegistry::new(config.pipeline_config());
    registry.attach_sink(Arc::new(sink.clone()));

    let id = registry.create_processor()?;
    tracing::info!(id = id.value(), "processor created");
    registry.start_processing()?;

    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);
    let mut raw_frames = 0u64;
    let mut denoised_frames = 0u64;
    let mut errors = 0u64;

    // Consumer side: drain events on this thread until the clock runs out.
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                match &event {
                    SinkEvent::RawFrame(_) => raw_frames += 1,
                    SinkEvent::DenoisedFrame(_) => denoised_frames += 1,
                    SinkEvent::Error(message) => {
                        errors += 1;
                        eprintln!("audio error: {message}");
                    }
                }
                if config.json {
                    println!("{}", serde_json::to_string(&Event::from(event))?);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    registry.stop_processing();
    registry.destroy_processor();

    if !config.json {
        println!(
            "raw frames: {raw_frames}, denoised frames: {denoised_frames}, errors: {errors}, dropped events: {}",
            sink.dropped_events()
        );
    }
    Ok(())
}
