// src/main.rs
use std::env;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use neuroflow::dsp::{Oscillation, SyntheticSource};
use neuroflow::types::EngineEvent;
use neuroflow::{spawn_pipeline, FlowState, PipelineConfig, Recommendation, StimulationParameters};

#[derive(Serialize)]
struct EpochLine<'a> {
    epoch: u64,
    timestamp: f64,
    state: FlowState,
    confidence: f32,
    signal_quality: f32,
    flow_probability: f32,
    stimulation: StimulationParameters,
    strobe_hz: f32,
    recommendations: Vec<&'a str>,
}

// Usage: neuroflow [config.json] [seconds]
fn main() -> Result<()> {
    env_logger::init();
    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => PipelineConfig::default(),
    };
    let run_for = match args.next() {
        Some(raw) => Duration::from_secs_f32(
            raw.parse::<f32>()
                .with_context(|| format!("invalid duration {raw:?}"))?,
        ),
        None => Duration::from_secs(20),
    };

    // Alpha-dominant signal with some theta and a little beta on top of noise.
    let source = SyntheticSource::new(
        config.sample_rate_hz,
        config.channel_labels.clone(),
        vec![
            Oscillation { freq_hz: 10.0, amplitude_uv: 12.0 },
            Oscillation { freq_hz: 6.0, amplitude_uv: 6.0 },
            Oscillation { freq_hz: 20.0, amplitude_uv: 3.0 },
        ],
    )
    .with_noise(2.0, 42)
    .realtime(true);

    info!(
        "starting pipeline: {} channels at {} Hz for {:?}",
        config.channel_labels.len(),
        config.sample_rate_hz,
        run_for
    );
    let handle = spawn_pipeline(config, source).context("building pipeline")?;
    let started = Instant::now();
    while started.elapsed() < run_for {
        let Ok(event) = handle.events().recv_timeout(Duration::from_millis(250)) else {
            continue;
        };
        match event {
            EngineEvent::Epoch(report) => {
                let m = &report.metrics;
                let line = EpochLine {
                    epoch: m.epoch,
                    timestamp: m.timestamp,
                    state: m.state,
                    confidence: m.confidence,
                    signal_quality: m.signal_quality(),
                    flow_probability: m.flow_probability(),
                    stimulation: report.stimulation(),
                    strobe_hz: report.stimulation().strobe_frequency(),
                    recommendations: report.recommendations().map(Recommendation::message).collect(),
                };
                println!("{}", serde_json::to_string(&line)?);
            }
            EngineEvent::Buffering { available, required } => {
                info!("buffering {available}/{required} samples");
            }
            EngineEvent::Stopped { epochs } => {
                info!("stopped after {epochs} epochs");
                return Ok(());
            }
        }
    }
    handle.stop();
    Ok(())
}
