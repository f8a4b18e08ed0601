use std::collections::VecDeque;
use std::f64::consts::PI;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::dsp::PipelineError;

/// One multi-channel reading. Immutable once buffered.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub values: Vec<f32>,
}

/// Contiguous block of samples as delivered by the device collaborator.
#[derive(Clone, Debug)]
pub struct SampleChunk {
    /// Timestamp of the first sample, in seconds.
    pub started_at: f64,
    pub sample_rate_hz: f32,
    pub samples: Vec<Vec<f32>>, // channels x samples
    pub channel_labels: Vec<String>,
}

impl SampleChunk {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        let channel_count = self.samples.len();
        if channel_count != self.channel_labels.len() {
            return Err(PipelineError::ChannelMismatch {
                expected: self.channel_labels.len(),
                actual: channel_count,
            });
        }
        if let Some(len) = self.samples_per_channel() {
            if let Some(bad) = self.samples.iter().find(|c| c.len() != len) {
                return Err(PipelineError::InvalidConfig(format!(
                    "ragged chunk: channel lengths {len} and {}",
                    bad.len()
                )));
            }
        }
        Ok(())
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    pub fn samples_per_channel(&self) -> Option<usize> {
        self.samples.first().map(|c| c.len())
    }

    pub fn duration(&self) -> Option<Duration> {
        self.samples_per_channel()
            .map(|len| Duration::from_secs_f32(len as f32 / self.sample_rate_hz))
    }

    /// Transposes the chunk into timestamped multi-channel samples.
    pub fn iter_samples(&self) -> impl Iterator<Item = Sample> + '_ {
        let len = self.samples_per_channel().unwrap_or(0);
        let dt = 1.0 / self.sample_rate_hz as f64;
        (0..len).map(move |i| Sample {
            timestamp: self.started_at + i as f64 * dt,
            values: self.samples.iter().map(|channel| channel[i]).collect(),
        })
    }
}

/// Anything that can yield sample chunks on demand.
pub trait SampleSource {
    fn next_chunk(&mut self) -> Result<Option<SampleChunk>, PipelineError>;
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<SampleChunk>,
}

impl ManualSource {
    pub fn new(chunks: impl IntoIterator<Item = SampleChunk>) -> Self {
        Self {
            queue: chunks.into_iter().collect(),
        }
    }
}

impl SampleSource for ManualSource {
    fn next_chunk(&mut self) -> Result<Option<SampleChunk>, PipelineError> {
        Ok(self.queue.pop_front())
    }
}

/// A sinusoid mixed into every synthetic channel.
#[derive(Clone, Copy, Debug)]
pub struct Oscillation {
    pub freq_hz: f32,
    pub amplitude_uv: f32,
}

/// Generates sums of sinusoids plus Gaussian-ish noise, optionally paced in real time.
pub struct SyntheticSource {
    sample_rate_hz: f32,
    channel_labels: Vec<String>,
    components: Vec<Oscillation>,
    noise_uv: f32,
    chunk_len: usize,
    remaining_chunks: Option<usize>,
    realtime: bool,
    next_index: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(sample_rate_hz: f32, channel_labels: Vec<String>, components: Vec<Oscillation>) -> Self {
        let chunk_len = ((sample_rate_hz / 16.0).round() as usize).max(1);
        Self {
            sample_rate_hz,
            channel_labels,
            components,
            noise_uv: 0.0,
            chunk_len,
            remaining_chunks: None,
            realtime: false,
            next_index: 0,
            rng: StdRng::seed_from_u64(7),
        }
    }

    pub fn with_noise(mut self, noise_uv: f32, seed: u64) -> Self {
        self.noise_uv = noise_uv.max(0.0);
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    /// Stop after this many chunks instead of streaming forever.
    pub fn limited_to(mut self, chunks: usize) -> Self {
        self.remaining_chunks = Some(chunks);
        self
    }

    /// Sleep for each chunk's duration, emulating a device cadence.
    pub fn realtime(mut self, enabled: bool) -> Self {
        self.realtime = enabled;
        self
    }

    fn value_at(&mut self, index: u64) -> f32 {
        let t = index as f64 / self.sample_rate_hz as f64;
        let clean: f64 = self
            .components
            .iter()
            .map(|c| c.amplitude_uv as f64 * (2.0 * PI * c.freq_hz as f64 * t).sin())
            .sum();
        let noise = if self.noise_uv > 0.0 {
            // Sum of uniforms approximates a normal distribution.
            let u: f32 = (0..4).map(|_| self.rng.gen_range(-1.0f32..1.0)).sum();
            u * 0.5 * self.noise_uv
        } else {
            0.0
        };
        clean as f32 + noise
    }
}

impl SampleSource for SyntheticSource {
    fn next_chunk(&mut self) -> Result<Option<SampleChunk>, PipelineError> {
        if let Some(remaining) = self.remaining_chunks.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }
        let start = self.next_index;
        let mut samples = vec![Vec::with_capacity(self.chunk_len); self.channel_labels.len()];
        for offset in 0..self.chunk_len as u64 {
            for channel in samples.iter_mut() {
                let value = self.value_at(start + offset);
                channel.push(value);
            }
        }
        self.next_index += self.chunk_len as u64;
        let chunk = SampleChunk {
            started_at: start as f64 / self.sample_rate_hz as f64,
            sample_rate_hz: self.sample_rate_hz,
            samples,
            channel_labels: self.channel_labels.clone(),
        };
        if self.realtime {
            if let Some(duration) = chunk.duration() {
                thread::sleep(duration);
            }
        }
        Ok(Some(chunk))
    }
}

/// Lightweight helper to produce a chunk from owned sample data.
pub fn make_chunk(
    started_at: f64,
    sample_rate_hz: f32,
    samples: Vec<Vec<f32>>,
    channel_labels: Vec<String>,
) -> SampleChunk {
    SampleChunk {
        started_at,
        sample_rate_hz,
        samples,
        channel_labels,
    }
}
