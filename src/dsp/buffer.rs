use std::collections::VecDeque;

use ndarray::Array2;

use crate::dsp::{PipelineError, Sample, SampleChunk};

/// Most recent window of samples, ready for analysis.
#[derive(Clone, Debug)]
pub struct Epoch {
    pub sample_rate_hz: f32,
    pub channel_labels: Vec<String>,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    pub samples: Array2<f32>, // channels x samples
}

impl Epoch {
    pub fn num_channels(&self) -> usize {
        self.samples.nrows()
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.len() as f32 / self.sample_rate_hz
    }
}

/// Fixed-capacity ring of raw samples per channel, overwritten oldest-first.
///
/// Single writer, single reader: callers that split ingestion and processing
/// across threads hand samples over a channel instead of sharing the buffer.
pub struct SampleBuffer {
    per_channel: Vec<VecDeque<f32>>, // channel -> samples
    timestamps: VecDeque<f64>,
    channel_labels: Vec<String>,
    sample_rate_hz: f32,
    capacity: usize,
}

impl SampleBuffer {
    pub fn with_history_seconds(
        channel_labels: Vec<String>,
        sample_rate_hz: f32,
        history_seconds: f32,
    ) -> Result<Self, PipelineError> {
        if !(sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        if channel_labels.is_empty() {
            return Err(PipelineError::EmptyChannelList);
        }
        let capacity = ((sample_rate_hz * history_seconds).round() as usize).max(1);
        let per_channel = channel_labels
            .iter()
            .map(|_| VecDeque::with_capacity(capacity))
            .collect();
        Ok(Self {
            per_channel,
            timestamps: VecDeque::with_capacity(capacity),
            channel_labels,
            sample_rate_hz,
            capacity,
        })
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    pub fn channel_labels(&self) -> &[String] {
        &self.channel_labels
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.timestamps.back().copied()
    }

    pub fn push(&mut self, sample: Sample) -> Result<(), PipelineError> {
        if sample.values.len() != self.per_channel.len() {
            return Err(PipelineError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: sample.values.len(),
            });
        }
        self.check_monotonic(sample.timestamp)?;
        if self.timestamps.len() == self.capacity {
            self.timestamps.pop_front();
            for channel_queue in &mut self.per_channel {
                channel_queue.pop_front();
            }
        }
        self.timestamps.push_back(sample.timestamp);
        for (channel_queue, value) in self.per_channel.iter_mut().zip(sample.values) {
            channel_queue.push_back(value);
        }
        Ok(())
    }

    pub fn push_chunk(&mut self, chunk: &SampleChunk) -> Result<(), PipelineError> {
        chunk.validate()?;
        if chunk.num_channels() != self.per_channel.len() {
            return Err(PipelineError::ChannelMismatch {
                expected: self.per_channel.len(),
                actual: chunk.num_channels(),
            });
        }
        if chunk.sample_rate_hz != self.sample_rate_hz {
            return Err(PipelineError::InvalidConfig(format!(
                "sample rate mismatch: expected {}, got {}",
                self.sample_rate_hz, chunk.sample_rate_hz
            )));
        }
        if chunk.samples_per_channel().unwrap_or(0) > 0 {
            self.check_monotonic(chunk.started_at)?;
        }
        for sample in chunk.iter_samples() {
            self.push(sample)?;
        }
        Ok(())
    }

    /// The most recent `duration_seconds` of samples for every channel.
    pub fn latest_epoch(&self, duration_seconds: f32) -> Result<Epoch, PipelineError> {
        let required = ((self.sample_rate_hz * duration_seconds).round() as usize).max(1);
        self.latest_samples(required)
    }

    pub fn latest_samples(&self, required: usize) -> Result<Epoch, PipelineError> {
        let available = self.len();
        if required == 0 || required > available {
            return Err(PipelineError::InsufficientData {
                required,
                available,
            });
        }
        let start = available - required;
        let samples = Array2::from_shape_fn((self.per_channel.len(), required), |(c, i)| {
            self.per_channel[c][start + i]
        });
        Ok(Epoch {
            sample_rate_hz: self.sample_rate_hz,
            channel_labels: self.channel_labels.clone(),
            start_timestamp: self.timestamps[start],
            end_timestamp: self.timestamps[available - 1],
            samples,
        })
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        for channel_queue in &mut self.per_channel {
            channel_queue.clear();
        }
    }

    fn check_monotonic(&self, timestamp: f64) -> Result<(), PipelineError> {
        match self.timestamps.back() {
            Some(&previous) if !(timestamp > previous) => Err(PipelineError::NonMonotonicTimestamp {
                previous,
                current: timestamp,
            }),
            _ => Ok(()),
        }
    }
}
