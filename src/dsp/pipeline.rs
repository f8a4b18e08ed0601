use log::debug;
use serde::{Deserialize, Serialize};

use crate::classifier::FlowClassifier;
use crate::config::PipelineConfig;
use crate::controller::{AdaptationController, ControlStep};
use crate::dsp::artifact::ArtifactFilter;
use crate::dsp::bands::BandFilterBank;
use crate::dsp::features::{CleanedChannel, FeatureExtractor};
use crate::dsp::{Epoch, PipelineError, Sample, SampleBuffer, SampleChunk};
use crate::recommendations::{self, Recommendation};
use crate::types::{EntrainmentMode, FlowMetrics, StimulationParameters};

/// Everything produced for one epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub metrics: FlowMetrics,
    pub control: ControlStep,
}

impl EpochReport {
    pub fn stimulation(&self) -> StimulationParameters {
        self.control.parameters
    }

    /// Detector advisories followed by the controller's.
    pub fn recommendations(&self) -> impl Iterator<Item = &Recommendation> {
        self.metrics
            .recommendations
            .iter()
            .chain(self.control.recommendations.iter())
    }
}

/// Buffer -> artifact filter -> band filters -> features -> classifier -> controller.
///
/// One instance per stream; nothing is shared between instances.
pub struct FlowPipeline {
    config: PipelineConfig,
    buffer: SampleBuffer,
    artifact: ArtifactFilter,
    bank: BandFilterBank,
    extractor: FeatureExtractor,
    classifier: FlowClassifier,
    controller: AdaptationController,
    latest: Option<FlowMetrics>,
    epochs: u64,
    samples_since_epoch: usize,
}

impl FlowPipeline {
    /// Validates the configuration and designs every filter up front.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let fs = config.sample_rate_hz;
        let buffer =
            SampleBuffer::with_history_seconds(config.channel_labels.clone(), fs, config.buffer_seconds)?;
        let artifact = ArtifactFilter::new(&config.artifact, fs)?;
        let bank = BandFilterBank::new(&config.bands, fs)?;
        let extractor = FeatureExtractor::new(&config.features, config.artifact.low_quality_ceiling);
        let classifier = FlowClassifier::new(&config.classifier);
        let controller = AdaptationController::new(&config.controller, config.mode);
        Ok(Self {
            config,
            buffer,
            artifact,
            bank,
            extractor,
            classifier,
            controller,
            latest: None,
            epochs: 0,
            samples_since_epoch: 0,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn push_sample(&mut self, sample: Sample) -> Result<(), PipelineError> {
        self.buffer.push(sample)?;
        self.samples_since_epoch += 1;
        Ok(())
    }

    pub fn push_samples(&mut self, chunk: &SampleChunk) -> Result<(), PipelineError> {
        self.buffer.push_chunk(chunk)?;
        self.samples_since_epoch += chunk.samples_per_channel().unwrap_or(0);
        Ok(())
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// New samples still needed before the next epoch is due.
    pub fn samples_until_ready(&self) -> usize {
        let missing = self.config.epoch_samples().saturating_sub(self.buffer.len());
        if missing > 0 || self.latest.is_none() {
            return missing;
        }
        self.config
            .shift_samples()
            .saturating_sub(self.samples_since_epoch)
    }

    pub fn latest_epoch(&self, duration_seconds: f32) -> Result<Epoch, PipelineError> {
        self.buffer.latest_epoch(duration_seconds)
    }

    /// Analyses the most recent epoch. Only fails with `InsufficientData`.
    pub fn process_epoch(&mut self) -> Result<EpochReport, PipelineError> {
        let epoch = self.buffer.latest_samples(self.config.epoch_samples())?;
        let channels: Vec<CleanedChannel> = epoch
            .samples
            .rows()
            .into_iter()
            .map(|row| {
                let raw = row.to_vec();
                let (filtered, mask) = self.artifact.clean(&raw);
                let quality = self.artifact.channel_quality(&filtered, &mask);
                CleanedChannel {
                    bands: self.bank.filter(&filtered),
                    mask,
                    quality,
                }
            })
            .collect();

        let features = self.extractor.extract(&channels);
        let (state, confidence) = self.classifier.classify(&features, self.extractor.history());
        let low_signal = features.signal_quality < self.config.classifier.min_signal_quality
            || self.artifact.is_low_quality(1.0 - features.clean_fraction);
        if low_signal {
            debug!(
                "epoch {}: low quality (clean {:.2}, quality {:.2})",
                self.epochs, features.clean_fraction, features.signal_quality
            );
        }
        let metrics = FlowMetrics {
            epoch: self.epochs,
            timestamp: epoch.end_timestamp,
            state,
            confidence,
            recommendations: recommendations::for_state(state, &features, low_signal),
            features,
        };
        let control = self.controller.step(&metrics);
        self.extractor.record(metrics.features.clone());
        self.latest = Some(metrics.clone());
        self.epochs += 1;
        self.samples_since_epoch = 0;
        Ok(EpochReport { metrics, control })
    }

    pub fn latest_metrics(&self) -> Option<&FlowMetrics> {
        self.latest.as_ref()
    }

    pub fn stimulation(&self) -> StimulationParameters {
        self.controller.parameters()
    }

    pub fn epochs_processed(&self) -> u64 {
        self.epochs
    }

    pub fn set_mode(&mut self, mode: EntrainmentMode) {
        self.controller.set_entrainment_mode(mode);
    }

    pub fn mode(&self) -> EntrainmentMode {
        self.controller.entrainment_mode()
    }

    pub fn set_recovery_score(&mut self, score: f32) {
        self.controller.set_recovery_score(score);
    }

    /// Drops buffered samples and feature history; stimulation state is kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.extractor.reset();
        self.samples_since_epoch = 0;
        self.latest = None;
    }
}
