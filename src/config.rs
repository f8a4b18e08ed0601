// src/config.rs
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::PipelineError;
use crate::types::{Band, EntrainmentMode};

pub const CONFIG_VERSION: u32 = 1;

/// Top-level settings for one pipeline instance. Fixed after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub version: u32,
    pub sample_rate_hz: f32,
    pub channel_labels: Vec<String>,
    /// Rolling raw-sample history kept per channel.
    pub buffer_seconds: f32,
    /// Analysis window length.
    pub epoch_seconds: f32,
    /// New data required between consecutive epochs.
    pub shift_seconds: f32,
    pub mode: EntrainmentMode,
    pub artifact: ArtifactConfig,
    pub bands: BandConfig,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
    pub controller: ControllerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sample_rate_hz: 256.0,
            channel_labels: ["TP9", "AF7", "AF8", "TP10"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            buffer_seconds: 4.0,
            epoch_seconds: 2.0,
            shift_seconds: 0.5,
            mode: EntrainmentMode::default(),
            artifact: ArtifactConfig::default(),
            bands: BandConfig::default(),
            features: FeatureConfig::default(),
            classifier: ClassifierConfig::default(),
            controller: ControllerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_channels(sample_rate_hz: f32, channel_labels: Vec<String>) -> Self {
        Self {
            sample_rate_hz,
            channel_labels,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn nyquist_hz(&self) -> f32 {
        self.sample_rate_hz * 0.5
    }

    pub fn buffer_samples(&self) -> usize {
        seconds_to_samples(self.buffer_seconds, self.sample_rate_hz)
    }

    pub fn epoch_samples(&self) -> usize {
        seconds_to_samples(self.epoch_seconds, self.sample_rate_hz)
    }

    pub fn shift_samples(&self) -> usize {
        seconds_to_samples(self.shift_seconds, self.sample_rate_hz)
    }

    /// Fails fast on anything that would break steady-state processing.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.version != CONFIG_VERSION {
            return Err(invalid(format!(
                "unsupported config version {} (expected {CONFIG_VERSION})",
                self.version
            )));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        if self.channel_labels.is_empty() {
            return Err(PipelineError::EmptyChannelList);
        }
        require_positive("buffer_seconds", self.buffer_seconds)?;
        require_positive("epoch_seconds", self.epoch_seconds)?;
        require_positive("shift_seconds", self.shift_seconds)?;
        if self.epoch_seconds > self.buffer_seconds {
            return Err(invalid(format!(
                "epoch_seconds {} exceeds buffer_seconds {}",
                self.epoch_seconds, self.buffer_seconds
            )));
        }
        if self.epoch_samples() < 8 {
            return Err(invalid("epoch must span at least 8 samples".into()));
        }
        let nyquist = self.nyquist_hz();
        self.bands.validate(nyquist)?;
        self.artifact.validate(nyquist)?;
        self.features.validate()?;
        self.classifier.validate()?;
        self.controller.validate()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Local mains frequency (50 or 60 Hz).
    pub line_noise_hz: f32,
    pub notch_q: f32,
    pub amplitude_threshold_uv: f32,
    pub gradient_threshold_uv_per_ms: f32,
    pub flatline_ms: f32,
    pub flatline_std_uv: f32,
    /// Excluded fraction above which an epoch is flagged low quality.
    pub low_quality_ceiling: f32,
    pub variance_ceiling_uv2: f32,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            line_noise_hz: 50.0,
            notch_q: 30.0,
            amplitude_threshold_uv: 100.0,
            gradient_threshold_uv_per_ms: 10.0,
            flatline_ms: 100.0,
            flatline_std_uv: 0.1,
            low_quality_ceiling: 0.5,
            variance_ceiling_uv2: 1000.0,
        }
    }
}

impl ArtifactConfig {
    fn validate(&self, nyquist_hz: f32) -> Result<(), PipelineError> {
        require_positive("artifact.line_noise_hz", self.line_noise_hz)?;
        if self.line_noise_hz >= nyquist_hz {
            return Err(PipelineError::CutoffAboveNyquist {
                band: "line_noise".into(),
                cutoff_hz: self.line_noise_hz,
                nyquist_hz,
            });
        }
        require_positive("artifact.notch_q", self.notch_q)?;
        require_positive("artifact.amplitude_threshold_uv", self.amplitude_threshold_uv)?;
        require_positive(
            "artifact.gradient_threshold_uv_per_ms",
            self.gradient_threshold_uv_per_ms,
        )?;
        require_positive("artifact.flatline_ms", self.flatline_ms)?;
        require_positive("artifact.variance_ceiling_uv2", self.variance_ceiling_uv2)?;
        if !(self.flatline_std_uv >= 0.0) {
            return Err(invalid("artifact.flatline_std_uv must be >= 0".into()));
        }
        require_unit("artifact.low_quality_ceiling", self.low_quality_ceiling)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandEdges {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl BandEdges {
    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    /// Butterworth order per edge; must be even.
    pub filter_order: usize,
    pub delta: BandEdges,
    pub theta: BandEdges,
    pub alpha: BandEdges,
    pub beta: BandEdges,
    pub gamma: BandEdges,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            filter_order: 4,
            delta: BandEdges::new(0.5, 4.0),
            theta: BandEdges::new(4.0, 8.0),
            alpha: BandEdges::new(8.0, 13.0),
            beta: BandEdges::new(13.0, 30.0),
            gamma: BandEdges::new(30.0, 100.0),
        }
    }
}

impl BandConfig {
    pub fn edges(&self, band: Band) -> BandEdges {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }

    fn validate(&self, nyquist_hz: f32) -> Result<(), PipelineError> {
        if self.filter_order == 0 || self.filter_order % 2 != 0 || self.filter_order > 8 {
            return Err(invalid(format!(
                "bands.filter_order must be an even number between 2 and 8, got {}",
                self.filter_order
            )));
        }
        for band in Band::ALL {
            let edges = self.edges(band);
            if !(edges.low_hz > 0.0 && edges.low_hz < edges.high_hz) {
                return Err(invalid(format!(
                    "{} band edges must satisfy 0 < low < high, got {}..{}",
                    band.name(),
                    edges.low_hz,
                    edges.high_hz
                )));
            }
            if edges.high_hz >= nyquist_hz {
                return Err(PipelineError::CutoffAboveNyquist {
                    band: band.name().to_string(),
                    cutoff_hz: edges.high_hz,
                    nyquist_hz,
                });
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Denominator floor for band-power ratios.
    pub ratio_floor: f32,
    pub max_ratio: f32,
    pub history_len: usize,
    pub gamma_burst_z: f32,
    pub gamma_burst_min_history: usize,
    /// (left, right) channel indices used for alpha asymmetry.
    pub asymmetry_pair: (usize, usize),
    /// Weights for beta suppression, alpha coherence, gamma bursts, |asymmetry|.
    pub attention_weights: [f32; 4],
    pub ideal_alpha_theta: f32,
    pub ideal_alpha_beta: f32,
    /// Weights for the alpha/theta and alpha/beta closeness scores.
    pub flow_weights: (f32, f32),
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            ratio_floor: 0.1,
            max_ratio: 100.0,
            history_len: 100,
            gamma_burst_z: 2.5,
            gamma_burst_min_history: 10,
            asymmetry_pair: (1, 2),
            attention_weights: [0.25; 4],
            ideal_alpha_theta: 1.5,
            ideal_alpha_beta: 2.0,
            flow_weights: (0.6, 0.4),
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        require_positive("features.ratio_floor", self.ratio_floor)?;
        require_positive("features.max_ratio", self.max_ratio)?;
        require_positive("features.gamma_burst_z", self.gamma_burst_z)?;
        require_positive("features.ideal_alpha_theta", self.ideal_alpha_theta)?;
        require_positive("features.ideal_alpha_beta", self.ideal_alpha_beta)?;
        if self.history_len == 0 {
            return Err(invalid("features.history_len must be > 0".into()));
        }
        require_weights("features.attention_weights", &self.attention_weights)?;
        require_weights(
            "features.flow_weights",
            &[self.flow_weights.0, self.flow_weights.1],
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub min_history: usize,
    pub bootstrap_confidence: f32,
    pub min_signal_quality: f32,
    pub stability_weight: f32,
    pub quality_weight: f32,
    pub flow_alpha_theta: f32,
    pub deep_flow_theta_beta: f32,
    pub anxiety_beta_alpha: f32,
    pub boredom_attention: f32,
    pub fallback_flow_probability: f32,
    pub fallback_anxiety_load: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_history: 10,
            bootstrap_confidence: 0.5,
            min_signal_quality: 0.2,
            stability_weight: 0.5,
            quality_weight: 0.5,
            flow_alpha_theta: 1.5,
            deep_flow_theta_beta: 1.2,
            anxiety_beta_alpha: 1.3,
            boredom_attention: 0.3,
            fallback_flow_probability: 0.6,
            fallback_anxiety_load: 0.6,
        }
    }
}

impl ClassifierConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        require_unit("classifier.bootstrap_confidence", self.bootstrap_confidence)?;
        require_unit("classifier.min_signal_quality", self.min_signal_quality)?;
        require_unit("classifier.boredom_attention", self.boredom_attention)?;
        require_unit(
            "classifier.fallback_flow_probability",
            self.fallback_flow_probability,
        )?;
        require_unit("classifier.fallback_anxiety_load", self.fallback_anxiety_load)?;
        require_positive("classifier.flow_alpha_theta", self.flow_alpha_theta)?;
        require_positive("classifier.deep_flow_theta_beta", self.deep_flow_theta_beta)?;
        require_positive("classifier.anxiety_beta_alpha", self.anxiety_beta_alpha)?;
        require_weights(
            "classifier.stability_weight/quality_weight",
            &[self.stability_weight, self.quality_weight],
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub min: f32,
    pub max: f32,
}

impl FrequencyRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    /// Overlap of two ranges, falling back to `self` when they are disjoint.
    pub fn intersect(&self, other: &FrequencyRange) -> FrequencyRange {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        if min <= max {
            FrequencyRange::new(min, max)
        } else {
            *self
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub carrier_range: FrequencyRange,
    pub beat_range: FrequencyRange,
    pub default_carrier_hz: f32,
    /// Largest relative frequency change per epoch.
    pub max_step_fraction: f32,
    pub coupling_step: f32,
    pub phase_lag_step: f32,
    pub stability_threshold: f32,
    pub min_confidence: f32,
    pub min_phase_sync: f32,
    pub recovery_threshold: f32,
    /// Exponential smoothing factor used while maintaining.
    pub smoothing: f32,
    pub history_len: usize,
    pub challenge_step: f32,
    pub challenge_range: (f32, f32),
    pub effective_flow_probability: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            carrier_range: FrequencyRange::new(100.0, 400.0),
            beat_range: FrequencyRange::new(0.5, 40.0),
            default_carrier_hz: 200.0,
            max_step_fraction: 0.02,
            coupling_step: 0.05,
            phase_lag_step: 0.05,
            stability_threshold: 0.5,
            min_confidence: 0.3,
            min_phase_sync: 0.2,
            recovery_threshold: 0.7,
            smoothing: 0.1,
            history_len: 10,
            challenge_step: 0.1,
            challenge_range: (0.3, 0.9),
            effective_flow_probability: 0.8,
        }
    }
}

impl ControllerConfig {
    fn validate(&self) -> Result<(), PipelineError> {
        for (name, range) in [
            ("controller.carrier_range", self.carrier_range),
            ("controller.beat_range", self.beat_range),
        ] {
            if !(range.min > 0.0 && range.min < range.max && range.max.is_finite()) {
                return Err(invalid(format!(
                    "{name} must satisfy 0 < min < max, got {}..{}",
                    range.min, range.max
                )));
            }
        }
        if !self.carrier_range.contains(self.default_carrier_hz) {
            return Err(invalid(format!(
                "controller.default_carrier_hz {} outside carrier range",
                self.default_carrier_hz
            )));
        }
        if !(self.max_step_fraction > 0.0 && self.max_step_fraction <= 0.5) {
            return Err(invalid("controller.max_step_fraction must be in (0, 0.5]".into()));
        }
        require_unit("controller.coupling_step", self.coupling_step)?;
        require_unit("controller.smoothing", self.smoothing)?;
        require_unit("controller.stability_threshold", self.stability_threshold)?;
        require_unit("controller.min_confidence", self.min_confidence)?;
        require_unit("controller.min_phase_sync", self.min_phase_sync)?;
        require_unit("controller.recovery_threshold", self.recovery_threshold)?;
        require_unit(
            "controller.effective_flow_probability",
            self.effective_flow_probability,
        )?;
        if !(self.phase_lag_step >= 0.0) {
            return Err(invalid("controller.phase_lag_step must be >= 0".into()));
        }
        let (lo, hi) = self.challenge_range;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(invalid("controller.challenge_range must lie in [0, 1]".into()));
        }
        if self.history_len == 0 {
            return Err(invalid("controller.history_len must be > 0".into()));
        }
        Ok(())
    }
}

fn seconds_to_samples(seconds: f32, sample_rate_hz: f32) -> usize {
    (seconds * sample_rate_hz).round().max(0.0) as usize
}

fn invalid(message: String) -> PipelineError {
    PipelineError::InvalidConfig(message)
}

fn require_positive(name: &str, value: f32) -> Result<(), PipelineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be > 0, got {value}")))
    }
}

fn require_unit(name: &str, value: f32) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must lie in [0, 1], got {value}")))
    }
}

fn require_weights(name: &str, weights: &[f32]) -> Result<(), PipelineError> {
    let valid = weights.iter().all(|w| w.is_finite() && *w >= 0.0)
        && weights.iter().sum::<f32>() > 0.0;
    if valid {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be non-negative with a positive sum")))
    }
}
