use crate::config::ArtifactConfig;
use crate::dsp::filter::{FilterChain, FilterKind};
use crate::dsp::PipelineError;
use crate::history::mean_std;

/// Per-sample verdict for one channel; `true` marks a clean sample.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QualityMask {
    clean: Vec<bool>,
}

impl QualityMask {
    pub fn all_clean(len: usize) -> Self {
        Self {
            clean: vec![true; len],
        }
    }

    pub fn from_flags(clean: Vec<bool>) -> Self {
        Self { clean }
    }

    pub fn len(&self) -> usize {
        self.clean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clean.is_empty()
    }

    pub fn is_clean(&self, index: usize) -> bool {
        self.clean.get(index).copied().unwrap_or(false)
    }

    pub fn clean_count(&self) -> usize {
        self.clean.iter().filter(|c| **c).count()
    }

    pub fn excluded_count(&self) -> usize {
        self.len() - self.clean_count()
    }

    /// Share of clean samples; 0 for an empty mask.
    pub fn clean_fraction(&self) -> f32 {
        if self.clean.is_empty() {
            0.0
        } else {
            self.clean_count() as f32 / self.clean.len() as f32
        }
    }

    pub fn excluded_fraction(&self) -> f32 {
        if self.clean.is_empty() {
            1.0
        } else {
            1.0 - self.clean_fraction()
        }
    }

    pub fn clean_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.clean
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.then_some(i))
    }

    fn exclude(&mut self, index: usize) {
        if let Some(flag) = self.clean.get_mut(index) {
            *flag = false;
        }
    }
}

/// Line-noise removal plus amplitude, gradient and flatline rejection.
pub struct ArtifactFilter {
    config: ArtifactConfig,
    sample_rate_hz: f32,
    notch: FilterChain,
    flatline_len: usize,
}

impl ArtifactFilter {
    pub fn new(config: &ArtifactConfig, sample_rate_hz: f32) -> Result<Self, PipelineError> {
        let notch = FilterChain::design(
            sample_rate_hz,
            &[FilterKind::Notch {
                freq_hz: config.line_noise_hz,
                q: config.notch_q,
            }],
        )?;
        let flatline_len = ((config.flatline_ms * sample_rate_hz / 1000.0).round() as usize).max(2);
        Ok(Self {
            config: config.clone(),
            sample_rate_hz,
            notch,
            flatline_len,
        })
    }

    /// Cleans one channel of an epoch.
    ///
    /// Line noise is removed first and the artifact checks run on the
    /// notched series, so mains hum is never mistaken for an artifact.
    /// Non-finite readings are bridged before the notch and always masked.
    /// Excluded samples in the returned series are replaced by a line
    /// between clean neighbours; the length matches the input.
    pub fn clean(&self, channel: &[f32]) -> (Vec<f32>, QualityMask) {
        if channel.is_empty() {
            return (Vec::new(), QualityMask::default());
        }
        let finite = QualityMask::from_flags(channel.iter().map(|v| v.is_finite()).collect());
        let notched = self.notch.filtfilt(&bridge_excluded(channel, &finite));
        let mut mask = self.detect(&notched);
        for i in 0..channel.len() {
            if !finite.is_clean(i) {
                mask.exclude(i);
            }
        }
        (bridge_excluded(&notched, &mask), mask)
    }

    /// `(1 − artifact ratio) × (1 − clamp(variance / ceiling))` over the clean samples.
    pub fn channel_quality(&self, filtered: &[f32], mask: &QualityMask) -> f32 {
        let clean_fraction = mask.clean_fraction();
        if clean_fraction <= 0.0 {
            return 0.0;
        }
        let (_, std) = mean_std(mask.clean_indices().filter_map(|i| filtered.get(i).copied()));
        let variance_factor = 1.0 - (std * std / self.config.variance_ceiling_uv2).clamp(0.0, 1.0);
        (clean_fraction * variance_factor).clamp(0.0, 1.0)
    }

    pub fn is_low_quality(&self, excluded_fraction: f32) -> bool {
        excluded_fraction > self.config.low_quality_ceiling
    }

    fn detect(&self, channel: &[f32]) -> QualityMask {
        let n = channel.len();
        let mut mask = QualityMask::all_clean(n);
        let gradient_scale = self.sample_rate_hz / 1000.0; // per-sample diff -> µV/ms
        for (i, &value) in channel.iter().enumerate() {
            if !value.is_finite() || value.abs() > self.config.amplitude_threshold_uv {
                mask.exclude(i);
                continue;
            }
            if i > 0 {
                let prev = channel[i - 1];
                if prev.is_finite()
                    && (value - prev).abs() * gradient_scale > self.config.gradient_threshold_uv_per_ms
                {
                    mask.exclude(i);
                }
            }
        }
        self.mark_flatlines(channel, &mut mask);
        mask
    }

    fn mark_flatlines(&self, channel: &[f32], mask: &mut QualityMask) {
        let n = channel.len();
        if n < 2 {
            return;
        }
        let window = self.flatline_len.min(n);
        let value = |i: usize| {
            let v = channel[i];
            if v.is_finite() {
                v as f64
            } else {
                0.0
            }
        };
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for i in 0..window {
            sum += value(i);
            sum_sq += value(i) * value(i);
        }
        let threshold = self.config.flatline_std_uv as f64;
        let mut start = 0;
        loop {
            let mean = sum / window as f64;
            let variance = (sum_sq / window as f64 - mean * mean).max(0.0);
            if variance.sqrt() < threshold {
                for i in start..start + window {
                    mask.exclude(i);
                }
            }
            let end = start + window;
            if end >= n {
                break;
            }
            let (old, new) = (value(start), value(end));
            sum += new - old;
            sum_sq += new * new - old * old;
            start += 1;
        }
    }
}

/// Replaces excluded samples with a line between the nearest clean neighbours.
fn bridge_excluded(channel: &[f32], mask: &QualityMask) -> Vec<f32> {
    let n = channel.len();
    if mask.clean_count() == 0 {
        return vec![0.0; n];
    }
    let mut out = channel.to_vec();
    let mut last_clean: Option<usize> = None;
    let mut i = 0;
    while i < n {
        if mask.is_clean(i) {
            last_clean = Some(i);
            i += 1;
            continue;
        }
        let gap_start = i;
        while i < n && !mask.is_clean(i) {
            i += 1;
        }
        let next_clean = (i < n).then_some(i);
        for (j, slot) in out.iter_mut().enumerate().take(i).skip(gap_start) {
            *slot = match (last_clean, next_clean) {
                (Some(a), Some(b)) => {
                    let t = (j - a) as f32 / (b - a) as f32;
                    channel[a] + t * (channel[b] - channel[a])
                }
                (Some(a), None) => channel[a],
                (None, Some(b)) => channel[b],
                (None, None) => 0.0,
            };
        }
    }
    out
}
