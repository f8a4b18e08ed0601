use std::f32::consts::PI;

use log::debug;
use rustfft::num_complex::Complex32;

use crate::config::FeatureConfig;
use crate::dsp::artifact::QualityMask;
use crate::dsp::bands::BandSeries;
use crate::dsp::hilbert::HilbertTransform;
use crate::history::{mean_std, FeatureHistory};
use crate::types::{Band, BandPowers, EpochQuality, FeatureVector};

const EPS: f32 = 1e-9;

/// One channel of an epoch after artifact rejection and band filtering.
#[derive(Clone, Debug, Default)]
pub struct CleanedChannel {
    pub bands: BandSeries,
    pub mask: QualityMask,
    /// Per-channel quality in `[0, 1]`.
    pub quality: f32,
}

struct ChannelFeatures {
    powers: [f32; 5],
    coupling: f32,
    sync: f32,
    alpha_phase: Vec<f32>,
}

/// Turns band-limited epochs into feature vectors and owns the rolling history.
pub struct FeatureExtractor {
    config: FeatureConfig,
    low_quality_ceiling: f32,
    hilbert: HilbertTransform,
    history: FeatureHistory,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureConfig, low_quality_ceiling: f32) -> Self {
        Self {
            config: config.clone(),
            low_quality_ceiling,
            hilbert: HilbertTransform::new(),
            history: FeatureHistory::new(config.history_len),
        }
    }

    /// Past feature vectors, oldest first; excludes the epoch being extracted.
    pub fn history(&self) -> &FeatureHistory {
        &self.history
    }

    /// Appends a finished epoch. Non-finite vectors are dropped.
    pub fn record(&mut self, features: FeatureVector) {
        if features.is_finite() {
            self.history.push(features);
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Never fails: an empty or fully masked epoch yields a zeroed vector.
    pub fn extract(&mut self, channels: &[CleanedChannel]) -> FeatureVector {
        if channels.is_empty() || channels.iter().any(|c| c.bands.is_empty()) {
            debug!("empty epoch, emitting zeroed features");
            return FeatureVector::zeroed();
        }
        let clean_fraction =
            channels.iter().map(|c| c.mask.clean_fraction()).sum::<f32>() / channels.len() as f32;
        let signal_quality = (channels.iter().map(|c| c.quality.clamp(0.0, 1.0)).sum::<f32>()
            / channels.len() as f32)
            .clamp(0.0, 1.0);

        let per_channel: Vec<Option<ChannelFeatures>> =
            channels.iter().map(|c| self.channel_features(c)).collect();
        let usable: Vec<&ChannelFeatures> = per_channel.iter().flatten().collect();
        if usable.is_empty() {
            debug!("every channel fully masked, emitting zeroed features");
            return FeatureVector {
                clean_fraction,
                signal_quality: 0.0,
                ..FeatureVector::zeroed()
            };
        }

        let count = usable.len() as f32;
        let powers = BandPowers::from_fn(|band| {
            usable.iter().map(|c| c.powers[band.index()]).sum::<f32>() / count
        });
        let theta_gamma_coupling =
            (usable.iter().map(|c| c.coupling).sum::<f32>() / count).clamp(0.0, 1.0);
        let alpha_beta_sync = (usable.iter().map(|c| c.sync).sum::<f32>() / count).clamp(0.0, 1.0);
        let alpha_coherence = alpha_coherence(channels, &per_channel);
        let alpha_asymmetry = self.alpha_asymmetry(&per_channel);

        let mut features = FeatureVector {
            powers,
            relative: powers.relative(),
            theta_gamma_coupling,
            alpha_beta_sync,
            alpha_coherence,
            alpha_asymmetry,
            clean_fraction,
            signal_quality,
            quality: if 1.0 - clean_fraction > self.low_quality_ceiling {
                EpochQuality::LowQuality
            } else {
                EpochQuality::Good
            },
            ..FeatureVector::zeroed()
        };
        self.derive_composites(&mut features);
        features
    }

    /// Ratios, composites and scores computed from the measured features.
    fn derive_composites(&self, f: &mut FeatureVector) {
        let p = f.powers;
        f.alpha_theta_ratio = self.ratio(p.alpha, p.theta);
        f.theta_beta_ratio = self.ratio(p.theta, p.beta);
        f.alpha_beta_ratio = self.ratio(p.alpha, p.beta);
        f.beta_alpha_ratio = self.ratio(p.beta, p.alpha);

        let slow = p.alpha + p.theta;
        f.beta_suppression = if slow > EPS {
            (1.0 - p.beta / slow).clamp(0.0, 1.0)
        } else {
            0.0
        };
        f.gamma_bursts = self.gamma_burst_score(p.gamma);

        let ab = f.alpha_beta_ratio;
        f.cognitive_load = ((f.relative.theta + (1.0 - ab / (1.0 + ab)) + (1.0 - f.beta_suppression))
            / 3.0)
            .clamp(0.0, 1.0);

        let w = self.config.attention_weights;
        let terms = [
            f.beta_suppression,
            f.alpha_coherence,
            f.gamma_bursts,
            f.alpha_asymmetry.abs(),
        ];
        let weight_sum: f32 = w.iter().sum();
        f.attention_level = if weight_sum > 0.0 {
            (terms.iter().zip(w).map(|(t, w)| t * w).sum::<f32>() / weight_sum).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let challenge = f.beta_suppression;
        let skill = f.alpha_theta_ratio;
        f.challenge_skill_balance =
            ((challenge - skill) / (challenge + skill).max(1e-6)).clamp(-1.0, 1.0);
        f.focus_score = ((f.attention_level + 1.0 - f.cognitive_load) / 2.0).clamp(0.0, 1.0);
        f.flow_probability = self.flow_probability(f.alpha_theta_ratio, f.alpha_beta_ratio);
    }

    /// Canonical flow score: closeness of alpha/theta and alpha/beta to their ideals.
    pub fn flow_probability(&self, alpha_theta: f32, alpha_beta: f32) -> f32 {
        let closeness = |value: f32, ideal: f32| 1.0 - ((value - ideal).abs() / ideal).min(1.0);
        let (w_at, w_ab) = self.config.flow_weights;
        let total = w_at + w_ab;
        if !(total > 0.0) {
            return 0.0;
        }
        let score = w_at * closeness(alpha_theta, self.config.ideal_alpha_theta)
            + w_ab * closeness(alpha_beta, self.config.ideal_alpha_beta);
        (score / total).clamp(0.0, 1.0)
    }

    /// How far above its recent distribution the current gamma power sits.
    pub fn gamma_burst_score(&self, gamma_power: f32) -> f32 {
        if self.history.len() < self.config.gamma_burst_min_history {
            return 0.0;
        }
        let (mean, std) = mean_std(self.history.iter().map(|f| f.powers.gamma));
        if std <= EPS {
            return 0.0;
        }
        let z = (gamma_power - mean) / std;
        let threshold = self.config.gamma_burst_z;
        if z > threshold {
            ((z - threshold) / threshold).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn ratio(&self, numerator: f32, denominator: f32) -> f32 {
        let value = numerator / denominator.max(self.config.ratio_floor);
        if value.is_finite() {
            value.clamp(0.0, self.config.max_ratio)
        } else {
            0.0
        }
    }

    fn alpha_asymmetry(&self, per_channel: &[Option<ChannelFeatures>]) -> f32 {
        let (left, right) = self.config.asymmetry_pair;
        if left == right {
            return 0.0;
        }
        let alpha = |i: usize| {
            per_channel
                .get(i)
                .and_then(|c| c.as_ref())
                .map(|c| c.powers[Band::Alpha.index()])
        };
        match (alpha(left), alpha(right)) {
            (Some(l), Some(r)) if l + r > EPS => ((r - l) / (r + l)).clamp(-1.0, 1.0),
            _ => 0.0,
        }
    }

    fn channel_features(&mut self, channel: &CleanedChannel) -> Option<ChannelFeatures> {
        let len = channel.bands.len();
        let clean: Vec<usize> = channel.mask.clean_indices().filter(|&i| i < len).collect();
        if clean.is_empty() {
            return None;
        }
        let mut envelopes: Vec<Vec<f32>> = Vec::with_capacity(5);
        let mut phases: Vec<Vec<f32>> = Vec::with_capacity(5);
        for band in Band::ALL {
            let analytic = self.hilbert.analytic(channel.bands.get(band));
            envelopes.push(analytic.envelope());
            phases.push(analytic.phase());
        }
        // Band power: mean squared envelope over the clean samples only.
        let mut powers = [0.0f32; 5];
        for band in Band::ALL {
            let envelope = &envelopes[band.index()];
            let sum: f64 = clean.iter().map(|&i| (envelope[i] as f64).powi(2)).sum();
            powers[band.index()] = (sum / clean.len() as f64) as f32;
        }

        let theta_phase = &phases[Band::Theta.index()];
        let gamma_env = &envelopes[Band::Gamma.index()];
        let mut weighted = Complex32::new(0.0, 0.0);
        let mut env_sum = 0.0f32;
        for &i in &clean {
            weighted += Complex32::from_polar(gamma_env[i], theta_phase[i]);
            env_sum += gamma_env[i];
        }
        let coupling = if env_sum > EPS {
            (weighted.norm() / env_sum).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let alpha_phase = phases[Band::Alpha.index()].clone();
        let beta_phase = &phases[Band::Beta.index()];
        let differences: Vec<f32> = clean.iter().map(|&i| alpha_phase[i] - beta_phase[i]).collect();
        let sync = phase_sync(&differences);

        Some(ChannelFeatures {
            powers,
            coupling,
            sync,
            alpha_phase,
        })
    }
}

/// `1 − circular spread / π` of a phase-difference series, in `[0, 1]`.
fn phase_sync(differences: &[f32]) -> f32 {
    if differences.is_empty() {
        return 0.0;
    }
    let resultant: Complex32 = differences
        .iter()
        .map(|&d| Complex32::from_polar(1.0, d))
        .sum();
    let center = resultant.arg();
    let (_, std) = mean_std(differences.iter().map(|&d| wrap_phase(d - center)));
    (1.0 - std / PI).clamp(0.0, 1.0)
}

fn wrap_phase(value: f32) -> f32 {
    let wrapped = (value + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped.is_finite() {
        wrapped
    } else {
        0.0
    }
}

/// Mean pairwise phase-locking value of the alpha band across channels.
fn alpha_coherence(channels: &[CleanedChannel], per_channel: &[Option<ChannelFeatures>]) -> f32 {
    let mut total = 0.0f32;
    let mut pairs = 0usize;
    for i in 0..per_channel.len() {
        for j in i + 1..per_channel.len() {
            let (Some(a), Some(b)) = (&per_channel[i], &per_channel[j]) else {
                continue;
            };
            let mut sum = Complex32::new(0.0, 0.0);
            let mut n = 0usize;
            for (k, (pa, pb)) in a.alpha_phase.iter().zip(&b.alpha_phase).enumerate() {
                if channels[i].mask.is_clean(k) && channels[j].mask.is_clean(k) {
                    sum += Complex32::from_polar(1.0, pa - pb);
                    n += 1;
                }
            }
            if n > 0 {
                total += sum.norm() / n as f32;
                pairs += 1;
            }
        }
    }
    if pairs == 0 {
        0.0
    } else {
        (total / pairs as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::config::{ArtifactConfig, BandConfig};
    use crate::dsp::artifact::ArtifactFilter;
    use crate::dsp::bands::BandFilterBank;
    use crate::dsp::filter::tests::sine;

    const FS: f32 = 256.0;

    fn prepare(raw: &[Vec<f32>]) -> Vec<CleanedChannel> {
        let artifact = ArtifactFilter::new(&ArtifactConfig::default(), FS).unwrap();
        let bank = BandFilterBank::new(&BandConfig::default(), FS).unwrap();
        raw.iter()
            .map(|channel| {
                let (filtered, mask) = artifact.clean(channel);
                let quality = artifact.channel_quality(&filtered, &mask);
                CleanedChannel {
                    bands: bank.filter(&filtered),
                    mask,
                    quality,
                }
            })
            .collect()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(&FeatureConfig::default(), 0.5)
    }

    fn add(a: &[f32], b: &[f32]) -> Vec<f32> {
        a.iter().zip(b).map(|(x, y)| x + y).collect()
    }

    #[test]
    fn alpha_dominant_epoch() {
        let x = sine(10.0, 1.0, FS, 512);
        let channels = prepare(&vec![x; 4]);
        let f = extractor().extract(&channels);
        assert!(f.powers.alpha > 10.0 * f.powers.beta);
        assert!(f.powers.alpha > 10.0 * f.powers.gamma);
        assert!(f.alpha_theta_ratio > 1.5);
        assert_eq!(f.quality, EpochQuality::Good);
        assert!(f.signal_quality > 0.9);
        assert!(f.alpha_coherence > 0.99);
        assert!(f.alpha_asymmetry.abs() < 1e-3);
        assert!(f.beta_suppression > 0.9);
    }

    #[test]
    fn theta_phase_gamma_amplitude_coupling() {
        let n = 1024;
        let theta = sine(6.0, 2.0, FS, n);
        let carrier = sine(40.0, 1.0, FS, n);
        let coupled: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / FS;
                let theta_phase = 2.0 * PI * 6.0 * t;
                theta[i] + 0.5 * (1.0 + theta_phase.sin()) * carrier[i]
            })
            .collect();
        let uncoupled = add(&theta, &sine(40.0, 0.5, FS, n));
        let mut fx = extractor();
        let with = fx.extract(&prepare(&[coupled])).theta_gamma_coupling;
        let without = fx.extract(&prepare(&[uncoupled])).theta_gamma_coupling;
        assert!(with > 0.3, "coupled {with}");
        assert!(without < 0.15, "uncoupled {without}");
    }

    #[test]
    fn phase_locked_bands_are_synchronized() {
        let edge = sine(13.0, 1.0, FS, 512);
        let drifting = add(&sine(10.0, 1.0, FS, 512), &sine(20.0, 1.0, FS, 512));
        let mut fx = extractor();
        let locked = fx.extract(&prepare(&[edge])).alpha_beta_sync;
        let free = fx.extract(&prepare(&[drifting])).alpha_beta_sync;
        assert!(locked > 0.9, "locked {locked}");
        assert!(free < 0.7, "free {free}");
    }

    #[test]
    fn asymmetry_follows_the_stronger_side() {
        let weak = sine(10.0, 1.0, FS, 512);
        let strong = sine(10.0, 3.0, FS, 512);
        let channels = prepare(&[weak.clone(), weak, strong.clone(), strong]);
        let f = extractor().extract(&channels);
        assert!(f.alpha_asymmetry > 0.5);
        assert!(f.alpha_asymmetry <= 1.0);
    }

    #[test]
    fn empty_and_flat_epochs_are_zeroed() {
        let mut fx = extractor();
        let f = fx.extract(&[]);
        assert_eq!(f, FeatureVector::zeroed());
        assert_eq!(f.signal_quality, 0.0);

        let flat = prepare(&vec![vec![0.0; 512]; 4]);
        let f = fx.extract(&flat);
        assert_eq!(f.signal_quality, 0.0);
        assert_eq!(f.quality, EpochQuality::LowQuality);
        assert_eq!(f.powers, BandPowers::default());

        let single = fx.extract(&prepare(&[sine(10.0, 1.0, FS, 512)]));
        assert_eq!(single.alpha_coherence, 0.0);
        assert_eq!(single.alpha_asymmetry, 0.0);
    }

    #[test]
    fn gamma_bursts_need_history() {
        let mut fx = extractor();
        assert_eq!(fx.gamma_burst_score(100.0), 0.0);
        for i in 0..20 {
            let mut f = FeatureVector::zeroed();
            f.powers.gamma = 1.0 + 0.1 * (i % 2) as f32;
            fx.record(f);
        }
        assert_eq!(fx.gamma_burst_score(1.05), 0.0);
        assert!(fx.gamma_burst_score(1.4) > 0.0);
        assert_eq!(fx.gamma_burst_score(100.0), 1.0);
    }

    #[test]
    fn history_is_bounded_and_skips_non_finite() {
        let mut fx = FeatureExtractor::new(
            &FeatureConfig {
                history_len: 5,
                ..FeatureConfig::default()
            },
            0.5,
        );
        for _ in 0..12 {
            fx.record(FeatureVector::zeroed());
        }
        assert_eq!(fx.history().len(), 5);
        let mut bad = FeatureVector::zeroed();
        bad.alpha_theta_ratio = f32::NAN;
        fx.record(bad);
        assert_eq!(fx.history().len(), 5);
        assert!(fx.history().iter().all(|f| f.is_finite()));
    }

    #[test]
    fn flow_probability_peaks_at_ideal_ratios() {
        let fx = extractor();
        assert!((fx.flow_probability(1.5, 2.0) - 1.0).abs() < 1e-6);
        assert_eq!(fx.flow_probability(10.0, 10.0), 0.0);
        assert!(fx.flow_probability(1.5, 10.0) > fx.flow_probability(10.0, 2.0));
    }

    #[test]
    fn randomized_epochs_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut fx = extractor();
        for round in 0..12 {
            let scale = [0.0, 1e-3, 1.0, 20.0, 80.0, 400.0][round % 6];
            let raw: Vec<Vec<f32>> = (0..4)
                .map(|_| (0..512).map(|_| rng.gen_range(-1.0f32..1.0) * scale).collect())
                .collect();
            let f = fx.extract(&prepare(&raw));
            assert!(f.is_finite());
            for band in Band::ALL {
                assert!(f.powers.get(band) >= 0.0);
                assert!((0.0..=1.0).contains(&f.relative.get(band)));
            }
            for ratio in [
                f.alpha_theta_ratio,
                f.theta_beta_ratio,
                f.alpha_beta_ratio,
                f.beta_alpha_ratio,
            ] {
                assert!((0.0..=100.0).contains(&ratio));
            }
            for score in [
                f.beta_suppression,
                f.theta_gamma_coupling,
                f.alpha_beta_sync,
                f.alpha_coherence,
                f.gamma_bursts,
                f.clean_fraction,
                f.signal_quality,
                f.cognitive_load,
                f.attention_level,
                f.focus_score,
                f.flow_probability,
            ] {
                assert!((0.0..=1.0).contains(&score), "score {score} at scale {scale}");
            }
            assert!((-1.0..=1.0).contains(&f.alpha_asymmetry));
            assert!((-1.0..=1.0).contains(&f.challenge_skill_balance));
            fx.record(f);
        }
    }
}
