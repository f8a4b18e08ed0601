// src/types.rs
use serde::{Deserialize, Serialize};

use crate::dsp::EpochReport;
use crate::recommendations::Recommendation;

/// Ordinal flow-state scale, ordered by increasing desirability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Unknown,
    Anxiety,
    Boredom,
    Flow,
    DeepFlow,
}

impl FlowState {
    pub const ALL: [FlowState; 5] = [
        FlowState::Unknown,
        FlowState::Anxiety,
        FlowState::Boredom,
        FlowState::Flow,
        FlowState::DeepFlow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Unknown => "UNKNOWN",
            FlowState::Anxiety => "ANXIETY",
            FlowState::Boredom => "BOREDOM",
            FlowState::Flow => "FLOW",
            FlowState::DeepFlow => "DEEP_FLOW",
        }
    }

    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn is_flow(&self) -> bool {
        matches!(self, FlowState::Flow | FlowState::DeepFlow)
    }
}

// EEG frequency bands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Delta,
    Theta,
    Alpha,
    Beta,
    Gamma,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::Delta, Band::Theta, Band::Alpha, Band::Beta, Band::Gamma];

    pub fn name(&self) -> &'static str {
        match self {
            Band::Delta => "delta",
            Band::Theta => "theta",
            Band::Alpha => "alpha",
            Band::Beta => "beta",
            Band::Gamma => "gamma",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Average spectral power per band over one epoch (µV², non-negative).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BandPowers {
    pub delta: f32,
    pub theta: f32,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl BandPowers {
    pub fn from_fn(mut f: impl FnMut(Band) -> f32) -> Self {
        let mut guarded = |band| {
            let value = f(band);
            if value.is_finite() {
                value.max(0.0)
            } else {
                0.0
            }
        };
        Self {
            delta: guarded(Band::Delta),
            theta: guarded(Band::Theta),
            alpha: guarded(Band::Alpha),
            beta: guarded(Band::Beta),
            gamma: guarded(Band::Gamma),
        }
    }

    pub fn get(&self, band: Band) -> f32 {
        match band {
            Band::Delta => self.delta,
            Band::Theta => self.theta,
            Band::Alpha => self.alpha,
            Band::Beta => self.beta,
            Band::Gamma => self.gamma,
        }
    }

    pub fn total(&self) -> f32 {
        Band::ALL.iter().map(|b| self.get(*b)).sum()
    }

    /// Share of total power per band; all zero when the epoch carries no power.
    pub fn relative(&self) -> BandPowers {
        let total = self.total();
        if total <= f32::EPSILON {
            return BandPowers::default();
        }
        BandPowers::from_fn(|band| (self.get(band) / total).clamp(0.0, 1.0))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EpochQuality {
    Good,
    #[default]
    LowQuality,
}

/// Fixed-shape feature record for one epoch.
///
/// Ranges: band powers are non-negative µV²; ratios lie in `[0, max_ratio]`;
/// `alpha_asymmetry` and `challenge_skill_balance` lie in `[-1, 1]`; every
/// other score lies in `[0, 1]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub powers: BandPowers,
    pub relative: BandPowers,
    pub alpha_theta_ratio: f32,
    pub theta_beta_ratio: f32,
    pub alpha_beta_ratio: f32,
    pub beta_alpha_ratio: f32,
    pub beta_suppression: f32,
    pub theta_gamma_coupling: f32,
    pub alpha_beta_sync: f32,
    pub alpha_coherence: f32,
    pub alpha_asymmetry: f32,
    pub gamma_bursts: f32,
    pub clean_fraction: f32,
    pub signal_quality: f32,
    pub cognitive_load: f32,
    pub attention_level: f32,
    pub challenge_skill_balance: f32,
    pub focus_score: f32,
    pub flow_probability: f32,
    pub quality: EpochQuality,
}

impl FeatureVector {
    /// Output for an empty or unusable epoch: everything zero, flagged low quality.
    pub fn zeroed() -> Self {
        Self::default()
    }

    pub fn is_finite(&self) -> bool {
        self.stability_components().iter().all(|v| v.is_finite())
            && Band::ALL.iter().all(|b| self.powers.get(*b).is_finite())
            && self.signal_quality.is_finite()
            && self.cognitive_load.is_finite()
            && self.attention_level.is_finite()
    }

    /// Features whose epoch-to-epoch spread drives classifier confidence.
    pub fn stability_components(&self) -> [f32; 7] {
        [
            self.alpha_theta_ratio,
            self.theta_beta_ratio,
            self.alpha_beta_ratio,
            self.beta_suppression,
            self.theta_gamma_coupling,
            self.alpha_beta_sync,
            self.alpha_coherence,
        ]
    }
}

/// Per-epoch snapshot handed to the controller and external callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    pub epoch: u64,
    pub timestamp: f64,
    pub state: FlowState,
    pub confidence: f32,
    pub features: FeatureVector,
    pub recommendations: Vec<Recommendation>,
}

impl FlowMetrics {
    pub fn cognitive_load(&self) -> f32 {
        self.features.cognitive_load
    }
    pub fn attention_level(&self) -> f32 {
        self.features.attention_level
    }
    pub fn theta_gamma_coupling(&self) -> f32 {
        self.features.theta_gamma_coupling
    }
    pub fn phase_sync(&self) -> f32 {
        self.features.alpha_beta_sync
    }
    pub fn flow_probability(&self) -> f32 {
        self.features.flow_probability
    }
    pub fn signal_quality(&self) -> f32 {
        self.features.signal_quality
    }
    pub fn is_low_quality(&self) -> bool {
        self.features.quality == EpochQuality::LowQuality
    }
}

/// Target entrainment mode an outer layer can request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrainmentMode {
    Focus,
    #[default]
    Flow,
    Meditate,
}

impl EntrainmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrainmentMode::Focus => "focus",
            EntrainmentMode::Flow => "flow",
            EntrainmentMode::Meditate => "meditate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "focus" => Some(EntrainmentMode::Focus),
            "flow" => Some(EntrainmentMode::Flow),
            "meditate" => Some(EntrainmentMode::Meditate),
            _ => None,
        }
    }
}

/// Current entrainment settings read by the audio/visual driver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StimulationParameters {
    /// Carrier tone in Hz.
    pub base_frequency: f32,
    /// Binaural beat in Hz (right ear = carrier + beat).
    pub beat_frequency: f32,
    pub coupling_strength: f32,
    /// Bilateral phase offset in radians.
    pub phase_lag: f32,
}

impl StimulationParameters {
    pub const STROBE_MIN_HZ: f32 = 4.0;
    pub const STROBE_MAX_HZ: f32 = 12.0;

    pub fn left_tone_hz(&self) -> f32 {
        self.base_frequency
    }

    pub fn right_tone_hz(&self) -> f32 {
        self.base_frequency + self.beat_frequency
    }

    /// Visual strobe rate harmonically tied to the beat.
    pub fn strobe_frequency(&self) -> f32 {
        (self.beat_frequency / 2.0).clamp(Self::STROBE_MIN_HZ, Self::STROBE_MAX_HZ)
    }
}

// Commands sent to the processing thread
#[derive(Clone, Debug)]
pub enum EngineCommand {
    SetMode(EntrainmentMode),
    SetRecoveryScore(f32),
}

// Events sent back by the processing thread
#[derive(Clone, Debug)]
pub enum EngineEvent {
    Epoch(Box<EpochReport>),
    Buffering { available: usize, required: usize },
    Stopped { epochs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn flow_states_are_ordinal() {
        assert!(FlowState::Unknown < FlowState::Anxiety);
        assert!(FlowState::Flow < FlowState::DeepFlow);
        assert_eq!(FlowState::DeepFlow.ordinal(), 4);
        assert!(FlowState::DeepFlow.is_flow());
        assert!(!FlowState::Boredom.is_flow());
    }
    #[test]
    fn relative_powers_sum_to_one() {
        let powers = BandPowers {
            delta: 1.0,
            theta: 2.0,
            alpha: 4.0,
            beta: 2.0,
            gamma: 1.0,
        };
        let rel = powers.relative();
        assert!((rel.total() - 1.0).abs() < 1e-5);
        assert!((rel.alpha - 0.4).abs() < 1e-6);
        assert_eq!(BandPowers::default().relative(), BandPowers::default());
    }
    #[test]
    fn band_powers_guard_non_finite_and_negative() {
        let p = BandPowers::from_fn(|band| match band {
            Band::Theta => f32::NAN,
            Band::Beta => -3.0,
            _ => 1.0,
        });
        assert_eq!(p.theta, 0.0);
        assert_eq!(p.beta, 0.0);
        assert_eq!(p.alpha, 1.0);
    }
    #[test]
    fn strobe_follows_beat_within_safe_range() {
        let mut params = StimulationParameters {
            base_frequency: 200.0,
            beat_frequency: 10.0,
            coupling_strength: 0.5,
            phase_lag: 0.0,
        };
        assert_eq!(params.strobe_frequency(), 5.0);
        assert_eq!(params.right_tone_hz(), 210.0);
        params.beat_frequency = 40.0;
        assert_eq!(params.strobe_frequency(), 12.0);
        params.beat_frequency = 1.0;
        assert_eq!(params.strobe_frequency(), 4.0);
    }
    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!(EntrainmentMode::parse("Focus"), Some(EntrainmentMode::Focus));
        assert_eq!(EntrainmentMode::parse(" meditate "), Some(EntrainmentMode::Meditate));
        assert_eq!(EntrainmentMode::parse("sleep"), None);
    }
}
