// src/controller.rs
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_4;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{ControllerConfig, FrequencyRange};
use crate::history::RollingHistory;
use crate::recommendations::Recommendation;
use crate::types::{EntrainmentMode, FlowMetrics, FlowState, StimulationParameters};

const PHASE_LAG_RANGE: FrequencyRange = FrequencyRange::new(0.0, std::f32::consts::PI);
const UNIT_RANGE: FrequencyRange = FrequencyRange::new(0.0, 1.0);
const OPTIMAL_LOAD: f32 = 0.75;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMode {
    Stabilize,
    Deepen,
    Maintain,
}

impl ControlMode {
    pub fn advisory(&self) -> Recommendation {
        match self {
            ControlMode::Stabilize => Recommendation::Stabilizing,
            ControlMode::Deepen => Recommendation::Deepening,
            ControlMode::Maintain => Recommendation::Maintaining,
        }
    }
}

/// Outcome of one controller step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlStep {
    pub parameters: StimulationParameters,
    pub mode: ControlMode,
    pub recommendations: Vec<Recommendation>,
    /// Signed change applied to the beat this epoch.
    pub beat_delta_hz: f32,
    pub base_delta_hz: f32,
    pub flow_depth: f32,
    pub stability_score: f32,
    pub recovery_capacity: f32,
    pub challenge_level: f32,
}

/// Default beat and preferred beat range for each entrainment mode.
struct ModeProfile {
    hold_beat_hz: f32,
    beat_range: FrequencyRange,
}

fn profile(mode: EntrainmentMode) -> ModeProfile {
    match mode {
        EntrainmentMode::Focus => ModeProfile {
            hold_beat_hz: 10.0,
            beat_range: FrequencyRange::new(8.0, 40.0),
        },
        EntrainmentMode::Flow => ModeProfile {
            hold_beat_hz: 8.0,
            beat_range: FrequencyRange::new(4.0, 40.0),
        },
        EntrainmentMode::Meditate => ModeProfile {
            hold_beat_hz: 6.0,
            beat_range: FrequencyRange::new(1.0, 12.0),
        },
    }
}

/// Closed-loop owner of the stimulation parameters.
pub struct AdaptationController {
    config: ControllerConfig,
    mode: EntrainmentMode,
    params: StimulationParameters,
    flow_depths: RollingHistory<f32>,
    recovery_score: f32,
    challenge_level: f32,
    effective: HashMap<EntrainmentMode, (f32, f32)>,
    last_mode: Option<ControlMode>,
}

impl AdaptationController {
    pub fn new(config: &ControllerConfig, mode: EntrainmentMode) -> Self {
        let hold = profile(mode).hold_beat_hz;
        let (challenge_min, challenge_max) = config.challenge_range;
        Self {
            params: StimulationParameters {
                base_frequency: config.carrier_range.clamp(config.default_carrier_hz),
                beat_frequency: config.beat_range.clamp(hold),
                coupling_strength: 0.5,
                phase_lag: 0.0,
            },
            flow_depths: RollingHistory::new(config.history_len),
            recovery_score: 1.0,
            challenge_level: ((challenge_min + challenge_max) / 2.0).clamp(challenge_min, challenge_max),
            effective: HashMap::new(),
            last_mode: None,
            config: config.clone(),
            mode,
        }
    }

    pub fn parameters(&self) -> StimulationParameters {
        self.params
    }

    pub fn entrainment_mode(&self) -> EntrainmentMode {
        self.mode
    }

    /// Retargets future steps; current parameters still move gradually.
    pub fn set_entrainment_mode(&mut self, mode: EntrainmentMode) {
        if mode != self.mode {
            info!("entrainment mode {} -> {}", self.mode.as_str(), mode.as_str());
            self.mode = mode;
        }
    }

    pub fn set_recovery_score(&mut self, score: f32) {
        self.recovery_score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    pub fn challenge_level(&self) -> f32 {
        self.challenge_level
    }

    /// Carrier and beat remembered from a high-flow epoch in this mode.
    pub fn remembered(&self, mode: EntrainmentMode) -> Option<(f32, f32)> {
        self.effective.get(&mode).copied()
    }

    pub fn step(&mut self, metrics: &FlowMetrics) -> ControlStep {
        let load = finite_or(metrics.cognitive_load(), 1.0).clamp(0.0, 1.0);
        let attention = finite_or(metrics.attention_level(), 0.0).clamp(0.0, 1.0);
        let sync = finite_or(metrics.phase_sync(), 0.0).clamp(0.0, 1.0);
        let confidence = finite_or(metrics.confidence, 0.0).clamp(0.0, 1.0);

        let load_optimality = (1.0 - (OPTIMAL_LOAD - load).abs() * 2.0).clamp(0.0, 1.0);
        let flow_depth = (0.4 * attention + 0.3 * load_optimality + 0.3 * sync).clamp(0.0, 1.0);
        self.flow_depths.push(flow_depth);
        let depth_stability = (1.0 - self.flow_depths.variance()).clamp(0.0, 1.0);
        let stability_score =
            (0.4 * flow_depth + 0.3 * depth_stability + 0.3 * confidence).clamp(0.0, 1.0);
        let recovery_capacity = (0.7 * self.recovery_score + 0.3 * (1.0 - load)).clamp(0.0, 1.0);

        let mode = if metrics.state == FlowState::Anxiety
            || stability_score < self.config.stability_threshold
            || confidence < self.config.min_confidence
            || sync < self.config.min_phase_sync
        {
            ControlMode::Stabilize
        } else if metrics.state.is_flow() && recovery_capacity > self.config.recovery_threshold {
            ControlMode::Deepen
        } else {
            ControlMode::Maintain
        };
        if self.last_mode != Some(mode) {
            info!(
                "epoch {}: control mode {:?} (state {}, stability {:.2})",
                metrics.epoch,
                mode,
                metrics.state.as_str(),
                stability_score
            );
            self.last_mode = Some(mode);
        }

        let previous = self.params;
        self.apply(mode);
        self.remember_if_effective(metrics);

        ControlStep {
            parameters: self.params,
            mode,
            recommendations: vec![mode.advisory()],
            beat_delta_hz: self.params.beat_frequency - previous.beat_frequency,
            base_delta_hz: self.params.base_frequency - previous.base_frequency,
            flow_depth,
            stability_score,
            recovery_capacity,
            challenge_level: self.challenge_level,
        }
    }

    fn apply(&mut self, mode: ControlMode) {
        let c = &self.config;
        let profile = profile(self.mode);
        let mode_range = profile.beat_range.intersect(&c.beat_range);
        let hold = mode_range.clamp(profile.hold_beat_hz);
        let remembered = self.effective.get(&self.mode).copied();
        let (challenge_min, challenge_max) = c.challenge_range;

        let (beat, carrier) = match mode {
            ControlMode::Stabilize => {
                self.params.coupling_strength =
                    (self.params.coupling_strength - c.coupling_step).clamp(0.0, 1.0);
                self.params.phase_lag = approach(self.params.phase_lag, 0.0, c.phase_lag_step);
                self.challenge_level -= c.challenge_step;
                (
                    self.bounded(self.params.beat_frequency, hold),
                    self.bounded(self.params.base_frequency, c.default_carrier_hz),
                )
            }
            ControlMode::Deepen => {
                self.params.coupling_strength =
                    (self.params.coupling_strength + c.coupling_step).clamp(0.0, 1.0);
                self.params.phase_lag = approach(self.params.phase_lag, FRAC_PI_4, c.phase_lag_step);
                self.challenge_level += c.challenge_step;
                (
                    self.bounded(self.params.beat_frequency, mode_range.max),
                    self.bounded(self.params.base_frequency, c.default_carrier_hz),
                )
            }
            ControlMode::Maintain => {
                let (carrier_target, beat_target) =
                    remembered.unwrap_or((c.default_carrier_hz, hold));
                let smooth = |current: f32, target: f32| current + c.smoothing * (target - current);
                (
                    self.bounded(
                        self.params.beat_frequency,
                        smooth(self.params.beat_frequency, beat_target),
                    ),
                    self.bounded(
                        self.params.base_frequency,
                        smooth(self.params.base_frequency, carrier_target),
                    ),
                )
            }
        };
        self.challenge_level = self.challenge_level.clamp(challenge_min, challenge_max);
        self.params.beat_frequency = clamp_logged("beat_frequency", beat, &self.config.beat_range);
        self.params.base_frequency = clamp_logged("base_frequency", carrier, &self.config.carrier_range);
        self.params.coupling_strength =
            clamp_logged("coupling_strength", self.params.coupling_strength, &UNIT_RANGE);
        self.params.phase_lag = clamp_logged("phase_lag", self.params.phase_lag, &PHASE_LAG_RANGE);
    }

    /// Moves toward `target` by at most `max_step_fraction` of the current value.
    fn bounded(&self, current: f32, target: f32) -> f32 {
        let max_step = current.abs() * self.config.max_step_fraction;
        current + (target - current).clamp(-max_step, max_step)
    }

    fn remember_if_effective(&mut self, metrics: &FlowMetrics) {
        if metrics.state.is_flow()
            && metrics.flow_probability() > self.config.effective_flow_probability
        {
            self.effective.insert(
                self.mode,
                (self.params.base_frequency, self.params.beat_frequency),
            );
        }
    }
}

fn approach(current: f32, target: f32, step: f32) -> f32 {
    current + (target - current).clamp(-step, step)
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

fn clamp_logged(name: &str, value: f32, range: &FrequencyRange) -> f32 {
    if !value.is_finite() {
        warn!("{name} was not finite; holding at {}", range.min);
        return range.min;
    }
    if range.contains(value) {
        return value;
    }
    let clamped = range.clamp(value);
    warn!(
        "{name} {value:.3} outside safe range [{}, {}]; clamped to {clamped:.3}",
        range.min, range.max
    );
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeatureVector;

    fn metrics(state: FlowState, confidence: f32, epoch: u64) -> FlowMetrics {
        FlowMetrics {
            epoch,
            timestamp: epoch as f64 * 0.5,
            state,
            confidence,
            features: FeatureVector {
                attention_level: 0.8,
                cognitive_load: 0.75,
                alpha_beta_sync: 0.9,
                flow_probability: 0.5,
                signal_quality: 0.9,
                ..FeatureVector::zeroed()
            },
            recommendations: vec![],
        }
    }

    fn controller() -> AdaptationController {
        AdaptationController::new(&ControllerConfig::default(), EntrainmentMode::Flow)
    }

    #[test]
    fn starts_at_mode_defaults() {
        let c = controller();
        let p = c.parameters();
        assert_eq!(p.base_frequency, 200.0);
        assert_eq!(p.beat_frequency, 8.0);
        assert_eq!(p.strobe_frequency(), 4.0);
        let focus = AdaptationController::new(&ControllerConfig::default(), EntrainmentMode::Focus);
        assert_eq!(focus.parameters().beat_frequency, 10.0);
        assert!((focus.challenge_level() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn alternating_anxiety_and_flow_moves_in_bounded_steps() {
        let config = ControllerConfig::default();
        let mut c = controller();
        let mut previous = c.parameters();
        for epoch in 0..50 {
            let state = if epoch % 2 == 0 {
                FlowState::Anxiety
            } else {
                FlowState::Flow
            };
            let step = c.step(&metrics(state, 0.9, epoch));
            let p = step.parameters;
            let beat_limit = previous.beat_frequency * config.max_step_fraction + 1e-4;
            let base_limit = previous.base_frequency * config.max_step_fraction + 1e-3;
            assert!((p.beat_frequency - previous.beat_frequency).abs() <= beat_limit);
            assert!((p.base_frequency - previous.base_frequency).abs() <= base_limit);
            assert!(config.beat_range.contains(p.beat_frequency));
            assert!(config.carrier_range.contains(p.base_frequency));
            assert!((0.0..=1.0).contains(&p.coupling_strength));
            assert!((step.beat_delta_hz - (p.beat_frequency - previous.beat_frequency)).abs() < 1e-6);
            let expected = if state == FlowState::Anxiety {
                ControlMode::Stabilize
            } else {
                ControlMode::Deepen
            };
            assert_eq!(step.mode, expected);
            previous = p;
        }
    }

    #[test]
    fn deepening_climbs_toward_gamma_without_jumping() {
        let mut c = controller();
        let mut last = c.parameters().beat_frequency;
        for epoch in 0..200 {
            let step = c.step(&metrics(FlowState::DeepFlow, 0.9, epoch));
            assert_eq!(step.mode, ControlMode::Deepen);
            assert!(step.parameters.beat_frequency >= last);
            assert!(step.parameters.beat_frequency - last <= last * 0.02 + 1e-4);
            last = step.parameters.beat_frequency;
        }
        assert!(last > 30.0 && last <= 40.0);
        assert_eq!(c.challenge_level(), 0.9);
        assert!((c.parameters().phase_lag - FRAC_PI_4).abs() < 1e-6);
        assert_eq!(c.parameters().coupling_strength, 1.0);
    }

    #[test]
    fn low_confidence_or_sync_forces_stabilize() {
        let mut c = controller();
        let step = c.step(&metrics(FlowState::Flow, 0.1, 0));
        assert_eq!(step.mode, ControlMode::Stabilize);
        assert_eq!(step.recommendations, vec![Recommendation::Stabilizing]);
        let mut m = metrics(FlowState::Flow, 0.9, 1);
        m.features.alpha_beta_sync = 0.05;
        assert_eq!(c.step(&m).mode, ControlMode::Stabilize);
        assert!((c.challenge_level() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn low_recovery_maintains_instead_of_deepening() {
        let mut c = controller();
        c.set_recovery_score(0.2);
        let step = c.step(&metrics(FlowState::Flow, 0.9, 0));
        assert_eq!(step.mode, ControlMode::Maintain);
        assert!(step.recovery_capacity < 0.7);
    }

    #[test]
    fn maintain_smooths_toward_remembered_beat() {
        let mut c = controller();
        for epoch in 0..20 {
            c.step(&metrics(FlowState::Flow, 0.9, epoch));
        }
        let mut winner = metrics(FlowState::Flow, 0.9, 20);
        winner.features.flow_probability = 0.95;
        c.step(&winner);
        let (_, remembered_beat) = c.remembered(EntrainmentMode::Flow).unwrap();
        assert!(remembered_beat > 8.0);

        c.set_recovery_score(0.0);
        let mut m = metrics(FlowState::Boredom, 0.9, 21);
        m.features.flow_probability = 0.1;
        let before = c.parameters().beat_frequency;
        let step = c.step(&m);
        assert_eq!(step.mode, ControlMode::Maintain);
        assert!((step.parameters.beat_frequency - before).abs() <= before * 0.02 + 1e-4);
    }

    #[test]
    fn meditate_stabilizes_toward_slower_beat() {
        let mut c = controller();
        c.set_entrainment_mode(EntrainmentMode::Meditate);
        for epoch in 0..100 {
            c.step(&metrics(FlowState::Anxiety, 0.9, epoch));
        }
        assert!((c.parameters().beat_frequency - 6.0).abs() < 0.2);
        assert_eq!(c.challenge_level(), 0.3);
        assert_eq!(c.parameters().coupling_strength, 0.0);
    }

    #[test]
    fn non_finite_metrics_never_escape_the_safe_range() {
        let mut c = controller();
        let mut m = metrics(FlowState::Flow, f32::NAN, 0);
        m.features.cognitive_load = f32::INFINITY;
        m.features.alpha_beta_sync = f32::NAN;
        let step = c.step(&m);
        assert_eq!(step.mode, ControlMode::Stabilize);
        assert!(step.parameters.beat_frequency.is_finite());
        c.set_recovery_score(f32::NAN);
        assert!(c.step(&metrics(FlowState::Flow, 0.9, 1)).recovery_capacity.is_finite());
    }
}
