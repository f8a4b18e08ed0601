// src/classifier.rs
use crate::config::ClassifierConfig;
use crate::history::{mean_std, FeatureHistory};
use crate::types::{FeatureVector, FlowState};

/// Deterministic threshold classifier.
///
/// Rules, first match wins:
/// 1. non-finite features or signal quality below the floor -> `Unknown`
/// 2. high alpha/theta and high theta/beta -> `DeepFlow`
/// 3. beta dominating alpha -> `Anxiety`
/// 4. attention below the floor -> `Boredom`
/// 5. high alpha/theta -> `Flow`
/// 6. otherwise by flow probability, then cognitive load.
#[derive(Clone, Debug)]
pub struct FlowClassifier {
    config: ClassifierConfig,
}

impl FlowClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// `history` holds previous epochs only. Pure: same input, same output.
    pub fn classify(&self, features: &FeatureVector, history: &FeatureHistory) -> (FlowState, f32) {
        let state = self.decide(features);
        if state == FlowState::Unknown {
            return (state, 0.0);
        }
        (state, self.confidence(features, history))
    }

    pub fn decide(&self, f: &FeatureVector) -> FlowState {
        let c = &self.config;
        if !f.is_finite() || !(f.signal_quality >= c.min_signal_quality) {
            return FlowState::Unknown;
        }
        let high_alpha_theta = f.alpha_theta_ratio > c.flow_alpha_theta;
        if high_alpha_theta && f.theta_beta_ratio > c.deep_flow_theta_beta {
            FlowState::DeepFlow
        } else if f.beta_alpha_ratio > c.anxiety_beta_alpha {
            FlowState::Anxiety
        } else if f.attention_level < c.boredom_attention {
            FlowState::Boredom
        } else if high_alpha_theta {
            FlowState::Flow
        } else if f.flow_probability >= c.fallback_flow_probability {
            FlowState::Flow
        } else if f.cognitive_load >= c.fallback_anxiety_load {
            FlowState::Anxiety
        } else {
            FlowState::Boredom
        }
    }

    /// Weighted mix of feature stability and signal quality, in `[0, 1]`.
    pub fn confidence(&self, features: &FeatureVector, history: &FeatureHistory) -> f32 {
        let c = &self.config;
        if history.len() < c.min_history {
            return c.bootstrap_confidence;
        }
        let current = features.stability_components();
        let stability = (0..current.len())
            .map(|k| {
                let values = history
                    .iter()
                    .map(|f| f.stability_components()[k])
                    .chain(std::iter::once(current[k]));
                let (_, std) = mean_std(values);
                1.0 / (1.0 + std)
            })
            .sum::<f32>()
            / current.len() as f32;
        let weight_sum = c.stability_weight + c.quality_weight;
        if !(weight_sum > 0.0) {
            return 0.0;
        }
        let quality = features.signal_quality.clamp(0.0, 1.0);
        let confidence = (c.stability_weight * stability + c.quality_weight * quality) / weight_sum;
        if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn classifier() -> FlowClassifier {
        FlowClassifier::new(&ClassifierConfig::default())
    }

    fn features(at: f32, tb: f32, ba: f32, attention: f32) -> FeatureVector {
        FeatureVector {
            alpha_theta_ratio: at,
            theta_beta_ratio: tb,
            beta_alpha_ratio: ba,
            attention_level: attention,
            signal_quality: 0.9,
            ..FeatureVector::zeroed()
        }
    }

    fn history_of(f: &FeatureVector, n: usize) -> FeatureHistory {
        let mut history = FeatureHistory::new(100);
        for _ in 0..n {
            history.push(f.clone());
        }
        history
    }

    #[test]
    fn threshold_tiers() {
        let c = classifier();
        assert_eq!(c.decide(&features(2.0, 1.5, 0.2, 0.5)), FlowState::DeepFlow);
        assert_eq!(c.decide(&features(2.0, 0.5, 0.2, 0.5)), FlowState::Flow);
        assert_eq!(c.decide(&features(0.5, 0.5, 2.0, 0.5)), FlowState::Anxiety);
        assert_eq!(c.decide(&features(0.5, 0.5, 0.5, 0.1)), FlowState::Boredom);
        let mut fallback = features(1.0, 0.5, 1.0, 0.5);
        fallback.flow_probability = 0.7;
        assert_eq!(c.decide(&fallback), FlowState::Flow);
        fallback.flow_probability = 0.1;
        fallback.cognitive_load = 0.8;
        assert_eq!(c.decide(&fallback), FlowState::Anxiety);
        fallback.cognitive_load = 0.2;
        assert_eq!(c.decide(&fallback), FlowState::Boredom);
    }

    #[test]
    fn bootstrap_confidence_until_ten_epochs() {
        let c = classifier();
        let f = features(2.0, 0.5, 0.2, 0.5);
        for n in 0..10 {
            assert_eq!(c.classify(&f, &history_of(&f, n)), (FlowState::Flow, 0.5));
        }
        let (_, confidence) = c.classify(&f, &history_of(&f, 10));
        // Perfectly stable history: stability 1, quality 0.9.
        assert!((confidence - 0.95).abs() < 1e-5);
    }

    #[test]
    fn unstable_history_lowers_confidence() {
        let c = classifier();
        let f = features(2.0, 0.5, 0.2, 0.5);
        let mut noisy = FeatureHistory::new(100);
        for i in 0..20 {
            noisy.push(features(if i % 2 == 0 { 0.0 } else { 10.0 }, 0.5, 0.2, 0.5));
        }
        let (_, steady) = c.classify(&f, &history_of(&f, 20));
        let (_, shaky) = c.classify(&f, &noisy);
        assert!(shaky < steady);
    }

    #[test]
    fn identical_inputs_classify_identically() {
        let c = classifier();
        let mut rng = StdRng::seed_from_u64(3);
        let mut history = FeatureHistory::new(100);
        for _ in 0..30 {
            history.push(features(rng.gen(), rng.gen(), rng.gen(), rng.gen()));
        }
        let f = features(1.7, 0.9, 0.4, 0.6);
        let first = c.classify(&f, &history);
        for _ in 0..5 {
            assert_eq!(c.classify(&f, &history), first);
        }
    }

    #[test]
    fn degenerate_inputs_are_unknown() {
        let c = classifier();
        let history = history_of(&features(2.0, 0.5, 0.2, 0.5), 20);
        assert_eq!(
            c.classify(&FeatureVector::zeroed(), &history),
            (FlowState::Unknown, 0.0)
        );
        let mut nan = features(2.0, 0.5, 0.2, 0.5);
        nan.theta_beta_ratio = f32::NAN;
        assert_eq!(c.classify(&nan, &history).0, FlowState::Unknown);
        let mut inf = features(2.0, 0.5, 0.2, 0.5);
        inf.powers.gamma = f32::INFINITY;
        assert_eq!(c.classify(&inf, &history).0, FlowState::Unknown);
    }

    #[test]
    fn confidence_stays_in_unit_interval_for_extremes() {
        let c = classifier();
        let mut rng = StdRng::seed_from_u64(11);
        let extremes = [0.0f32, 1e-12, 1.0, 1e6, f32::MAX / 4.0];
        let mut history = FeatureHistory::new(100);
        for _ in 0..200 {
            let pick = |rng: &mut StdRng| {
                if rng.gen_bool(0.3) {
                    extremes[rng.gen_range(0..extremes.len())]
                } else {
                    rng.gen_range(0.0f32..100.0)
                }
            };
            let mut f = features(pick(&mut rng), pick(&mut rng), pick(&mut rng), pick(&mut rng));
            f.signal_quality = rng.gen_range(0.0f32..=1.0);
            f.alpha_beta_sync = pick(&mut rng);
            let (state, confidence) = c.classify(&f, &history);
            assert!((0.0..=1.0).contains(&confidence), "{state:?} {confidence}");
            history.push(f);
        }
    }
}
