// src/recommendations.rs
use serde::{Deserialize, Serialize};

use crate::types::{FeatureVector, FlowState};

/// Fixed advisory catalog. Selection is deterministic for a given input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    ReduceTaskSize,
    ReduceComplexity,
    IncreaseComplexity,
    AddComplexity,
    MaintainEngagement,
    WatchCognitiveLoad,
    OptimalState,
    AlphaThetaBeats,
    AlphaBeats,
    CheckSignal,
    Stabilizing,
    Deepening,
    Maintaining,
}

impl Recommendation {
    pub const ALL: [Recommendation; 13] = [
        Recommendation::ReduceTaskSize,
        Recommendation::ReduceComplexity,
        Recommendation::IncreaseComplexity,
        Recommendation::AddComplexity,
        Recommendation::MaintainEngagement,
        Recommendation::WatchCognitiveLoad,
        Recommendation::OptimalState,
        Recommendation::AlphaThetaBeats,
        Recommendation::AlphaBeats,
        Recommendation::CheckSignal,
        Recommendation::Stabilizing,
        Recommendation::Deepening,
        Recommendation::Maintaining,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            Recommendation::ReduceTaskSize => {
                "Cognitive load is high. Try breaking the task into smaller steps."
            }
            Recommendation::ReduceComplexity => {
                "Challenge level may be too high. Consider reducing complexity."
            }
            Recommendation::IncreaseComplexity => {
                "Attention level is low. Try increasing task complexity."
            }
            Recommendation::AddComplexity => {
                "Challenge level may be too low. Consider adding complexity."
            }
            Recommendation::MaintainEngagement => "Maintain current engagement level.",
            Recommendation::WatchCognitiveLoad => "Watch cognitive load - take breaks if needed.",
            Recommendation::OptimalState => "Optimal state achieved. Maintain current conditions.",
            Recommendation::AlphaThetaBeats => {
                "Consider alpha-theta binaural beats (8-10 Hz) to improve focus."
            }
            Recommendation::AlphaBeats => {
                "Try alpha binaural beats (10-12 Hz) to reduce cognitive load."
            }
            Recommendation::CheckSignal => "Signal quality is low. Check electrode contact.",
            Recommendation::Stabilizing => "Stabilizing: easing stimulation back toward the mode's hold beat.",
            Recommendation::Deepening => "Deepening: raising coupling and beat toward the top of the mode range.",
            Recommendation::Maintaining => "Maintaining current stimulation.",
        }
    }
}

const HIGH_LOAD: f32 = 0.7;
const OVERLOAD: f32 = 0.8;
const LOW_ATTENTION: f32 = 0.3;
const BEATS_ATTENTION: f32 = 0.5;

/// Detector advisories keyed by state, then a binaural-beat suggestion keyed
/// by attention and load. UNKNOWN epochs only get the signal advisory.
pub fn for_state(state: FlowState, features: &FeatureVector, low_signal: bool) -> Vec<Recommendation> {
    let load = features.cognitive_load;
    let attention = features.attention_level;
    let mut out = Vec::new();
    if low_signal {
        out.push(Recommendation::CheckSignal);
    }
    match state {
        FlowState::Anxiety => {
            if load > HIGH_LOAD {
                out.push(Recommendation::ReduceTaskSize);
            }
            out.push(Recommendation::ReduceComplexity);
        }
        FlowState::Boredom => {
            if attention < LOW_ATTENTION {
                out.push(Recommendation::IncreaseComplexity);
            }
            out.push(Recommendation::AddComplexity);
        }
        FlowState::Flow => {
            out.push(Recommendation::MaintainEngagement);
            if load > OVERLOAD {
                out.push(Recommendation::WatchCognitiveLoad);
            }
        }
        FlowState::DeepFlow => out.push(Recommendation::OptimalState),
        FlowState::Unknown => return out,
    }
    if attention < BEATS_ATTENTION {
        out.push(Recommendation::AlphaThetaBeats);
    } else if load > HIGH_LOAD {
        out.push(Recommendation::AlphaBeats);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(load: f32, attention: f32) -> FeatureVector {
        FeatureVector {
            cognitive_load: load,
            attention_level: attention,
            ..FeatureVector::zeroed()
        }
    }

    #[test]
    fn catalog_is_enumerable_and_unique() {
        let mut messages: Vec<&str> = Recommendation::ALL.iter().map(|r| r.message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), Recommendation::ALL.len());
    }

    #[test]
    fn every_selection_comes_from_the_catalog() {
        for state in FlowState::ALL {
            for load in [0.0, 0.5, 0.9] {
                for attention in [0.0, 0.5, 0.9] {
                    for low in [false, true] {
                        let picks = for_state(state, &features(load, attention), low);
                        assert!(picks.iter().all(|r| Recommendation::ALL.contains(r)));
                        assert_eq!(picks, for_state(state, &features(load, attention), low));
                    }
                }
            }
        }
    }

    #[test]
    fn selection_table() {
        use Recommendation::*;
        let cases: &[(FlowState, f32, f32, &[Recommendation])] = &[
            (FlowState::Anxiety, 0.9, 0.1, &[ReduceTaskSize, ReduceComplexity, AlphaThetaBeats]),
            (FlowState::Anxiety, 0.7, 0.6, &[ReduceComplexity]),
            (FlowState::Anxiety, 0.75, 0.6, &[ReduceTaskSize, ReduceComplexity, AlphaBeats]),
            (FlowState::Boredom, 0.1, 0.2, &[IncreaseComplexity, AddComplexity, AlphaThetaBeats]),
            (FlowState::Boredom, 0.1, 0.3, &[AddComplexity, AlphaThetaBeats]),
            (FlowState::Boredom, 0.1, 0.5, &[AddComplexity]),
            (FlowState::Flow, 0.8, 0.9, &[MaintainEngagement, AlphaBeats]),
            (FlowState::Flow, 0.85, 0.9, &[MaintainEngagement, WatchCognitiveLoad, AlphaBeats]),
            (FlowState::Flow, 0.5, 0.9, &[MaintainEngagement]),
            (FlowState::DeepFlow, 0.9, 0.9, &[OptimalState, AlphaBeats]),
            (FlowState::DeepFlow, 0.2, 0.4, &[OptimalState, AlphaThetaBeats]),
            (FlowState::Unknown, 0.9, 0.1, &[]),
        ];
        for (state, load, attention, want) in cases {
            let picks = for_state(*state, &features(*load, *attention), false);
            assert_eq!(&picks, want, "{state:?} load={load} attention={attention}");
        }
    }

    #[test]
    fn low_signal_leads_the_list() {
        let picks = for_state(FlowState::Unknown, &features(0.9, 0.1), true);
        assert_eq!(picks, vec![Recommendation::CheckSignal]);
        let picks = for_state(FlowState::Flow, &features(0.5, 0.9), true);
        assert_eq!(
            picks,
            vec![Recommendation::CheckSignal, Recommendation::MaintainEngagement]
        );
    }

    #[test]
    fn detector_wording_is_kept() {
        assert_eq!(
            Recommendation::ReduceTaskSize.message(),
            "Cognitive load is high. Try breaking the task into smaller steps."
        );
        assert_eq!(
            Recommendation::AlphaThetaBeats.message(),
            "Consider alpha-theta binaural beats (8-10 Hz) to improve focus."
        );
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Recommendation::AlphaThetaBeats).unwrap();
        assert_eq!(json, "\"alpha_theta_beats\"");
    }
}
