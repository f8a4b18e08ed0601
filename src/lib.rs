// src/lib.rs
pub mod classifier;
pub mod config;
pub mod controller;
pub mod dsp;
pub mod engine;
pub mod history;
pub mod recommendations;
pub mod types;

pub use classifier::FlowClassifier;
pub use config::PipelineConfig;
pub use controller::{AdaptationController, ControlMode, ControlStep};
pub use dsp::{EpochReport, FlowPipeline, PipelineError, Sample, SampleChunk, SampleSource};
pub use engine::{spawn_pipeline, PipelineHandle};
pub use recommendations::Recommendation;
pub use types::{
    BandPowers, EntrainmentMode, FeatureVector, FlowMetrics, FlowState, StimulationParameters,
};
