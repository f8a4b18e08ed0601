// src/dsp/mod.rs
// Signal path: buffering, cleaning, band filtering and feature extraction.
pub mod artifact;
pub mod bands;
pub mod buffer;
pub mod error;
pub mod features;
pub mod filter;
pub mod hilbert;
pub mod pipeline;
pub mod source;
// Re-exports for callers outside the module
pub use artifact::{ArtifactFilter, QualityMask};
pub use bands::{BandFilterBank, BandSeries};
pub use buffer::{Epoch, SampleBuffer};
pub use error::PipelineError;
pub use features::{CleanedChannel, FeatureExtractor};
pub use filter::{FilterChain, FilterKind};
pub use hilbert::{AnalyticSignal, HilbertTransform};
pub use pipeline::{EpochReport, FlowPipeline};
pub use source::{make_chunk, ManualSource, Oscillation, Sample, SampleChunk, SampleSource, SyntheticSource};
