use thiserror::Error;
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("insufficient data: epoch needs {required} samples, buffer holds {available}")]
    InsufficientData { required: usize, available: usize },
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("at least one EEG channel must be configured")]
    EmptyChannelList,
    #[error("{band} cutoff {cutoff_hz} Hz must be below the Nyquist frequency {nyquist_hz} Hz")]
    CutoffAboveNyquist {
        band: String,
        cutoff_hz: f32,
        nyquist_hz: f32,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("timestamps must be monotonic: {current} follows {previous}")]
    NonMonotonicTimestamp { previous: f64, current: f64 },
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
impl PipelineError {
    /// Errors the caller should answer by waiting for more data.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::InsufficientData { .. })
    }
    /// Errors raised while building a pipeline, never during steady state.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidSampleRate
                | PipelineError::EmptyChannelList
                | PipelineError::CutoffAboveNyquist { .. }
                | PipelineError::InvalidConfig(_)
                | PipelineError::Io(_)
                | PipelineError::Json(_)
        )
    }
}
