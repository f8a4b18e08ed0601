use crate::config::BandConfig;
use crate::dsp::filter::{FilterChain, FilterKind};
use crate::dsp::PipelineError;
use crate::types::Band;

/// Zero-phase band-limited copies of one cleaned channel.
#[derive(Clone, Debug, Default)]
pub struct BandSeries {
    series: [Vec<f32>; 5],
}

impl BandSeries {
    pub fn get(&self, band: Band) -> &[f32] {
        &self.series[band.index()]
    }

    pub fn len(&self) -> usize {
        self.series[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.iter().any(|s| s.is_empty())
    }
}

/// One Butterworth bandpass cascade per band, designed once per sample rate.
pub struct BandFilterBank {
    sample_rate_hz: f32,
    chains: [FilterChain; 5],
}

impl BandFilterBank {
    pub fn new(config: &BandConfig, sample_rate_hz: f32) -> Result<Self, PipelineError> {
        let design = |band: Band| {
            let edges = config.edges(band);
            FilterChain::design(
                sample_rate_hz,
                &[FilterKind::Bandpass {
                    low_hz: edges.low_hz,
                    high_hz: edges.high_hz,
                    order: config.filter_order,
                }],
            )
            .map_err(|err| match err {
                PipelineError::CutoffAboveNyquist {
                    cutoff_hz,
                    nyquist_hz,
                    ..
                } => PipelineError::CutoffAboveNyquist {
                    band: band.name().to_string(),
                    cutoff_hz,
                    nyquist_hz,
                },
                other => other,
            })
        };
        Ok(Self {
            sample_rate_hz,
            chains: [
                design(Band::Delta)?,
                design(Band::Theta)?,
                design(Band::Alpha)?,
                design(Band::Beta)?,
                design(Band::Gamma)?,
            ],
        })
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    pub fn filter(&self, clean: &[f32]) -> BandSeries {
        BandSeries {
            series: std::array::from_fn(|i| self.chains[i].filtfilt(clean)),
        }
    }
}
