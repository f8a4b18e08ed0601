use std::f64::consts::PI;

use crate::dsp::PipelineError;

#[derive(Clone, Copy, Debug)]
pub enum FilterKind {
    Notch { freq_hz: f32, q: f32 },
    Highpass { cutoff_hz: f32, order: usize },
    Lowpass { cutoff_hz: f32, order: usize },
    Bandpass { low_hz: f32, high_hz: f32, order: usize },
}

impl FilterKind {
    fn lowest_edge_hz(&self) -> f32 {
        match *self {
            FilterKind::Notch { freq_hz, q } => freq_hz / q.max(0.1),
            FilterKind::Highpass { cutoff_hz, .. } => cutoff_hz,
            FilterKind::Lowpass { cutoff_hz, .. } => cutoff_hz,
            FilterKind::Bandpass { low_hz, .. } => low_hz,
        }
    }

    fn highest_edge_hz(&self) -> f32 {
        match *self {
            FilterKind::Notch { freq_hz, .. } => freq_hz,
            FilterKind::Highpass { cutoff_hz, .. } => cutoff_hz,
            FilterKind::Lowpass { cutoff_hz, .. } => cutoff_hz,
            FilterKind::Bandpass { high_hz, .. } => high_hz,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadCoeffs {
    fn process(&self, state: &mut BiquadState, input: f64) -> f64 {
        // Transposed direct form II
        let y = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * y + state.z2;
        state.z2 = self.b2 * input - self.a2 * y;
        y
    }

    /// State that makes a constant `x0` input pass without a start-up transient.
    fn steady_state(&self, x0: f64) -> BiquadState {
        let den = 1.0 + self.a1 + self.a2;
        let gain = if den.abs() < 1e-12 {
            0.0
        } else {
            (self.b0 + self.b1 + self.b2) / den
        };
        let y0 = gain * x0;
        BiquadState {
            z1: y0 - self.b0 * x0,
            z2: self.b2 * x0 - self.a2 * y0,
        }
    }
}

/// Cascade of second-order sections with precomputed coefficients.
#[derive(Clone, Debug)]
pub struct FilterChain {
    sections: Vec<BiquadCoeffs>,
    pad_len: usize,
}

impl FilterChain {
    /// Designs the cascade once for a fixed sample rate.
    pub fn design(sample_rate_hz: f32, kinds: &[FilterKind]) -> Result<Self, PipelineError> {
        if !(sample_rate_hz > 0.0) {
            return Err(PipelineError::InvalidSampleRate);
        }
        let nyquist = sample_rate_hz * 0.5;
        let mut sections = Vec::new();
        let mut lowest_edge = f32::MAX;
        for kind in kinds {
            let highest = kind.highest_edge_hz();
            if highest >= nyquist {
                return Err(PipelineError::CutoffAboveNyquist {
                    band: format!("{kind:?}"),
                    cutoff_hz: highest,
                    nyquist_hz: nyquist,
                });
            }
            if !(kind.lowest_edge_hz() > 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "filter edges must be positive: {kind:?}"
                )));
            }
            lowest_edge = lowest_edge.min(kind.lowest_edge_hz());
            sections.extend(design_sections(sample_rate_hz as f64, *kind)?);
        }
        let transient = if lowest_edge < f32::MAX {
            (sample_rate_hz / lowest_edge).ceil() as usize
        } else {
            0
        };
        let pad_len = (3 * (2 * sections.len() + 1)).max(transient);
        Ok(Self { sections, pad_len })
    }

    pub fn empty() -> Self {
        Self {
            sections: vec![],
            pad_len: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    /// Single forward pass, as a streaming device filter would produce.
    #[cfg(test)]
    fn filter_causal(&self, input: &[f32]) -> Vec<f32> {
        let mut data: Vec<f64> = input.iter().map(|&v| v as f64).collect();
        self.run(&mut data);
        data.into_iter().map(|v| v as f32).collect()
    }

    /// Forward-backward pass: squared magnitude response, zero phase.
    pub fn filtfilt(&self, input: &[f32]) -> Vec<f32> {
        let n = input.len();
        if n == 0 || self.sections.is_empty() {
            return input.to_vec();
        }
        let pad = self.pad_len.min(n - 1);
        let first = input[0] as f64;
        let last = input[n - 1] as f64;
        // Odd extension at both ends keeps edge transients out of the epoch.
        let mut data = Vec::with_capacity(n + 2 * pad);
        data.extend((1..=pad).rev().map(|i| 2.0 * first - input[i] as f64));
        data.extend(input.iter().map(|&v| v as f64));
        data.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i] as f64));
        self.run(&mut data);
        data.reverse();
        self.run(&mut data);
        data.reverse();
        data[pad..pad + n].iter().map(|&v| v as f32).collect()
    }

    fn run(&self, data: &mut [f64]) {
        let Some(&x0) = data.first() else {
            return;
        };
        let mut start = x0;
        for section in &self.sections {
            let mut state = section.steady_state(start);
            for value in data.iter_mut() {
                *value = section.process(&mut state, *value);
            }
            start = data[0];
        }
    }
}

fn design_sections(sample_rate_hz: f64, kind: FilterKind) -> Result<Vec<BiquadCoeffs>, PipelineError> {
    match kind {
        FilterKind::Notch { freq_hz, q } => Ok(vec![notch(freq_hz as f64, sample_rate_hz, q as f64)]),
        FilterKind::Highpass { cutoff_hz, order } => Ok(butterworth_qs(order)?
            .into_iter()
            .map(|q| highpass(cutoff_hz as f64, sample_rate_hz, q))
            .collect()),
        FilterKind::Lowpass { cutoff_hz, order } => Ok(butterworth_qs(order)?
            .into_iter()
            .map(|q| lowpass(cutoff_hz as f64, sample_rate_hz, q))
            .collect()),
        FilterKind::Bandpass {
            low_hz,
            high_hz,
            order,
        } => {
            if low_hz >= high_hz {
                return Err(PipelineError::InvalidConfig(format!(
                    "bandpass edges inverted: {low_hz}..{high_hz}"
                )));
            }
            let mut sections = design_sections(
                sample_rate_hz,
                FilterKind::Highpass {
                    cutoff_hz: low_hz,
                    order,
                },
            )?;
            sections.extend(design_sections(
                sample_rate_hz,
                FilterKind::Lowpass {
                    cutoff_hz: high_hz,
                    order,
                },
            )?);
            Ok(sections)
        }
    }
}

/// Section Q factors of an even-order Butterworth prototype.
fn butterworth_qs(order: usize) -> Result<Vec<f64>, PipelineError> {
    if order == 0 || order % 2 != 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "Butterworth order must be even and positive, got {order}"
        )));
    }
    let n = order as f64;
    Ok((0..order / 2)
        .map(|k| {
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * n);
            1.0 / (2.0 * theta.cos())
        })
        .collect())
}

fn lowpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 - cos_w0) * 0.5;
    let b1 = 1.0 - cos_w0;
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}

fn highpass(freq_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q);
    let cos_w0 = w0.cos();
    let b0 = (1.0 + cos_w0) * 0.5;
    let b1 = -(1.0 + cos_w0);
    let b2 = b0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}

fn notch(center_hz: f64, sample_rate_hz: f64, q: f64) -> BiquadCoeffs {
    let w0 = 2.0 * PI * center_hz / sample_rate_hz;
    let alpha = w0.sin() / (2.0 * q.max(0.1));
    let cos_w0 = w0.cos();
    let b0 = 1.0;
    let b1 = -2.0 * cos_w0;
    let b2 = 1.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_w0;
    let a2 = 1.0 - alpha;
    normalize(b0, b1, b2, a0, a1, a2)
}

fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> BiquadCoeffs {
    let a0_inv = 1.0 / a0;
    BiquadCoeffs {
        b0: b0 * a0_inv,
        b1: b1 * a0_inv,
        b2: b2 * a0_inv,
        a1: a1 * a0_inv,
        a2: a2 * a0_inv,
    }
}
