use rustfft::{num_complex::Complex32, FftPlanner};

/// Analytic signal of a real series, with helpers for envelope and phase.
#[derive(Clone, Debug, Default)]
pub struct AnalyticSignal {
    values: Vec<Complex32>,
}

impl AnalyticSignal {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Complex32] {
        &self.values
    }

    /// Instantaneous amplitude.
    pub fn envelope(&self) -> Vec<f32> {
        self.values.iter().map(|c| c.norm()).collect()
    }

    /// Instantaneous phase in `(-π, π]`.
    pub fn phase(&self) -> Vec<f32> {
        self.values.iter().map(|c| c.arg()).collect()
    }
}

/// FFT-based Hilbert transform; plans are cached across epochs of equal length.
pub struct HilbertTransform {
    planner: FftPlanner<f32>,
}

impl Default for HilbertTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl HilbertTransform {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    pub fn analytic(&mut self, input: &[f32]) -> AnalyticSignal {
        let n = input.len();
        if n == 0 {
            return AnalyticSignal::default();
        }
        let mut buffer: Vec<Complex32> = input
            .iter()
            .map(|&v| Complex32::new(if v.is_finite() { v } else { 0.0 }, 0.0))
            .collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);
        // Zero negative frequencies, double positive ones; DC and Nyquist stay.
        let half = n / 2;
        for (k, bin) in buffer.iter_mut().enumerate().skip(1) {
            if k < half || (k == half && n % 2 == 1) {
                *bin *= 2.0;
            } else if k > half {
                *bin = Complex32::ZERO;
            }
        }
        self.planner.plan_fft_inverse(n).process(&mut buffer);
        let scale = 1.0 / n as f32;
        for value in buffer.iter_mut() {
            *value *= scale;
        }
        AnalyticSignal { values: buffer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::filter::tests::sine;

    #[test]
    fn envelope_of_a_sine_is_its_amplitude() {
        // Whole number of cycles, so there is no leakage at the edges.
        let x = sine(8.0, 2.0, 256.0, 256);
        let analytic = HilbertTransform::new().analytic(&x);
        assert_eq!(analytic.len(), 256);
        for (i, (re, env)) in analytic
            .values()
            .iter()
            .map(|c| c.re)
            .zip(analytic.envelope())
            .enumerate()
        {
            assert!((re - x[i]).abs() < 1e-3);
            assert!((env - 2.0).abs() < 1e-3, "envelope {env} at {i}");
        }
    }

    #[test]
    fn phase_advances_at_the_signal_frequency() {
        let x = sine(8.0, 1.0, 256.0, 256);
        let phase = HilbertTransform::new().analytic(&x).phase();
        let expected_step = 2.0 * std::f32::consts::PI * 8.0 / 256.0;
        let step = phase[11] - phase[10];
        assert!((step - expected_step).abs() < 1e-3);
    }

    #[test]
    fn odd_lengths_and_empty_input() {
        let mut hilbert = HilbertTransform::new();
        assert!(hilbert.analytic(&[]).is_empty());
        let odd = hilbert.analytic(&sine(8.0, 1.0, 256.0, 255));
        assert_eq!(odd.len(), 255);
        assert!(odd.envelope().iter().all(|v| v.is_finite()));
    }
}
