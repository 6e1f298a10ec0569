//! FFT engine using realfft for real-valued signals
//!
//! One engine per worker: the plan is shared, the buffers are not

use num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::error::AnalysisError;

/// FFT engine for real-valued signals
pub struct FftEngine {
    /// FFT size (number of samples)
    fft_size: usize,

    /// Real FFT processor
    r2c: Arc<dyn RealToComplex<f64>>,

    /// Reusable input buffer
    input_buffer: Vec<f64>,

    /// Reusable output buffer (complex spectrum)
    output_buffer: Vec<Complex<f64>>,
}

impl FftEngine {
    /// Create new FFT engine
    ///
    /// # Arguments
    /// * `fft_size` - FFT size (number of samples)
    pub fn new(fft_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let r2c = planner.plan_fft_forward(fft_size);

        let input_buffer = r2c.make_input_vec();
        let output_buffer = r2c.make_output_vec();

        Self {
            fft_size,
            r2c,
            input_buffer,
            output_buffer,
        }
    }

    /// Compute the FFT of `signal` into the internal output buffer
    ///
    /// The signal is zero-padded (or cut) to `fft_size`.
    fn transform(&mut self, signal: &[f64]) -> Result<&[Complex<f64>], AnalysisError> {
        let copy_len = signal.len().min(self.fft_size);
        self.input_buffer[..copy_len].copy_from_slice(&signal[..copy_len]);
        if copy_len < self.fft_size {
            self.input_buffer[copy_len..].fill(0.0);
        }

        self.r2c
            .process(&mut self.input_buffer, &mut self.output_buffer)
            .map_err(|e| AnalysisError::Fft(e.to_string()))?;

        Ok(self.output_buffer.as_slice())
    }

    /// Accumulate the power spectrum |X[k]|² of `signal` into `acc`
    pub fn accumulate_power(&mut self, signal: &[f64], acc: &mut [f64]) -> Result<(), AnalysisError> {
        let spectrum = self.transform(signal)?;
        for (a, c) in acc.iter_mut().zip(spectrum.iter()) {
            *a += c.norm_sqr();
        }
        Ok(())
    }

    /// Get FFT size
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Get number of frequency bins (fft_size/2 + 1 for real FFT)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_fft_dc_signal() {
        let mut fft = FftEngine::new(1024);
        let mut power = vec![0.0; fft.num_bins()];

        // DC signal (constant), zero-padded
        fft.accumulate_power(&vec![1.0; 100], &mut power).unwrap();

        assert!((power[0] - 100.0 * 100.0).abs() < 1e-6);
        assert!(power[10] < 1.0);
    }

    #[test]
    fn test_fft_sine_wave() {
        let mut fft = FftEngine::new(1024);
        let mut power = vec![0.0; fft.num_bins()];

        // Sine wave exactly on bin 51
        let signal: Vec<f64> = (0..1024)
            .map(|n| (2.0 * PI * 51.0 * n as f64 / 1024.0).sin())
            .collect();
        fft.accumulate_power(&signal, &mut power).unwrap();

        let (peak_bin, &peak_pow) = power
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap();

        assert_eq!(peak_bin, 51);
        // |X| = N/2 for a unit sine
        assert!((peak_pow.sqrt() - 512.0).abs() < 1e-6);
    }

    #[test]
    fn test_accumulate_power() {
        let mut fft = FftEngine::new(64);
        let signal = vec![1.0; 64];
        let mut acc = vec![0.0; fft.num_bins()];

        fft.accumulate_power(&signal, &mut acc).unwrap();
        fft.accumulate_power(&signal, &mut acc).unwrap();

        assert!((acc[0] - 2.0 * 64.0 * 64.0).abs() < 1e-6);
        assert_eq!(fft.fft_size(), 64);
        assert_eq!(acc.len(), 33);
    }
}
