//! Welch power spectral density estimation
//!
//! The aligned series is cut into overlapping segments, each segment is
//! detrended and windowed, and the one-sided periodograms are averaged.
//! Power is expressed as a density (units²/Hz) so estimates from recordings
//! of different length or sample count are directly comparable.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::fft::FftEngine;
use super::windowing::{detrend_and_window, generate_window, window_power_sum, WindowType};
use crate::alignment::{interpolate_linear, AlignedSeries};
use crate::error::AnalysisError;
use crate::measurement::Axis;

/// Spectral estimation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Segment length in seconds, rounded up to a power-of-two sample count
    pub window_seconds: f64,

    /// Window applied to each segment
    pub window: WindowType,

    /// Fraction of a segment shared with the next one, in [0, 1)
    pub overlap: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            window_seconds: 0.5,
            window: WindowType::default(),
            overlap: 0.5,
        }
    }
}

impl SpectralConfig {
    /// Segment length in samples for a given sample rate
    pub fn segment_len(&self, sample_rate: f64) -> usize {
        let raw = (sample_rate * self.window_seconds).ceil().max(2.0) as usize;
        raw.next_power_of_two()
    }
}

/// Segmentation and scaling shared by the PSD and the spectrogram
pub(crate) struct SegmentPlan {
    nfft: usize,
    step: usize,
    window: Vec<f64>,
    sample_rate: f64,
    scale: f64,
}

impl SegmentPlan {
    pub(crate) fn new(config: &SpectralConfig, sample_rate: f64) -> Self {
        let nfft = config.segment_len(sample_rate);
        let overlap = (nfft as f64 * config.overlap.clamp(0.0, 0.99)).floor() as usize;
        let step = (nfft - overlap).max(1);
        let window = generate_window(config.window, nfft);
        let scale = 1.0 / (sample_rate * window_power_sum(&window));

        Self {
            nfft,
            step,
            window,
            sample_rate,
            scale,
        }
    }

    pub(crate) fn nfft(&self) -> usize {
        self.nfft
    }

    pub(crate) fn num_bins(&self) -> usize {
        self.nfft / 2 + 1
    }

    pub(crate) fn segment_count(&self, len: usize) -> usize {
        if len < self.nfft {
            0
        } else {
            (len - self.nfft) / self.step + 1
        }
    }

    pub(crate) fn segment_start(&self, index: usize) -> usize {
        index * self.step
    }

    /// Add the raw periodogram |X[k]|² of segment `index` of `signal` to `acc`
    pub(crate) fn accumulate_segment(
        &self,
        engine: &mut FftEngine,
        signal: &[f64],
        index: usize,
        scratch: &mut Vec<f64>,
        acc: &mut [f64],
    ) -> Result<(), AnalysisError> {
        let start = self.segment_start(index);
        scratch.clear();
        scratch.extend_from_slice(&signal[start..start + self.nfft]);
        detrend_and_window(scratch, &self.window);
        engine.accumulate_power(scratch, acc)
    }

    /// Turn accumulated raw periodograms into a one-sided density averaged over `count` segments
    pub(crate) fn finish(&self, acc: &mut [f64], count: usize) {
        if count == 0 {
            return;
        }
        let factor = self.scale / count as f64;
        let last = acc.len().saturating_sub(1);
        for (k, value) in acc.iter_mut().enumerate() {
            // DC and Nyquist appear once in the full spectrum, every other bin twice
            let sides = if k == 0 || (k == last && self.nfft % 2 == 0) {
                1.0
            } else {
                2.0
            };
            *value *= factor * sides;
        }
    }

    pub(crate) fn frequencies(&self) -> Vec<f64> {
        (0..self.num_bins())
            .map(|k| k as f64 * self.sample_rate / self.nfft as f64)
            .collect()
    }
}

/// Welch PSD of a single channel
///
/// # Arguments
/// * `signal` - Uniformly sampled input
/// * `sample_rate` - Sampling rate in Hz
/// * `config` - Segment length, window and overlap
///
/// # Returns
/// `(frequencies, density)` for bins 0..=nfft/2
pub fn welch_psd(
    signal: &[f64],
    sample_rate: f64,
    config: &SpectralConfig,
) -> Result<(Vec<f64>, Vec<f64>), AnalysisError> {
    let plan = SegmentPlan::new(config, sample_rate);
    let psd = plan_psd(&plan, signal)?;
    Ok((plan.frequencies(), psd))
}

fn plan_psd(plan: &SegmentPlan, signal: &[f64]) -> Result<Vec<f64>, AnalysisError> {
    let count = plan.segment_count(signal.len());
    if count == 0 {
        return Err(AnalysisError::InsufficientData(format!(
            "{} samples is shorter than one {}-sample analysis window",
            signal.len(),
            plan.nfft()
        )));
    }

    let mut engine = FftEngine::new(plan.nfft());
    let mut scratch = Vec::with_capacity(plan.nfft());
    let mut acc = vec![0.0; plan.num_bins()];
    for index in 0..count {
        plan.accumulate_segment(&mut engine, signal, index, &mut scratch, &mut acc)?;
    }
    plan.finish(&mut acc, count);

    Ok(acc)
}

/// Per-axis power spectral densities on one frequency axis, plus their sum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralEstimate {
    freqs: Vec<f64>,
    psd: [Vec<f64>; 3],
    combined: Vec<f64>,
    sample_rate: f64,
}

impl SpectralEstimate {
    /// Assemble an estimate, checking the frequency axis and channel lengths
    pub fn from_parts(
        freqs: Vec<f64>,
        psd: [Vec<f64>; 3],
        sample_rate: f64,
    ) -> Result<Self, AnalysisError> {
        if freqs.is_empty() {
            return Err(AnalysisError::InsufficientData(
                "spectral estimate has no frequency bins".to_string(),
            ));
        }
        if psd.iter().any(|p| p.len() != freqs.len()) {
            return Err(AnalysisError::InvalidInput(format!(
                "PSD channel lengths {:?} do not match {} frequency bins",
                psd.iter().map(Vec::len).collect::<Vec<_>>(),
                freqs.len()
            )));
        }
        if freqs[0] < 0.0 || freqs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidInput(
                "frequency bins must be non-negative and strictly increasing".to_string(),
            ));
        }
        let nyquist = sample_rate / 2.0;
        if let Some(&last) = freqs.last() {
            if last > nyquist * (1.0 + 1e-9) {
                return Err(AnalysisError::InvalidInput(format!(
                    "last frequency bin {last:.3} Hz exceeds the {nyquist:.3} Hz Nyquist limit"
                )));
            }
        }

        let combined = (0..freqs.len())
            .map(|k| psd[0][k] + psd[1][k] + psd[2][k])
            .collect();

        Ok(Self {
            freqs,
            psd,
            combined,
            sample_rate,
        })
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn axis(&self, axis: Axis) -> &[f64] {
        &self.psd[axis.index()]
    }

    /// Sum of the three axis densities
    pub fn combined(&self) -> &[f64] {
        &self.combined
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Spacing between bins, zero for a single-bin estimate
    pub fn resolution(&self) -> f64 {
        if self.freqs.len() < 2 {
            0.0
        } else {
            (self.freqs[self.freqs.len() - 1] - self.freqs[0]) / (self.freqs.len() - 1) as f64
        }
    }

    pub fn max_freq(&self) -> f64 {
        self.freqs.last().copied().unwrap_or(0.0)
    }

    /// Frequency and power of the strongest bin of the combined density
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.combined
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(k, &p)| (self.freqs[k], p))
    }

    /// Keep only bins at or below `max_freq`
    pub fn truncated(&self, max_freq: f64) -> Self {
        let keep = self.freqs.iter().take_while(|&&f| f <= max_freq).count().max(1);
        Self {
            freqs: self.freqs[..keep].to_vec(),
            psd: [
                self.psd[0][..keep].to_vec(),
                self.psd[1][..keep].to_vec(),
                self.psd[2][..keep].to_vec(),
            ],
            combined: self.combined[..keep].to_vec(),
            sample_rate: self.sample_rate,
        }
    }

    /// Divide by (f + 0.1) and zero everything below 5 Hz
    ///
    /// Input shaper fitting works on this variant so that low-frequency
    /// drift does not dominate the residual vibration integral.
    pub fn normalized_to_frequencies(&self) -> Self {
        let normalize = |psd: &[f64]| -> Vec<f64> {
            psd.iter()
                .zip(self.freqs.iter())
                .map(|(&p, &f)| if f < 5.0 { 0.0 } else { p / (f + 0.1) })
                .collect()
        };

        let psd = [
            normalize(&self.psd[0]),
            normalize(&self.psd[1]),
            normalize(&self.psd[2]),
        ];
        let combined = normalize(&self.combined);

        Self {
            freqs: self.freqs.clone(),
            psd,
            combined,
            sample_rate: self.sample_rate,
        }
    }

    /// Linearly re-interpolate every channel onto `freqs`
    pub fn interpolated(&self, freqs: &[f64]) -> Result<Self, AnalysisError> {
        let psd = [
            interpolate_linear(freqs, &self.freqs, &self.psd[0]),
            interpolate_linear(freqs, &self.freqs, &self.psd[1]),
            interpolate_linear(freqs, &self.freqs, &self.psd[2]),
        ];
        Self::from_parts(freqs.to_vec(), psd, self.sample_rate)
    }
}

/// Welch estimator over aligned three-axis series
#[derive(Debug, Clone, Default)]
pub struct PsdEstimator {
    config: SpectralConfig,
}

impl PsdEstimator {
    pub fn new(config: SpectralConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Estimate per-axis densities, truncated to `max_freq` (default: Nyquist)
    ///
    /// Recorded axes are processed in parallel on the current rayon pool.
    /// Zero-filled axes contribute a zero density.
    pub fn estimate(
        &self,
        series: &AlignedSeries,
        max_freq: Option<f64>,
    ) -> Result<SpectralEstimate, AnalysisError> {
        let sample_rate = series.sample_rate();
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }

        let plan = SegmentPlan::new(&self.config, sample_rate);
        if series.len() < plan.nfft() {
            return Err(AnalysisError::InsufficientData(format!(
                "aligned series has {} samples ({:.3} s), one analysis window needs {} ({:.3} s)",
                series.len(),
                series.duration(),
                plan.nfft(),
                plan.nfft() as f64 / sample_rate
            )));
        }

        let channels = Axis::ALL[..]
            .par_iter()
            .map(|&axis| {
                if series.recorded().contains(&axis) {
                    plan_psd(&plan, series.channel(axis))
                } else {
                    Ok(vec![0.0; plan.num_bins()])
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut channels = channels.into_iter();
        let psd = [
            channels.next().unwrap_or_default(),
            channels.next().unwrap_or_default(),
            channels.next().unwrap_or_default(),
        ];

        let estimate = SpectralEstimate::from_parts(plan.frequencies(), psd, sample_rate)?;
        let limit = max_freq.unwrap_or(sample_rate / 2.0).min(sample_rate / 2.0);

        log::debug!(
            "Welch PSD: {} segments of {} samples at {:.1} Hz, {} bins up to {:.1} Hz",
            plan.segment_count(series.len()),
            plan.nfft(),
            sample_rate,
            estimate.len(),
            limit
        );

        Ok(estimate.truncated(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::ResamplingAligner;
    use crate::measurement::AxisSeries;
    use std::f64::consts::PI;

    fn sine_series(axis: Axis, freq: f64, amplitude: f64, rate: f64, seconds: f64) -> AxisSeries {
        let n = (rate * seconds) as usize;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / rate).collect();
        let v = t.iter().map(|&t| amplitude * (2.0 * PI * freq * t).sin()).collect();
        AxisSeries::new(axis, t, v).unwrap()
    }

    #[test]
    fn test_sine_peak_within_one_bin() {
        let f0 = 47.3;
        let input = vec![sine_series(Axis::X, f0, 2500.0, 3200.0, 4.0)];
        let aligned = ResamplingAligner::default().align(&input).unwrap();

        let estimate = PsdEstimator::default().estimate(&aligned, Some(200.0)).unwrap();
        let (peak_freq, _) = estimate.peak().unwrap();

        assert!((peak_freq - f0).abs() <= estimate.resolution());
    }

    #[test]
    fn test_bins_increase_and_respect_max_freq() {
        let input = vec![
            sine_series(Axis::X, 30.0, 1.0, 1000.0, 3.0),
            sine_series(Axis::Z, 80.0, 1.0, 1000.0, 3.0),
        ];
        let aligned = ResamplingAligner::default().align(&input).unwrap();

        let estimate = PsdEstimator::default().estimate(&aligned, Some(120.0)).unwrap();

        assert!(estimate.freqs().windows(2).all(|w| w[1] > w[0]));
        assert!(estimate.max_freq() <= 120.0);
        assert!(estimate.axis(Axis::Y).iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_density_independent_of_duration() {
        let config = SpectralConfig::default();
        let short: Vec<f64> = (0..4000).map(|i| (2.0 * PI * 50.0 * i as f64 / 1000.0).sin()).collect();
        let long: Vec<f64> = (0..16000).map(|i| (2.0 * PI * 50.0 * i as f64 / 1000.0).sin()).collect();

        let (_, a) = welch_psd(&short, 1000.0, &config).unwrap();
        let (_, b) = welch_psd(&long, 1000.0, &config).unwrap();

        let pa: f64 = a.iter().cloned().fold(0.0, f64::max);
        let pb: f64 = b.iter().cloned().fold(0.0, f64::max);
        assert!((pa - pb).abs() / pa < 0.05);
    }

    #[test]
    fn test_parseval_sine_power() {
        // Density integrated over frequency equals the signal variance
        let config = SpectralConfig {
            window: WindowType::Hann,
            ..Default::default()
        };
        let rate = 1000.0;
        let signal: Vec<f64> = (0..20000)
            .map(|i| (2.0 * PI * 123.0 * i as f64 / rate).sin() * 3.0)
            .collect();

        let (freqs, psd) = welch_psd(&signal, rate, &config).unwrap();
        let df = freqs[1] - freqs[0];
        let power: f64 = psd.iter().sum::<f64>() * df;

        assert!((power - 4.5).abs() / 4.5 < 0.02);
    }

    #[test]
    fn test_shorter_than_window_fails() {
        let input = vec![sine_series(Axis::X, 10.0, 1.0, 4000.0, 0.4)];
        let aligned = ResamplingAligner::new(crate::alignment::AlignerConfig { min_duration: 0.1 })
            .align(&input)
            .unwrap();

        let result = PsdEstimator::default().estimate(&aligned, None);
        assert!(matches!(result, Err(AnalysisError::InsufficientData(_))));
    }

    #[test]
    fn test_segment_len_rounds_up() {
        let config = SpectralConfig::default();
        assert_eq!(config.segment_len(3200.0), 2048);
        assert_eq!(config.segment_len(2048.0), 1024);
    }

    #[test]
    fn test_normalization_zeroes_low_band() {
        let freqs = vec![0.0, 2.5, 5.0, 10.0];
        let psd = [vec![1.0; 4], vec![0.0; 4], vec![0.0; 4]];
        let estimate = SpectralEstimate::from_parts(freqs, psd, 100.0).unwrap();

        let normalized = estimate.normalized_to_frequencies();
        assert_eq!(normalized.combined()[0], 0.0);
        assert_eq!(normalized.combined()[1], 0.0);
        assert!((normalized.combined()[3] - 1.0 / 10.1).abs() < 1e-12);
    }

    #[test]
    fn test_from_parts_rejects_unsorted_bins() {
        let psd = [vec![0.0; 3], vec![0.0; 3], vec![0.0; 3]];
        let result = SpectralEstimate::from_parts(vec![0.0, 2.0, 1.0], psd, 100.0);
        assert!(matches!(result, Err(AnalysisError::InvalidInput(_))));
    }
}
