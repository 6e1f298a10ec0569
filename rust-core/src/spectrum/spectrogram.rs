//! Time-frequency power map of the summed axis densities

use ndarray::Array2;
use serde::Serialize;

use super::fft::FftEngine;
use super::welch::{SegmentPlan, SpectralConfig};
use crate::alignment::AlignedSeries;
use crate::error::AnalysisError;

/// Spectrogram with one column per analysis segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrogram {
    /// Frequency of each row in Hz
    pub freqs: Vec<f64>,

    /// Segment centre time of each column, relative to the series start
    pub times: Vec<f64>,

    /// Density summed over the recorded axes, shape (freqs, times)
    pub power: Array2<f64>,
}

/// Compute the spectrogram of `series`, keeping rows at or below `max_freq`
///
/// Segmentation matches the Welch estimator so that averaging the columns
/// reproduces the combined PSD.
pub fn compute_spectrogram(
    series: &AlignedSeries,
    config: &SpectralConfig,
    max_freq: Option<f64>,
) -> Result<Spectrogram, AnalysisError> {
    let sample_rate = series.sample_rate();
    let plan = SegmentPlan::new(config, sample_rate);
    let count = plan.segment_count(series.len());
    if count == 0 {
        return Err(AnalysisError::InsufficientData(format!(
            "{} samples is shorter than one {}-sample spectrogram segment",
            series.len(),
            plan.nfft()
        )));
    }

    let freqs_all = plan.frequencies();
    let limit = max_freq.unwrap_or(sample_rate / 2.0);
    let rows = freqs_all.iter().take_while(|&&f| f <= limit).count().max(1);

    let mut engine = FftEngine::new(plan.nfft());
    let mut scratch = Vec::with_capacity(plan.nfft());
    let mut column = vec![0.0; plan.num_bins()];
    let mut power = Array2::<f64>::zeros((rows, count));

    for segment in 0..count {
        column.fill(0.0);
        for &axis in series.recorded() {
            plan.accumulate_segment(&mut engine, series.channel(axis), segment, &mut scratch, &mut column)?;
        }
        plan.finish(&mut column, 1);

        for (row, &value) in column.iter().take(rows).enumerate() {
            power[[row, segment]] = value;
        }
    }

    let half = plan.nfft() as f64 / 2.0;
    let times = (0..count)
        .map(|segment| (plan.segment_start(segment) as f64 + half) / sample_rate)
        .collect();

    Ok(Spectrogram {
        freqs: freqs_all[..rows].to_vec(),
        times,
        power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::ResamplingAligner;
    use crate::measurement::{Axis, AxisSeries};
    use crate::spectrum::welch::PsdEstimator;
    use std::f64::consts::PI;

    fn aligned_chirp() -> AlignedSeries {
        // 20 Hz for the first half, 60 Hz for the second
        let rate = 1000.0;
        let t: Vec<f64> = (0..6000).map(|i| i as f64 / rate).collect();
        let v = t
            .iter()
            .map(|&t| if t < 3.0 { (2.0 * PI * 20.0 * t).sin() } else { (2.0 * PI * 60.0 * t).sin() })
            .collect();
        let series = AxisSeries::new(Axis::Y, t, v).unwrap();
        ResamplingAligner::default().align(&[series]).unwrap()
    }

    #[test]
    fn test_spectrogram_tracks_frequency_change() {
        let aligned = aligned_chirp();
        let spec = compute_spectrogram(&aligned, &SpectralConfig::default(), Some(100.0)).unwrap();

        assert_eq!(spec.power.dim(), (spec.freqs.len(), spec.times.len()));

        let peak_row = |col: usize| {
            spec.power
                .column(col)
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(row, _)| spec.freqs[row])
                .unwrap()
        };

        assert!((peak_row(0) - 20.0).abs() < 2.0);
        assert!((peak_row(spec.times.len() - 1) - 60.0).abs() < 2.0);
    }

    #[test]
    fn test_column_mean_matches_welch() {
        let aligned = aligned_chirp();
        let config = SpectralConfig::default();
        let spec = compute_spectrogram(&aligned, &config, None).unwrap();
        let psd = PsdEstimator::new(config).estimate(&aligned, None).unwrap();

        let cols = spec.times.len() as f64;
        for (row, &expected) in psd.combined().iter().enumerate().take(50) {
            let mean = spec.power.row(row).sum() / cols;
            assert!((mean - expected).abs() <= 1e-9 * expected.max(1.0));
        }
    }
}
