//! Resampling of independently sampled axis channels onto one uniform time base

use serde::{Deserialize, Serialize};

use crate::error::AlignmentError;
use crate::measurement::{Axis, AxisSeries};

/// Aligner configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Shortest overlapping time range accepted, in seconds
    pub min_duration: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self { min_duration: 0.5 }
    }
}

/// Three axis channels sharing one uniform timestamp grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedSeries {
    timestamps: Vec<f64>,
    channels: [Vec<f64>; 3],
    sample_rate: f64,
    recorded: Vec<Axis>,
}

impl AlignedSeries {
    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn channel(&self, axis: Axis) -> &[f64] {
        &self.channels[axis.index()]
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Axes that were actually recorded (the others are zero-filled)
    pub fn recorded(&self) -> &[Axis] {
        &self.recorded
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn duration(&self) -> f64 {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(s), Some(e)) => e - s,
            _ => 0.0,
        }
    }
}

/// Aligns per-axis series at the densest axis' effective rate
#[derive(Debug, Clone, Default)]
pub struct ResamplingAligner {
    config: AlignerConfig,
}

impl ResamplingAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    /// Interpolate every axis onto a uniform grid spanning the common time range
    pub fn align(&self, series: &[AxisSeries]) -> Result<AlignedSeries, AlignmentError> {
        if series.is_empty() {
            return Err(AlignmentError::NoAxes);
        }

        for s in series {
            if s.len() < 2 {
                return Err(AlignmentError::TooFewSamples {
                    axis: s.axis().to_string(),
                    samples: s.len(),
                });
            }
        }

        let start = series
            .iter()
            .filter_map(|s| s.start())
            .fold(f64::NEG_INFINITY, f64::max);
        let end = series
            .iter()
            .filter_map(|s| s.end())
            .fold(f64::INFINITY, f64::min);

        if end <= start {
            return Err(AlignmentError::NoOverlap { start, end });
        }

        let span = end - start;
        if span < self.config.min_duration {
            return Err(AlignmentError::TooShort {
                duration: span,
                minimum: self.config.min_duration,
            });
        }

        let sample_rate = series
            .iter()
            .map(|s| s.effective_rate())
            .fold(0.0, f64::max);

        // Small epsilon keeps the end point when span * rate is integral
        let count = (span * sample_rate + 1e-9).floor() as usize + 1;
        let timestamps: Vec<f64> = (0..count)
            .map(|i| start + i as f64 / sample_rate)
            .collect();

        let mut channels: [Vec<f64>; 3] = [
            vec![0.0; count],
            vec![0.0; count],
            vec![0.0; count],
        ];
        let mut recorded = Vec::with_capacity(series.len());

        for s in series {
            if recorded.contains(&s.axis()) {
                continue;
            }
            channels[s.axis().index()] = interpolate_linear(&timestamps, s.timestamps(), s.values());
            recorded.push(s.axis());
        }
        recorded.sort();

        log::debug!(
            "Aligned {} axes onto {} samples at {:.1} Hz ({:.3} s)",
            recorded.len(),
            count,
            sample_rate,
            span
        );

        Ok(AlignedSeries {
            timestamps,
            channels,
            sample_rate,
            recorded,
        })
    }
}

/// Piecewise-linear interpolation of (`xp`, `fp`) at sorted points `x`
///
/// `xp` must be non-decreasing. Points outside the range take the edge value.
/// Points that coincide with a knot return that knot's value exactly.
pub fn interpolate_linear(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return vec![0.0; x.len()];
    }

    let mut out = Vec::with_capacity(x.len());
    let mut j = 0usize;

    for &xi in x {
        if xi <= xp[0] {
            out.push(fp[0]);
            continue;
        }
        if xi >= xp[n - 1] {
            out.push(fp[n - 1]);
            continue;
        }

        // x is sorted, so the bracketing knot only moves forward
        if xi < xp[j] {
            j = 0;
        }
        while j + 1 < n && xp[j + 1] <= xi {
            j += 1;
        }

        let dx = xp[j + 1] - xp[j];
        if dx <= 0.0 {
            out.push(fp[j + 1]);
        } else {
            let frac = (xi - xp[j]) / dx;
            out.push(fp[j] + (fp[j + 1] - fp[j]) * frac);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(axis: Axis, start: f64, rate: f64, n: usize, f: impl Fn(f64) -> f64) -> AxisSeries {
        let t: Vec<f64> = (0..n).map(|i| start + i as f64 / rate).collect();
        let v = t.iter().map(|&t| f(t)).collect();
        AxisSeries::new(axis, t, v).unwrap()
    }

    #[test]
    fn test_aligned_channels_share_grid() {
        let input = vec![
            series(Axis::X, 0.0, 1000.0, 2000, |t| t),
            series(Axis::Y, 0.1, 800.0, 1500, |t| 2.0 * t),
            series(Axis::Z, 0.05, 1200.0, 2300, |t| -t),
        ];

        let aligned = ResamplingAligner::default().align(&input).unwrap();

        let n = aligned.len();
        assert!(n > 0);
        for axis in Axis::ALL {
            assert_eq!(aligned.channel(axis).len(), n);
        }
        assert!((aligned.timestamps()[0] - 0.1).abs() < 1e-12);
        assert!(*aligned.timestamps().last().unwrap() <= 1.999 + 1e-9);

        // linear signals are reproduced exactly by linear interpolation
        let t = aligned.timestamps()[n / 2];
        assert!((aligned.channel(Axis::Y)[n / 2] - 2.0 * t).abs() < 1e-9);
        assert!((aligned.channel(Axis::Z)[n / 2] + t).abs() < 1e-9);
    }

    #[test]
    fn test_reference_rate_is_densest_axis() {
        let input = vec![
            series(Axis::X, 0.0, 500.0, 1000, |_| 0.0),
            series(Axis::Y, 0.0, 2000.0, 4000, |_| 0.0),
        ];

        let aligned = ResamplingAligner::default().align(&input).unwrap();

        let expected = 4000.0 / (3999.0 / 2000.0);
        assert!((aligned.sample_rate() - expected).abs() < 1e-9);
        assert_eq!(aligned.recorded(), &[Axis::X, Axis::Y]);
        assert!(aligned.channel(Axis::Z).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_alignment_is_deterministic() {
        let input = vec![
            series(Axis::X, 0.0, 1000.0, 1500, |t| (t * 30.0).sin()),
            series(Axis::Y, 0.013, 990.0, 1400, |t| (t * 10.0).cos()),
        ];
        let aligner = ResamplingAligner::default();

        let a = aligner.align(&input).unwrap();
        let b = aligner.align(&input).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_disjoint_ranges_fail() {
        let input = vec![
            series(Axis::X, 0.0, 1000.0, 1000, |_| 0.0),
            series(Axis::Y, 5.0, 1000.0, 1000, |_| 0.0),
        ];

        let result = ResamplingAligner::default().align(&input);
        assert!(matches!(result, Err(AlignmentError::NoOverlap { .. })));
    }

    #[test]
    fn test_short_overlap_fails() {
        let input = vec![
            series(Axis::X, 0.0, 1000.0, 1000, |_| 0.0),
            series(Axis::Y, 0.8, 1000.0, 1000, |_| 0.0),
        ];

        let result = ResamplingAligner::default().align(&input);
        assert!(matches!(result, Err(AlignmentError::TooShort { .. })));
    }

    #[test]
    fn test_interpolation_edges_and_knots() {
        let xp = [0.0, 1.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 20.0, 30.0];
        let out = interpolate_linear(&[-1.0, 0.5, 1.0, 1.5, 3.0], &xp, &fp);

        assert_eq!(out[0], 0.0);
        assert!((out[1] - 5.0).abs() < 1e-12);
        assert_eq!(out[2], 20.0);
        assert!((out[3] - 25.0).abs() < 1e-12);
        assert_eq!(out[4], 30.0);
    }
}
