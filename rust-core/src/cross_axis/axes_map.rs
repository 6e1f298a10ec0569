//! Accelerometer orientation detection from commanded moves
//!
//! Each recording holds one positive move along a known machine axis. An
//! ideal accelerate/decelerate profile for that move is matched against every
//! accelerometer channel; the channel (and sign) that follows the profile
//! best is the physical axis mounted along the commanded one.

use serde::{Deserialize, Serialize};

use super::correlation::{match_template, peak_correlation};
use super::{CouplingPair, CrossAxisMetric};
use crate::alignment::AlignedSeries;
use crate::error::AnalysisError;
use crate::measurement::Axis;

/// Axes map detection settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxesMapConfig {
    /// Commanded acceleration (mm/s²)
    pub accel: f64,

    /// Commanded travel of each move (mm)
    pub travel_length: f64,

    /// Minimum |correlation| for a detection to count
    pub correlation_threshold: f64,
}

impl AxesMapConfig {
    pub fn new(accel: f64, travel_length: f64) -> Self {
        Self {
            accel,
            travel_length,
            correlation_threshold: 0.5,
        }
    }

    /// Duration of a triangular-velocity move: accelerate then decelerate
    pub fn move_duration(&self) -> f64 {
        2.0 * (self.travel_length / self.accel).sqrt()
    }
}

/// Physical accelerometer axis found for one commanded axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisAssignment {
    pub commanded: Axis,
    pub detected: Axis,
    pub inverted: bool,

    /// |correlation| of the detected channel with the move profile
    pub score: f64,

    /// Measured direction of the move in accelerometer coordinates (unit vector)
    pub direction: [f64; 3],

    /// Angle between `direction` and the detected axis, in degrees
    pub angle_error: f64,

    /// Time of the matched move start, relative to the recording start
    pub move_start: f64,
}

impl AxisAssignment {
    /// Signed axis label as used in an `axes_map` setting
    pub fn signed_label(&self) -> String {
        if self.inverted {
            format!("-{}", self.detected)
        } else {
            self.detected.to_string()
        }
    }
}

/// Detected orientation plus diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxesMapping {
    pub assignments: Vec<AxisAssignment>,

    /// `axes_map` value, `?` for machine axes that were not tested
    pub axes_map: String,

    /// Mean magnitude of the static acceleration (mm/s²)
    pub gravity: f64,

    /// Mean standard deviation of the channels before the first move (mm/s²)
    pub noise: f64,

    /// Pairwise channel correlations of every recording
    pub couplings: Vec<CrossAxisMetric>,
}

/// Axis mapping and lag detection
#[derive(Debug, Clone, Copy)]
pub struct AxesMapAnalyzer {
    config: AxesMapConfig,
}

impl AxesMapAnalyzer {
    pub fn new(config: AxesMapConfig) -> Result<Self, AnalysisError> {
        if !(config.accel > 0.0) || !(config.travel_length > 0.0) {
            return Err(AnalysisError::InvalidInput(format!(
                "accel ({}) and travel length ({}) must be positive",
                config.accel, config.travel_length
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &AxesMapConfig {
        &self.config
    }

    /// Largest lag searched, in samples
    pub fn max_lag_samples(&self, sample_rate: f64) -> usize {
        (self.config.move_duration() * sample_rate).ceil() as usize
    }

    /// Correlate two channels of one recording over the move-length lag window
    ///
    /// # Errors
    /// `InsufficientSignal` when a channel is flat or the correlation is below threshold
    pub fn detect_lag(
        &self,
        series: &AlignedSeries,
        first: Axis,
        second: Axis,
    ) -> Result<CrossAxisMetric, AnalysisError> {
        let metric = self.pair_metric(series, first, second).ok_or_else(|| {
            AnalysisError::InsufficientSignal(format!("{first}/{second}: flat channel"))
        })?;

        if metric.coupling_score < self.config.correlation_threshold {
            return Err(AnalysisError::InsufficientSignal(format!(
                "{first}/{second}: peak correlation {:.3} below {:.3}",
                metric.coupling_score, self.config.correlation_threshold
            )));
        }
        Ok(metric)
    }

    fn pair_metric(&self, series: &AlignedSeries, first: Axis, second: Axis) -> Option<CrossAxisMetric> {
        let fs = series.sample_rate();
        let peak = peak_correlation(
            series.channel(first),
            series.channel(second),
            self.max_lag_samples(fs),
        )?;

        Some(CrossAxisMetric {
            pair: CouplingPair::Axes { first, second },
            coupling_score: peak.coefficient.abs(),
            lag_seconds: Some(peak.lag as f64 / fs),
            coupling_frequency: None,
            sign_inverted: peak.coefficient < 0.0,
        })
    }

    /// Correlation of every pair of recorded channels, flat channels skipped
    pub fn pair_metrics(&self, series: &AlignedSeries) -> Vec<CrossAxisMetric> {
        let axes = series.recorded();
        let mut metrics = Vec::new();
        for (i, &first) in axes.iter().enumerate() {
            for &second in &axes[i + 1..] {
                if let Some(metric) = self.pair_metric(series, first, second) {
                    metrics.push(metric);
                }
            }
        }
        metrics
    }

    fn template(&self, sample_rate: f64) -> Vec<f64> {
        let half = ((self.config.move_duration() / 2.0) * sample_rate).round().max(1.0) as usize;
        let mut template = vec![1.0; half];
        template.resize(2 * half, -1.0);
        template
    }

    /// Find which accelerometer channel follows a move along `commanded`
    pub fn detect_axis(
        &self,
        commanded: Axis,
        series: &AlignedSeries,
    ) -> Result<AxisAssignment, AnalysisError> {
        let fs = series.sample_rate();
        let template = self.template(fs);
        if series.len() < template.len() {
            return Err(AnalysisError::InsufficientData(format!(
                "recording of {:.3} s is shorter than the {:.3} s move",
                series.duration(),
                self.config.move_duration()
            )));
        }

        let best = series
            .recorded()
            .iter()
            .filter_map(|&axis| {
                match_template(series.channel(axis), &template).map(|(start, r)| (axis, start, r))
            })
            .max_by(|(_, _, a), (_, _, b)| a.abs().total_cmp(&b.abs()));

        let Some((detected, start, r)) = best else {
            return Err(AnalysisError::InsufficientSignal(format!(
                "move along {commanded}: no channel carries signal"
            )));
        };

        if r.abs() < self.config.correlation_threshold {
            return Err(AnalysisError::InsufficientSignal(format!(
                "move along {commanded}: best correlation {:.3} on {detected} below {:.3}",
                r.abs(),
                self.config.correlation_threshold
            )));
        }

        let direction = move_direction(series, start, template.len());
        let aligned = direction[detected.index()].abs().min(1.0);
        let angle_error = aligned.acos().to_degrees();

        log::debug!(
            "Move along {commanded}: detected {}{detected} (r = {r:.3}, {angle_error:.1}° off axis)",
            if r < 0.0 { "-" } else { "" }
        );

        Ok(AxisAssignment {
            commanded,
            detected,
            inverted: r < 0.0,
            score: r.abs(),
            direction,
            angle_error,
            move_start: start as f64 / fs,
        })
    }

    /// Detect the full mapping from one recording per commanded axis
    ///
    /// # Errors
    /// `InsufficientSignal` when a move is ambiguous or two commanded axes
    /// land on the same physical axis
    pub fn map_axes(&self, recordings: &[(Axis, &AlignedSeries)]) -> Result<AxesMapping, AnalysisError> {
        if recordings.is_empty() {
            return Err(AnalysisError::InsufficientData("no axes map recording".to_string()));
        }

        let mut assignments: Vec<AxisAssignment> = Vec::with_capacity(recordings.len());
        let mut noise = 0.0;
        for (commanded, series) in recordings {
            let assignment = self.detect_axis(*commanded, series)?;
            noise += quiet_noise(series, (assignment.move_start * series.sample_rate()) as usize);
            if let Some(other) = assignments.iter().find(|a| a.detected == assignment.detected) {
                return Err(AnalysisError::InsufficientSignal(format!(
                    "moves along {} and {} were both detected on accelerometer axis {}",
                    other.commanded, assignment.commanded, assignment.detected
                )));
            }
            assignments.push(assignment);
        }
        assignments.sort_by_key(|a| a.commanded);

        let axes_map = Axis::ALL
            .iter()
            .map(|axis| {
                assignments
                    .iter()
                    .find(|a| a.commanded == *axis)
                    .map(AxisAssignment::signed_label)
                    .unwrap_or_else(|| "?".to_string())
            })
            .collect::<Vec<_>>()
            .join(",");

        let gravity = recordings.iter().map(|(_, s)| static_magnitude(s)).sum::<f64>()
            / recordings.len() as f64;

        let noise = noise / recordings.len() as f64;

        let couplings = recordings
            .iter()
            .flat_map(|(_, s)| self.pair_metrics(s))
            .collect();

        log::info!("Detected axes_map: {axes_map} (gravity {gravity:.0} mm/s²)");

        Ok(AxesMapping {
            assignments,
            axes_map,
            gravity,
            noise,
            couplings,
        })
    }
}

fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f64>() / x.len() as f64
    }
}

/// Unit vector of (accelerating half mean - decelerating half mean) per channel
fn move_direction(series: &AlignedSeries, start: usize, len: usize) -> [f64; 3] {
    let half = len / 2;
    let mut v = [0.0; 3];
    for axis in Axis::ALL {
        let channel = &series.channel(axis)[start..start + len];
        v[axis.index()] = (mean(&channel[..half]) - mean(&channel[half..])) / 2.0;
    }

    let norm = v.iter().map(|c| c * c).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|c| *c /= norm);
    }
    v
}

/// Magnitude of the per-channel mean acceleration
fn static_magnitude(series: &AlignedSeries) -> f64 {
    Axis::ALL
        .iter()
        .map(|&axis| mean(series.channel(axis)).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Mean channel standard deviation over the samples preceding `until`
fn quiet_noise(series: &AlignedSeries, until: usize) -> f64 {
    let until = until.min(series.len());
    if until < 2 {
        return 0.0;
    }

    let axes = series.recorded();
    axes.iter()
        .map(|&axis| {
            let quiet = &series.channel(axis)[..until];
            let m = mean(quiet);
            (quiet.iter().map(|v| (v - m).powi(2)).sum::<f64>() / until as f64).sqrt()
        })
        .sum::<f64>()
        / axes.len().max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::ResamplingAligner;
    use crate::measurement::AxisSeries;

    const RATE: f64 = 1000.0;

    fn noise(n: usize, seed: u64, amplitude: f64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5) * amplitude
            })
            .collect()
    }

    /// 3 s recording with one move of `accel` starting at 1.2 s, seen on `channel`
    fn recording(channel: Axis, sign: f64, accel: f64, half: usize) -> AlignedSeries {
        recording_at(channel, sign, accel, half, 1200)
    }

    fn recording_at(channel: Axis, sign: f64, accel: f64, half: usize, start: usize) -> AlignedSeries {
        let n = 3000;
        let t: Vec<f64> = (0..n).map(|i| i as f64 / RATE).collect();
        let mut values = [noise(n, 1, 40.0), noise(n, 2, 40.0), noise(n, 3, 40.0)];
        for v in values[Axis::Z.index()].iter_mut() {
            *v += 9810.0;
        }

        for i in 0..2 * half {
            let profile = if i < half { accel } else { -accel };
            values[channel.index()][start + i] += sign * profile;
        }

        let series: Vec<AxisSeries> = Axis::ALL
            .iter()
            .map(|&axis| AxisSeries::new(axis, t.clone(), values[axis.index()].clone()).unwrap())
            .collect();
        ResamplingAligner::default().align(&series).unwrap()
    }

    fn analyzer() -> AxesMapAnalyzer {
        // 10 mm at 1000 mm/s²: 0.1 s accelerating, 0.1 s decelerating
        AxesMapAnalyzer::new(AxesMapConfig::new(1000.0, 10.0)).unwrap()
    }

    #[test]
    fn test_detects_inverted_axis() {
        let series = recording(Axis::Y, -1.0, 1000.0, 100);
        let assignment = analyzer().detect_axis(Axis::X, &series).unwrap();

        assert_eq!(assignment.detected, Axis::Y);
        assert!(assignment.inverted);
        assert!(assignment.score > 0.9);
        assert!(assignment.angle_error < 10.0);
        assert!((assignment.move_start - 1.2).abs() < 0.01);
    }

    #[test]
    fn test_full_mapping_string() {
        let x = recording(Axis::Y, -1.0, 1000.0, 100);
        let y = recording(Axis::X, 1.0, 1000.0, 100);
        let z = recording(Axis::Z, 1.0, 1000.0, 100);

        let mapping = analyzer()
            .map_axes(&[(Axis::X, &x), (Axis::Y, &y), (Axis::Z, &z)])
            .unwrap();

        assert_eq!(mapping.axes_map, "-y,x,z");
        assert!((mapping.gravity - 9810.0).abs() < 50.0);
        assert!(mapping.noise > 0.0 && mapping.noise < 40.0);
    }

    #[test]
    fn test_noise_independent_of_input_order() {
        // Quiet windows of very different lengths before each move
        let x = recording_at(Axis::X, 1.0, 1000.0, 100, 2500);
        let z = recording_at(Axis::Z, 1.0, 1000.0, 100, 300);

        let forward = analyzer().map_axes(&[(Axis::X, &x), (Axis::Z, &z)]).unwrap();
        let reversed = analyzer().map_axes(&[(Axis::Z, &z), (Axis::X, &x)]).unwrap();

        assert_eq!(forward.axes_map, "x,?,z");
        assert_eq!(reversed.axes_map, forward.axes_map);
        assert!((forward.noise - reversed.noise).abs() < 1e-9);
        assert!(forward.noise < 40.0);
    }

    #[test]
    fn test_partial_mapping_marks_missing_axes() {
        let z = recording(Axis::Z, -1.0, 1000.0, 100);
        let mapping = analyzer().map_axes(&[(Axis::Z, &z)]).unwrap();
        assert_eq!(mapping.axes_map, "?,?,-z");
    }

    #[test]
    fn test_duplicate_assignment_is_ambiguous() {
        let x = recording(Axis::Y, 1.0, 1000.0, 100);
        let y = recording(Axis::Y, 1.0, 1000.0, 100);

        let result = analyzer().map_axes(&[(Axis::X, &x), (Axis::Y, &y)]);
        assert!(matches!(result, Err(AnalysisError::InsufficientSignal(_))));
    }

    #[test]
    fn test_noise_only_is_insufficient() {
        let series = recording(Axis::X, 1.0, 0.0, 100);
        let result = analyzer().detect_axis(Axis::X, &series);
        assert!(matches!(result, Err(AnalysisError::InsufficientSignal(_))));
    }

    #[test]
    fn test_lag_between_offset_copies() {
        let n = 3000;
        let base = noise(n, 11, 100.0);
        let offset = 25;
        let mut shifted = vec![0.0; offset];
        shifted.extend_from_slice(&base[..n - offset]);

        let t: Vec<f64> = (0..n).map(|i| i as f64 / RATE).collect();
        let series = ResamplingAligner::default()
            .align(&[
                AxisSeries::new(Axis::X, t.clone(), base).unwrap(),
                AxisSeries::new(Axis::Y, t, shifted).unwrap(),
            ])
            .unwrap();

        let metric = analyzer().detect_lag(&series, Axis::X, Axis::Y).unwrap();
        let lag = metric.lag_seconds.unwrap();

        assert!((lag - offset as f64 / series.sample_rate()).abs() <= 1.0 / series.sample_rate());
        assert!(!metric.sign_inverted);
    }
}
