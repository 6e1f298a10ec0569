//! Vibration profile: PSDs of several recordings stacked by test parameter
//!
//! Rows are ordered by ascending test parameter (speed or direction), columns
//! share the frequency axis of the coarsest input estimate. Duplicate
//! parameter values are averaged into a single row.

use ndarray::{Array2, ArrayView1, Axis as GridAxis};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::alignment::interpolate_linear;
use crate::cross_axis::belts::pearson;
use crate::error::AnalysisError;
use crate::measurement::MeasurementMetadata;
use crate::spectrum::{Peak, PeakDetector, SpectralEstimate};

/// What the rows of a profile vary over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileParameter {
    #[default]
    Speed,
    Direction,
}

impl ProfileParameter {
    /// Prefix of the filename token carrying the value, e.g. `sp120`
    pub fn token_prefix(self) -> &'static str {
        match self {
            ProfileParameter::Speed => "sp",
            ProfileParameter::Direction => "an",
        }
    }

    pub fn from_metadata(self, metadata: &MeasurementMetadata) -> Option<f64> {
        match self {
            ProfileParameter::Speed => metadata.speed,
            ProfileParameter::Direction => metadata.angle,
        }
    }

    /// Parse the value from a `_`-separated recording name
    pub fn from_name(self, name: &str) -> Option<f64> {
        let prefix = self.token_prefix();
        name.split('_')
            .filter_map(|token| token.strip_prefix(prefix))
            .find_map(|value| value.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

/// Power over (test parameter, frequency)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VibrationProfile {
    pub parameter: ProfileParameter,

    /// Distinct parameter values, ascending
    pub values: Vec<f64>,

    pub freqs: Vec<f64>,

    /// Combined density, shape (values, freqs)
    pub power: Array2<f64>,

    /// Number of recordings averaged into each row
    pub merged: Vec<usize>,

    /// Per-axis densities averaged over every recording
    #[serde(skip)]
    mean: SpectralEstimate,
}

/// Statistics derived from a profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    /// Integrated power of each row
    pub energies: Vec<f64>,
    pub min_energy: f64,
    pub max_energy: f64,
    pub variance: f64,

    /// Row energy over the maximum row energy
    pub vibration_metric: Vec<f64>,

    /// Inclusive parameter ranges whose vibration metric stays below the threshold
    pub low_vibration_ranges: Vec<(f64, f64)>,

    /// Peaks of the mean spectrum
    pub peaks: Vec<Peak>,

    /// Only for direction profiles spanning at least three angles
    pub symmetry: Option<DirectionalSymmetry>,
}

/// How evenly vibrations spread over move directions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionalSymmetry {
    /// Similarity (0-100 %) between the energy at each angle and at its mirror about the X axis
    pub symmetry_factor: f64,

    /// Angles (degrees, in [0, 360)) of the local energy maxima, strongest first
    pub main_angles: Vec<f64>,
}

impl VibrationProfile {
    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.power.row(index)
    }

    /// Trapezoidal integral of each row over frequency
    pub fn energies(&self) -> Vec<f64> {
        self.power
            .rows()
            .into_iter()
            .map(|row| {
                self.freqs
                    .windows(2)
                    .zip(row.iter().zip(row.iter().skip(1)))
                    .map(|(f, (a, b))| (f[1] - f[0]) * (a + b) / 2.0)
                    .sum()
            })
            .collect()
    }

    /// Combined density averaged over rows
    pub fn mean_spectrum(&self) -> Vec<f64> {
        self.power
            .mean_axis(GridAxis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default()
    }

    /// Per-axis estimate averaged over every recording, used for shaper calibration
    pub fn mean_estimate(&self) -> &SpectralEstimate {
        &self.mean
    }

    /// # Arguments
    /// * `low_fraction` - Vibration metric under which a row counts as quiet
    pub fn summary(&self, low_fraction: f64) -> ProfileSummary {
        let energies = self.energies();
        let min_energy = energies.iter().copied().fold(f64::INFINITY, f64::min);
        let max_energy = energies.iter().copied().fold(0.0, f64::max);
        let variance = energies.iter().population_variance();

        let vibration_metric: Vec<f64> = energies
            .iter()
            .map(|e| if max_energy > 0.0 { e / max_energy } else { 0.0 })
            .collect();

        let mut low_vibration_ranges = Vec::new();
        let mut start: Option<usize> = None;
        for (i, &metric) in vibration_metric.iter().enumerate() {
            match (metric <= low_fraction, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    low_vibration_ranges.push((self.values[s], self.values[i - 1]));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            low_vibration_ranges.push((self.values[s], self.values[self.values.len() - 1]));
        }

        let mean = self.mean_spectrum();
        let threshold = 0.05 * mean.iter().copied().fold(0.0, f64::max);
        let peaks = PeakDetector::default().detect(&mean, &self.freqs, threshold);

        let symmetry = match self.parameter {
            ProfileParameter::Direction => directional_symmetry(&self.values, &energies),
            ProfileParameter::Speed => None,
        };

        ProfileSummary {
            energies,
            min_energy,
            max_energy,
            variance,
            vibration_metric,
            low_vibration_ranges,
            peaks,
            symmetry,
        }
    }
}

/// Stacks estimates into a [`VibrationProfile`]
#[derive(Debug, Clone, Copy, Default)]
pub struct VibrationProfileAggregator {
    parameter: ProfileParameter,
}

impl VibrationProfileAggregator {
    pub fn new(parameter: ProfileParameter) -> Self {
        Self { parameter }
    }

    /// Build the profile from `(parameter value, estimate)` pairs in input order
    ///
    /// # Errors
    /// * `InvalidInput` for a non-finite parameter value
    /// * `InsufficientData` when fewer than two distinct values are present
    pub fn aggregate(&self, entries: &[(f64, &SpectralEstimate)]) -> Result<VibrationProfile, AnalysisError> {
        if let Some((value, _)) = entries.iter().find(|(v, _)| !v.is_finite()) {
            return Err(AnalysisError::InvalidInput(format!(
                "{:?} value {value} is not finite",
                self.parameter
            )));
        }

        let coarsest = entries
            .iter()
            .map(|(_, e)| *e)
            .reduce(|a, b| if b.resolution() > a.resolution() { b } else { a })
            .ok_or_else(|| AnalysisError::InsufficientData("no recording for the vibration profile".to_string()))?;

        let max_freq = entries
            .iter()
            .map(|(_, e)| e.max_freq())
            .fold(f64::INFINITY, f64::min);
        let freqs = coarsest.truncated(max_freq).freqs().to_vec();

        let resampled = entries
            .iter()
            .map(|(v, e)| e.interpolated(&freqs).map(|r| (*v, r)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut order: Vec<usize> = (0..resampled.len()).collect();
        order.sort_by(|&a, &b| resampled[a].0.total_cmp(&resampled[b].0));

        let mut values: Vec<f64> = Vec::new();
        let mut merged: Vec<usize> = Vec::new();
        let mut rows: Vec<Vec<f64>> = Vec::new();
        for index in order {
            let (value, estimate) = &resampled[index];
            match values.last() {
                Some(last) if last == value => {
                    let row = rows.last_mut().into_iter().flatten();
                    row.zip(estimate.combined()).for_each(|(acc, p)| *acc += p);
                    if let Some(count) = merged.last_mut() {
                        *count += 1;
                    }
                }
                _ => {
                    values.push(*value);
                    merged.push(1);
                    rows.push(estimate.combined().to_vec());
                }
            }
        }

        if values.len() < 2 {
            return Err(AnalysisError::InsufficientData(format!(
                "vibration profile needs at least 2 distinct {:?} values, got {}",
                self.parameter,
                values.len()
            )));
        }

        for (row, &count) in rows.iter_mut().zip(merged.iter()) {
            if count > 1 {
                row.iter_mut().for_each(|p| *p /= count as f64);
            }
        }

        let cols = freqs.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let power = Array2::from_shape_vec((values.len(), cols), flat)
            .map_err(|e| AnalysisError::InvalidInput(e.to_string()))?;

        let mean = mean_estimate(&resampled.iter().map(|(_, e)| e).collect::<Vec<_>>(), &freqs)?;

        log::debug!(
            "Vibration profile: {} row(s) from {} recording(s), {} bins up to {:.1} Hz",
            values.len(),
            entries.len(),
            cols,
            freqs.last().copied().unwrap_or(0.0)
        );

        Ok(VibrationProfile {
            parameter: self.parameter,
            values,
            freqs,
            power,
            merged,
            mean,
        })
    }
}

/// Energy per angle folded onto [0, 360), mirrored about the X axis and compared
fn directional_symmetry(angles: &[f64], energies: &[f64]) -> Option<DirectionalSymmetry> {
    let mut folded: Vec<(f64, f64)> = angles
        .iter()
        .zip(energies)
        .map(|(a, e)| (a.rem_euclid(360.0), *e))
        .collect();
    folded.sort_by(|a, b| a.0.total_cmp(&b.0));

    // 0 and 360 fold onto the same direction
    let mut points: Vec<(f64, f64, usize)> = Vec::with_capacity(folded.len());
    for (angle, energy) in folded {
        match points.last_mut() {
            Some((last, sum, count)) if (*last - angle).abs() < 1e-9 => {
                *sum += energy;
                *count += 1;
            }
            _ => points.push((angle, energy, 1)),
        }
    }
    if points.len() < 3 {
        return None;
    }

    let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.1 / p.2 as f64).collect();
    let n = xs.len();

    // Wrap one knot on each side so interpolation is periodic
    let mut wrapped_x = Vec::with_capacity(n + 2);
    let mut wrapped_y = Vec::with_capacity(n + 2);
    wrapped_x.push(xs[n - 1] - 360.0);
    wrapped_y.push(ys[n - 1]);
    wrapped_x.extend_from_slice(&xs);
    wrapped_y.extend_from_slice(&ys);
    wrapped_x.push(xs[0] + 360.0);
    wrapped_y.push(ys[0]);

    let mut mirrored: Vec<(f64, usize)> = xs
        .iter()
        .enumerate()
        .map(|(i, a)| ((360.0 - a).rem_euclid(360.0), i))
        .collect();
    mirrored.sort_by(|a, b| a.0.total_cmp(&b.0));
    let at: Vec<f64> = mirrored.iter().map(|m| m.0).collect();
    let values = interpolate_linear(&at, &wrapped_x, &wrapped_y);
    let mut reflected = vec![0.0; n];
    for ((_, i), v) in mirrored.iter().zip(values) {
        reflected[*i] = v;
    }

    let symmetry_factor = (pearson(&ys, &reflected) * 100.0).clamp(0.0, 100.0);

    let mut maxima: Vec<(f64, f64)> = (0..n)
        .filter(|&i| {
            let prev = ys[(i + n - 1) % n];
            let next = ys[(i + 1) % n];
            ys[i] > prev && ys[i] >= next
        })
        .map(|i| (xs[i], ys[i]))
        .collect();
    maxima.sort_by(|a, b| b.1.total_cmp(&a.1));

    log::debug!("Directional symmetry {symmetry_factor:.1}% over {n} angle(s)");

    Some(DirectionalSymmetry {
        symmetry_factor,
        main_angles: maxima.into_iter().map(|(a, _)| a).collect(),
    })
}

fn mean_estimate(estimates: &[&SpectralEstimate], freqs: &[f64]) -> Result<SpectralEstimate, AnalysisError> {
    let n = estimates.len().max(1) as f64;
    let mut psd = [vec![0.0; freqs.len()], vec![0.0; freqs.len()], vec![0.0; freqs.len()]];
    for estimate in estimates {
        for axis in crate::measurement::Axis::ALL {
            psd[axis.index()]
                .iter_mut()
                .zip(estimate.axis(axis))
                .for_each(|(acc, p)| *acc += p / n);
        }
    }

    let sample_rate = estimates
        .iter()
        .map(|e| e.sample_rate())
        .fold(f64::INFINITY, f64::min);
    SpectralEstimate::from_parts(freqs.to_vec(), psd, sample_rate)
}
