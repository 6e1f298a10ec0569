//! Input shaper calibration against a measured power spectrum
//!
//! Every catalogue candidate is swept over frequency. At each test frequency
//! the residual vibrations (pessimised over a few plausible damping ratios)
//! and the smoothing are computed, and a per-candidate recommendation is made.
//! The overall choice is then the viable candidate with the fewest residual
//! vibrations.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::catalogue::{ShaperCandidate, ShaperCatalogue};
use super::pulses::SMOOTHING_ACCEL;
use crate::error::AnalysisError;
use crate::spectrum::{compute_mechanical_parameters, SpectralEstimate, DEFAULT_DAMPING_RATIO};

/// Vibrations below `max(psd) / SHAPER_VIBRATION_REDUCTION` are out of reach of any shaper
const SHAPER_VIBRATION_REDUCTION: f64 = 20.0;

/// Vibration ceiling (in %) for the performance recommendation
pub const MAX_PERFORMANCE_VIBRATIONS: f64 = 5.0;

/// Calibration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibratorConfig {
    /// Square corner velocity (mm/s)
    pub scv: f64,

    /// Smoothing ceiling; candidates that cannot get below it are excluded
    pub max_smoothing: Option<f64>,

    /// Machine damping ratio; estimated from the spectrum when absent
    pub damping_ratio: Option<f64>,

    /// Damping ratios over which residual vibrations are pessimised
    pub test_damping_ratios: Vec<f64>,

    /// Sweep step (Hz)
    pub freq_step: f64,

    /// Upper end of the sweep (Hz, exclusive)
    pub max_shaper_freq: f64,

    /// Highest spectrum frequency taken into account (Hz), never below the sweep ceiling
    pub max_freq: f64,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            scv: 5.0,
            max_smoothing: None,
            damping_ratio: None,
            test_damping_ratios: vec![0.075, 0.1, 0.15],
            freq_step: 0.2,
            max_shaper_freq: 150.0,
            max_freq: 200.0,
        }
    }
}

/// Recommended tuning of one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaperFit {
    pub name: String,

    /// Recommended shaper frequency (Hz)
    pub freq: f64,

    /// Remaining vibrations as a fraction of the unshaped ones
    pub vibrations: f64,

    pub smoothing: f64,

    /// Smoothing/vibration trade-off used inside the sweep (lower is better)
    pub score: f64,

    /// Highest acceleration keeping smoothing acceptable (mm/s²)
    pub max_accel: f64,

    /// Pessimised shaper response over the analysed frequencies
    pub response: Vec<f64>,

    /// True when the candidate cannot meet the smoothing ceiling
    pub excluded: bool,
}

/// Outcome of a calibration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    /// Frequencies the responses are evaluated on
    pub freqs: Vec<f64>,

    /// One fit per candidate, in catalogue order
    pub fits: Vec<ShaperFit>,

    /// Index in `fits` of the selected shaper
    pub best: usize,

    /// Index of a higher-acceleration alternative, when one exists
    pub performance: Option<usize>,

    pub damping_ratio: f64,
    pub scv: f64,
    pub max_smoothing: Option<f64>,
}

impl CalibrationResult {
    pub fn best(&self) -> &ShaperFit {
        &self.fits[self.best]
    }

    pub fn performance(&self) -> Option<&ShaperFit> {
        self.performance.map(|i| &self.fits[i])
    }

    /// Candidates that meet the smoothing ceiling
    pub fn viable(&self) -> impl Iterator<Item = &ShaperFit> {
        self.fits.iter().filter(|f| !f.excluded)
    }
}

/// Sweep-based shaper calibrator
#[derive(Debug, Clone, Default)]
pub struct ShaperCalibrator {
    config: CalibratorConfig,
}

impl ShaperCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibratorConfig {
        &self.config
    }

    /// Calibrate every catalogue candidate against `estimate`
    ///
    /// The combined density is normalised to frequencies (see
    /// [`SpectralEstimate::normalized_to_frequencies`]) before fitting.
    ///
    /// # Errors
    /// * `CatalogueUnavailable` if the catalogue is empty
    /// * `InsufficientSignal` if the spectrum carries no energy above 5 Hz
    /// * `NoViableShaper` if every candidate exceeds the smoothing ceiling
    pub fn calibrate(
        &self,
        estimate: &SpectralEstimate,
        catalogue: &dyn ShaperCatalogue,
    ) -> Result<CalibrationResult, AnalysisError> {
        self.validate()?;

        let candidates = catalogue.candidates();
        if candidates.is_empty() {
            return Err(AnalysisError::CatalogueUnavailable(format!(
                "{} has no shaper candidates",
                catalogue.describe()
            )));
        }

        let limit = self.config.max_freq.max(self.config.max_shaper_freq);
        let normalized = estimate.truncated(limit).normalized_to_frequencies();
        if normalized.combined().iter().all(|&p| p <= 0.0) {
            return Err(AnalysisError::InsufficientSignal(
                "no vibration energy above 5 Hz to calibrate against".to_string(),
            ));
        }

        let damping_ratio = self.config.damping_ratio.unwrap_or_else(|| {
            compute_mechanical_parameters(normalized.combined(), normalized.freqs(), None)
                .map(|p| p.damping_or_default())
                .unwrap_or(DEFAULT_DAMPING_RATIO)
        });

        let fits: Vec<ShaperFit> = candidates
            .par_iter()
            .map(|candidate| self.fit_candidate(*candidate, &normalized, damping_ratio))
            .collect();

        let freqs = normalized.freqs().to_vec();

        let best = select_best(&fits).ok_or_else(|| AnalysisError::NoViableShaper {
            ceiling: self.config.max_smoothing.unwrap_or(f64::INFINITY),
            lowest: fits.iter().map(|f| f.smoothing).fold(f64::INFINITY, f64::min),
        })?;
        let performance = select_performance(&fits, best);

        for fit in &fits {
            log::debug!(
                "{} @ {:.1} Hz: vibrations {:.1}%, smoothing {:.3}, max accel {:.0}{}",
                fit.name,
                fit.freq,
                fit.vibrations * 100.0,
                fit.smoothing,
                fit.max_accel,
                if fit.excluded { " (excluded)" } else { "" }
            );
        }
        log::info!(
            "Recommended shaper: {} @ {:.1} Hz (damping ratio {:.3})",
            fits[best].name,
            fits[best].freq,
            damping_ratio
        );

        Ok(CalibrationResult {
            freqs,
            fits,
            best,
            performance,
            damping_ratio,
            scv: self.config.scv,
            max_smoothing: self.config.max_smoothing,
        })
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        let c = &self.config;
        if !(c.freq_step > 0.0) {
            return Err(AnalysisError::InvalidInput("freq_step must be positive".to_string()));
        }
        if !(c.scv >= 0.0) {
            return Err(AnalysisError::InvalidInput("scv must be non-negative".to_string()));
        }
        if c.test_damping_ratios.is_empty()
            || c.test_damping_ratios.iter().any(|d| !(*d > 0.0 && *d < 1.0))
        {
            return Err(AnalysisError::InvalidInput(
                "test damping ratios must lie in (0, 1)".to_string(),
            ));
        }
        if let Some(d) = c.damping_ratio {
            if !(d >= 0.0 && d < 1.0) {
                return Err(AnalysisError::InvalidInput(format!(
                    "damping ratio {d} outside [0, 1)"
                )));
            }
        }
        Ok(())
    }

    /// Test frequencies of a candidate, from its minimum up to the sweep ceiling
    fn sweep(&self, min_freq: f64) -> Vec<f64> {
        let end = self.config.max_shaper_freq;
        let start = min_freq.min(end - 1e-7);
        let count = ((end - start) / self.config.freq_step).ceil().max(1.0) as usize;
        (0..count)
            .map(|i| start + i as f64 * self.config.freq_step)
            .filter(|&f| f < end)
            .collect()
    }

    fn fit_candidate(
        &self,
        candidate: &dyn ShaperCandidate,
        estimate: &SpectralEstimate,
        damping_ratio: f64,
    ) -> ShaperFit {
        let config = &self.config;
        let test_freqs = self.sweep(candidate.min_freq());
        let freqs = estimate.freqs();
        let psd = estimate.combined();
        let n = freqs.len();

        let max_psd = psd.iter().cloned().fold(0.0, f64::max);
        let threshold = max_psd / SHAPER_VIBRATION_REDUCTION;
        let all_vibrations: f64 = psd.iter().map(|&p| (p - threshold).max(0.0)).sum();

        let mut results: Vec<ShaperFit> = Vec::with_capacity(test_freqs.len());
        let mut best: Option<usize> = None;

        // High to low: smoothing grows as the frequency drops
        for &freq in test_freqs.iter().rev() {
            let smoothing = candidate.smoothing(freq, damping_ratio, SMOOTHING_ACCEL, config.scv);
            if let Some(ceiling) = config.max_smoothing {
                if smoothing > ceiling && best.is_some() {
                    break;
                }
            }

            let mut response = vec![0.0f64; n];
            let mut vibrations: f64 = 0.0;
            for &test_damping in &config.test_damping_ratios {
                let vals = candidate.response(freq, damping_ratio, test_damping, freqs);
                let remaining: f64 = vals
                    .iter()
                    .zip(psd.iter())
                    .map(|(&v, &p)| (v * p - threshold).max(0.0))
                    .sum();
                let ratio = if all_vibrations > 0.0 {
                    remaining / all_vibrations
                } else {
                    0.0
                };
                vibrations = vibrations.max(ratio);
                for (r, v) in response.iter_mut().zip(vals) {
                    *r = r.max(v);
                }
            }

            let score = smoothing * (vibrations.powf(1.5) + vibrations * 0.2 + 0.01);
            results.push(ShaperFit {
                name: candidate.name().to_string(),
                freq,
                vibrations,
                smoothing,
                score,
                max_accel: 0.0,
                response,
                excluded: false,
            });

            let last = results.len() - 1;
            if best.map_or(true, |b| results[b].vibrations > results[last].vibrations) {
                best = Some(last);
            }
        }

        let Some(best) = best else {
            return ShaperFit {
                name: candidate.name().to_string(),
                freq: 0.0,
                vibrations: 1.0,
                smoothing: f64::INFINITY,
                score: f64::INFINITY,
                max_accel: 0.0,
                response: vec![1.0; n],
                excluded: true,
            };
        };

        // Prefer a nearly-as-good frequency with a better trade-off score
        let mut selected = best;
        for (i, res) in results.iter().enumerate().rev() {
            if res.vibrations < results[best].vibrations * 1.1 && res.score < results[selected].score {
                selected = i;
            }
        }

        let lowest_smoothing = results.iter().map(|r| r.smoothing).fold(f64::INFINITY, f64::min);
        let mut fit = results.swap_remove(selected);
        fit.excluded = config.max_smoothing.is_some_and(|ceiling| lowest_smoothing > ceiling);
        fit.max_accel = candidate.pulses(fit.freq, damping_ratio).max_accel(config.scv);
        fit
    }
}

fn select_best(fits: &[ShaperFit]) -> Option<usize> {
    fits.iter()
        .enumerate()
        .filter(|(_, f)| !f.excluded)
        .min_by(|(ia, a), (ib, b)| {
            a.vibrations
                .total_cmp(&b.vibrations)
                .then_with(|| a.smoothing.total_cmp(&b.smoothing))
                .then_with(|| ia.cmp(ib))
        })
        .map(|(i, _)| i)
}

fn select_performance(fits: &[ShaperFit], best: usize) -> Option<usize> {
    let (index, fit) = fits
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.excluded && f.vibrations * 100.0 < MAX_PERFORMANCE_VIBRATIONS)
        .max_by(|(ia, a), (ib, b)| {
            a.max_accel
                .partial_cmp(&b.max_accel)
                .unwrap_or(Ordering::Equal)
                // Earlier catalogue entries win ties
                .then_with(|| ib.cmp(ia))
        })?;

    (index != best && fit.max_accel >= fits[best].max_accel).then_some(index)
}
