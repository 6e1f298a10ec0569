//! Relative belt comparison
//!
//! Two recordings, one per belt path, are reduced to their combined PSD on a
//! shared frequency grid. Peaks are paired across the two curves; on
//! symmetric kinematics the curves should be near copies, which is scored by
//! a similarity factor and a mechanical health indicator.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics};

use super::{CouplingPair, CrossAxisMetric};
use crate::error::AnalysisError;
use crate::spectrum::{Peak, PeakDetector, SpectralEstimate};

/// Detection threshold relative to the curve maximum
const PEAKS_DETECTION_THRESHOLD: f64 = 0.1;

/// Ideal number of paired peaks
const MAX_PAIRED_PEAKS: usize = 2;

/// Pairing threshold ceiling (Hz)
const MAX_PAIRING_THRESHOLD: f64 = 10.0;

/// Weight of unpaired peak amplitude in the health indicator
const UNPAIRED_PEAK_PENALTY: f64 = 30.0;

/// Kinematics whose two belt paths are expected to behave the same
const SYMMETRIC_KINEMATICS: [&str; 4] = ["limited_corexy", "corexy", "limited_corexz", "corexz"];

const MHI_LEVELS: [(f64, f64, &str); 6] = [
    (70.0, 100.0, "Excellent mechanical health"),
    (55.0, 70.0, "Good mechanical health"),
    (45.0, 55.0, "Acceptable mechanical health"),
    (30.0, 45.0, "Potential signs of a mechanical issue"),
    (15.0, 30.0, "Likely a mechanical issue"),
    (0.0, 15.0, "Mechanical issue detected"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeltsConfig {
    /// Machine kinematics, e.g. `corexy`
    pub kinematics: Option<String>,

    /// Upper bound of the shared frequency grid (Hz)
    pub max_freq: f64,

    /// Number of points in the shared frequency grid
    pub bins: usize,

    /// Curves whose maximum does not exceed this are rejected
    pub min_power: f64,
}

impl Default for BeltsConfig {
    fn default() -> Self {
        Self {
            kinematics: None,
            max_freq: 200.0,
            bins: 500,
            min_power: 0.0,
        }
    }
}

impl BeltsConfig {
    pub fn is_symmetric(&self) -> bool {
        self.kinematics
            .as_deref()
            .is_some_and(|k| SYMMETRIC_KINEMATICS.contains(&k.to_ascii_lowercase().as_str()))
    }
}

/// One belt's curve on the shared grid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeltSignal {
    pub label: String,
    pub psd: Vec<f64>,
    pub peaks: Vec<Peak>,
    pub unpaired: Vec<Peak>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakPair {
    pub first: Peak,
    pub second: Peak,
}

impl PeakPair {
    pub fn freq_delta(&self) -> f64 {
        (self.first.freq - self.second.freq).abs()
    }

    /// Amplitude difference relative to the larger peak, in percent
    pub fn amplitude_delta(&self) -> f64 {
        let max = self.first.power.max(self.second.power);
        if max > 0.0 {
            (self.first.power - self.second.power).abs() / max * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeltComparison {
    pub freqs: Vec<f64>,
    pub first: BeltSignal,
    pub second: BeltSignal,
    pub pairs: Vec<PeakPair>,

    /// Frequency distance under which peaks were paired (Hz)
    pub pairing_threshold: f64,

    /// Main peak frequency of the first curve minus that of the second (Hz)
    pub peak_divergence: f64,

    /// Total energy of the first curve over that of the second
    pub energy_ratio: f64,

    /// Pearson similarity in percent, symmetric kinematics only
    pub similarity: Option<f64>,

    /// Mechanical health indicator label, symmetric kinematics only
    pub health: Option<String>,

    pub metric: CrossAxisMetric,
}

/// Display label of a belt recording named like `belt_A_...`
pub fn belt_label(name: &str) -> String {
    let token = name.split('_').nth(1).unwrap_or(name);
    match token {
        "A" => format!("{token} (axis 1,-1)"),
        "B" => format!("{token} (axis 1, 1)"),
        _ => token.to_string(),
    }
}

pub(crate) fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let sum_x: f64 = x.iter().sum();
    let sum_y: f64 = y.iter().sum();
    let sum_xy: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let sum_x2: f64 = x.iter().map(|a| a * a).sum();
    let sum_y2: f64 = y.iter().map(|a| a * a).sum();

    let numerator = n * sum_xy - sum_x * sum_y;
    let denominator = ((n * sum_x2 - sum_x.powi(2)) * (n * sum_y2 - sum_y.powi(2))).sqrt();

    if denominator == 0.0 {
        0.0
    } else {
        (numerator / denominator).clamp(-1.0, 1.0)
    }
}

/// median + 1.5 IQR of every cross-curve peak distance, capped
fn pairing_threshold(first: &[Peak], second: &[Peak]) -> f64 {
    let distances: Vec<f64> = first
        .iter()
        .flat_map(|a| second.iter().map(move |b| (a.freq - b.freq).abs()))
        .collect();
    if distances.is_empty() {
        return MAX_PAIRING_THRESHOLD;
    }

    let mut data = Data::new(distances);
    let iqr = data.percentile(75) - data.percentile(25);
    (data.median() + 1.5 * iqr).min(MAX_PAIRING_THRESHOLD)
}

/// Greedily pair the closest remaining peaks while they are within `threshold + 1` Hz
fn pair_peaks(first: &[Peak], second: &[Peak], threshold: f64) -> (Vec<PeakPair>, Vec<Peak>, Vec<Peak>) {
    let mut left = first.to_vec();
    let mut right = second.to_vec();
    let mut pairs = Vec::new();

    while !left.is_empty() && !right.is_empty() {
        let mut best: Option<(usize, usize)> = None;
        let mut min_distance = threshold + 1.0;
        for (i, a) in left.iter().enumerate() {
            for (j, b) in right.iter().enumerate() {
                let distance = (a.freq - b.freq).abs();
                if distance < min_distance {
                    min_distance = distance;
                    best = Some((i, j));
                }
            }
        }

        let Some((i, j)) = best else { break };
        pairs.push(PeakPair {
            first: left.remove(i),
            second: right.remove(j),
        });
    }

    (pairs, left, right)
}

fn health_label(mhi: f64) -> &'static str {
    let mhi = mhi.clamp(1.0, 100.0);
    MHI_LEVELS
        .iter()
        .find(|(lower, upper, _)| *lower < mhi && mhi <= *upper)
        .map(|(_, _, label)| *label)
        .unwrap_or("Unknown mechanical health")
}

/// Compares the two belt paths of a machine
#[derive(Debug, Clone, Default)]
pub struct BeltComparator {
    config: BeltsConfig,
}

impl BeltComparator {
    pub fn new(config: BeltsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BeltsConfig {
        &self.config
    }

    /// Compare two recordings given as `(name, estimate)`
    ///
    /// # Errors
    /// `InsufficientSignal` when either curve is flat or has no detectable peak
    pub fn compare(
        &self,
        first: (&str, &SpectralEstimate),
        second: (&str, &SpectralEstimate),
    ) -> Result<BeltComparison, AnalysisError> {
        if self.config.bins < 2 {
            return Err(AnalysisError::InvalidInput(format!(
                "belt comparison needs at least 2 bins, got {}",
                self.config.bins
            )));
        }

        let max_freq = self
            .config
            .max_freq
            .min(first.1.max_freq())
            .min(second.1.max_freq());
        if !(max_freq > 0.0) {
            return Err(AnalysisError::InsufficientData(
                "belt recordings share no frequency range".to_string(),
            ));
        }

        let step = max_freq / (self.config.bins - 1) as f64;
        let freqs: Vec<f64> = (0..self.config.bins).map(|i| i as f64 * step).collect();

        let a = self.signal(first.0, first.1, &freqs)?;
        let b = self.signal(second.0, second.1, &freqs)?;

        let threshold = pairing_threshold(&a.peaks, &b.peaks);
        let (pairs, unpaired_a, unpaired_b) = pair_peaks(&a.peaks, &b.peaks, threshold);
        let a = BeltSignal { unpaired: unpaired_a, ..a };
        let b = BeltSignal { unpaired: unpaired_b, ..b };

        let correlation = pearson(&a.psd, &b.psd);
        let (similarity, health) = if self.config.is_symmetric() {
            let similarity = (correlation * 100.0).clamp(0.0, 100.0);
            let mhi = self.health_indicator(similarity, &a, &b, pairs.len());
            log::info!("Belts estimated similarity: {similarity:.1}%");
            log::info!("Mechanical health: {mhi}");
            (Some(similarity), Some(mhi.to_string()))
        } else {
            (None, None)
        };

        let main_freq = |psd: &[f64]| {
            psd.iter()
                .enumerate()
                .max_by(|(_, x), (_, y)| x.total_cmp(y))
                .map(|(k, _)| freqs[k])
                .unwrap_or(0.0)
        };
        let peak_divergence = main_freq(&a.psd) - main_freq(&b.psd);

        let energy_b: f64 = b.psd.iter().sum();
        let energy_ratio = if energy_b > 0.0 {
            a.psd.iter().sum::<f64>() / energy_b
        } else {
            f64::INFINITY
        };

        let coupling_frequency = pairs
            .iter()
            .max_by(|x, y| (x.first.power + x.second.power).total_cmp(&(y.first.power + y.second.power)))
            .map(|p| (p.first.freq + p.second.freq) / 2.0);

        log::debug!(
            "Belts: {} pair(s), {} + {} unpaired peak(s), pairing threshold {threshold:.2} Hz",
            pairs.len(),
            a.unpaired.len(),
            b.unpaired.len()
        );

        let metric = CrossAxisMetric {
            pair: CouplingPair::Belts {
                first: a.label.clone(),
                second: b.label.clone(),
            },
            coupling_score: correlation,
            lag_seconds: None,
            coupling_frequency,
            sign_inverted: false,
        };

        Ok(BeltComparison {
            freqs,
            first: a,
            second: b,
            pairs,
            pairing_threshold: threshold,
            peak_divergence,
            energy_ratio,
            similarity,
            health,
            metric,
        })
    }

    fn signal(&self, name: &str, estimate: &SpectralEstimate, freqs: &[f64]) -> Result<BeltSignal, AnalysisError> {
        let psd = estimate.interpolated(freqs)?.combined().to_vec();
        let max = psd.iter().copied().fold(0.0, f64::max);
        if !(max > self.config.min_power) {
            return Err(AnalysisError::InsufficientSignal(format!(
                "{name}: belt curve has no energy below {:.1} Hz",
                self.config.max_freq
            )));
        }

        let peaks = PeakDetector::belts().detect(&psd, freqs, PEAKS_DETECTION_THRESHOLD * max);
        if peaks.is_empty() {
            return Err(AnalysisError::InsufficientSignal(format!("{name}: no resonance peak detected")));
        }

        Ok(BeltSignal {
            label: belt_label(name),
            psd,
            peaks,
            unpaired: Vec::new(),
        })
    }

    fn health_indicator(&self, similarity: f64, a: &BeltSignal, b: &BeltSignal, paired: usize) -> &'static str {
        let mut mhi = similarity;
        if paired >= MAX_PAIRED_PEAKS {
            mhi *= MAX_PAIRED_PEAKS as f64 / paired as f64;
        }

        let highest = a
            .psd
            .iter()
            .chain(b.psd.iter())
            .copied()
            .fold(0.0, f64::max);
        let penalty: f64 = a
            .unpaired
            .iter()
            .chain(b.unpaired.iter())
            .map(|p| p.power / highest * UNPAIRED_PEAK_PENALTY)
            .sum();

        health_label((mhi - penalty).clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Combined-only estimate made of Lorentzian peaks `(freq, height)`
    fn estimate(peaks: &[(f64, f64)]) -> SpectralEstimate {
        let freqs: Vec<f64> = (0..=500).map(|i| i as f64 * 0.5).collect();
        let psd: Vec<f64> = freqs
            .iter()
            .map(|&f| {
                peaks
                    .iter()
                    .map(|&(f0, h)| h / (1.0 + ((f - f0) / 2.0).powi(2)))
                    .sum()
            })
            .collect();
        let zeros = vec![0.0; freqs.len()];
        SpectralEstimate::from_parts(freqs, [psd, zeros.clone(), zeros], 1000.0).unwrap()
    }

    fn corexy() -> BeltComparator {
        BeltComparator::new(BeltsConfig {
            kinematics: Some("corexy".to_string()),
            ..BeltsConfig::default()
        })
    }

    #[test]
    fn test_identical_belts_are_healthy() {
        let e = estimate(&[(40.0, 1.0), (90.0, 0.6)]);
        let result = corexy().compare(("belt_A_run", &e), ("belt_B_run", &e)).unwrap();

        assert_eq!(result.pairs.len(), 2);
        assert!(result.first.unpaired.is_empty() && result.second.unpaired.is_empty());
        assert!((result.similarity.unwrap() - 100.0).abs() < 1e-6);
        assert_eq!(result.health.as_deref(), Some("Excellent mechanical health"));
        assert!((result.energy_ratio - 1.0).abs() < 1e-9);
        assert!(result.peak_divergence.abs() < 1e-9);
    }

    #[test]
    fn test_shifted_peak_still_pairs() {
        let a = estimate(&[(40.0, 1.0), (90.0, 0.6)]);
        let b = estimate(&[(45.0, 1.0), (90.0, 0.6)]);
        let result = corexy().compare(("belt_A", &a), ("belt_B", &b)).unwrap();

        assert_eq!(result.pairs.len(), 2);
        assert!(result.pairing_threshold <= MAX_PAIRING_THRESHOLD);
        assert!(result.similarity.unwrap() < 100.0);
        assert!((result.peak_divergence + 5.0).abs() < 1.0);

        let main = result.metric.coupling_frequency.unwrap();
        assert!((main - 42.5).abs() < 1.0);
    }

    #[test]
    fn test_unpaired_peak_lowers_health() {
        let a = estimate(&[(40.0, 1.0), (90.0, 0.6)]);
        let b = estimate(&[(40.0, 1.0), (90.0, 0.6), (150.0, 0.9)]);
        let result = corexy().compare(("belt_A", &a), ("belt_B", &b)).unwrap();

        assert_eq!(result.second.unpaired.len(), 1);
        assert!((result.second.unpaired[0].freq - 150.0).abs() < 1.0);
        assert_ne!(result.health.as_deref(), Some("Excellent mechanical health"));
        assert!(result.energy_ratio < 1.0);
    }

    #[test]
    fn test_non_symmetric_kinematics_skip_similarity() {
        let e = estimate(&[(40.0, 1.0)]);
        let result = BeltComparator::default()
            .compare(("belt_A", &e), ("belt_B", &e))
            .unwrap();

        assert!(result.similarity.is_none());
        assert!(result.health.is_none());
        assert_eq!(result.pairs.len(), 1);
    }

    #[test]
    fn test_flat_curve_is_insufficient() {
        let flat = estimate(&[]);
        let e = estimate(&[(40.0, 1.0)]);
        let result = corexy().compare(("belt_A", &flat), ("belt_B", &e));
        assert!(matches!(result, Err(AnalysisError::InsufficientSignal(_))));
    }

    #[test]
    fn test_belt_labels() {
        assert_eq!(belt_label("belt_A_20240101"), "A (axis 1,-1)");
        assert_eq!(belt_label("belt_B"), "B (axis 1, 1)");
        assert_eq!(belt_label("upper_left"), "left");
        assert_eq!(belt_label("single"), "single");
    }

    #[test]
    fn test_health_levels() {
        assert_eq!(health_label(100.0), "Excellent mechanical health");
        assert_eq!(health_label(70.0), "Good mechanical health");
        assert_eq!(health_label(50.0), "Acceptable mechanical health");
        assert_eq!(health_label(0.0), "Mechanical issue detected");
    }
}
