//! Main resonance frequency and damping ratio from a power spectrum

use serde::Serialize;

/// Damping ratio assumed when the half-power bandwidth cannot be measured
pub const DEFAULT_DAMPING_RATIO: f64 = 0.1;

/// Resonance characteristics of the strongest peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MechanicalParameters {
    /// Frequency of the strongest bin in Hz
    pub resonance_freq: f64,

    /// Damping ratio from the half-power bandwidth, if both crossings exist
    pub damping_ratio: Option<f64>,

    pub peak_index: usize,
    pub peak_power: f64,
}

impl MechanicalParameters {
    /// Damping ratio, or the default when it could not be measured
    pub fn damping_or_default(&self) -> f64 {
        self.damping_ratio.unwrap_or(DEFAULT_DAMPING_RATIO)
    }
}

/// Locate the main resonance and estimate its damping ratio
///
/// # Arguments
/// * `psd` - Power values
/// * `freqs` - Frequency of each value, strictly increasing
/// * `min_freq` - Ignore bins below this frequency when searching the peak
///
/// # Returns
/// `None` for an empty spectrum
pub fn compute_mechanical_parameters(
    psd: &[f64],
    freqs: &[f64],
    min_freq: Option<f64>,
) -> Option<MechanicalParameters> {
    let n = psd.len().min(freqs.len());
    let start = match min_freq {
        Some(min) => freqs[..n].iter().position(|&f| f >= min)?,
        None => 0,
    };

    let (peak_index, &peak_power) = psd[start..n]
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, p)| (start + i, p))?;
    let resonance_freq = freqs[peak_index];
    let half_power = peak_power / std::f64::consts::SQRT_2;

    let below = psd[..peak_index].iter().rposition(|&p| p <= half_power);
    let above = psd[peak_index..n]
        .iter()
        .position(|&p| p <= half_power)
        .map(|i| i + peak_index);

    let damping_ratio = match (below, above) {
        (Some(lo), Some(hi)) if peak_power > 0.0 && resonance_freq > 0.0 => {
            let f_lo = crossing(freqs, psd, lo, lo + 1, half_power);
            let f_hi = crossing(freqs, psd, hi - 1, hi, half_power);
            let ratio = (f_hi - f_lo) / resonance_freq;
            let bw1 = ratio.powi(2);
            let bw2 = ratio.powi(4);
            let inner = 0.5 - (1.0 / (4.0 + 4.0 * bw1 - bw2)).sqrt();
            (inner >= 0.0 && inner.is_finite()).then(|| inner.sqrt())
        }
        _ => None,
    };

    Some(MechanicalParameters {
        resonance_freq,
        damping_ratio,
        peak_index,
        peak_power,
    })
}

/// Frequency where the segment between bins `a` and `b` crosses `level`
fn crossing(freqs: &[f64], psd: &[f64], a: usize, b: usize, level: f64) -> f64 {
    let dp = psd[b] - psd[a];
    if dp == 0.0 {
        return freqs[a];
    }
    freqs[a] + (level - psd[a]) * (freqs[b] - freqs[a]) / dp
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Power response of a damped oscillator driven by white noise
    fn resonance(freqs: &[f64], fr: f64, zeta: f64) -> Vec<f64> {
        freqs
            .iter()
            .map(|&f| {
                let r = f / fr;
                1.0 / ((1.0 - r * r).powi(2) + (2.0 * zeta * r).powi(2))
            })
            .collect()
    }

    #[test]
    fn test_recovers_resonance_and_damping() {
        let freqs: Vec<f64> = (0..4000).map(|i| i as f64 * 0.05).collect();
        let psd = resonance(&freqs, 50.0, 0.08);

        let params = compute_mechanical_parameters(&psd, &freqs, None).unwrap();

        assert!((params.resonance_freq - 50.0).abs() < 0.5);
        let zeta = params.damping_ratio.unwrap();
        assert!((zeta - 0.08).abs() < 0.02, "zeta = {zeta}");
    }

    #[test]
    fn test_peak_at_edge_has_no_damping() {
        let freqs: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let psd: Vec<f64> = freqs.iter().map(|&f| f + 1.0).collect();

        let params = compute_mechanical_parameters(&psd, &freqs, None).unwrap();

        assert_eq!(params.peak_index, 99);
        assert_eq!(params.damping_ratio, None);
        assert_eq!(params.damping_or_default(), DEFAULT_DAMPING_RATIO);
    }

    #[test]
    fn test_min_freq_skips_low_band() {
        let freqs: Vec<f64> = (0..200).map(|i| i as f64).collect();
        let mut psd = resonance(&freqs, 80.0, 0.1);
        psd[2] = 1e6;

        let params = compute_mechanical_parameters(&psd, &freqs, Some(10.0)).unwrap();
        assert!((params.resonance_freq - 80.0).abs() < 1.5);
    }

    #[test]
    fn test_empty_spectrum() {
        assert!(compute_mechanical_parameters(&[], &[], None).is_none());
    }
}
