//! Peak detection on power spectra

use serde::{Deserialize, Serialize};

/// A detected spectral peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Bin index in the analysed curve
    pub index: usize,
    pub freq: f64,
    pub power: f64,
}

/// Moving-average smoothed local-maximum detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakDetector {
    /// Moving-average length used before looking for maxima
    pub window_size: usize,

    /// Half-width, in bins, of the refinement neighbourhood
    pub vicinity: usize,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self {
            window_size: 5,
            vicinity: 3,
        }
    }
}

impl PeakDetector {
    /// Wider smoothing for the belt comparison curves
    pub fn belts() -> Self {
        Self {
            window_size: 20,
            vicinity: 15,
        }
    }

    /// Find peaks whose smoothed height exceeds `threshold`
    ///
    /// # Arguments
    /// * `data` - Power values
    /// * `freqs` - Frequency of each value
    /// * `threshold` - Absolute detection threshold
    ///
    /// # Returns
    /// Peaks in ascending frequency order, positioned on the raw curve
    pub fn detect(&self, data: &[f64], freqs: &[f64], threshold: f64) -> Vec<Peak> {
        let n = data.len().min(freqs.len());
        if n < 3 {
            return Vec::new();
        }

        let smoothed = moving_average(&data[..n], self.window_size.max(1));
        let mut peaks: Vec<Peak> = Vec::new();

        for i in 1..n - 1 {
            if !(smoothed[i - 1] < smoothed[i] && smoothed[i] > smoothed[i + 1]) {
                continue;
            }
            if smoothed[i] <= threshold {
                continue;
            }

            let lo = i.saturating_sub(self.vicinity);
            let hi = (i + self.vicinity + 1).min(n);

            let index = data[lo..hi]
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(offset, _)| lo + offset)
                .unwrap_or(i);

            // Two smoothed maxima can refine onto the same raw bin
            if peaks.last().is_some_and(|p| p.index == index) {
                continue;
            }

            peaks.push(Peak {
                index,
                freq: freqs[index],
                power: data[index],
            });
        }

        peaks
    }
}

/// Centred moving average, shrinking the window at the edges
fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    let n = data.len();
    let half = window / 2;

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for &v in data {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + window - half).min(n);
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}
