//! Input shaper pulse trains and their frequency-domain evaluation
//!
//! A shaper is a train of impulses `(A_i, T_i)` convolved with the motion
//! command. Its residual response to a damped oscillator and the positional
//! smoothing it introduces are both closed-form in `A` and `T`.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Acceleration at which smoothing scores are compared (mm/s²)
pub const SMOOTHING_ACCEL: f64 = 5000.0;

/// Smoothing allowed when searching the maximum recommended acceleration
pub const TARGET_SMOOTHING: f64 = 0.12;

/// Tolerance on the residual vibration ratio of the EI family
const SHAPER_VIBRATION_TOLERANCE: f64 = 0.05;

/// Impulse amplitudes and times (seconds) of a tuned shaper
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PulseTrain {
    pub amplitudes: Vec<f64>,
    pub times: Vec<f64>,
}

/// Built-in pulse-train families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaperFamily {
    #[serde(rename = "zv")]
    Zv,
    #[serde(rename = "mzv")]
    Mzv,
    #[serde(rename = "zvd")]
    Zvd,
    #[serde(rename = "ei")]
    Ei,
    #[serde(rename = "2hump_ei")]
    TwoHumpEi,
    #[serde(rename = "3hump_ei")]
    ThreeHumpEi,
}

fn damped_period(freq: f64, damping_ratio: f64) -> (f64, f64) {
    let df = (1.0 - damping_ratio * damping_ratio).sqrt();
    (1.0 / (freq * df), df)
}

impl ShaperFamily {
    /// All families, in their conventional listing order
    pub const ALL: [ShaperFamily; 6] = [
        ShaperFamily::Zv,
        ShaperFamily::Mzv,
        ShaperFamily::Zvd,
        ShaperFamily::Ei,
        ShaperFamily::TwoHumpEi,
        ShaperFamily::ThreeHumpEi,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShaperFamily::Zv => "zv",
            ShaperFamily::Mzv => "mzv",
            ShaperFamily::Zvd => "zvd",
            ShaperFamily::Ei => "ei",
            ShaperFamily::TwoHumpEi => "2hump_ei",
            ShaperFamily::ThreeHumpEi => "3hump_ei",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Lowest frequency worth testing for this family (Hz)
    pub fn min_freq(self) -> f64 {
        match self {
            ShaperFamily::Zv => 21.0,
            ShaperFamily::Mzv => 23.0,
            ShaperFamily::Zvd => 29.0,
            ShaperFamily::Ei => 29.0,
            ShaperFamily::TwoHumpEi => 39.0,
            ShaperFamily::ThreeHumpEi => 48.0,
        }
    }

    /// Pulse train tuned to `freq` for an oscillator with `damping_ratio`
    pub fn pulses(self, freq: f64, damping_ratio: f64) -> PulseTrain {
        let (t_d, df) = damped_period(freq, damping_ratio);
        let zeta = damping_ratio;

        let (amplitudes, times) = match self {
            ShaperFamily::Zv => {
                let k = (-zeta * PI / df).exp();
                (vec![1.0, k], vec![0.0, 0.5 * t_d])
            }
            ShaperFamily::Zvd => {
                let k = (-zeta * PI / df).exp();
                (vec![1.0, 2.0 * k, k * k], vec![0.0, 0.5 * t_d, t_d])
            }
            ShaperFamily::Mzv => {
                let k = (-0.75 * zeta * PI / df).exp();
                let a1 = 1.0 - 1.0 / 2f64.sqrt();
                let a2 = (2f64.sqrt() - 1.0) * k;
                let a3 = a1 * k * k;
                (vec![a1, a2, a3], vec![0.0, 0.375 * t_d, 0.75 * t_d])
            }
            ShaperFamily::Ei => {
                let v = SHAPER_VIBRATION_TOLERANCE;
                let a1 = 0.24968 + 0.24961 * v
                    + (0.80008 + 1.23328 * v + (0.49599 + 3.17316 * v) * zeta) * zeta;
                let a3 = 0.25149 + 0.21474 * v
                    + (-0.83249 + 1.41498 * v + (0.85181 - 4.90094 * v) * zeta) * zeta;
                let a2 = 1.0 - a1 - a3;
                let t2 = 0.4999
                    + ((0.46159 + 8.57843 * v) * v
                        + ((4.26169 - 108.644 * v) * v + (1.75601 + 336.989 * v) * v * zeta) * zeta)
                        * zeta;
                (vec![a1, a2, a3], vec![0.0, t2 * t_d, t_d])
            }
            ShaperFamily::TwoHumpEi => {
                let v2 = SHAPER_VIBRATION_TOLERANCE * SHAPER_VIBRATION_TOLERANCE;
                let x = (v2 * ((1.0 - v2).sqrt() + 1.0)).powf(1.0 / 3.0);
                let k = (-zeta * PI / df).exp();
                let a1 = (3.0 * x * x + 2.0 * x + 3.0 * v2) / (16.0 * x);
                let a2 = (0.5 - a1) * k;
                let a3 = a2 * k;
                let a4 = a1 * k * k * k;
                (
                    vec![a1, a2, a3, a4],
                    vec![0.0, 0.5 * t_d, t_d, 1.5 * t_d],
                )
            }
            ShaperFamily::ThreeHumpEi => {
                let v = SHAPER_VIBRATION_TOLERANCE;
                let k = (-zeta * PI / df).exp();
                let k2 = k * k;
                let a1 = 0.0625 * (1.0 + 3.0 * v + 2.0 * (2.0 * (v + 1.0) * v).sqrt());
                let a2 = 0.25 * (1.0 - v) * k;
                let a3 = (0.5 * (1.0 + v) - 2.0 * a1) * k2;
                let a4 = a2 * k2;
                let a5 = a1 * k2 * k2;
                (
                    vec![a1, a2, a3, a4, a5],
                    vec![0.0, 0.5 * t_d, t_d, 1.5 * t_d, 2.0 * t_d],
                )
            }
        };

        PulseTrain { amplitudes, times }
    }
}

impl PulseTrain {
    /// Build a custom train from relative amplitudes and times in damped periods
    ///
    /// Each amplitude decays by `K^(2 t_i)` with `K = exp(-ζπ/√(1-ζ²))`, which
    /// reproduces the ZV/ZVD trains for `[1, 1] @ [0, .5]` and `[1, 2, 1] @ [0, .5, 1]`.
    pub fn custom(amplitudes: &[f64], periods: &[f64], freq: f64, damping_ratio: f64) -> Self {
        let (t_d, df) = damped_period(freq, damping_ratio);
        let k = (-damping_ratio * PI / df).exp();

        let amplitudes = amplitudes
            .iter()
            .zip(periods.iter())
            .map(|(&a, &t)| a * k.powf(2.0 * t))
            .collect();
        let times = periods.iter().map(|&t| t * t_d).collect();

        Self { amplitudes, times }
    }

    /// Residual vibration ratio of a damped oscillator at each of `freqs`
    ///
    /// 1 means the shaper does nothing at that frequency, 0 means full cancellation.
    pub fn response(&self, freqs: &[f64], damping_ratio: f64) -> Vec<f64> {
        let sum_a: f64 = self.amplitudes.iter().sum();
        let inv_d = if sum_a != 0.0 { 1.0 / sum_a } else { 0.0 };
        let t_last = self.times.last().copied().unwrap_or(0.0);
        let df = (1.0 - damping_ratio * damping_ratio).sqrt();

        freqs
            .iter()
            .map(|&f| {
                let omega = 2.0 * PI * f;
                let damping = damping_ratio * omega;
                let omega_d = omega * df;

                let (mut s, mut c) = (0.0, 0.0);
                for (&a, &t) in self.amplitudes.iter().zip(self.times.iter()) {
                    let w = a * (-damping * (t_last - t)).exp();
                    s += w * (omega_d * t).sin();
                    c += w * (omega_d * t).cos();
                }
                (s * s + c * c).sqrt() * inv_d
            })
            .collect()
    }

    /// Positional smoothing at `accel` with square corner velocity `scv`
    pub fn smoothing(&self, accel: f64, scv: f64) -> f64 {
        let sum_a: f64 = self.amplitudes.iter().sum();
        if sum_a == 0.0 {
            return 0.0;
        }
        let inv_d = 1.0 / sum_a;
        let half_accel = accel * 0.5;

        let shift: f64 = self
            .amplitudes
            .iter()
            .zip(self.times.iter())
            .map(|(&a, &t)| a * t)
            .sum::<f64>()
            * inv_d;

        let mut offset_90 = 0.0;
        let mut offset_180 = 0.0;
        for (&a, &t) in self.amplitudes.iter().zip(self.times.iter()) {
            let dt = t - shift;
            if t >= shift {
                offset_90 += a * (scv + half_accel * dt) * dt;
            }
            offset_180 += a * half_accel * dt * dt;
        }

        let offset_90 = offset_90 * inv_d * 2f64.sqrt();
        let offset_180 = offset_180 * inv_d;
        offset_90.max(offset_180)
    }

    /// Highest acceleration keeping smoothing at or below `TARGET_SMOOTHING`
    pub fn max_accel(&self, scv: f64) -> f64 {
        bisect(|accel| self.smoothing(accel, scv) <= TARGET_SMOOTHING)
    }
}

/// Largest `x` for which the monotone predicate `ok(x)` still holds
fn bisect(ok: impl Fn(f64) -> bool) -> f64 {
    if !ok(1e-9) {
        return 0.0;
    }

    let mut left = 1.0;
    let mut right = 1.0;
    while !ok(left) {
        right = left;
        left *= 0.5;
    }
    if right == left {
        while ok(right) {
            right *= 2.0;
            if !right.is_finite() {
                return left;
            }
        }
    }
    while right - left > 1e-8 {
        let middle = (left + right) * 0.5;
        if ok(middle) {
            left = middle;
        } else {
            right = middle;
        }
    }

    left
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_response_at_dc() {
        for family in ShaperFamily::ALL {
            let train = family.pulses(50.0, 0.1);
            let vals = train.response(&[0.0], 0.1);
            assert!((vals[0] - 1.0).abs() < 1e-12, "{}: {}", family.name(), vals[0]);
            assert!(train.times.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn test_response_cancels_at_tuned_frequency() {
        for family in [ShaperFamily::Zv, ShaperFamily::Mzv, ShaperFamily::Zvd] {
            let train = family.pulses(40.0, 0.1);
            let vals = train.response(&[40.0, 400.0], 0.1);
            assert!(vals[0] < 1e-6, "{}: {}", family.name(), vals[0]);
        }
    }

    #[test]
    fn test_ei_keeps_vibrations_under_tolerance() {
        let train = ShaperFamily::Ei.pulses(40.0, 0.1);
        let vals = train.response(&[40.0], 0.1);
        assert!(vals[0] <= SHAPER_VIBRATION_TOLERANCE + 0.02, "{}", vals[0]);
    }

    #[test]
    fn test_custom_train_matches_zvd() {
        let zvd = ShaperFamily::Zvd.pulses(35.0, 0.08);
        let custom = PulseTrain::custom(&[1.0, 2.0, 1.0], &[0.0, 0.5, 1.0], 35.0, 0.08);

        for (a, b) in zvd.amplitudes.iter().zip(custom.amplitudes.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
        for (a, b) in zvd.times.iter().zip(custom.times.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_smoothing_decreases_with_frequency() {
        for family in ShaperFamily::ALL {
            let low = family.pulses(30.0, 0.1).smoothing(SMOOTHING_ACCEL, 5.0);
            let high = family.pulses(60.0, 0.1).smoothing(SMOOTHING_ACCEL, 5.0);
            assert!(high < low, "{}", family.name());
        }
    }

    #[test]
    fn test_max_accel_hits_target_smoothing() {
        let train = ShaperFamily::Mzv.pulses(50.0, 0.1);
        let accel = train.max_accel(5.0);

        assert!(accel > 0.0);
        assert!(train.smoothing(accel, 5.0) <= TARGET_SMOOTHING);
        assert!(train.smoothing(accel * 1.01, 5.0) > TARGET_SMOOTHING);
    }

    #[test]
    fn test_family_names_round_trip() {
        for family in ShaperFamily::ALL {
            assert_eq!(ShaperFamily::from_name(family.name()), Some(family));
        }
        assert_eq!(ShaperFamily::from_name("MZV"), Some(ShaperFamily::Mzv));
        assert_eq!(ShaperFamily::from_name("nope"), None);
    }
}
