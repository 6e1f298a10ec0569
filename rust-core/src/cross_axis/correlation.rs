//! FFT-based cross-correlation

use num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;

/// Best alignment between two signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorrelationPeak {
    /// Positive when the second signal lags the first, in samples
    pub lag: isize,

    /// Normalised correlation at `lag`, in [-1, 1]
    pub coefficient: f64,
}

/// Full linear cross-correlation `c[k] = Σ a[i]·b[i+k]`
///
/// # Returns
/// Values for `k = -(a.len()-1) ..= b.len()-1`, so index `a.len()-1` is lag 0
pub fn fft_correlate(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }

    let out_len = a.len() + b.len() - 1;
    let size = out_len.next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut fa: Vec<Complex<f64>> = a.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fa.resize(size, Complex::new(0.0, 0.0));
    let mut fb: Vec<Complex<f64>> = b.iter().map(|&v| Complex::new(v, 0.0)).collect();
    fb.resize(size, Complex::new(0.0, 0.0));

    forward.process(&mut fa);
    forward.process(&mut fb);

    let mut product: Vec<Complex<f64>> = fa
        .iter()
        .zip(fb.iter())
        .map(|(x, y)| x.conj() * y)
        .collect();
    inverse.process(&mut product);

    let scale = 1.0 / size as f64;
    let negative = a.len() - 1;

    // Circular layout: lag k >= 0 at index k, lag -k at index size - k
    (0..out_len)
        .map(|i| {
            let lag = i as isize - negative as isize;
            let idx = if lag >= 0 {
                lag as usize
            } else {
                size - lag.unsigned_abs()
            };
            product[idx].re * scale
        })
        .collect()
}

fn demeaned(x: &[f64]) -> Vec<f64> {
    let mean = if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f64>() / x.len() as f64
    };
    x.iter().map(|v| v - mean).collect()
}

/// Lag within `±max_lag` samples maximising |normalised correlation|
///
/// Both signals are mean-removed. Returns `None` when either is constant.
pub fn peak_correlation(a: &[f64], b: &[f64], max_lag: usize) -> Option<CorrelationPeak> {
    let a = demeaned(a);
    let b = demeaned(b);

    let norm = (a.iter().map(|v| v * v).sum::<f64>() * b.iter().map(|v| v * v).sum::<f64>()).sqrt();
    if !(norm > 0.0) {
        return None;
    }

    let corr = fft_correlate(&a, &b);
    let zero = a.len() as isize - 1;
    let lo = (-(max_lag as isize)).max(-zero);
    let hi = (max_lag as isize).min(b.len() as isize - 1);

    (lo..=hi)
        .map(|lag| (lag, corr[(zero + lag) as usize] / norm))
        .max_by(|(_, x), (_, y)| x.abs().total_cmp(&y.abs()))
        .map(|(lag, coefficient)| CorrelationPeak { lag, coefficient })
}

/// Best match of a zero-mean `template` sliding over `signal`
///
/// Each window is scored with the Pearson correlation against the template.
/// Returns the window start and the signed coefficient of the strongest match.
pub fn match_template(signal: &[f64], template: &[f64]) -> Option<(usize, f64)> {
    let m = template.len();
    if m < 2 || signal.len() < m {
        return None;
    }

    let template = demeaned(template);
    let t_norm = template.iter().map(|v| v * v).sum::<f64>().sqrt();
    if !(t_norm > 0.0) {
        return None;
    }

    let corr = fft_correlate(&template, signal);
    let zero = m - 1;

    let mut sum = vec![0.0; signal.len() + 1];
    let mut sum_sq = vec![0.0; signal.len() + 1];
    for (i, &v) in signal.iter().enumerate() {
        sum[i + 1] = sum[i] + v;
        sum_sq[i + 1] = sum_sq[i] + v * v;
    }

    (0..=signal.len() - m)
        .filter_map(|start| {
            let s = sum[start + m] - sum[start];
            let ss = sum_sq[start + m] - sum_sq[start];
            let var = ss - s * s / m as f64;
            // zero-mean template: Σ t·(x - mean) == Σ t·x
            (var > 1e-12 * ss.max(1.0)).then(|| (start, corr[zero + start] / (t_norm * var.sqrt())))
        })
        .max_by(|(_, x), (_, y)| x.abs().total_cmp(&y.abs()))
}
