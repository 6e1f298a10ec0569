//! Inter-axis correlation: accelerometer axis mapping and belt comparison

pub mod correlation;
pub mod axes_map;
pub mod belts;

use serde::Serialize;

use crate::measurement::Axis;

pub use axes_map::{AxesMapAnalyzer, AxesMapConfig, AxesMapping, AxisAssignment};
pub use belts::{belt_label, BeltComparator, BeltComparison, BeltSignal, BeltsConfig, PeakPair};
pub use correlation::{fft_correlate, match_template, peak_correlation, CorrelationPeak};

/// What a coupling metric relates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouplingPair {
    Axes { first: Axis, second: Axis },
    Belts { first: String, second: String },
}

/// Pairwise coupling between two channels or two recordings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossAxisMetric {
    pub pair: CouplingPair,

    /// |correlation| for axes, signed Pearson correlation of the spectra for belts
    pub coupling_score: f64,

    /// Lag of the second channel behind the first (s)
    pub lag_seconds: Option<f64>,

    /// Frequency at which the pair couples most strongly (Hz)
    pub coupling_frequency: Option<f64>,

    pub sign_inverted: bool,
}
