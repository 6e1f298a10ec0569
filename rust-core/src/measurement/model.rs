//! Canonical measurement data model

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Accelerometer axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Column index in (x, y, z) ordered storage
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Axis> {
        Axis::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    /// Bit used for this axis in the binary container axis mask
    pub fn mask_bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// On-disk representation of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementFormat {
    /// Compressed binary container
    Binary,
    /// Row-oriented delimited text
    Legacy,
}

impl MeasurementFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "stdata" | "stm" | "bin" => Some(MeasurementFormat::Binary),
            "csv" | "txt" => Some(MeasurementFormat::Legacy),
            _ => None,
        }
    }
}

/// A single timestamped reading for one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub timestamp: f64,
    pub value: f64,
}

/// Time-ordered readings of one axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSeries {
    axis: Axis,
    timestamps: Vec<f64>,
    values: Vec<f64>,
}

impl AxisSeries {
    /// Build a series, checking that timestamps are finite and non-decreasing
    pub fn new(axis: Axis, timestamps: Vec<f64>, values: Vec<f64>) -> Result<Self, DecodeError> {
        if timestamps.len() != values.len() {
            return Err(DecodeError::InvalidRecord {
                index: timestamps.len().min(values.len()),
                reason: format!(
                    "axis {axis}: {} timestamps but {} values",
                    timestamps.len(),
                    values.len()
                ),
            });
        }

        for (i, (&t, &v)) in timestamps.iter().zip(values.iter()).enumerate() {
            if !t.is_finite() || !v.is_finite() {
                return Err(DecodeError::InvalidRecord {
                    index: i,
                    reason: format!("axis {axis}: non-finite sample"),
                });
            }
            if i > 0 && t < timestamps[i - 1] {
                return Err(DecodeError::InvalidRecord {
                    index: i,
                    reason: format!("axis {axis}: timestamp goes backwards"),
                });
            }
        }

        Ok(Self {
            axis,
            timestamps,
            values,
        })
    }

    pub fn from_samples(axis: Axis, samples: &[RawSample]) -> Result<Self, DecodeError> {
        let timestamps = samples.iter().map(|s| s.timestamp).collect();
        let values = samples.iter().map(|s| s.value).collect();
        Self::new(axis, timestamps, values)
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn samples(&self) -> impl Iterator<Item = RawSample> + '_ {
        self.timestamps
            .iter()
            .zip(self.values.iter())
            .map(|(&timestamp, &value)| RawSample { timestamp, value })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn start(&self) -> Option<f64> {
        self.timestamps.first().copied()
    }

    pub fn end(&self) -> Option<f64> {
        self.timestamps.last().copied()
    }

    /// Time span covered by the series in seconds
    pub fn duration(&self) -> f64 {
        match (self.start(), self.end()) {
            (Some(s), Some(e)) => e - s,
            _ => 0.0,
        }
    }

    /// Effective sample rate (samples / duration), zero when undefined
    pub fn effective_rate(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            self.len() as f64 / duration
        } else {
            0.0
        }
    }
}

/// Measurement parameters embedded in a file or supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub accel: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub frequency: Option<f64>,
    #[serde(default)]
    pub accel_per_hz: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub angle: Option<f64>,
    /// Keys without a dedicated field
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl MeasurementMetadata {
    /// Fill every absent field from `fallback`, returning the names of filled fields
    pub fn fill_from(&mut self, fallback: &MeasurementMetadata) -> Vec<&'static str> {
        let mut filled = Vec::new();

        macro_rules! fill {
            ($field:ident) => {
                if self.$field.is_none() && fallback.$field.is_some() {
                    self.$field = fallback.$field.clone();
                    filled.push(stringify!($field));
                }
            };
        }

        fill!(name);
        fill!(accel);
        fill!(duration);
        fill!(frequency);
        fill!(accel_per_hz);
        fill!(speed);
        fill!(angle);

        for (key, value) in &fallback.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }

        filled
    }
}

/// Embedded name, or the file stem
fn display_name(metadata: &MeasurementMetadata, source: &Path) -> String {
    metadata.name.clone().unwrap_or_else(|| {
        source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("measurement")
            .to_string()
    })
}

/// One decoded recording
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementFile {
    name: String,
    source: PathBuf,
    format: MeasurementFormat,
    metadata: MeasurementMetadata,
    series: Vec<AxisSeries>,
    skipped_rows: usize,
    notes: Vec<String>,
}

impl MeasurementFile {
    pub fn new(
        source: PathBuf,
        format: MeasurementFormat,
        metadata: MeasurementMetadata,
        series: Vec<AxisSeries>,
    ) -> Self {
        let name = display_name(&metadata, &source);

        Self {
            name,
            source,
            format,
            metadata,
            series,
            skipped_rows: 0,
            notes: Vec::new(),
        }
    }

    pub(crate) fn with_skipped_rows(mut self, skipped: usize) -> Self {
        self.skipped_rows = skipped;
        self
    }

    pub(crate) fn push_note(&mut self, note: String) {
        self.notes.push(note);
    }

    /// Fill absent metadata from `fallback`, returning the names of filled fields
    pub(crate) fn fill_metadata(&mut self, fallback: &MeasurementMetadata) -> Vec<&'static str> {
        let filled = self.metadata.fill_from(fallback);
        if filled.contains(&"name") {
            self.name = display_name(&self.metadata, &self.source);
        }
        filled
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn format(&self) -> MeasurementFormat {
        self.format
    }

    pub fn metadata(&self) -> &MeasurementMetadata {
        &self.metadata
    }

    pub fn series(&self) -> &[AxisSeries] {
        &self.series
    }

    pub fn axis_series(&self, axis: Axis) -> Option<&AxisSeries> {
        self.series.iter().find(|s| s.axis() == axis)
    }

    /// Axes present in this recording
    pub fn axes(&self) -> Vec<Axis> {
        self.series.iter().map(|s| s.axis()).collect()
    }

    /// Number of samples of the longest axis
    pub fn sample_count(&self) -> usize {
        self.series.iter().map(|s| s.len()).max().unwrap_or(0)
    }

    /// Rows dropped by lenient legacy parsing
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Degradations noticed while decoding (metadata fallbacks, size mismatches)
    pub fn notes(&self) -> &[String] {
        &self.notes
    }
}
