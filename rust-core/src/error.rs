//! Error taxonomy for the analysis pipeline

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while decoding a measurement file
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid magic bytes: expected STMEAS, found {0:02x?}")]
    InvalidMagic(Vec<u8>),

    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u16),

    #[error("Truncated {section}: expected {expected} bytes, found {found}")]
    Truncated {
        section: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Decompression failed: {0}")]
    Compression(String),

    #[error("Decompressed payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid metadata block: {0}")]
    Metadata(String),

    #[error("Record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("No valid rows ({skipped} skipped)")]
    NoValidRows { skipped: usize },

    #[error("Cannot determine the format of {0}")]
    UnknownFormat(PathBuf),
}

/// Failures while aligning axis channels onto one time base
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("No axis series to align")]
    NoAxes,

    #[error("Axis {axis} has {samples} samples, at least 2 are required")]
    TooFewSamples { axis: String, samples: usize },

    #[error("Axis time ranges do not overlap (latest start {start:.6} s >= earliest end {end:.6} s)")]
    NoOverlap { start: f64, end: f64 },

    #[error("Overlapping time range of {duration:.3} s is shorter than the {minimum:.3} s minimum")]
    TooShort { duration: f64, minimum: f64 },
}

/// Failures while locating or parsing the shaper catalogue
#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("Catalogue {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Catalogue {path} is malformed: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Catalogue {0} declares no usable shaper")]
    Empty(PathBuf),
}

/// Failures while loading or validating the analysis configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required parameter `{parameter}` for graph type {graph}")]
    MissingParameter {
        graph: &'static str,
        parameter: &'static str,
    },

    #[error("Invalid value for `{parameter}`: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Top-level error returned by every pipeline stage
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Insufficient signal: {0}")]
    InsufficientSignal(String),

    #[error("No shaper satisfies the smoothing ceiling of {ceiling:.4} (lowest candidate smoothing {lowest:.4})")]
    NoViableShaper { ceiling: f64, lowest: f64 },

    #[error("Shaper catalogue unavailable: {0}")]
    CatalogueUnavailable(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("FFT processing failed: {0}")]
    Fft(String),
}

impl From<CatalogueError> for AnalysisError {
    fn from(err: CatalogueError) -> Self {
        AnalysisError::CatalogueUnavailable(err.to_string())
    }
}
