//! Shake&Tune analysis core
//!
//! Decodes accelerometer recordings, estimates their spectra and derives
//! resonance diagnostics: input shaper recommendations, belt comparison,
//! accelerometer axis mapping and vibration-vs-speed profiles. The optional
//! `python` feature exposes the pipeline to a Python renderer.

// Suppress PyO3 non-local impl warnings (harmless macro-generated code)
#![cfg_attr(feature = "python", allow(non_local_definitions))]

pub mod error;
pub mod measurement;
pub mod alignment;
pub mod spectrum;
pub mod cross_axis;
pub mod shaper;
pub mod profile;
pub mod config;
pub mod context;
pub mod result;
pub mod pipeline;

#[cfg(feature = "python")]
pub mod python_bindings;

pub use alignment::{AlignedSeries, ResamplingAligner};
pub use config::{AnalysisConfig, GraphType};
pub use context::AnalysisContext;
pub use error::AnalysisError;
pub use measurement::{Axis, MeasurementDecoder, MeasurementFile};
pub use pipeline::run;
pub use result::{AnalysisResult, ResultAssembler};
pub use spectrum::{PsdEstimator, SpectralEstimate};
