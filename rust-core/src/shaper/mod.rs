//! Input shaper catalogue and calibration

pub mod pulses;
pub mod catalogue;
pub mod calibrator;

pub use pulses::{PulseTrain, ShaperFamily, SMOOTHING_ACCEL, TARGET_SMOOTHING};
pub use catalogue::{FileCatalogue, ShaperCandidate, ShaperCatalogue, ShaperDefinition, StandardCatalogue};
pub use calibrator::{CalibrationResult, CalibratorConfig, ShaperCalibrator, ShaperFit};
