//! Python entry point running a whole analysis

use std::path::PathBuf;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::AnalysisConfig;
use crate::pipeline;

/// Run the analysis described by a TOML config file
///
/// Args:
///     config_path: Path to the analysis config
///
/// Returns:
///     The analysis result as a JSON string
#[pyfunction]
pub fn run_analysis(py: Python<'_>, config_path: PathBuf) -> PyResult<String> {
    let config = AnalysisConfig::load(&config_path).map_err(|e| PyValueError::new_err(e.to_string()))?;

    // Decoding and FFT work does not touch Python objects
    let result = py
        .allow_threads(|| pipeline::run(&config))
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;

    result.to_json().map_err(|e| PyRuntimeError::new_err(e.to_string()))
}
