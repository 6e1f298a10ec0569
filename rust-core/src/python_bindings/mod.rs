//! PyO3 bindings for Python integration

use pyo3::prelude::*;

mod analysis_bindings;
mod spectrum_bindings;

/// Python module definition
#[pymodule]
fn shaketune(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(analysis_bindings::run_analysis, m)?)?;
    m.add_class::<spectrum_bindings::PyPsdEstimator>()?;
    m.add_class::<spectrum_bindings::PyWindowType>()?;

    Ok(())
}
