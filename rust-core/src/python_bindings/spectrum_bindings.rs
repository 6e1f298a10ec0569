//! Python bindings for PSD estimation

use numpy::{PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::alignment::ResamplingAligner;
use crate::measurement::{Axis, AxisSeries};
use crate::spectrum::{PsdEstimator, SpectralConfig, WindowType};

/// Window type enum exposed to Python
#[pyclass(name = "WindowType")]
#[derive(Clone)]
pub enum PyWindowType {
    Hann,
    Hamming,
    Blackman,
    /// Kaiser window with beta = 6
    Kaiser,
    Rectangular,
}

impl From<PyWindowType> for WindowType {
    fn from(py_win: PyWindowType) -> Self {
        match py_win {
            PyWindowType::Hann => WindowType::Hann,
            PyWindowType::Hamming => WindowType::Hamming,
            PyWindowType::Blackman => WindowType::Blackman,
            PyWindowType::Kaiser => WindowType::default(),
            PyWindowType::Rectangular => WindowType::Rectangular,
        }
    }
}

type PsdArrays<'py> = (
    &'py PyArray1<f64>,
    &'py PyArray1<f64>,
    &'py PyArray1<f64>,
    &'py PyArray1<f64>,
    &'py PyArray1<f64>,
);

/// Welch PSD estimator exposed to Python
#[pyclass(name = "PsdEstimator")]
pub struct PyPsdEstimator {
    estimator: PsdEstimator,
}

#[pymethods]
impl PyPsdEstimator {
    /// Create a new estimator
    ///
    /// Args:
    ///     window_seconds: Segment length in seconds (rounded up to a power of two)
    ///     window_type: Window applied to each segment
    ///     overlap: Fraction of overlap between segments
    #[new]
    #[pyo3(signature = (window_seconds=0.5, window_type=PyWindowType::Kaiser, overlap=0.5))]
    fn new(window_seconds: f64, window_type: PyWindowType, overlap: f64) -> PyResult<Self> {
        if !(window_seconds > 0.0) || !(0.0..1.0).contains(&overlap) {
            return Err(PyValueError::new_err(
                "window_seconds must be positive and overlap within [0, 1)",
            ));
        }

        Ok(Self {
            estimator: PsdEstimator::new(SpectralConfig {
                window_seconds,
                window: window_type.into(),
                overlap,
            }),
        })
    }

    /// Estimate the PSD of a three-axis recording
    ///
    /// Args:
    ///     time: Sample timestamps in seconds
    ///     x, y, z: Acceleration per axis (same length as time)
    ///     max_freq: Highest frequency kept (default: Nyquist)
    ///
    /// Returns:
    ///     (freqs, psd_x, psd_y, psd_z, psd_sum) as numpy arrays
    #[pyo3(signature = (time, x, y, z, max_freq=None))]
    fn estimate<'py>(
        &self,
        py: Python<'py>,
        time: PyReadonlyArray1<f64>,
        x: PyReadonlyArray1<f64>,
        y: PyReadonlyArray1<f64>,
        z: PyReadonlyArray1<f64>,
        max_freq: Option<f64>,
    ) -> PyResult<PsdArrays<'py>> {
        let invalid = |e: String| PyValueError::new_err(e);

        let t = time.as_slice().map_err(|e| invalid(e.to_string()))?.to_vec();
        let series = [(Axis::X, x), (Axis::Y, y), (Axis::Z, z)]
            .into_iter()
            .map(|(axis, values)| {
                let values = values.as_slice().map_err(|e| invalid(e.to_string()))?.to_vec();
                AxisSeries::new(axis, t.clone(), values).map_err(|e| invalid(e.to_string()))
            })
            .collect::<PyResult<Vec<_>>>()?;

        let aligned = ResamplingAligner::default()
            .align(&series)
            .map_err(|e| invalid(e.to_string()))?;
        let estimate = py
            .allow_threads(|| self.estimator.estimate(&aligned, max_freq))
            .map_err(|e| invalid(e.to_string()))?;

        Ok((
            PyArray1::from_slice(py, estimate.freqs()),
            PyArray1::from_slice(py, estimate.axis(Axis::X)),
            PyArray1::from_slice(py, estimate.axis(Axis::Y)),
            PyArray1::from_slice(py, estimate.axis(Axis::Z)),
            PyArray1::from_slice(py, estimate.combined()),
        ))
    }

    /// Segment length in samples at `sample_rate`
    fn segment_len(&self, sample_rate: f64) -> usize {
        self.estimator.config().segment_len(sample_rate)
    }
}
