//! Spectral analysis: Welch PSD, spectrogram, peaks and resonance parameters

pub mod fft;
pub mod windowing;
pub mod welch;
pub mod spectrogram;
pub mod peaks;
pub mod mechanical;

pub use fft::FftEngine;
pub use windowing::WindowType;
pub use welch::{welch_psd, PsdEstimator, SpectralConfig, SpectralEstimate};
pub use spectrogram::{compute_spectrogram, Spectrogram};
pub use peaks::{Peak, PeakDetector};
pub use mechanical::{compute_mechanical_parameters, MechanicalParameters, DEFAULT_DAMPING_RATIO};
