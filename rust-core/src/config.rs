//! Analysis configuration loaded from TOML
//!
//! ```toml
//! graph = "input-shaper"
//! output = "out/shaper.png"
//! inputs = ["raw_data_x.stdata"]
//!
//! [params]
//! scv = 5.0
//! max_smoothing = 0.1
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alignment::AlignerConfig;
use crate::cross_axis::{AxesMapConfig, BeltsConfig};
use crate::error::ConfigError;
use crate::measurement::{Axis, DecodeLimits, MeasurementFormat, MeasurementMetadata};
use crate::profile::ProfileParameter;
use crate::shaper::CalibratorConfig;
use crate::spectrum::SpectralConfig;

/// Kind of analysis to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GraphType {
    StaticFrequency,
    AxesMap,
    Belts,
    InputShaper,
    Vibrations,
}

impl GraphType {
    pub fn name(self) -> &'static str {
        match self {
            GraphType::StaticFrequency => "static-frequency",
            GraphType::AxesMap => "axes-map",
            GraphType::Belts => "belts",
            GraphType::InputShaper => "input-shaper",
            GraphType::Vibrations => "vibrations",
        }
    }

    pub fn default_max_freq(self) -> f64 {
        match self {
            GraphType::Vibrations => 1000.0,
            _ => 200.0,
        }
    }

    /// Whether the graph needs the shaper catalogue
    pub fn needs_catalogue(self) -> bool {
        matches!(self, GraphType::InputShaper | GraphType::Vibrations)
    }
}

/// Graph-specific numeric parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    /// Commanded acceleration (mm/s²)
    pub accel: Option<f64>,

    /// Axes map move length (mm)
    pub travel_length: Option<f64>,

    /// Commanded axis of each axes map input, in input order (default x, y, z)
    pub axes: Option<Vec<Axis>>,

    pub correlation_threshold: Option<f64>,

    pub kinematics: Option<String>,

    /// Square corner velocity (mm/s)
    pub scv: Option<f64>,

    pub max_smoothing: Option<f64>,

    /// Overrides the damping ratio estimated from the spectrum
    pub damping_ratio: Option<f64>,

    /// Static frequency excitation (Hz)
    pub frequency: Option<f64>,

    pub duration: Option<f64>,
    pub accel_per_hz: Option<f64>,

    /// Row parameter of the vibration profile
    pub profile: ProfileParameter,

    /// Vibration metric under which a profile row counts as quiet
    pub low_vibration_fraction: Option<f64>,
}

fn default_dpi() -> u32 {
    150
}

/// One analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub graph: GraphType,

    /// Where the renderer writes the graph
    pub output: PathBuf,

    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    /// Forces the input format instead of detecting it
    #[serde(default)]
    pub format: Option<MeasurementFormat>,

    #[serde(default)]
    pub max_freq: Option<f64>,

    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Shaper catalogue file; the standard set when absent
    #[serde(default)]
    pub catalogue: Option<PathBuf>,

    /// Worker threads (rayon default when absent)
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub params: GraphParams,

    #[serde(default)]
    pub spectral: SpectralConfig,

    #[serde(default)]
    pub alignment: AlignerConfig,

    #[serde(default)]
    pub decode: DecodeLimits,
}

fn positive(parameter: &'static str, value: Option<f64>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(v > 0.0) || !v.is_finite() => Err(ConfigError::InvalidValue {
            parameter,
            reason: format!("{v} is not a positive number"),
        }),
        _ => Ok(()),
    }
}

impl AnalysisConfig {
    /// Read, parse and validate a config file
    ///
    /// Relative input and catalogue paths are resolved against the config's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;

        if let Some(base) = path.parent() {
            let resolve = |p: &PathBuf| if p.is_relative() { base.join(p) } else { p.clone() };
            config.inputs = config.inputs.iter().map(resolve).collect();
            config.catalogue = config.catalogue.as_ref().map(resolve);
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let graph = self.graph.name();
        if self.inputs.is_empty() {
            return Err(ConfigError::InvalidValue {
                parameter: "inputs",
                reason: format!("{graph} needs at least one measurement file"),
            });
        }

        positive("max_freq", self.max_freq)?;
        positive("accel", self.params.accel)?;
        positive("travel_length", self.params.travel_length)?;
        positive("scv", self.params.scv)?;
        positive("max_smoothing", self.params.max_smoothing)?;
        positive("spectral.window_seconds", Some(self.spectral.window_seconds))?;

        if self.dpi == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "dpi",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                parameter: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.spectral.overlap) {
            return Err(ConfigError::InvalidValue {
                parameter: "spectral.overlap",
                reason: format!("{} is outside [0, 1)", self.spectral.overlap),
            });
        }
        if let Some(zeta) = self.params.damping_ratio {
            if !(zeta > 0.0 && zeta < 1.0) {
                return Err(ConfigError::InvalidValue {
                    parameter: "damping_ratio",
                    reason: format!("{zeta} is outside (0, 1)"),
                });
            }
        }

        if self.graph == GraphType::AxesMap {
            if self.params.accel.is_none() {
                return Err(ConfigError::MissingParameter { graph: "axes-map", parameter: "accel" });
            }
            if self.params.travel_length.is_none() {
                return Err(ConfigError::MissingParameter {
                    graph: "axes-map",
                    parameter: "travel_length",
                });
            }
        }

        Ok(())
    }

    pub fn max_freq(&self) -> f64 {
        self.max_freq.unwrap_or_else(|| self.graph.default_max_freq())
    }

    /// Parameters used for files that do not embed them
    pub fn fallback_metadata(&self) -> MeasurementMetadata {
        MeasurementMetadata {
            accel: self.params.accel,
            duration: self.params.duration,
            frequency: self.params.frequency,
            accel_per_hz: self.params.accel_per_hz,
            ..MeasurementMetadata::default()
        }
    }

    pub fn calibrator_config(&self) -> CalibratorConfig {
        let defaults = CalibratorConfig::default();
        CalibratorConfig {
            scv: self.params.scv.unwrap_or(defaults.scv),
            max_smoothing: self.params.max_smoothing,
            damping_ratio: self.params.damping_ratio,
            max_freq: self.max_freq(),
            ..defaults
        }
    }

    pub fn belts_config(&self) -> BeltsConfig {
        BeltsConfig {
            kinematics: self.params.kinematics.clone(),
            max_freq: self.max_freq(),
            ..BeltsConfig::default()
        }
    }

    pub fn axes_map_config(&self) -> Result<AxesMapConfig, ConfigError> {
        let accel = self.params.accel.ok_or(ConfigError::MissingParameter {
            graph: "axes-map",
            parameter: "accel",
        })?;
        let travel_length = self.params.travel_length.ok_or(ConfigError::MissingParameter {
            graph: "axes-map",
            parameter: "travel_length",
        })?;

        let mut config = AxesMapConfig::new(accel, travel_length);
        if let Some(threshold) = self.params.correlation_threshold {
            config.correlation_threshold = threshold;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AnalysisConfig::from_toml(
            "graph = \"vibrations\"\noutput = \"out.png\"\ninputs = [\"a.stdata\", \"b.stdata\"]\n",
        )
        .unwrap();

        assert_eq!(config.graph, GraphType::Vibrations);
        assert_eq!(config.max_freq(), 1000.0);
        assert_eq!(config.dpi, 150);
        assert_eq!(config.params.profile, ProfileParameter::Speed);
        assert_eq!(config.calibrator_config().scv, 5.0);
    }

    #[test]
    fn test_axes_map_requires_accel() {
        let result = AnalysisConfig::from_toml(
            "graph = \"axes-map\"\noutput = \"o.png\"\ninputs = [\"x.csv\"]\n[params]\ntravel_length = 50.0\n",
        );
        assert!(matches!(
            result,
            Err(ConfigError::MissingParameter { parameter: "accel", .. })
        ));
    }

    #[test]
    fn test_nested_tables() {
        let text = r#"
            graph = "input-shaper"
            output = "o.png"
            inputs = ["x.stdata"]
            max_freq = 150.0
            catalogue = "shapers.toml"

            [params]
            scv = 7.5
            max_smoothing = 0.2

            [spectral]
            window_seconds = 1.0
            window = "hann"

            [decode]
            max_payload_bytes = 1024
        "#;
        let config = AnalysisConfig::from_toml(text).unwrap();
        let calibrator = config.calibrator_config();

        assert_eq!(calibrator.scv, 7.5);
        assert_eq!(calibrator.max_smoothing, Some(0.2));
        assert_eq!(calibrator.max_freq, 150.0);
        assert_eq!(config.spectral.window_seconds, 1.0);
        assert_eq!(config.spectral.overlap, 0.5);
        assert_eq!(config.decode.max_payload_bytes, 1024);
    }

    #[test]
    fn test_rejects_bad_values() {
        let base = "graph = \"belts\"\noutput = \"o.png\"\ninputs = [\"a.csv\", \"b.csv\"]\n";
        assert!(AnalysisConfig::from_toml(&format!("{base}[params]\nscv = -1.0\n")).is_err());
        assert!(AnalysisConfig::from_toml(&format!("{base}[spectral]\noverlap = 1.0\n")).is_err());
        assert!(AnalysisConfig::from_toml("graph = \"belts\"\noutput = \"o.png\"\n").is_err());
        assert!(AnalysisConfig::from_toml("graph = \"sideways\"\noutput = \"o.png\"\n").is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "graph = \"static-frequency\"\noutput = \"o.png\"\ninputs = [\"rec.csv\"]\n",
        )
        .unwrap();

        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.inputs, vec![dir.path().join("rec.csv")]);
    }
}
