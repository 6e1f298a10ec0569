//! Catalogues of candidate input shapers
//!
//! The calibrator only sees the [`ShaperCatalogue`] / [`ShaperCandidate`]
//! traits. Two implementations are provided: the standard in-memory set and
//! a TOML file listing built-in families and custom pulse trains:
//!
//! ```toml
//! [[shaper]]
//! name = "mzv"
//!
//! [[shaper]]
//! name = "soft_zv"
//! min_freq = 18.0
//! amplitudes = [1.0, 1.0]
//! times = [0.0, 0.5]      # in damped periods
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::pulses::{PulseTrain, ShaperFamily};
use crate::error::CatalogueError;

/// A named shaper that can be tuned to any frequency
pub trait ShaperCandidate: Send + Sync {
    fn name(&self) -> &str;

    /// Lowest frequency included in the calibration sweep
    fn min_freq(&self) -> f64;

    /// Pulse train tuned to `freq` for the given damping ratio
    fn pulses(&self, freq: f64, damping_ratio: f64) -> PulseTrain;

    /// Residual vibration ratio at each of `freqs` for an oscillator with `test_damping`
    fn response(&self, freq: f64, damping_ratio: f64, test_damping: f64, freqs: &[f64]) -> Vec<f64> {
        self.pulses(freq, damping_ratio).response(freqs, test_damping)
    }

    /// Positional smoothing at `accel` with square corner velocity `scv`
    fn smoothing(&self, freq: f64, damping_ratio: f64, accel: f64, scv: f64) -> f64 {
        self.pulses(freq, damping_ratio).smoothing(accel, scv)
    }
}

/// A read-only set of candidates in declaration (priority) order
pub trait ShaperCatalogue: Send + Sync {
    /// Human-readable origin of the catalogue
    fn describe(&self) -> String;

    fn candidates(&self) -> Vec<&dyn ShaperCandidate>;
}

/// Pulse-train definition backing a catalogue entry
#[derive(Debug, Clone, PartialEq)]
enum PulseShape {
    Family(ShaperFamily),
    Custom { amplitudes: Vec<f64>, periods: Vec<f64> },
}

/// A catalogue entry
#[derive(Debug, Clone, PartialEq)]
pub struct ShaperDefinition {
    name: String,
    min_freq: f64,
    shape: PulseShape,
}

impl ShaperDefinition {
    pub fn family(family: ShaperFamily) -> Self {
        Self {
            name: family.name().to_string(),
            min_freq: family.min_freq(),
            shape: PulseShape::Family(family),
        }
    }

    /// Custom train; `periods` are impulse times in damped periods
    pub fn custom(name: &str, min_freq: f64, amplitudes: Vec<f64>, periods: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            min_freq,
            shape: PulseShape::Custom { amplitudes, periods },
        }
    }
}

impl ShaperCandidate for ShaperDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_freq(&self) -> f64 {
        self.min_freq
    }

    fn pulses(&self, freq: f64, damping_ratio: f64) -> PulseTrain {
        match &self.shape {
            PulseShape::Family(family) => family.pulses(freq, damping_ratio),
            PulseShape::Custom { amplitudes, periods } => {
                PulseTrain::custom(amplitudes, periods, freq, damping_ratio)
            }
        }
    }
}

/// The six standard pulse-train shapers
#[derive(Debug, Clone)]
pub struct StandardCatalogue {
    shapers: Vec<ShaperDefinition>,
}

impl Default for StandardCatalogue {
    fn default() -> Self {
        Self {
            shapers: ShaperFamily::ALL.into_iter().map(ShaperDefinition::family).collect(),
        }
    }
}

impl StandardCatalogue {
    /// Restrict the standard set to the named families, keeping the standard order
    pub fn only(names: &[&str]) -> Self {
        let shapers = ShaperFamily::ALL
            .into_iter()
            .filter(|f| names.iter().any(|n| ShaperFamily::from_name(n) == Some(*f)))
            .map(ShaperDefinition::family)
            .collect();
        Self { shapers }
    }
}

impl ShaperCatalogue for StandardCatalogue {
    fn describe(&self) -> String {
        "standard shapers".to_string()
    }

    fn candidates(&self) -> Vec<&dyn ShaperCandidate> {
        self.shapers.iter().map(|s| s as &dyn ShaperCandidate).collect()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogueDocument {
    #[serde(default)]
    shaper: Vec<CatalogueEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogueEntry {
    name: String,
    #[serde(default)]
    min_freq: Option<f64>,
    #[serde(default)]
    amplitudes: Option<Vec<f64>>,
    #[serde(default)]
    times: Option<Vec<f64>>,
}

impl CatalogueEntry {
    fn into_definition(self) -> Result<ShaperDefinition, String> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err("entry without a name".to_string());
        }

        match (self.amplitudes, self.times) {
            (None, None) => {
                let family = ShaperFamily::from_name(&name)
                    .ok_or_else(|| format!("`{name}` is not a known shaper and has no pulse train"))?;
                let mut definition = ShaperDefinition::family(family);
                if let Some(min) = self.min_freq {
                    if !(min > 0.0) {
                        return Err(format!("`{name}`: min_freq must be positive"));
                    }
                    definition.min_freq = min;
                }
                Ok(definition)
            }
            (Some(amplitudes), Some(times)) => {
                validate_pulse_train(&name, &amplitudes, &times)?;
                let min_freq = self
                    .min_freq
                    .filter(|m| *m > 0.0)
                    .ok_or_else(|| format!("`{name}`: custom shapers need a positive min_freq"))?;
                Ok(ShaperDefinition::custom(&name, min_freq, amplitudes, times))
            }
            _ => Err(format!("`{name}`: amplitudes and times must be given together")),
        }
    }
}

fn validate_pulse_train(name: &str, amplitudes: &[f64], times: &[f64]) -> Result<(), String> {
    if amplitudes.is_empty() || amplitudes.len() != times.len() {
        return Err(format!(
            "`{name}`: {} amplitudes for {} times",
            amplitudes.len(),
            times.len()
        ));
    }
    if amplitudes.iter().any(|a| !a.is_finite()) || amplitudes.iter().sum::<f64>() <= 0.0 {
        return Err(format!("`{name}`: amplitudes must be finite with a positive sum"));
    }
    if times.iter().any(|t| !t.is_finite() || *t < 0.0) || times.windows(2).any(|w| w[1] < w[0]) {
        return Err(format!("`{name}`: times must be non-negative and non-decreasing"));
    }
    Ok(())
}

/// Catalogue loaded from a TOML file
#[derive(Debug, Clone)]
pub struct FileCatalogue {
    path: PathBuf,
    shapers: Vec<ShaperDefinition>,
}

impl FileCatalogue {
    /// Load a catalogue, returning it with one message per skipped entry
    ///
    /// # Errors
    /// `CatalogueError` when the file cannot be read or parsed, or when no
    /// entry survives validation.
    pub fn load(path: &Path) -> Result<(Self, Vec<String>), CatalogueError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, path: &Path) -> Result<(Self, Vec<String>), CatalogueError> {
        let document: CatalogueDocument = toml::from_str(text).map_err(|e| CatalogueError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut shapers = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for (index, entry) in document.shaper.into_iter().enumerate() {
            match entry.into_definition() {
                Ok(definition) if seen.insert(definition.name.to_ascii_lowercase()) => {
                    shapers.push(definition)
                }
                Ok(definition) => skipped.push(format!(
                    "shaper #{index}: duplicate name `{}` ignored",
                    definition.name
                )),
                Err(reason) => skipped.push(format!("shaper #{index}: {reason}")),
            }
        }

        for message in &skipped {
            log::warn!("{}: {}", path.display(), message);
        }

        if shapers.is_empty() {
            return Err(CatalogueError::Empty(path.to_path_buf()));
        }

        log::debug!(
            "Loaded {} shaper(s) from {} ({} skipped)",
            shapers.len(),
            path.display(),
            skipped.len()
        );

        Ok((
            Self {
                path: path.to_path_buf(),
                shapers,
            },
            skipped,
        ))
    }
}

impl ShaperCatalogue for FileCatalogue {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn candidates(&self) -> Vec<&dyn ShaperCandidate> {
        self.shapers.iter().map(|s| s as &dyn ShaperCandidate).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue_order() {
        let catalogue = StandardCatalogue::default();
        let names: Vec<&str> = catalogue.candidates().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["zv", "mzv", "zvd", "ei", "2hump_ei", "3hump_ei"]);
    }

    #[test]
    fn test_only_keeps_standard_order() {
        let catalogue = StandardCatalogue::only(&["EI", "zv", "bogus"]);
        let names: Vec<&str> = catalogue.candidates().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["zv", "ei"]);
    }

    #[test]
    fn test_file_catalogue_partial_load() {
        let text = r#"
            [[shaper]]
            name = "mzv"

            [[shaper]]
            name = "soft_zv"
            min_freq = 18.0
            amplitudes = [1.0, 1.0]
            times = [0.0, 0.5]

            [[shaper]]
            name = "mystery"

            [[shaper]]
            name = "broken"
            min_freq = 20.0
            amplitudes = [1.0]
            times = [0.0, 0.5]

            [[shaper]]
            name = "MZV"
        "#;

        let (catalogue, skipped) = FileCatalogue::parse(text, Path::new("shapers.toml")).unwrap();
        let names: Vec<&str> = catalogue.candidates().iter().map(|c| c.name()).collect();

        assert_eq!(names, vec!["mzv", "soft_zv"]);
        assert_eq!(skipped.len(), 3);
        assert!(skipped[0].contains("mystery"));
    }

    #[test]
    fn test_custom_entry_behaves_like_family() {
        let text = "[[shaper]]\nname = \"my_zv\"\nmin_freq = 21.0\namplitudes = [1.0, 1.0]\ntimes = [0.0, 0.5]\n";
        let (catalogue, _) = FileCatalogue::parse(text, Path::new("c.toml")).unwrap();
        let custom = catalogue.candidates()[0].pulses(45.0, 0.1);
        let zv = ShaperFamily::Zv.pulses(45.0, 0.1);

        assert!((custom.amplitudes[1] - zv.amplitudes[1]).abs() < 1e-12);
        assert!((custom.times[1] - zv.times[1]).abs() < 1e-12);
    }

    #[test]
    fn test_empty_catalogue_fails() {
        let result = FileCatalogue::parse("[[shaper]]\nname = \"nothing\"\n", Path::new("e.toml"));
        assert!(matches!(result, Err(CatalogueError::Empty(_))));
    }

    #[test]
    fn test_missing_file_fails() {
        let result = FileCatalogue::load(Path::new("/nonexistent/shapers.toml"));
        assert!(matches!(result, Err(CatalogueError::Io { .. })));
    }

    #[test]
    fn test_malformed_toml_fails() {
        let result = FileCatalogue::parse("[[shaper]\nname=", Path::new("bad.toml"));
        assert!(matches!(result, Err(CatalogueError::Parse { .. })));
    }
}
