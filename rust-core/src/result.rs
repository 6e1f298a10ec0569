//! Result object handed to the external renderer

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{AnalysisConfig, GraphParams, GraphType};
use crate::cross_axis::{AxesMapping, BeltComparison};
use crate::measurement::decoder::METADATA_FALLBACK_NOTE;
use crate::measurement::{Axis, MeasurementFile, MeasurementFormat, MeasurementMetadata};
use crate::profile::{ProfileSummary, VibrationProfile};
use crate::shaper::CalibrationResult;
use crate::spectrum::{MechanicalParameters, Peak, SpectralEstimate, Spectrogram};

/// Category of a degraded-but-usable situation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Input decoded with skipped rows or a suspicious container
    DegradedInput,
    /// A parameter missing from the file was taken from the config
    MetadataFallback,
    /// A catalogue entry was skipped
    CatalogueEntry,
    /// One input of a multi-file graph failed and was left out
    FileFailed,
    /// An input was not used by the selected graph
    IgnoredInput,
    /// An optional analysis step produced nothing
    Analysis,
}

/// Structured warning attached to a result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,

    /// File or component the warning is about
    pub source: Option<String>,

    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, source: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.map(str::to_string),
            message: message.into(),
        }
    }
}

/// What was read from one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub path: PathBuf,
    pub format: MeasurementFormat,
    pub axes: Vec<Axis>,
    pub sample_count: usize,
    pub skipped_rows: usize,
    pub metadata: MeasurementMetadata,
}

impl From<&MeasurementFile> for FileSummary {
    fn from(file: &MeasurementFile) -> Self {
        Self {
            name: file.name().to_string(),
            path: file.source().to_path_buf(),
            format: file.format(),
            axes: file.axes(),
            sample_count: file.sample_count(),
            skipped_rows: file.skipped_rows(),
            metadata: file.metadata().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub version: &'static str,
    pub output: PathBuf,
    pub dpi: u32,
    pub max_freq: f64,
    pub parameters: GraphParams,

    /// Description of the shaper catalogue used, if any
    pub catalogue: Option<String>,

    pub files: Vec<FileSummary>,
}

/// Graph-specific payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "graph", rename_all = "kebab-case")]
pub enum GraphOutput {
    StaticFrequency {
        spectrogram: Spectrogram,
        estimate: SpectralEstimate,
    },
    AxesMap {
        mapping: AxesMapping,
    },
    Belts {
        comparison: BeltComparison,
    },
    InputShaper {
        estimate: SpectralEstimate,
        spectrogram: Option<Spectrogram>,
        mechanical: Option<MechanicalParameters>,
        peaks: Vec<Peak>,
        /// Peaks strong enough to matter for the shaper choice
        effect_peaks: usize,
        calibration: CalibrationResult,
    },
    Vibrations {
        profile: VibrationProfile,
        summary: ProfileSummary,
        mechanical: Option<MechanicalParameters>,
        calibration: CalibrationResult,
    },
}

/// Everything one run produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub graph: GraphType,
    pub provenance: Provenance,
    pub output: GraphOutput,
    pub warnings: Vec<Warning>,
}

impl AnalysisResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Collects provenance and warnings while a graph runs
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    graph: GraphType,
    files: Vec<FileSummary>,
    warnings: Vec<Warning>,
    catalogue: Option<String>,
}

impl ResultAssembler {
    pub fn new(graph: GraphType) -> Self {
        Self {
            graph,
            files: Vec::new(),
            warnings: Vec::new(),
            catalogue: None,
        }
    }

    /// Record a decoded input and its decode notes
    pub fn add_file(&mut self, file: &MeasurementFile) {
        if file.skipped_rows() > 0 {
            self.warn(Warning::new(
                WarningKind::DegradedInput,
                Some(file.name()),
                format!("{} malformed row(s) skipped", file.skipped_rows()),
            ));
        }
        for note in file.notes() {
            let kind = if note.starts_with(METADATA_FALLBACK_NOTE) {
                WarningKind::MetadataFallback
            } else {
                WarningKind::DegradedInput
            };
            self.warn(Warning::new(kind, Some(file.name()), note.clone()));
        }
        self.files.push(FileSummary::from(file));
    }

    pub fn warn(&mut self, warning: Warning) {
        log::warn!(
            "{}{}",
            warning.source.as_deref().map(|s| format!("{s}: ")).unwrap_or_default(),
            warning.message
        );
        self.warnings.push(warning);
    }

    pub fn set_catalogue(&mut self, description: String) {
        self.catalogue = Some(description);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn finish(self, config: &AnalysisConfig, output: GraphOutput) -> AnalysisResult {
        AnalysisResult {
            graph: self.graph,
            provenance: Provenance {
                version: env!("CARGO_PKG_VERSION"),
                output: config.output.clone(),
                dpi: config.dpi,
                max_freq: config.max_freq(),
                parameters: config.params.clone(),
                catalogue: self.catalogue,
                files: self.files,
            },
            output,
            warnings: self.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::AxisSeries;

    fn file(note: Option<&str>) -> MeasurementFile {
        let t: Vec<f64> = (0..8).map(|i| i as f64 * 0.01).collect();
        let series = AxisSeries::new(Axis::X, t, vec![0.0; 8]).unwrap();
        let mut file = MeasurementFile::new(
            PathBuf::from("raw_x.csv"),
            MeasurementFormat::Legacy,
            MeasurementMetadata::default(),
            vec![series],
        )
        .with_skipped_rows(2);
        if let Some(note) = note {
            file.push_note(note.to_string());
        }
        file
    }

    #[test]
    fn test_file_notes_become_warnings() {
        let mut assembler = ResultAssembler::new(GraphType::StaticFrequency);
        assembler.add_file(&file(Some(&format!("{METADATA_FALLBACK_NOTE}: accel"))));
        assembler.add_file(&file(Some("declared payload size 12 differs from 40")));

        let kinds: Vec<WarningKind> = assembler.warnings().iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![
                WarningKind::DegradedInput,
                WarningKind::MetadataFallback,
                WarningKind::DegradedInput,
                WarningKind::DegradedInput,
            ]
        );
        assert!(assembler.warnings().iter().all(|w| w.source.as_deref() == Some("raw_x")));
    }

    #[test]
    fn test_warning_kind_serialization() {
        let warning = Warning::new(WarningKind::FileFailed, None, "unreadable");
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "file_failed");
        assert!(json["source"].is_null());
    }
}
