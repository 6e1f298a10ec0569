//! Graph dispatch: decode, align, estimate, analyse, assemble

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::alignment::{AlignedSeries, ResamplingAligner};
use crate::config::{AnalysisConfig, GraphType};
use crate::context::AnalysisContext;
use crate::cross_axis::{AxesMapAnalyzer, BeltComparator};
use crate::error::{AnalysisError, DecodeError};
use crate::measurement::{Axis, MeasurementFile};
use crate::profile::VibrationProfileAggregator;
use crate::result::{AnalysisResult, GraphOutput, ResultAssembler, Warning, WarningKind};
use crate::shaper::{ShaperCalibrator, ShaperCatalogue};
use crate::spectrum::{
    compute_mechanical_parameters, compute_spectrogram, PeakDetector, PsdEstimator, SpectralEstimate,
};

/// Peak detection threshold on the input shaper PSD, relative to its maximum
const PEAKS_DETECTION_THRESHOLD: f64 = 0.05;

/// Peaks above this fraction of the maximum are reported as significant
const PEAKS_EFFECT_THRESHOLD: f64 = 0.12;

/// Default vibration metric under which a profile row counts as quiet
const LOW_VIBRATION_FRACTION: f64 = 0.2;

/// Most recordings used by an axes map (one per machine axis)
const MAX_AXES_MAP_INPUTS: usize = 3;

/// Load the context for `config` and run its graph
pub fn run(config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    let context = AnalysisContext::new(config)?;
    run_with_context(config, &context)
}

/// Run the graph selected by `config` with an existing context
pub fn run_with_context(
    config: &AnalysisConfig,
    context: &AnalysisContext,
) -> Result<AnalysisResult, AnalysisError> {
    log::info!(
        "Running {} analysis on {} file(s)",
        config.graph.name(),
        config.inputs.len()
    );

    let mut pipeline = Pipeline {
        config,
        context,
        assembler: ResultAssembler::new(config.graph),
    };

    let output = match config.graph {
        GraphType::StaticFrequency => pipeline.static_frequency()?,
        GraphType::AxesMap => pipeline.axes_map()?,
        GraphType::Belts => pipeline.belts()?,
        GraphType::InputShaper => pipeline.input_shaper()?,
        GraphType::Vibrations => pipeline.vibrations()?,
    };

    Ok(pipeline.assembler.finish(config, output))
}

struct Pipeline<'a> {
    config: &'a AnalysisConfig,
    context: &'a AnalysisContext,
    assembler: ResultAssembler,
}

impl<'a> Pipeline<'a> {
    /// Decode `paths` on the worker pool, results in input order
    fn decode_all(&self, paths: &[PathBuf]) -> Vec<Result<MeasurementFile, DecodeError>> {
        let decoder = self.context.decoder();
        let format = self.config.format;
        self.context
            .install(|| paths.par_iter().map(|p| decoder.decode(p, format)).collect())
    }

    /// Decode the first `count` inputs, failing on the first error
    fn decode_required(&mut self, count: usize) -> Result<Vec<MeasurementFile>, AnalysisError> {
        let config = self.config;
        let inputs = &config.inputs;
        if inputs.len() < count {
            return Err(AnalysisError::InsufficientData(format!(
                "{} needs {count} measurement file(s), got {}",
                self.config.graph.name(),
                inputs.len()
            )));
        }

        for ignored in &inputs[count..] {
            self.assembler.warn(Warning::new(
                WarningKind::IgnoredInput,
                Some(&ignored.display().to_string()),
                format!(
                    "incorrect number of measurements: only the first {count} used by {}",
                    self.config.graph.name()
                ),
            ));
        }

        let mut files = Vec::with_capacity(count);
        for result in self.decode_all(&inputs[..count]) {
            let file = result?;
            self.assembler.add_file(&file);
            files.push(file);
        }
        Ok(files)
    }

    /// Decode every input, recording failures as warnings
    fn decode_tolerant(&mut self) -> Result<Vec<MeasurementFile>, AnalysisError> {
        let config = self.config;
        let inputs = &config.inputs;
        let mut files = Vec::with_capacity(inputs.len());

        for (path, result) in inputs.iter().zip(self.decode_all(inputs)) {
            match result {
                Ok(file) => {
                    self.assembler.add_file(&file);
                    files.push(file);
                }
                Err(e) => self.file_failed(path, &e.to_string()),
            }
        }

        if files.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "none of the {} measurement file(s) could be decoded",
                inputs.len()
            )));
        }
        Ok(files)
    }

    fn file_failed(&mut self, path: &Path, reason: &str) {
        self.assembler.warn(Warning::new(
            WarningKind::FileFailed,
            Some(&path.display().to_string()),
            reason,
        ));
    }

    fn align(&self, file: &MeasurementFile) -> Result<AlignedSeries, AnalysisError> {
        Ok(ResamplingAligner::new(self.config.alignment).align(file.series())?)
    }

    fn estimate(&self, series: &AlignedSeries, max_freq: f64) -> Result<SpectralEstimate, AnalysisError> {
        let estimator = PsdEstimator::new(self.config.spectral);
        self.context.install(|| estimator.estimate(series, Some(max_freq)))
    }

    fn catalogue(&mut self) -> Result<&'a dyn ShaperCatalogue, AnalysisError> {
        let context = self.context;
        let catalogue = context.catalogue()?;
        for warning in context.catalogue_warnings() {
            self.assembler.warn(warning.clone());
        }
        self.assembler.set_catalogue(catalogue.describe());
        Ok(catalogue)
    }

    fn static_frequency(&mut self) -> Result<GraphOutput, AnalysisError> {
        let file = self.decode_required(1)?.remove(0);
        let series = self.align(&file)?;
        let max_freq = self.config.max_freq();

        let spectrogram = compute_spectrogram(&series, &self.config.spectral, Some(max_freq))?;
        let estimate = self.estimate(&series, max_freq)?;

        Ok(GraphOutput::StaticFrequency { spectrogram, estimate })
    }

    fn axes_map(&mut self) -> Result<GraphOutput, AnalysisError> {
        let count = self.config.inputs.len().clamp(1, MAX_AXES_MAP_INPUTS);
        let files = self.decode_required(count)?;
        let analyzer = AxesMapAnalyzer::new(self.config.axes_map_config()?)?;

        let commanded = self.config.params.axes.clone().unwrap_or_else(|| Axis::ALL.to_vec());
        if commanded.len() < files.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "{} axes map recording(s) but only {} commanded axes",
                files.len(),
                commanded.len()
            )));
        }

        let series = files
            .iter()
            .map(|f| self.align(f))
            .collect::<Result<Vec<_>, _>>()?;
        let recordings: Vec<(Axis, &AlignedSeries)> = commanded.iter().copied().zip(series.iter()).collect();

        let mapping = analyzer.map_axes(&recordings)?;
        Ok(GraphOutput::AxesMap { mapping })
    }

    fn belts(&mut self) -> Result<GraphOutput, AnalysisError> {
        let files = self.decode_required(2)?;
        let max_freq = self.config.max_freq();

        let estimates = files
            .iter()
            .map(|f| self.align(f).and_then(|s| self.estimate(&s, max_freq)))
            .collect::<Result<Vec<_>, _>>()?;

        let comparison = BeltComparator::new(self.config.belts_config()).compare(
            (files[0].name(), &estimates[0]),
            (files[1].name(), &estimates[1]),
        )?;
        Ok(GraphOutput::Belts { comparison })
    }

    fn input_shaper(&mut self) -> Result<GraphOutput, AnalysisError> {
        let catalogue = self.catalogue()?;
        let file = self.decode_required(1)?.remove(0);
        let series = self.align(&file)?;

        let calibrator = ShaperCalibrator::new(self.config.calibrator_config());
        let max_freq = self.config.max_freq();
        let analysed_freq = max_freq.max(calibrator.config().max_shaper_freq);

        let estimate = self.estimate(&series, analysed_freq)?;
        let calibration = self
            .context
            .install(|| calibrator.calibrate(&estimate, catalogue))?;

        let spectrogram = match compute_spectrogram(&series, &self.config.spectral, Some(max_freq)) {
            Ok(s) => Some(s),
            Err(e) => {
                self.assembler.warn(Warning::new(
                    WarningKind::Analysis,
                    Some(file.name()),
                    format!("spectrogram skipped: {e}"),
                ));
                None
            }
        };

        let estimate = estimate.truncated(max_freq);
        let mechanical = compute_mechanical_parameters(estimate.combined(), estimate.freqs(), None);

        let highest = estimate.peak().map(|(_, p)| p).unwrap_or(0.0);
        let peaks = PeakDetector::default().detect(
            estimate.combined(),
            estimate.freqs(),
            PEAKS_DETECTION_THRESHOLD * highest,
        );
        let effect_peaks = peaks
            .iter()
            .filter(|p| p.power > PEAKS_EFFECT_THRESHOLD * highest)
            .count();

        log::info!(
            "Peaks detected on the graph: {} @ {} Hz ({effect_peaks} above effect threshold)",
            peaks.len(),
            peaks
                .iter()
                .map(|p| format!("{:.1}", p.freq))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(GraphOutput::InputShaper {
            estimate,
            spectrogram,
            mechanical,
            peaks,
            effect_peaks,
            calibration,
        })
    }

    fn vibrations(&mut self) -> Result<GraphOutput, AnalysisError> {
        let catalogue = self.catalogue()?;
        let files = self.decode_tolerant()?;
        let parameter = self.config.params.profile;
        let max_freq = self.config.max_freq();

        let mut located = Vec::with_capacity(files.len());
        for file in &files {
            let value = match parameter.from_metadata(file.metadata()) {
                Some(v) => Some(v),
                None => {
                    let from_name = parameter.from_name(file.name());
                    if from_name.is_some() {
                        self.assembler.warn(Warning::new(
                            WarningKind::MetadataFallback,
                            Some(file.name()),
                            format!("{parameter:?} taken from the file name"),
                        ));
                    }
                    from_name
                }
            };

            match value {
                Some(v) => located.push((v, file)),
                None => self.file_failed(
                    file.source(),
                    &format!("no {parameter:?} value in metadata or file name"),
                ),
            }
        }

        let estimator = PsdEstimator::new(self.config.spectral);
        let aligner = ResamplingAligner::new(self.config.alignment);
        let estimated: Vec<Result<(f64, SpectralEstimate), AnalysisError>> = self.context.install(|| {
            located
                .par_iter()
                .map(|(value, file)| -> Result<(f64, SpectralEstimate), AnalysisError> {
                    let series = aligner.align(file.series())?;
                    Ok((*value, estimator.estimate(&series, Some(max_freq))?))
                })
                .collect()
        });

        let mut estimates = Vec::with_capacity(estimated.len());
        for ((_, file), result) in located.iter().zip(estimated) {
            match result {
                Ok(entry) => estimates.push(entry),
                Err(e) => self.file_failed(file.source(), &e.to_string()),
            }
        }

        let entries: Vec<(f64, &SpectralEstimate)> = estimates.iter().map(|(v, e)| (*v, e)).collect();
        let profile = VibrationProfileAggregator::new(parameter).aggregate(&entries)?;

        let low_fraction = self
            .config
            .params
            .low_vibration_fraction
            .unwrap_or(LOW_VIBRATION_FRACTION);
        let summary = profile.summary(low_fraction);

        let mean = profile.mean_estimate();
        let mechanical = compute_mechanical_parameters(mean.combined(), mean.freqs(), None);
        let calibrator = ShaperCalibrator::new(self.config.calibrator_config());
        let calibration = self.context.install(|| calibrator.calibrate(mean, catalogue))?;

        Ok(GraphOutput::Vibrations {
            profile,
            summary,
            mechanical,
            calibration,
        })
    }
}
