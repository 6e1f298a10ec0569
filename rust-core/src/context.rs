//! Per-invocation resources shared by every pipeline stage

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ConfigError};
use crate::measurement::MeasurementDecoder;
use crate::result::{Warning, WarningKind};
use crate::shaper::{FileCatalogue, ShaperCatalogue, StandardCatalogue};

/// Owns the decoder, the shaper catalogue and the worker pool of one run
pub struct AnalysisContext {
    decoder: MeasurementDecoder,
    catalogue: Result<Box<dyn ShaperCatalogue>, String>,
    catalogue_warnings: Vec<Warning>,
    pool: ThreadPool,
}

impl AnalysisContext {
    /// Build the context, loading the configured catalogue once
    ///
    /// A catalogue that fails to load is kept as unavailable; only graphs
    /// that need it report the failure.
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigError> {
        let mut catalogue_warnings = Vec::new();

        let catalogue: Result<Box<dyn ShaperCatalogue>, String> = match &config.catalogue {
            None => Ok(Box::new(StandardCatalogue::default())),
            Some(path) => match FileCatalogue::load(path) {
                Ok((catalogue, skipped)) => {
                    let source = catalogue.describe();
                    catalogue_warnings.extend(
                        skipped
                            .into_iter()
                            .map(|m| Warning::new(WarningKind::CatalogueEntry, Some(&source), m)),
                    );
                    Ok(Box::new(catalogue))
                }
                Err(e) => {
                    if config.graph.needs_catalogue() {
                        log::error!("{e}");
                    }
                    Err(e.to_string())
                }
            },
        };

        Self::build(config, catalogue, catalogue_warnings)
    }

    /// Build the context around an already constructed catalogue
    pub fn with_catalogue(
        config: &AnalysisConfig,
        catalogue: Box<dyn ShaperCatalogue>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Ok(catalogue), Vec::new())
    }

    fn build(
        config: &AnalysisConfig,
        catalogue: Result<Box<dyn ShaperCatalogue>, String>,
        catalogue_warnings: Vec<Warning>,
    ) -> Result<Self, ConfigError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers.unwrap_or(0))
            .thread_name(|i| format!("shaketune-worker-{i}"))
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;

        log::debug!("Worker pool ready with {} thread(s)", pool.current_num_threads());

        Ok(Self {
            decoder: MeasurementDecoder::new(config.decode, config.fallback_metadata()),
            catalogue,
            catalogue_warnings,
            pool,
        })
    }

    pub fn decoder(&self) -> &MeasurementDecoder {
        &self.decoder
    }

    /// # Errors
    /// `CatalogueUnavailable` when the catalogue failed to load
    pub fn catalogue(&self) -> Result<&dyn ShaperCatalogue, AnalysisError> {
        self.catalogue
            .as_deref()
            .map_err(|reason| AnalysisError::CatalogueUnavailable(reason.clone()))
    }

    /// Entries skipped while loading the catalogue
    pub fn catalogue_warnings(&self) -> &[Warning] {
        &self.catalogue_warnings
    }

    /// Run `op` on the worker pool; rayon iterators inside it use the pool
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(extra: &str) -> AnalysisConfig {
        AnalysisConfig::from_toml(&format!(
            "graph = \"input-shaper\"\noutput = \"o.png\"\ninputs = [\"x.csv\"]\nworkers = 2\n{extra}"
        ))
        .unwrap()
    }

    #[test]
    fn test_standard_catalogue_by_default() {
        let context = AnalysisContext::new(&config("")).unwrap();
        let catalogue = context.catalogue().unwrap();
        assert_eq!(catalogue.candidates().len(), 6);
        assert_eq!(context.install(rayon::current_num_threads), 2);
    }

    #[test]
    fn test_missing_catalogue_is_unavailable() {
        let context = AnalysisContext::new(&config("catalogue = \"/nonexistent/shapers.toml\"\n")).unwrap();
        assert!(matches!(
            context.catalogue(),
            Err(AnalysisError::CatalogueUnavailable(_))
        ));
    }

    #[test]
    fn test_partial_catalogue_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapers.toml");
        std::fs::write(&path, "[[shaper]]\nname = \"zv\"\n\n[[shaper]]\nname = \"unknown\"\n").unwrap();

        let context = AnalysisContext::new(&config(&format!("catalogue = {:?}\n", path))).unwrap();
        assert_eq!(context.catalogue().unwrap().candidates().len(), 1);
        assert_eq!(context.catalogue_warnings().len(), 1);
        assert_eq!(context.catalogue_warnings()[0].kind, WarningKind::CatalogueEntry);
    }
}
