//! Format dispatch for measurement files

use std::fs::File;
use std::path::Path;

use super::binary::{decode_binary, has_magic, DecodeLimits};
use super::legacy::decode_legacy;
use super::model::{MeasurementFile, MeasurementFormat, MeasurementMetadata};
use crate::error::DecodeError;

/// Start of the note recorded when config values stand in for missing metadata
pub(crate) const METADATA_FALLBACK_NOTE: &str = "metadata fields taken from the configuration";

/// Decodes measurement files of either supported format
#[derive(Debug, Clone, Default)]
pub struct MeasurementDecoder {
    limits: DecodeLimits,
    fallback: MeasurementMetadata,
}

impl MeasurementDecoder {
    /// Create a decoder
    ///
    /// # Arguments
    /// * `limits` - Resource bounds for decompression
    /// * `fallback` - Parameters used when a file does not embed them
    pub fn new(limits: DecodeLimits, fallback: MeasurementMetadata) -> Self {
        Self { limits, fallback }
    }

    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Decode a file, using `format` when given and detection otherwise
    pub fn decode(
        &self,
        path: &Path,
        format: Option<MeasurementFormat>,
    ) -> Result<MeasurementFile, DecodeError> {
        let io_err = |source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = match format.or_else(|| MeasurementFormat::from_path(path)) {
            Some(MeasurementFormat::Binary) => {
                let bytes = std::fs::read(path).map_err(io_err)?;
                decode_binary(&bytes, path, &self.limits)?
            }
            Some(MeasurementFormat::Legacy) => {
                let reader = File::open(path).map_err(io_err)?;
                decode_legacy(reader, path)?
            }
            None => {
                let bytes = std::fs::read(path).map_err(io_err)?;
                if has_magic(&bytes) {
                    decode_binary(&bytes, path, &self.limits)?
                } else if bytes.is_ascii() {
                    decode_legacy(bytes.as_slice(), path)?
                } else {
                    return Err(DecodeError::UnknownFormat(path.to_path_buf()));
                }
            }
        };

        log::debug!(
            "Decoded {} ({:?}): {} samples on axes {:?}",
            path.display(),
            file.format(),
            file.sample_count(),
            file.axes()
        );

        Ok(self.apply_fallback(file))
    }

    fn apply_fallback(&self, mut file: MeasurementFile) -> MeasurementFile {
        let filled = file.fill_metadata(&self.fallback);
        if !filled.is_empty() {
            file.push_note(format!("{METADATA_FALLBACK_NOTE}: {}", filled.join(", ")));
        }
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::binary::encode_measurement;
    use crate::measurement::model::Axis;

    #[test]
    fn test_detects_binary_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("measurement");
        let records: Vec<[f64; 4]> = (0..10).map(|i| [i as f64, 0.0, 0.0, 0.0]).collect();
        let bytes = encode_measurement(&records, &Axis::ALL, &MeasurementMetadata::default()).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let fallback = MeasurementMetadata {
            accel: Some(1500.0),
            ..Default::default()
        };
        let decoder = MeasurementDecoder::new(DecodeLimits::default(), fallback);
        let file = decoder.decode(&path, None).unwrap();

        assert_eq!(file.format(), MeasurementFormat::Binary);
        assert_eq!(file.metadata().accel, Some(1500.0));
        assert_eq!(file.notes().len(), 1);
    }

    #[test]
    fn test_detected_and_forced_formats_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording");
        let records: Vec<[f64; 4]> = (0..10).map(|i| [i as f64 * 0.01, 1.0, 2.0, 3.0]).collect();
        let bytes = encode_measurement(&records, &Axis::ALL, &MeasurementMetadata::default()).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let fallback = MeasurementMetadata {
            name: Some("belt_B".to_string()),
            ..Default::default()
        };
        let decoder = MeasurementDecoder::new(DecodeLimits::default(), fallback);
        let detected = decoder.decode(&path, None).unwrap();
        let forced = decoder.decode(&path, Some(MeasurementFormat::Binary)).unwrap();

        assert_eq!(detected.name(), "belt_B");
        assert_eq!(forced.name(), detected.name());
        assert_eq!(forced.notes(), detected.notes());
        assert_eq!(forced.series(), detected.series());
    }

    #[test]
    fn test_missing_file() {
        let decoder = MeasurementDecoder::default();
        let result = decoder.decode(Path::new("/nonexistent/raw.csv"), None);
        assert!(matches!(result, Err(DecodeError::Io { .. })));
    }
}
