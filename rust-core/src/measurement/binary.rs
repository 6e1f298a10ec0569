//! Compressed binary measurement container
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────────
//! 0x00     6       [u8; 6]     Magic: "STMEAS"
//! 0x06     2       u16 LE      Version (1)
//! 0x08     1       u8          Axis mask (bit 0 = X, bit 1 = Y, bit 2 = Z)
//! 0x09     3       [u8; 3]     Reserved
//! 0x0C     4       u32 LE      L: metadata length
//! 0x10     L       UTF-8       Metadata (JSON object)
//! 0x10+L   8       u64 LE      Declared compressed payload size (advisory)
//! 0x18+L   ...     zstd        Payload frame, optionally followed by padding
//! ─────────────────────────────────────────────────
//! ```
//!
//! The decompressed payload is a u64 LE record count followed by that many
//! 32-byte records of four f64 LE values (t, x, y, z). Bytes after the last
//! record are padding and ignored.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{Axis, AxisSeries, MeasurementFile, MeasurementFormat, MeasurementMetadata};
use crate::error::DecodeError;

/// Magic bytes identifying a binary measurement container
pub const MAGIC: [u8; 6] = *b"STMEAS";

/// Current container version
pub const FORMAT_VERSION: u16 = 1;

/// Fixed header size before the metadata block
pub const HEADER_SIZE: usize = 16;

/// Size of one (t, x, y, z) record
pub const RECORD_SIZE: usize = 32;

/// Decompression chunk size
const DECODE_CHUNK: usize = 64 * 1024;

const ZSTD_LEVEL: i32 = 3;

/// Resource bounds applied while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeLimits {
    /// Hard upper bound on the decompressed payload size in bytes
    pub max_payload_bytes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Parsed fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub axis_mask: u8,
    pub metadata_len: u32,
}

impl ContainerHeader {
    /// Parse the fixed header from the start of a file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            let found = bytes.iter().take(MAGIC.len()).copied().collect();
            return Err(DecodeError::InvalidMagic(found));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                section: "header",
                expected: HEADER_SIZE,
                found: bytes.len(),
            });
        }

        let version = u16::from_le_bytes([bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let axis_mask = bytes[8];
        if axis_mask == 0 || axis_mask & !0b111 != 0 {
            return Err(DecodeError::Metadata(format!("invalid axis mask {axis_mask:#05b}")));
        }

        let metadata_len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        Ok(Self {
            version,
            axis_mask,
            metadata_len,
        })
    }

    /// Axes flagged as recorded
    pub fn axes(&self) -> Vec<Axis> {
        Axis::ALL
            .into_iter()
            .filter(|a| self.axis_mask & a.mask_bit() != 0)
            .collect()
    }
}

/// Check whether a byte buffer starts like a binary container
pub fn has_magic(bytes: &[u8]) -> bool {
    bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] == MAGIC
}

/// Decode a binary container already loaded in memory
pub fn decode_binary(
    bytes: &[u8],
    source: &Path,
    limits: &DecodeLimits,
) -> Result<MeasurementFile, DecodeError> {
    let header = ContainerHeader::from_bytes(bytes)?;

    let meta_end = HEADER_SIZE + header.metadata_len as usize;
    let size_end = meta_end + 8;
    if bytes.len() < size_end {
        return Err(DecodeError::Truncated {
            section: "metadata",
            expected: size_end,
            found: bytes.len(),
        });
    }

    let metadata = parse_metadata(&bytes[HEADER_SIZE..meta_end])?;

    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&bytes[meta_end..size_end]);
    let declared = u64::from_le_bytes(size_bytes);

    let compressed = &bytes[size_end..];
    let payload = decompress_bounded(compressed, limits.max_payload_bytes)?;
    let records = parse_records(&payload)?;

    let axes = header.axes();
    let timestamps: Vec<f64> = records.iter().map(|r| r[0]).collect();
    let mut series = Vec::with_capacity(axes.len());
    for axis in &axes {
        let values = records.iter().map(|r| r[axis.index() + 1]).collect();
        series.push(AxisSeries::new(*axis, timestamps.clone(), values)?);
    }

    let mut file = MeasurementFile::new(
        source.to_path_buf(),
        MeasurementFormat::Binary,
        metadata,
        series,
    );

    if declared != compressed.len() as u64 {
        let note = format!(
            "declared compressed size {} differs from the {} bytes present",
            declared,
            compressed.len()
        );
        log::debug!("{}: {}", source.display(), note);
        file.push_note(note);
    }

    Ok(file)
}

/// Decompress a single zstd frame in fixed-size chunks, refusing to grow past `limit`
fn decompress_bounded(compressed: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = zstd::stream::read::Decoder::new(compressed)
        .map_err(|e| DecodeError::Compression(e.to_string()))?
        .single_frame();

    let mut payload = Vec::new();
    let mut chunk = vec![0u8; DECODE_CHUNK];

    loop {
        let n = decoder
            .read(&mut chunk)
            .map_err(|e| DecodeError::Compression(e.to_string()))?;
        if n == 0 {
            break;
        }
        if payload.len() + n > limit {
            return Err(DecodeError::PayloadTooLarge { limit });
        }
        payload.extend_from_slice(&chunk[..n]);
    }

    Ok(payload)
}

fn parse_records(payload: &[u8]) -> Result<Vec<[f64; 4]>, DecodeError> {
    if payload.len() < 8 {
        return Err(DecodeError::Truncated {
            section: "record count",
            expected: 8,
            found: payload.len(),
        });
    }

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&payload[..8]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let expected = count
        .checked_mul(RECORD_SIZE)
        .and_then(|n| n.checked_add(8))
        .ok_or_else(|| DecodeError::Metadata(format!("record count {count} overflows")))?;
    if payload.len() < expected {
        return Err(DecodeError::Truncated {
            section: "records",
            expected,
            found: payload.len(),
        });
    }

    let records = payload[8..expected]
        .chunks_exact(RECORD_SIZE)
        .map(|rec| {
            let mut out = [0.0; 4];
            for (i, field) in rec.chunks_exact(8).enumerate() {
                let mut b = [0u8; 8];
                b.copy_from_slice(field);
                out[i] = f64::from_le_bytes(b);
            }
            out
        })
        .collect();

    Ok(records)
}

fn parse_metadata(block: &[u8]) -> Result<MeasurementMetadata, DecodeError> {
    if block.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(MeasurementMetadata::default());
    }

    let text = std::str::from_utf8(block).map_err(|e| DecodeError::Metadata(e.to_string()))?;
    let root: Value = serde_json::from_str(text).map_err(|e| DecodeError::Metadata(e.to_string()))?;
    let obj = root
        .as_object()
        .ok_or_else(|| DecodeError::Metadata("expected a JSON object".to_string()))?;

    let mut meta = MeasurementMetadata::default();
    for (key, value) in obj {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        match key.as_str() {
            "name" => meta.name = value.as_str().map(str::to_string),
            "accel" if number.is_some() => meta.accel = number,
            "duration" if number.is_some() => meta.duration = number,
            "frequency" | "freq" if number.is_some() => meta.frequency = number,
            "accel_per_hz" if number.is_some() => meta.accel_per_hz = number,
            "speed" if number.is_some() => meta.speed = number,
            "angle" if number.is_some() => meta.angle = number,
            _ => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                meta.extra.insert(key.clone(), text);
            }
        }
    }

    Ok(meta)
}

fn metadata_to_json(meta: &MeasurementMetadata) -> Value {
    let mut obj = Map::new();
    if let Some(name) = &meta.name {
        obj.insert("name".into(), Value::String(name.clone()));
    }

    let numeric = [
        ("accel", meta.accel),
        ("duration", meta.duration),
        ("frequency", meta.frequency),
        ("accel_per_hz", meta.accel_per_hz),
        ("speed", meta.speed),
        ("angle", meta.angle),
    ];
    for (key, value) in numeric {
        if let Some(n) = value.and_then(serde_json::Number::from_f64) {
            obj.insert(key.into(), Value::Number(n));
        }
    }

    for (key, value) in &meta.extra {
        obj.insert(key.clone(), Value::String(value.clone()));
    }

    Value::Object(obj)
}

/// Encode (t, x, y, z) records into a binary container
pub fn encode_measurement(
    records: &[[f64; 4]],
    axes: &[Axis],
    metadata: &MeasurementMetadata,
) -> Result<Vec<u8>, DecodeError> {
    let axis_mask = axes.iter().fold(0u8, |mask, a| mask | a.mask_bit());
    if axis_mask == 0 {
        return Err(DecodeError::Metadata("no axis recorded".to_string()));
    }

    let meta_bytes = metadata_to_json(metadata).to_string().into_bytes();

    let mut payload = Vec::with_capacity(8 + records.len() * RECORD_SIZE);
    payload.extend_from_slice(&(records.len() as u64).to_le_bytes());
    for rec in records {
        for value in rec {
            payload.extend_from_slice(&value.to_le_bytes());
        }
    }

    let compressed = {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)
            .map_err(|e| DecodeError::Compression(e.to_string()))?;
        encoder
            .include_checksum(true)
            .map_err(|e| DecodeError::Compression(e.to_string()))?;
        encoder
            .write_all(&payload)
            .map_err(|e| DecodeError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| DecodeError::Compression(e.to_string()))?
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + meta_bytes.len() + 8 + compressed.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(axis_mask);
    out.extend_from_slice(&[0u8; 3]);
    out.extend_from_slice(&(meta_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta_bytes);
    out.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
    out.extend_from_slice(&compressed);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records(n: usize) -> Vec<[f64; 4]> {
        (0..n)
            .map(|i| {
                let t = i as f64 / 1000.0;
                [t, (t * 7.0).sin(), (t * 3.0).cos(), 9.81]
            })
            .collect()
    }

    fn sample_metadata() -> MeasurementMetadata {
        MeasurementMetadata {
            name: Some("static_x".to_string()),
            accel: Some(3000.0),
            frequency: Some(42.5),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_encoded_container() {
        let records = sample_records(500);
        let bytes = encode_measurement(&records, &Axis::ALL, &sample_metadata()).unwrap();

        let file = decode_binary(&bytes, Path::new("x.stdata"), &DecodeLimits::default()).unwrap();

        assert_eq!(file.name(), "static_x");
        assert_eq!(file.axes(), vec![Axis::X, Axis::Y, Axis::Z]);
        assert_eq!(file.sample_count(), 500);
        assert_eq!(file.metadata().accel, Some(3000.0));
        assert_eq!(file.metadata().frequency, Some(42.5));
        assert_eq!(file.axis_series(Axis::Y).unwrap().values()[10], records[10][2]);
        assert!(file.notes().is_empty());
    }

    #[test]
    fn test_decode_is_idempotent() {
        let bytes = encode_measurement(&sample_records(300), &Axis::ALL, &sample_metadata()).unwrap();
        let limits = DecodeLimits::default();

        let a = decode_binary(&bytes, Path::new("a.stdata"), &limits).unwrap();
        let b = decode_binary(&bytes, Path::new("a.stdata"), &limits).unwrap();

        for (sa, sb) in a.series().iter().zip(b.series()) {
            let bits_a: Vec<u64> = sa.values().iter().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u64> = sb.values().iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits_a, bits_b);
            assert_eq!(sa.timestamps(), sb.timestamps());
        }
    }

    #[test]
    fn test_trailing_padding_is_ignored() {
        let mut bytes = encode_measurement(&sample_records(64), &Axis::ALL, &sample_metadata()).unwrap();
        bytes.extend_from_slice(&[0u8; 37]);

        let file = decode_binary(&bytes, Path::new("p.stdata"), &DecodeLimits::default()).unwrap();

        assert_eq!(file.sample_count(), 64);
        assert_eq!(file.notes().len(), 1);
    }

    #[test]
    fn test_partial_axis_mask() {
        let bytes = encode_measurement(&sample_records(50), &[Axis::Z], &MeasurementMetadata::default()).unwrap();
        let file = decode_binary(&bytes, Path::new("z.stdata"), &DecodeLimits::default()).unwrap();

        assert_eq!(file.axes(), vec![Axis::Z]);
        assert_eq!(file.name(), "z");
    }

    #[test]
    fn test_invalid_magic() {
        let result = decode_binary(b"NOTAFILE-------------", Path::new("bad"), &DecodeLimits::default());
        assert!(matches!(result, Err(DecodeError::InvalidMagic(_))));
    }

    #[test]
    fn test_corrupted_payload() {
        let mut bytes = encode_measurement(&sample_records(200), &Axis::ALL, &sample_metadata()).unwrap();
        let len = bytes.len();
        for b in &mut bytes[len - 40..len - 8] {
            *b ^= 0x5a;
        }

        let result = decode_binary(&bytes, Path::new("c.stdata"), &DecodeLimits::default());
        assert!(matches!(result, Err(DecodeError::Compression(_))));
    }

    #[test]
    fn test_payload_limit() {
        let bytes = encode_measurement(&sample_records(4096), &Axis::ALL, &sample_metadata()).unwrap();
        let limits = DecodeLimits {
            max_payload_bytes: 1024,
        };

        let result = decode_binary(&bytes, Path::new("big.stdata"), &limits);
        assert!(matches!(result, Err(DecodeError::PayloadTooLarge { limit: 1024 })));
    }

    #[test]
    fn test_truncated_records() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&10u64.to_le_bytes());
        payload.extend_from_slice(&[0u8; RECORD_SIZE * 3]);

        let result = parse_records(&payload);
        assert!(matches!(result, Err(DecodeError::Truncated { section: "records", .. })));
    }

    #[test]
    fn test_metadata_numeric_strings_and_extras() {
        let meta = parse_metadata(br#"{"accel": "2500", "kinematics": "corexy", "bed_mesh": 3}"#).unwrap();

        assert_eq!(meta.accel, Some(2500.0));
        assert_eq!(meta.extra.get("kinematics").map(String::as_str), Some("corexy"));
        assert_eq!(meta.extra.get("bed_mesh").map(String::as_str), Some("3"));
    }
}
