//! Legacy delimited text measurements
//!
//! Header row naming the columns (`#time,accel_x,accel_y,accel_z` as written
//! by Klipper), followed by one numeric row per sample. Malformed rows are
//! skipped and counted instead of failing the whole file.

use std::io::Read;
use std::path::Path;

use super::model::{Axis, AxisSeries, MeasurementFile, MeasurementFormat, MeasurementMetadata};
use crate::error::DecodeError;

/// Column positions resolved from the header row
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMap {
    time: usize,
    axes: Vec<(Axis, usize)>,
}

fn column_role(name: &str) -> Option<Option<Axis>> {
    let name = name.trim().trim_start_matches('#').trim().to_ascii_lowercase();
    match name.as_str() {
        "time" | "t" | "timestamp" => Some(None),
        "accel_x" | "x" | "ax" => Some(Some(Axis::X)),
        "accel_y" | "y" | "ay" => Some(Some(Axis::Y)),
        "accel_z" | "z" | "az" => Some(Some(Axis::Z)),
        _ => None,
    }
}

fn resolve_columns(headers: &csv::StringRecord) -> Result<ColumnMap, DecodeError> {
    let mut time = None;
    let mut axes: Vec<(Axis, usize)> = Vec::new();

    for (idx, name) in headers.iter().enumerate() {
        match column_role(name) {
            Some(None) if time.is_none() => time = Some(idx),
            Some(Some(axis)) if !axes.iter().any(|(a, _)| *a == axis) => axes.push((axis, idx)),
            _ => {}
        }
    }

    let time = time.ok_or_else(|| DecodeError::MissingColumn("time".to_string()))?;
    if axes.is_empty() {
        return Err(DecodeError::MissingColumn("accel_x|accel_y|accel_z".to_string()));
    }
    axes.sort_by_key(|(axis, _)| *axis);

    Ok(ColumnMap { time, axes })
}

fn parse_field(record: &csv::StringRecord, idx: usize) -> Option<f64> {
    record
        .get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Decode legacy text from any reader
pub fn decode_legacy<R: Read>(reader: R, source: &Path) -> Result<MeasurementFile, DecodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| DecodeError::MissingColumn(format!("unreadable header row: {e}")))?
        .clone();
    let columns = resolve_columns(&headers)?;

    let mut timestamps = Vec::new();
    let mut values: Vec<Vec<f64>> = vec![Vec::new(); columns.axes.len()];
    let mut skipped = 0usize;

    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                if let csv::ErrorKind::Io(_) = e.kind() {
                    return Err(DecodeError::Io {
                        path: source.to_path_buf(),
                        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                    });
                }
                skipped += 1;
                continue;
            }
        };

        let Some(t) = parse_field(&record, columns.time) else {
            skipped += 1;
            continue;
        };
        if timestamps.last().is_some_and(|&last| t < last) {
            skipped += 1;
            continue;
        }

        let row: Option<Vec<f64>> = columns
            .axes
            .iter()
            .map(|(_, idx)| parse_field(&record, *idx))
            .collect();

        match row {
            Some(row) => {
                timestamps.push(t);
                for (column, v) in values.iter_mut().zip(row) {
                    column.push(v);
                }
            }
            None => skipped += 1,
        }
    }

    if timestamps.is_empty() {
        return Err(DecodeError::NoValidRows { skipped });
    }

    if skipped > 0 {
        log::warn!(
            "{}: skipped {} malformed row(s), kept {}",
            source.display(),
            skipped,
            timestamps.len()
        );
    }

    let series = columns
        .axes
        .iter()
        .zip(values)
        .map(|((axis, _), column)| AxisSeries::new(*axis, timestamps.clone(), column))
        .collect::<Result<Vec<_>, _>>()?;

    let file = MeasurementFile::new(
        source.to_path_buf(),
        MeasurementFormat::Legacy,
        MeasurementMetadata::default(),
        series,
    );

    Ok(file.with_skipped_rows(skipped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    fn csv_with_rows(rows: usize, corrupted: &[usize]) -> String {
        let mut text = String::from("#time,accel_x,accel_y,accel_z\n");
        for i in 0..rows {
            let t = i as f64 * 0.001;
            if corrupted.contains(&i) {
                match i % 3 {
                    0 => writeln!(text, "{t:.6},abc,1.0,2.0").unwrap(),
                    1 => writeln!(text, "{t:.6},1.0").unwrap(),
                    _ => writeln!(text, "nan,1.0,2.0,3.0").unwrap(),
                }
            } else {
                writeln!(text, "{t:.6},{:.3},{:.3},9810.000", i as f64, -(i as f64)).unwrap();
            }
        }
        text
    }

    #[test]
    fn test_corrupted_rows_are_counted() {
        let text = csv_with_rows(100, &[5, 40, 77]);
        let file = decode_legacy(text.as_bytes(), Path::new("raw_data_x.csv")).unwrap();

        assert_eq!(file.skipped_rows(), 3);
        assert_eq!(file.sample_count(), 97);
        assert_eq!(file.axes(), vec![Axis::X, Axis::Y, Axis::Z]);
        assert_eq!(file.format(), MeasurementFormat::Legacy);
    }

    #[test]
    fn test_single_axis_file() {
        let text = "time,accel_z\n0.0,1.0\n0.1,2.0\n0.2,3.0\n";
        let file = decode_legacy(text.as_bytes(), Path::new("z.csv")).unwrap();

        assert_eq!(file.axes(), vec![Axis::Z]);
        assert_eq!(file.axis_series(Axis::Z).unwrap().values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_backwards_rows_are_skipped() {
        let text = "#time,accel_x\n0.0,1.0\n0.2,2.0\n0.1,3.0\n0.3,4.0\n";
        let file = decode_legacy(text.as_bytes(), Path::new("b.csv")).unwrap();

        assert_eq!(file.skipped_rows(), 1);
        assert_eq!(file.axis_series(Axis::X).unwrap().values(), &[1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_missing_time_column() {
        let text = "accel_x,accel_y\n1.0,2.0\n";
        let result = decode_legacy(text.as_bytes(), Path::new("m.csv"));
        assert!(matches!(result, Err(DecodeError::MissingColumn(c)) if c == "time"));
    }

    #[test]
    fn test_zero_valid_rows() {
        let text = "#time,accel_x\nfoo,bar\n,\n";
        let result = decode_legacy(text.as_bytes(), Path::new("e.csv"));
        assert!(matches!(result, Err(DecodeError::NoValidRows { skipped: 2 })));
    }
}
