//! Measurement decoding: binary containers and legacy text

pub mod model;
pub mod binary;
pub mod legacy;
pub mod decoder;

pub use model::{Axis, AxisSeries, MeasurementFile, MeasurementFormat, MeasurementMetadata, RawSample};
pub use binary::{DecodeLimits, encode_measurement};
pub use decoder::MeasurementDecoder;
