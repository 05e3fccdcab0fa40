//! Storage precision of raster cells on disk

use serde::{Deserialize, Serialize};
use std::fmt;

/// On-disk cell type of a raster.
///
/// Rasters are processed in memory as `f64`; the data type decides how the
/// values are stored when the raster is written, and is what "keep type"
/// resampling preserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    UInt8,
    UInt16,
    Int16,
    Int32,
    /// 4-byte floating point
    #[default]
    Float32,
    /// 8-byte floating point
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::UInt8,
        DataType::UInt16,
        DataType::Int16,
        DataType::Int32,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Parse a name as written by [`DataType::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Quantize a value to what this type can hold.
    ///
    /// Integer types round to nearest and saturate at their range; NaN stays NaN
    /// so callers can substitute their nodata value.
    pub fn quantize(&self, value: f64) -> f64 {
        if value.is_nan() {
            return value;
        }
        match self {
            DataType::UInt8 => value.round().clamp(u8::MIN as f64, u8::MAX as f64),
            DataType::UInt16 => value.round().clamp(u16::MIN as f64, u16::MAX as f64),
            DataType::Int16 => value.round().clamp(i16::MIN as f64, i16::MAX as f64),
            DataType::Int32 => value.round().clamp(i32::MIN as f64, i32::MAX as f64),
            DataType::Float32 => value as f32 as f64,
            DataType::Float64 => value,
        }
    }

    /// Short lowercase name, matching the serialized form
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_integer_types() {
        assert_eq!(DataType::UInt8.quantize(300.4), 255.0);
        assert_eq!(DataType::UInt8.quantize(-3.0), 0.0);
        assert_eq!(DataType::Int16.quantize(12.6), 13.0);
        assert!(DataType::Int32.quantize(f64::NAN).is_nan());
    }

    #[test]
    fn test_quantize_float32_loses_precision() {
        let v = 0.1_f64;
        assert_ne!(DataType::Float32.quantize(v), v);
        assert_eq!(DataType::Float64.quantize(v), v);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&DataType::Float32).unwrap();
        assert_eq!(json, "\"float32\"");
        let back: DataType = serde_json::from_str("\"int16\"").unwrap();
        assert_eq!(back, DataType::Int16);
        assert_eq!(DataType::from_name("Float64"), Some(DataType::Float64));
        assert_eq!(DataType::from_name("f4"), None);
    }
}
