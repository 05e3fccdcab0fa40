//! Error types for slopeclass

use thiserror::Error;

/// Main error type for raster and vector operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Input grid #{index} does not overlap any other input grid")]
    NoOverlap { index: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Unsupported format for '{path}': expected {expected}")]
    UnsupportedFormat { path: String, expected: &'static str },

    #[error("Band {band} not available ({available} band(s) in file)")]
    BandOutOfRange { band: usize, available: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Formula error: {0}")]
    Formula(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for slopeclass operations
pub type Result<T> = std::result::Result<T, Error>;
