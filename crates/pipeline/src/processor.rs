//! The processing backend seen by the orchestrator

use slopeclass_algorithms::grid::{GridFit, Interpolation, MatchMode, OverlapMode};
use slopeclass_core::raster::DataType;
use slopeclass_core::Result;
use std::path::PathBuf;

/// Mosaic several grids into one
#[derive(Debug, Clone)]
pub struct MosaicRequest {
    pub grids: Vec<PathBuf>,
    pub data_type: DataType,
    pub resampling: Interpolation,
    pub overlap: OverlapMode,
    pub blend_distance: f64,
    pub matching: MatchMode,
    pub cell_size: f64,
    pub fit: GridFit,
    pub output: PathBuf,
}

/// Resample a grid to a new cell size
#[derive(Debug, Clone)]
pub struct ResampleRequest {
    pub input: PathBuf,
    /// Store the output with the input's data type instead of 4-byte float
    pub keep_type: bool,
    pub scale_up: Interpolation,
    pub scale_down: Interpolation,
    pub cell_size: f64,
    pub fit: GridFit,
    pub output: PathBuf,
}

/// Slope of one band of a DEM
#[derive(Debug, Clone)]
pub struct SlopeRequest {
    pub input: PathBuf,
    /// 1-indexed
    pub band: usize,
    /// Ratio of horizontal to vertical units
    pub scale: f64,
    pub as_percent: bool,
    pub compute_edges: bool,
    /// Zevenbergen-Thorne instead of Horn
    pub zevenbergen: bool,
    pub output: PathBuf,
}

/// Evaluate a formula over one or more grids
#[derive(Debug, Clone)]
pub struct CalculatorRequest {
    /// Bound to `a`, `b`, ... in order
    pub grids: Vec<PathBuf>,
    pub formula: String,
    pub interpolation: Interpolation,
    pub use_nodata: bool,
    pub data_type: DataType,
    pub output: PathBuf,
}

/// Trace regions of one band into polygons
#[derive(Debug, Clone)]
pub struct PolygonizeRequest {
    pub input: PathBuf,
    /// 1-indexed
    pub band: usize,
    pub field: String,
    pub eight_connectedness: bool,
    pub output: PathBuf,
}

/// Geoprocessing operations used by the pipeline.
///
/// Every operation writes its result to the request's output path and
/// returns the path actually written.
pub trait Geoprocessor {
    fn mosaic(&self, request: &MosaicRequest) -> Result<PathBuf>;

    fn resample(&self, request: &ResampleRequest) -> Result<PathBuf>;

    fn slope(&self, request: &SlopeRequest) -> Result<PathBuf>;

    fn raster_calculator(&self, request: &CalculatorRequest) -> Result<PathBuf>;

    fn polygonize(&self, request: &PolygonizeRequest) -> Result<PathBuf>;
}
