//! # slopeclass algorithms
//!
//! Raster processing operations used by the slope classification pipeline.
//!
//! ## Categories
//!
//! - **grid**: interpolation kernels, target grid fitting, resampling, mosaicking
//! - **terrain**: slope (Horn or Zevenbergen-Thorne)
//! - **calculator**: formula-driven raster calculator
//! - **vector**: raster to polygon conversion

pub mod calculator;
pub mod grid;
pub mod terrain;
pub mod vector;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::calculator::{raster_calculator, CalculatorParams, Formula};
    pub use crate::grid::{
        mosaic, resample, GridFit, Interpolation, MatchMode, MosaicParams, OverlapMode,
        ResampleParams,
    };
    pub use crate::terrain::{slope, Slope, SlopeMethod, SlopeParams, SlopeUnits};
    pub use crate::vector::{polygonize, Connectivity, PolygonizeParams};
    pub use slopeclass_core::prelude::*;
}
