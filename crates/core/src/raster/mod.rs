//! Raster data structures and operations

mod data_type;
mod element;
mod geotransform;
mod grid;

pub use data_type::DataType;
pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
