//! Raster to vector conversion
//!
//! - Polygonize: trace regions of equal value into attributed polygons

mod polygonize;

pub use polygonize::{polygonize, Connectivity, PolygonizeParams};
