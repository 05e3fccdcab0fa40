//! I/O for rasters (GeoTIFF) and vector layers (GeoJSON)

mod geojson;
mod native;

pub use geojson::{ensure_vector_path, to_geojson, write_geojson};
pub use native::{
    ensure_extension, ensure_raster_path, read_geotiff, read_geotiff_with_type, write_geotiff,
    GeoTiffOptions,
};
