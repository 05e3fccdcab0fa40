//! Geoprocessor backed by the slopeclass processing library

use crate::processor::{
    CalculatorRequest, Geoprocessor, MosaicRequest, PolygonizeRequest, ResampleRequest,
    SlopeRequest,
};
use slopeclass_algorithms::calculator::{raster_calculator, CalculatorParams, Formula};
use slopeclass_algorithms::grid::{mosaic, resample, MosaicParams, ResampleParams};
use slopeclass_algorithms::terrain::{slope, SlopeMethod, SlopeParams, SlopeUnits};
use slopeclass_algorithms::vector::{polygonize, Connectivity, PolygonizeParams};
use slopeclass_core::io::{
    ensure_raster_path, ensure_vector_path, read_geotiff, read_geotiff_with_type, write_geojson,
    write_geotiff, GeoTiffOptions,
};
use slopeclass_core::raster::{DataType, Raster};
use slopeclass_core::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runs every operation in-process on GeoTIFF/GeoJSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProcessor;

impl NativeProcessor {
    pub fn new() -> Self {
        Self
    }
}

fn read_rasters(paths: &[PathBuf]) -> Result<Vec<Raster<f64>>> {
    paths
        .iter()
        .map(|p| {
            ensure_raster_path(p)?;
            read_geotiff(p, None)
        })
        .collect()
}

fn store(raster: &Raster<f64>, path: &Path, data_type: DataType) -> Result<PathBuf> {
    write_geotiff(raster, path, Some(GeoTiffOptions::with_data_type(data_type)))?;
    debug!(
        "Wrote {}x{} {} grid to {}",
        raster.cols(),
        raster.rows(),
        data_type,
        path.display()
    );
    Ok(path.to_path_buf())
}

impl Geoprocessor for NativeProcessor {
    fn mosaic(&self, request: &MosaicRequest) -> Result<PathBuf> {
        ensure_raster_path(&request.output)?;
        let tiles = read_rasters(&request.grids)?;
        let refs: Vec<&Raster<f64>> = tiles.iter().collect();

        let params = MosaicParams {
            resampling: request.resampling,
            overlap: request.overlap,
            blend_distance: request.blend_distance,
            matching: request.matching,
            cell_size: request.cell_size,
            fit: request.fit,
        };
        let mosaicked = mosaic(&refs, &params)?;
        store(&mosaicked, &request.output, request.data_type)
    }

    fn resample(&self, request: &ResampleRequest) -> Result<PathBuf> {
        ensure_raster_path(&request.input)?;
        ensure_raster_path(&request.output)?;
        let (input, stored_as) = read_geotiff_with_type::<f64, _>(&request.input, None)?;

        let params = ResampleParams {
            cell_size: request.cell_size,
            scale_up: request.scale_up,
            scale_down: request.scale_down,
            fit: request.fit,
        };
        let resampled = resample(&input, &params)?;

        let data_type = if request.keep_type {
            stored_as
        } else {
            DataType::Float32
        };
        store(&resampled, &request.output, data_type)
    }

    fn slope(&self, request: &SlopeRequest) -> Result<PathBuf> {
        ensure_raster_path(&request.input)?;
        ensure_raster_path(&request.output)?;
        let dem: Raster<f64> = read_geotiff(&request.input, Some(request.band))?;

        let params = SlopeParams {
            units: if request.as_percent {
                SlopeUnits::Percent
            } else {
                SlopeUnits::Degrees
            },
            scale: request.scale,
            compute_edges: request.compute_edges,
            method: if request.zevenbergen {
                SlopeMethod::ZevenbergenThorne
            } else {
                SlopeMethod::Horn
            },
        };
        let result = slope(&dem, params)?;
        store(&result, &request.output, DataType::Float32)
    }

    fn raster_calculator(&self, request: &CalculatorRequest) -> Result<PathBuf> {
        ensure_raster_path(&request.output)?;
        let formula = Formula::parse(&request.formula)?;
        let grids = read_rasters(&request.grids)?;
        let refs: Vec<&Raster<f64>> = grids.iter().collect();

        let params = CalculatorParams {
            interpolation: request.interpolation,
            use_nodata: request.use_nodata,
        };
        let result = raster_calculator(&refs, &formula, &params)?;
        store(&result, &request.output, request.data_type)
    }

    fn polygonize(&self, request: &PolygonizeRequest) -> Result<PathBuf> {
        ensure_raster_path(&request.input)?;
        ensure_vector_path(&request.output)?;
        let raster: Raster<f64> = read_geotiff(&request.input, Some(request.band))?;

        let params = PolygonizeParams {
            field: request.field.clone(),
            connectivity: if request.eight_connectedness {
                Connectivity::Eight
            } else {
                Connectivity::Four
            },
        };
        let features = polygonize(&raster, &params)?;
        write_geojson(&features, &request.output)?;
        debug!(
            "Wrote {} polygon feature(s) to {}",
            features.len(),
            request.output.display()
        );
        Ok(request.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slopeclass_algorithms::grid::{GridFit, Interpolation};
    use slopeclass_core::{Error, GeoTransform};

    fn write_dem(path: &Path, data_type: DataType) {
        let mut dem = Raster::new(6, 6);
        dem.set_transform(GeoTransform::north_up(0.0, 6.0, 1.0));
        for r in 0..6 {
            for c in 0..6 {
                dem.set(r, c, (r * 6 + c) as f64).unwrap();
            }
        }
        write_geotiff(&dem, path, Some(GeoTiffOptions::with_data_type(data_type))).unwrap();
    }

    #[test]
    fn test_resample_keeps_stored_type() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dem.tif");
        write_dem(&input, DataType::Int16);

        let request = ResampleRequest {
            input: input.clone(),
            keep_type: true,
            scale_up: Interpolation::BSpline,
            scale_down: Interpolation::BSpline,
            cell_size: 2.0,
            fit: GridFit::Cells,
            output: dir.path().join("coarse.tif"),
        };
        let written = NativeProcessor.resample(&request).unwrap();

        let (raster, data_type) = read_geotiff_with_type::<f64, _>(&written, None).unwrap();
        assert_eq!(data_type, DataType::Int16);
        assert_eq!(raster.shape(), (3, 3));
    }

    #[test]
    fn test_output_formats_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dem.tif");
        write_dem(&input, DataType::Float32);

        let request = SlopeRequest {
            input: input.clone(),
            band: 1,
            scale: 1.0,
            as_percent: true,
            compute_edges: false,
            zevenbergen: false,
            output: dir.path().join("slope.png"),
        };
        assert!(matches!(
            NativeProcessor.slope(&request),
            Err(Error::UnsupportedFormat { .. })
        ));

        let request = PolygonizeRequest {
            input,
            band: 1,
            field: "class".into(),
            eight_connectedness: false,
            output: dir.path().join("classes.tif"),
        };
        assert!(NativeProcessor.polygonize(&request).is_err());
    }

    #[test]
    fn test_missing_band_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("dem.tif");
        write_dem(&input, DataType::Float32);

        let request = SlopeRequest {
            input,
            band: 2,
            scale: 1.0,
            as_percent: true,
            compute_edges: false,
            zevenbergen: false,
            output: dir.path().join("slope.tif"),
        };
        assert!(matches!(
            NativeProcessor.slope(&request),
            Err(Error::BandOutOfRange { band: 2, available: 1 })
        ));
    }
}
