//! Resampling a raster to a new cell size

use crate::grid::{GridFit, Interpolation, TargetGrid};
use crate::maybe_rayon::*;
use ndarray::Array2;
use slopeclass_core::raster::Raster;
use slopeclass_core::{Error, Result};

/// Parameters for resampling
#[derive(Debug, Clone)]
pub struct ResampleParams {
    /// Target cell size in map units
    pub cell_size: f64,
    /// Kernel used when the target is coarser than the input
    pub scale_up: Interpolation,
    /// Kernel used when the target is finer than (or equal to) the input
    pub scale_down: Interpolation,
    pub fit: GridFit,
}

impl Default for ResampleParams {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            scale_up: Interpolation::BSpline,
            scale_down: Interpolation::BSpline,
            fit: GridFit::Cells,
        }
    }
}

/// Resample `raster` onto a grid of `params.cell_size` covering its extent.
///
/// Each output cell centre is mapped back into the input and sampled with the
/// scale-up or scale-down kernel. Output cells without a value are NaN.
pub fn resample(raster: &Raster<f64>, params: &ResampleParams) -> Result<Raster<f64>> {
    if raster.is_empty() {
        return Err(Error::InvalidDimensions { width: 0, height: 0 });
    }

    let grid = TargetGrid::fit(raster.bounds(), params.cell_size, params.fit)?;
    let kernel = if params.cell_size > raster.cell_size() {
        params.scale_up
    } else {
        params.scale_down
    };

    tracing::debug!(
        "Resampling {}x{} @ {} -> {}x{} @ {} ({})",
        raster.cols(),
        raster.rows(),
        raster.cell_size(),
        grid.cols,
        grid.rows,
        params.cell_size,
        kernel.name()
    );

    let (rows, cols) = grid.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let (x, y) = grid.transform.pixel_to_geo(col, row);
                let (src_col, src_row) = raster.geo_to_pixel(x, y);
                if let Some(v) = kernel.sample(raster, src_col, src_row) {
                    *cell = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_transform(grid.transform);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
