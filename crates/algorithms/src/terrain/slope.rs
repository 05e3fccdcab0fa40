//! Slope calculation from DEMs
//!
//! Gradient from a 3x3 neighbourhood, with either Horn's (1981) weighted
//! differences or Zevenbergen & Thorne's (1987) central differences.

use crate::maybe_rayon::*;
use ndarray::Array2;
use slopeclass_core::raster::Raster;
use slopeclass_core::{Algorithm, Error, Result};

/// Units for slope output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeUnits {
    /// Degrees (0-90)
    #[default]
    Degrees,
    /// Percent rise, 100 * tan(slope); unbounded
    Percent,
}

/// Finite difference scheme for the surface gradient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeMethod {
    /// Weighted differences over all eight neighbours
    #[default]
    Horn,
    /// Central differences over the four direct neighbours
    ZevenbergenThorne,
}

/// Parameters for slope calculation
#[derive(Debug, Clone)]
pub struct SlopeParams {
    /// Output units
    pub units: SlopeUnits,
    /// Ratio of horizontal to vertical units (use ~111120 for lat/lon DEMs
    /// with metre elevations)
    pub scale: f64,
    /// Compute border cells by substituting the centre value for missing
    /// neighbours; otherwise borders and cells next to no-data are NaN
    pub compute_edges: bool,
    pub method: SlopeMethod,
}

impl Default for SlopeParams {
    fn default() -> Self {
        Self {
            units: SlopeUnits::Degrees,
            scale: 1.0,
            compute_edges: false,
            method: SlopeMethod::Horn,
        }
    }
}

/// Slope algorithm
#[derive(Debug, Clone, Default)]
pub struct Slope;

impl Algorithm for Slope {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = SlopeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Slope"
    }

    fn description(&self) -> &'static str {
        "Calculate slope (rate of change of elevation) from a DEM"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        slope(&input, params)
    }
}

/// Calculate slope from a DEM
///
/// With the neighbourhood
/// ```text
/// a b c
/// d e f
/// g h i
/// ```
/// Horn:
/// dz/dx = ((c + 2f + i) - (a + 2d + g)) / (8 * ew_res)
/// dz/dy = ((g + 2h + i) - (a + 2b + c)) / (8 * ns_res)
///
/// Zevenbergen-Thorne:
/// dz/dx = (f - d) / (2 * ew_res)
/// dz/dy = (h - b) / (2 * ns_res)
///
/// where the resolutions are the cell sizes multiplied by `scale`.
pub fn slope(dem: &Raster<f64>, params: SlopeParams) -> Result<Raster<f64>> {
    if !(params.scale.is_finite() && params.scale > 0.0) {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: params.scale.to_string(),
            reason: "must be a positive number".into(),
        });
    }

    let (rows, cols) = dem.shape();
    let ew_res = dem.transform().cell_size() * params.scale;
    let ns_res = dem.transform().cell_size_y() * params.scale;
    let nodata = dem.nodata();
    let is_missing = |v: f64| v.is_nan() || nodata.is_some_and(|nd| (v - nd).abs() < f64::EPSILON);

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];

            for col in 0..cols {
                let e = unsafe { dem.get_unchecked(row, col) };
                if is_missing(e) {
                    continue;
                }

                // Neighbour at offset (dr, dc); None when outside or no-data
                let at = |dr: isize, dc: isize| -> Option<f64> {
                    let r = row as isize + dr;
                    let c = col as isize + dc;
                    if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                        return None;
                    }
                    let v = unsafe { dem.get_unchecked(r as usize, c as usize) };
                    (!is_missing(v)).then_some(v)
                };

                let mut window = [0.0; 9];
                let mut complete = true;
                for (k, w) in window.iter_mut().enumerate() {
                    let dr = (k / 3) as isize - 1;
                    let dc = (k % 3) as isize - 1;
                    match at(dr, dc) {
                        Some(v) => *w = v,
                        None => {
                            complete = false;
                            *w = e;
                        }
                    }
                }
                if !complete && !params.compute_edges {
                    continue;
                }

                let [a, b, c, d, _, f, g, h, i] = window;
                let (dz_dx, dz_dy) = match params.method {
                    SlopeMethod::Horn => (
                        ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / (8.0 * ew_res),
                        ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / (8.0 * ns_res),
                    ),
                    SlopeMethod::ZevenbergenThorne => {
                        ((f - d) / (2.0 * ew_res), (h - b) / (2.0 * ns_res))
                    }
                };

                let gradient = (dz_dx * dz_dx + dz_dy * dz_dy).sqrt();
                row_data[col] = match params.units {
                    SlopeUnits::Degrees => gradient.atan().to_degrees(),
                    SlopeUnits::Percent => gradient * 100.0,
                };
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
