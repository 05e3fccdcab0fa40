//! Cell-by-cell evaluation of a formula over one or more grids

use crate::calculator::Formula;
use crate::grid::Interpolation;
use crate::maybe_rayon::*;
use ndarray::Array2;
use slopeclass_core::raster::Raster;
use slopeclass_core::{Error, Result};

/// Parameters for the raster calculator
#[derive(Debug, Clone)]
pub struct CalculatorParams {
    /// Kernel for grids whose grid system differs from the first grid
    pub interpolation: Interpolation,
    /// Pass no-data cells to the formula as NaN instead of skipping the cell
    pub use_nodata: bool,
}

impl Default for CalculatorParams {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::BSpline,
            use_nodata: false,
        }
    }
}

/// Evaluate `formula` for every cell of the first grid.
///
/// The first grid defines the output grid system. Further grids on the same
/// system are read cell by cell; grids on another system are sampled at the
/// output cell centres. Unless `use_nodata` is set, a cell where any
/// referenced grid is no-data is no-data in the output. Non-finite results
/// are no-data (NaN).
pub fn raster_calculator(
    grids: &[&Raster<f64>],
    formula: &Formula,
    params: &CalculatorParams,
) -> Result<Raster<f64>> {
    let first = *grids
        .first()
        .ok_or_else(|| Error::Algorithm("Raster calculator needs at least one grid".into()))?;

    let needed = formula.grid_count();
    if needed > grids.len() {
        return Err(Error::Formula(format!(
            "'{}' references {} grid(s), {} given",
            formula,
            needed,
            grids.len()
        )));
    }
    let used = &grids[..needed];

    let (rows, cols) = first.shape();
    let same_system: Vec<bool> = used
        .iter()
        .map(|g| g.shape() == first.shape() && g.transform() == first.transform())
        .collect();

    tracing::debug!(
        "Evaluating '{}' over {}x{} ({} grid(s), {} resampled)",
        formula,
        cols,
        rows,
        needed,
        same_system.iter().filter(|same| !**same).count()
    );

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values = vec![f64::NAN; needed];

            for (col, out) in row_data.iter_mut().enumerate() {
                let mut missing = false;
                for (k, grid) in used.iter().enumerate() {
                    let value = if same_system[k] {
                        grid.valid_at(row, col)
                    } else {
                        let (x, y) = first.pixel_to_geo(col, row);
                        let (c, r) = grid.geo_to_pixel(x, y);
                        params.interpolation.sample(grid, c, r)
                    };
                    match value {
                        Some(v) => values[k] = v,
                        None => {
                            missing = true;
                            values[k] = f64::NAN;
                        }
                    }
                }

                if missing && !params.use_nodata {
                    continue;
                }

                let v = formula.evaluate(&values);
                if v.is_finite() {
                    *out = v;
                }
            }

            row_data
        })
        .collect();

    let mut output = first.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use slopeclass_core::GeoTransform;

    fn make_grid(rows: usize, cols: usize, value: f64, cell: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * cell, cell, -cell));
        r
    }

    #[test]
    fn test_single_grid() {
        let a = make_grid(4, 4, 12.0, 1.0);
        let f = Formula::parse("(or(gt(a,0),eq(a,0)))+(or(gt(a,5),eq(a,5)))+(or(gt(a,10),eq(a,10)))").unwrap();
        let out = raster_calculator(&[&a], &f, &CalculatorParams::default()).unwrap();
        assert_eq!(out.get(2, 2).unwrap(), 3.0);
        assert_eq!(out.shape(), (4, 4));
    }

    #[test]
    fn test_two_grids_same_system() {
        let a = make_grid(3, 3, 5.0, 1.0);
        let b = make_grid(3, 3, 2.0, 1.0);
        let f = Formula::parse("a * b - 1").unwrap();
        let out = raster_calculator(&[&a, &b], &f, &CalculatorParams::default()).unwrap();
        assert_relative_eq!(out.get(1, 1).unwrap(), 9.0);
    }

    #[test]
    fn test_other_grid_system_is_sampled() {
        let a = make_grid(4, 4, 1.0, 1.0);
        // Same extent, coarser cells
        let b = make_grid(2, 2, 3.0, 2.0);
        let f = Formula::parse("a + b").unwrap();
        let params = CalculatorParams {
            interpolation: Interpolation::Bilinear,
            use_nodata: false,
        };
        let out = raster_calculator(&[&a, &b], &f, &params).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 4.0);
        assert_relative_eq!(out.get(3, 3).unwrap(), 4.0);
    }

    #[test]
    fn test_nodata_handling() {
        let mut a = make_grid(3, 3, 7.0, 1.0);
        a.set(1, 1, f64::NAN).unwrap();
        let f = Formula::parse("ifelse(eq(a, a), a, -1)").unwrap();

        let skipped = raster_calculator(&[&a], &f, &CalculatorParams::default()).unwrap();
        assert!(skipped.get(1, 1).unwrap().is_nan());
        assert_eq!(skipped.get(0, 0).unwrap(), 7.0);

        let params = CalculatorParams {
            use_nodata: true,
            ..Default::default()
        };
        let used = raster_calculator(&[&a], &f, &params).unwrap();
        // NaN != NaN, so the formula sees the gap and yields -1
        assert_eq!(used.get(1, 1).unwrap(), -1.0);
    }

    #[test]
    fn test_missing_grid_error() {
        let a = make_grid(3, 3, 1.0, 1.0);
        let f = Formula::parse("a + b").unwrap();
        let result = raster_calculator(&[&a], &f, &CalculatorParams::default());
        assert!(matches!(result, Err(Error::Formula(_))));
    }

    #[test]
    fn test_no_grids_error() {
        let f = Formula::parse("1").unwrap();
        assert!(raster_calculator(&[], &f, &CalculatorParams::default()).is_err());
    }
}
