//! Target grid construction from an extent and a cell size

use slopeclass_core::raster::GeoTransform;
use slopeclass_core::{Error, Result};

/// How a target grid is fitted to an extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridFit {
    /// Cell centres lie on the extent boundary; the grid reaches half a cell beyond it
    Nodes,
    /// Cell edges lie on the extent boundary
    #[default]
    Cells,
}

/// Grid system of an output raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl TargetGrid {
    /// Build a north-up grid with square `cell_size` cells covering
    /// `bounds` = (min_x, min_y, max_x, max_y).
    ///
    /// With [`GridFit::Cells`] the cell count rounds up so the whole extent
    /// is covered.
    pub fn fit(bounds: (f64, f64, f64, f64), cell_size: f64, fit: GridFit) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::InvalidParameter {
                name: "cell_size",
                value: cell_size.to_string(),
                reason: "must be a positive number".into(),
            });
        }

        let (min_x, min_y, max_x, max_y) = bounds;
        let width = max_x - min_x;
        let height = max_y - min_y;
        if !(width >= 0.0 && height >= 0.0) {
            return Err(Error::Algorithm(format!(
                "Degenerate extent ({}, {}) - ({}, {})",
                min_x, min_y, max_x, max_y
            )));
        }

        // Tolerance keeps exact multiples from gaining a sliver column
        const EPS: f64 = 1e-9;
        let (transform, cols, rows) = match fit {
            GridFit::Cells => {
                let cols = ((width / cell_size) - EPS).ceil().max(1.0) as usize;
                let rows = ((height / cell_size) - EPS).ceil().max(1.0) as usize;
                (GeoTransform::north_up(min_x, max_y, cell_size), cols, rows)
            }
            GridFit::Nodes => {
                let cols = (width / cell_size + EPS).floor() as usize + 1;
                let rows = (height / cell_size + EPS).floor() as usize + 1;
                let half = cell_size / 2.0;
                (GeoTransform::north_up(min_x - half, max_y + half, cell_size), cols, rows)
            }
        };

        Ok(Self {
            transform,
            rows,
            cols,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_cells_exact_multiple() {
        let grid = TargetGrid::fit((0.0, 0.0, 20.0, 10.0), 2.0, GridFit::Cells).unwrap();
        assert_eq!(grid.shape(), (5, 10));
        assert_relative_eq!(grid.transform.origin_x, 0.0);
        assert_relative_eq!(grid.transform.origin_y, 10.0);
    }

    #[test]
    fn test_fit_cells_rounds_up() {
        let grid = TargetGrid::fit((0.0, 0.0, 19.0, 9.0), 2.0, GridFit::Cells).unwrap();
        assert_eq!(grid.shape(), (5, 10));
    }

    #[test]
    fn test_fit_nodes_adds_half_cell_margin() {
        let grid = TargetGrid::fit((0.0, 0.0, 20.0, 10.0), 2.0, GridFit::Nodes).unwrap();
        assert_eq!(grid.shape(), (6, 11));
        assert_relative_eq!(grid.transform.origin_x, -1.0);
        let (cx, cy) = grid.transform.pixel_to_geo(0, 0);
        assert_relative_eq!(cx, 0.0);
        assert_relative_eq!(cy, 10.0);
    }

    #[test]
    fn test_rejects_non_positive_cell_size() {
        assert!(TargetGrid::fit((0.0, 0.0, 1.0, 1.0), 0.0, GridFit::Cells).is_err());
        assert!(TargetGrid::fit((0.0, 0.0, 1.0, 1.0), f64::NAN, GridFit::Cells).is_err());
    }
}
