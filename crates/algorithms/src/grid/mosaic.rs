//! Mosaicking several rasters onto one grid

use crate::grid::{GridFit, Interpolation, TargetGrid};
use crate::maybe_rayon::*;
use ndarray::Array2;
use slopeclass_core::raster::Raster;
use slopeclass_core::{Error, Result};

/// How values of overlapping inputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMode {
    /// Keep the value of the first input covering a cell
    First,
    /// Keep the value of the last input covering a cell
    Last,
    Minimum,
    Maximum,
    /// Arithmetic mean of all inputs covering a cell
    #[default]
    Mean,
    /// Weighted mean; an input's weight ramps from 0 at its edge to 1 at
    /// `blend_distance` inside it
    Feathering,
}

/// Radiometric adjustment of each input against the mosaic built so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    None,
    /// Linear gain/offset fitted over the cells an input shares with the mosaic
    Regression,
}

/// Parameters for mosaicking
#[derive(Debug, Clone)]
pub struct MosaicParams {
    /// Kernel used to sample each input on the target grid
    pub resampling: Interpolation,
    pub overlap: OverlapMode,
    /// Feathering distance in map units
    pub blend_distance: f64,
    pub matching: MatchMode,
    /// Target cell size in map units
    pub cell_size: f64,
    pub fit: GridFit,
}

impl Default for MosaicParams {
    fn default() -> Self {
        Self {
            resampling: Interpolation::Bilinear,
            overlap: OverlapMode::Mean,
            blend_distance: 0.0,
            matching: MatchMode::None,
            cell_size: 1.0,
            fit: GridFit::Cells,
        }
    }
}

/// Running combination of input values per output cell
struct Accumulator {
    mode: OverlapMode,
    /// Current value (First/Last/Minimum/Maximum) or weighted sum (Mean/Feathering)
    value: Array2<f64>,
    weight: Array2<f64>,
}

impl Accumulator {
    fn new(mode: OverlapMode, rows: usize, cols: usize) -> Self {
        Self {
            mode,
            value: Array2::zeros((rows, cols)),
            weight: Array2::zeros((rows, cols)),
        }
    }

    fn add(&mut self, row: usize, col: usize, v: f64, w: f64) {
        let idx = (row, col);
        let seen = self.weight[idx] > 0.0;
        match self.mode {
            OverlapMode::First if seen => {}
            OverlapMode::Minimum if seen && self.value[idx] <= v => {}
            OverlapMode::Maximum if seen && self.value[idx] >= v => {}
            OverlapMode::First | OverlapMode::Last | OverlapMode::Minimum | OverlapMode::Maximum => {
                self.value[idx] = v;
                self.weight[idx] = 1.0;
            }
            OverlapMode::Mean => {
                self.value[idx] += v;
                self.weight[idx] += 1.0;
            }
            OverlapMode::Feathering => {
                self.value[idx] += v * w;
                self.weight[idx] += w;
            }
        }
    }

    fn current(&self, row: usize, col: usize) -> Option<f64> {
        let w = self.weight[(row, col)];
        if w <= 0.0 {
            return None;
        }
        let v = self.value[(row, col)];
        Some(match self.mode {
            OverlapMode::Mean | OverlapMode::Feathering => v / w,
            _ => v,
        })
    }

    fn finish(self) -> Array2<f64> {
        let (rows, cols) = self.value.dim();
        Array2::from_shape_fn((rows, cols), |(r, c)| self.current(r, c).unwrap_or(f64::NAN))
    }
}

/// Mosaic `tiles` onto one grid covering their union.
///
/// Tiles are combined in order. Every tile must share the coordinate system of
/// the others (where known) and, when there is more than one tile, overlap or
/// touch at least one other tile.
pub fn mosaic(tiles: &[&Raster<f64>], params: &MosaicParams) -> Result<Raster<f64>> {
    let first = *tiles
        .first()
        .ok_or_else(|| Error::Algorithm("Mosaic needs at least one input grid".into()))?;

    check_crs(tiles)?;
    check_overlap(tiles)?;

    let union = tiles.iter().skip(1).fold(first.bounds(), |acc, t| {
        let b = t.bounds();
        (acc.0.min(b.0), acc.1.min(b.1), acc.2.max(b.2), acc.3.max(b.3))
    });
    let grid = TargetGrid::fit(union, params.cell_size, params.fit)?;
    let (rows, cols) = grid.shape();

    tracing::debug!(
        "Mosaicking {} grid(s) onto {}x{} @ {} ({:?}, {:?})",
        tiles.len(),
        cols,
        rows,
        params.cell_size,
        params.overlap,
        params.matching
    );

    let mut acc = Accumulator::new(params.overlap, rows, cols);

    for (index, tile) in tiles.iter().enumerate() {
        let sampled = sample_onto(tile, &grid, params.resampling)?;

        let (gain, offset) = match params.matching {
            MatchMode::Regression if index > 0 => regression_fit(&sampled, &acc),
            _ => (1.0, 0.0),
        };

        let tile_bounds = tile.bounds();
        for ((r, c), &v) in sampled.indexed_iter() {
            if v.is_nan() {
                continue;
            }
            let weight = if params.overlap == OverlapMode::Feathering {
                let (x, y) = grid.transform.pixel_to_geo(c, r);
                feather_weight(x, y, tile_bounds, params.blend_distance)
            } else {
                1.0
            };
            acc.add(r, c, gain * v + offset, weight);
        }
    }

    let mut output = first.with_same_meta::<f64>(rows, cols);
    output.set_transform(grid.transform);
    output.set_crs(tiles.iter().find_map(|t| t.crs().cloned()));
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = acc.finish();

    Ok(output)
}

fn check_crs(tiles: &[&Raster<f64>]) -> Result<()> {
    let mut known = tiles.iter().filter_map(|t| t.crs());
    if let Some(reference) = known.next() {
        if let Some(other) = known.find(|c| !c.is_equivalent(reference)) {
            return Err(Error::CrsMismatch(reference.to_string(), other.to_string()));
        }
    }
    Ok(())
}

fn check_overlap(tiles: &[&Raster<f64>]) -> Result<()> {
    if tiles.len() < 2 {
        return Ok(());
    }
    let bounds: Vec<_> = tiles.iter().map(|t| t.bounds()).collect();
    let touches = |a: &(f64, f64, f64, f64), b: &(f64, f64, f64, f64)| {
        a.0 <= b.2 && a.2 >= b.0 && a.1 <= b.3 && a.3 >= b.1
    };

    for (i, a) in bounds.iter().enumerate() {
        let overlaps = bounds
            .iter()
            .enumerate()
            .any(|(j, b)| i != j && touches(a, b));
        if !overlaps {
            return Err(Error::NoOverlap { index: i + 1 });
        }
    }
    Ok(())
}

/// Sample one tile at every target cell centre (NaN where it has no value)
fn sample_onto(tile: &Raster<f64>, grid: &TargetGrid, kernel: Interpolation) -> Result<Array2<f64>> {
    let (rows, cols) = grid.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let (x, y) = grid.transform.pixel_to_geo(col, row);
                let (src_col, src_row) = tile.geo_to_pixel(x, y);
                if let Some(v) = kernel.sample(tile, src_col, src_row) {
                    *cell = v;
                }
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

/// Least-squares `mosaic = gain * tile + offset` over shared cells
fn regression_fit(sampled: &Array2<f64>, acc: &Accumulator) -> (f64, f64) {
    let pairs: Vec<(f64, f64)> = sampled
        .indexed_iter()
        .filter(|(_, v)| !v.is_nan())
        .filter_map(|((r, c), &x)| acc.current(r, c).map(|y| (x, y)))
        .collect();

    if pairs.len() < 3 {
        return (1.0, 0.0);
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = pairs.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = pairs.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();

    if sxx < 1e-12 {
        // Constant tile: shift only
        return (1.0, mean_y - mean_x);
    }
    let gain = sxy / sxx;
    (gain, mean_y - gain * mean_x)
}

/// Weight of a tile at (x, y): distance to the tile's nearest edge over the
/// blend distance, capped at 1.
fn feather_weight(x: f64, y: f64, bounds: (f64, f64, f64, f64), blend_distance: f64) -> f64 {
    if blend_distance <= 0.0 {
        return 1.0;
    }
    let (min_x, min_y, max_x, max_y) = bounds;
    let edge = (x - min_x).min(max_x - x).min(y - min_y).min(max_y - y);
    (edge / blend_distance).clamp(1e-6, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use slopeclass_core::{GeoTransform, CRS};

    fn tile(min_x: f64, max_y: f64, rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::north_up(min_x, max_y, 1.0));
        r.set_crs(Some(CRS::from_epsg(25830)));
        r
    }

    fn params(overlap: OverlapMode) -> MosaicParams {
        MosaicParams {
            resampling: Interpolation::NearestNeighbour,
            overlap,
            ..Default::default()
        }
    }

    #[test]
    fn test_union_extent() {
        let a = tile(0.0, 10.0, 10, 10, 1.0);
        let b = tile(5.0, 10.0, 10, 10, 3.0);
        let out = mosaic(&[&a, &b], &params(OverlapMode::Mean)).unwrap();

        assert_eq!(out.shape(), (10, 15));
        assert_eq!(out.bounds(), (0.0, 0.0, 15.0, 10.0));
        assert_eq!(out.crs().and_then(|c| c.epsg()), Some(25830));
    }

    #[test]
    fn test_overlap_modes() {
        let a = tile(0.0, 10.0, 10, 10, 1.0);
        let b = tile(5.0, 10.0, 10, 10, 3.0);

        let cases = [
            (OverlapMode::First, 1.0),
            (OverlapMode::Last, 3.0),
            (OverlapMode::Minimum, 1.0),
            (OverlapMode::Maximum, 3.0),
            (OverlapMode::Mean, 2.0),
        ];
        for (mode, expected) in cases {
            let out = mosaic(&[&a, &b], &params(mode)).unwrap();
            assert_eq!(out.get(5, 7).unwrap(), expected, "{:?}", mode);
            // Outside the overlap each tile keeps its own value
            assert_eq!(out.get(5, 1).unwrap(), 1.0, "{:?}", mode);
            assert_eq!(out.get(5, 13).unwrap(), 3.0, "{:?}", mode);
        }
    }

    #[test]
    fn test_feathering_blends_towards_far_tile() {
        let a = tile(0.0, 10.0, 10, 10, 0.0);
        let b = tile(5.0, 10.0, 10, 10, 10.0);
        let mut p = params(OverlapMode::Feathering);
        p.blend_distance = 4.0;
        let out = mosaic(&[&a, &b], &p).unwrap();

        // Column 5 sits just inside b's left edge: mostly a
        let near_a = out.get(5, 5).unwrap();
        // Column 9 sits just inside a's right edge: mostly b
        let near_b = out.get(5, 9).unwrap();
        assert!(near_a < 5.0, "got {}", near_a);
        assert!(near_b > 5.0, "got {}", near_b);
    }

    #[test]
    fn test_regression_matching_removes_offset() {
        let mut a = tile(0.0, 10.0, 10, 10, 0.0);
        let mut b = tile(5.0, 10.0, 10, 10, 0.0);
        for r in 0..10 {
            for c in 0..10 {
                a.set(r, c, (r + c) as f64).unwrap();
                // Same surface, shifted by +100 and offset 5 columns
                b.set(r, c, (r + c + 5) as f64 + 100.0).unwrap();
            }
        }
        let mut p = params(OverlapMode::Last);
        p.matching = MatchMode::Regression;
        let out = mosaic(&[&a, &b], &p).unwrap();

        assert_relative_eq!(out.get(3, 12).unwrap(), 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_tiles_fail() {
        let a = tile(0.0, 10.0, 10, 10, 1.0);
        let b = tile(50.0, 10.0, 10, 10, 1.0);
        let result = mosaic(&[&a, &b], &params(OverlapMode::Mean));
        assert!(matches!(result, Err(Error::NoOverlap { index: 1 })));
    }

    #[test]
    fn test_crs_mismatch_fails() {
        let a = tile(0.0, 10.0, 10, 10, 1.0);
        let mut b = tile(5.0, 10.0, 10, 10, 1.0);
        b.set_crs(Some(CRS::from_epsg(32630)));
        let result = mosaic(&[&a, &b], &params(OverlapMode::Mean));
        assert!(matches!(result, Err(Error::CrsMismatch(_, _))));
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(mosaic(&[], &MosaicParams::default()).is_err());
    }
}
