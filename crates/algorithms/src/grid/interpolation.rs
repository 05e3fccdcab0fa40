//! Point sampling of rasters at fractional pixel positions

use slopeclass_core::raster::Raster;

/// Interpolation kernel used when a raster is sampled off its cell centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Value of the containing cell
    NearestNeighbour,
    /// 2x2 bilinear
    Bilinear,
    /// 4x4 cubic convolution (Keys, a = -0.5); interpolates the samples
    BicubicSpline,
    /// 4x4 uniform cubic B-spline; smooths, does not pass through samples
    #[default]
    BSpline,
}

impl Interpolation {
    pub const ALL: [Interpolation; 4] = [
        Interpolation::NearestNeighbour,
        Interpolation::Bilinear,
        Interpolation::BicubicSpline,
        Interpolation::BSpline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::NearestNeighbour => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::BicubicSpline => "bicubic",
            Interpolation::BSpline => "bspline",
        }
    }

    /// Parse a kernel name as written by [`Interpolation::name`]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|i| i.name() == name)
    }

    /// Sample `raster` at fractional pixel coordinates.
    ///
    /// `(col, row)` address cell corners, so the centre of cell (c, r) is
    /// `(c + 0.5, r + 0.5)`. Points outside the raster yield `None`. Near the
    /// border the kernel clamps to the edge cells. When a kernel touches a
    /// no-data cell it falls back to the next simpler kernel, and finally to
    /// the nearest cell, which may itself be no-data.
    pub fn sample(&self, raster: &Raster<f64>, col: f64, row: f64) -> Option<f64> {
        let (rows, cols) = raster.shape();
        if raster.is_empty() || !(col >= 0.0 && row >= 0.0 && col <= cols as f64 && row <= rows as f64) {
            return None;
        }

        let nearest = || {
            let c = (col.floor() as usize).min(cols - 1);
            let r = (row.floor() as usize).min(rows - 1);
            raster.valid_at(r, c)
        };

        // Centre-based coordinates
        let x = col - 0.5;
        let y = row - 0.5;

        match self {
            Interpolation::NearestNeighbour => nearest(),
            Interpolation::Bilinear => bilinear(raster, x, y).or_else(nearest),
            Interpolation::BicubicSpline => cubic(raster, x, y, keys_weight)
                .or_else(|| bilinear(raster, x, y))
                .or_else(nearest),
            Interpolation::BSpline => cubic(raster, x, y, bspline_weight)
                .or_else(|| bilinear(raster, x, y))
                .or_else(nearest),
        }
    }
}

/// Cell value with indices clamped to the raster
fn clamped(raster: &Raster<f64>, col: isize, row: isize) -> Option<f64> {
    let c = col.clamp(0, raster.cols() as isize - 1) as usize;
    let r = row.clamp(0, raster.rows() as isize - 1) as usize;
    raster.valid_at(r, c)
}

fn bilinear(raster: &Raster<f64>, x: f64, y: f64) -> Option<f64> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (c0, r0) = (x0 as isize, y0 as isize);

    let v00 = clamped(raster, c0, r0)?;
    let v10 = clamped(raster, c0 + 1, r0)?;
    let v01 = clamped(raster, c0, r0 + 1)?;
    let v11 = clamped(raster, c0 + 1, r0 + 1)?;

    let top = v00 + (v10 - v00) * fx;
    let bottom = v01 + (v11 - v01) * fx;
    Some(top + (bottom - top) * fy)
}

fn cubic(raster: &Raster<f64>, x: f64, y: f64, weight: fn(f64) -> f64) -> Option<f64> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (c0, r0) = (x0 as isize, y0 as isize);

    let mut sum = 0.0;
    for j in -1..=2_isize {
        let wy = weight(fy - j as f64);
        for i in -1..=2_isize {
            let wx = weight(fx - i as f64);
            sum += wx * wy * clamped(raster, c0 + i, r0 + j)?;
        }
    }
    Some(sum)
}

/// Keys cubic convolution kernel with a = -0.5
fn keys_weight(d: f64) -> f64 {
    const A: f64 = -0.5;
    let d = d.abs();
    if d <= 1.0 {
        (A + 2.0) * d.powi(3) - (A + 3.0) * d.powi(2) + 1.0
    } else if d < 2.0 {
        A * d.powi(3) - 5.0 * A * d.powi(2) + 8.0 * A * d - 4.0 * A
    } else {
        0.0
    }
}

/// Uniform cubic B-spline basis
fn bspline_weight(d: f64) -> f64 {
    let d = d.abs();
    if d < 1.0 {
        (4.0 - 6.0 * d * d + 3.0 * d.powi(3)) / 6.0
    } else if d < 2.0 {
        (2.0 - d).powi(3) / 6.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// z = 2 * col + 3 * row at cell centres
    fn ramp() -> Raster<f64> {
        let mut r = Raster::new(8, 8);
        for row in 0..8 {
            for col in 0..8 {
                r.set(row, col, 2.0 * col as f64 + 3.0 * row as f64).unwrap();
            }
        }
        r
    }

    #[test]
    fn test_kernels_reproduce_linear_surface() {
        let raster = ramp();
        // Between cell centres (3,4) and (4,5), away from the border
        let (col, row) = (4.25, 5.1);
        let expected = 2.0 * (col - 0.5) + 3.0 * (row - 0.5);

        for kernel in [Interpolation::Bilinear, Interpolation::BicubicSpline, Interpolation::BSpline] {
            let v = kernel.sample(&raster, col, row).unwrap();
            assert_relative_eq!(v, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_nearest_picks_containing_cell() {
        let raster = ramp();
        let v = Interpolation::NearestNeighbour.sample(&raster, 2.9, 1.1).unwrap();
        assert_eq!(v, 2.0 * 2.0 + 3.0 * 1.0);
    }

    #[test]
    fn test_outside_is_none() {
        let raster = ramp();
        assert!(Interpolation::Bilinear.sample(&raster, -0.1, 3.0).is_none());
        assert!(Interpolation::BSpline.sample(&raster, 3.0, 8.5).is_none());
    }

    #[test]
    fn test_nodata_neighbour_falls_back() {
        let mut raster = ramp();
        raster.set(3, 3, f64::NAN).unwrap();

        // The 4x4 window at (4.6, 4.6) touches cell (3,3); the 2x2 one does not
        let v = Interpolation::BSpline.sample(&raster, 4.6, 4.6).unwrap();
        assert!(v.is_finite());
        // Nearest on the hole itself is no-data
        assert!(Interpolation::NearestNeighbour.sample(&raster, 3.5, 3.5).is_none());
    }

    #[test]
    fn test_names_roundtrip() {
        for kernel in Interpolation::ALL {
            assert_eq!(Interpolation::from_name(kernel.name()), Some(kernel));
        }
        assert_eq!(Interpolation::from_name("B-spline"), None);
    }
}
