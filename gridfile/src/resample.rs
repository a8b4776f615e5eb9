//! Conversion of whole grids onto a new lattice or into another
//! format.

use crate::{stream, Grid, GridError, GridHeader, NativeWriter, Region, Registration};
use geo::geometry::Coord;
use log::debug;
use std::path::Path;

/// Slack, in fractions of a source increment, allowed when deciding if
/// a target node falls inside the source.
const EDGE_TOLERANCE: f64 = 1e-6;

/// Lattice a grid is resampled onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleTarget {
    pub region: Region,
    pub inc: Coord<f64>,
    pub registration: Registration,
}

/// Bilinearly resamples the grid at `src` onto `target`, writing the
/// result to `dst` in the native format.
///
/// Target nodes outside the source, or next to a NaN source node, are
/// NaN.
pub fn resample(src: &Path, target: &ResampleTarget, dst: &Path) -> Result<GridHeader, GridError> {
    let grid = stream::load(src)?;
    let header = GridHeader::new(target.region, target.inc, target.registration)?;
    if grid.header.region.intersection(&header.region).is_none() {
        return Err(GridError::EmptyResample(target.region.to_string()));
    }
    debug!(
        "resampling {} ({} x {}) onto {} ({} x {})",
        src.display(),
        grid.header.n_columns,
        grid.header.n_rows,
        header.region,
        header.n_columns,
        header.n_rows
    );

    let mut wtr = NativeWriter::create(dst, &header, false)?;
    let mut row_buf = vec![f32::NAN; header.n_columns];
    let (mut z_min, mut z_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let x0 = grid.header.col_to_x(0);
    let y0 = grid.header.row_to_y(0);
    #[allow(clippy::cast_possible_wrap)]
    for row in 0..header.n_rows {
        let fy = (y0 - header.row_to_y(row as i64)) / grid.header.inc.y;
        for (col, out) in row_buf.iter_mut().enumerate() {
            let fx = (header.col_to_x(col as i64) - x0) / grid.header.inc.x;
            *out = bilinear(&grid, fx, fy);
            if !out.is_nan() {
                z_min = z_min.min(f64::from(*out));
                z_max = z_max.max(f64::from(*out));
            }
        }
        wtr.write_row(row, &row_buf)?;
    }
    if z_min > z_max {
        (z_min, z_max) = (f64::NAN, f64::NAN);
    }
    wtr.finish(z_min, z_max)?;
    Ok(GridHeader {
        z_min,
        z_max,
        ..header
    })
}

/// Copies the grid at `src` to `dst`, converting it to the format
/// implied by `dst`'s extension.
pub fn reformat(src: &Path, dst: &Path) -> Result<GridHeader, GridError> {
    let grid = stream::load(src)?;
    debug!("reformatting {} to {}", src.display(), dst.display());
    stream::store(dst, &grid)?;
    Ok(grid.header)
}

/// Interpolates `grid` at fractional column `fx` and row `fy`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bilinear(grid: &Grid, fx: f64, fy: f64) -> f32 {
    let max_x = (grid.header.n_columns - 1) as f64;
    let max_y = (grid.header.n_rows - 1) as f64;
    if fx < -EDGE_TOLERANCE
        || fy < -EDGE_TOLERANCE
        || fx > max_x + EDGE_TOLERANCE
        || fy > max_y + EDGE_TOLERANCE
    {
        return f32::NAN;
    }
    let fx = fx.clamp(0.0, max_x);
    let fy = fy.clamp(0.0, max_y);
    let x0 = fx.floor() as usize;
    let y0 = fy.floor() as usize;
    let x1 = (x0 + 1).min(grid.header.n_columns - 1);
    let y1 = (y0 + 1).min(grid.header.n_rows - 1);
    let xf = fx - x0 as f64;
    let yf = fy - y0 as f64;

    let top = grid.row(y0);
    let bottom = grid.row(y1);
    let [v00, v10, v01, v11] = [top[x0], top[x1], bottom[x0], bottom[x1]].map(f64::from);
    if v00.is_nan() || v10.is_nan() || v01.is_nan() || v11.is_nan() {
        return f32::NAN;
    }
    let upper = v00 * (1.0 - xf) + v10 * xf;
    let lower = v01 * (1.0 - xf) + v11 * xf;
    (upper * (1.0 - yf) + lower * yf) as f32
}

#[cfg(test)]
mod tests {
    use super::{reformat, resample, ResampleTarget};
    use crate::{load, store, Grid, GridHeader, Region, Registration};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;

    /// z = x + 10y on a 1-degree gridline lattice.
    fn plane() -> Grid {
        let header = GridHeader::new(
            Region::new(0.0, 4.0, 0.0, 4.0).unwrap(),
            Coord { x: 1.0, y: 1.0 },
            Registration::Gridline,
        )
        .unwrap();
        let mut grid = Grid::new(header);
        for row in 0..5 {
            let y = grid.header.row_to_y(row as i64);
            for col in 0..5 {
                let x = grid.header.col_to_x(col as i64);
                grid.row_mut(row)[col] = (x + 10.0 * y) as f32;
            }
        }
        grid.update_extrema();
        grid
    }

    #[test]
    fn test_bilinear_reproduces_plane() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plane.grd");
        let dst = dir.path().join("out.grd");
        store(&src, &plane()).unwrap();

        let target = ResampleTarget {
            region: Region::new(0.0, 4.0, 0.0, 4.0).unwrap(),
            inc: Coord { x: 0.5, y: 0.5 },
            registration: Registration::Pixel,
        };
        let header = resample(&src, &target, &dst).unwrap();
        assert_eq!((header.n_columns, header.n_rows), (8, 8));

        let out = load(&dst).unwrap();
        for row in 0..8 {
            let y = out.header.row_to_y(row as i64);
            for col in 0..8 {
                let x = out.header.col_to_x(col as i64);
                assert_relative_eq!(
                    f64::from(out.row(row)[col]),
                    x + 10.0 * y,
                    epsilon = 1e-4
                );
            }
        }
        assert_relative_eq!(out.header.z_min, 0.25 + 2.5, epsilon = 1e-4);
    }

    #[test]
    fn test_outside_source_is_nan() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plane.grd");
        let dst = dir.path().join("out.grd");
        store(&src, &plane()).unwrap();

        let target = ResampleTarget {
            region: Region::new(2.0, 6.0, 0.0, 4.0).unwrap(),
            inc: Coord { x: 1.0, y: 1.0 },
            registration: Registration::Gridline,
        };
        resample(&src, &target, &dst).unwrap();
        let out = load(&dst).unwrap();
        assert_relative_eq!(out.row(0)[2], 44.0);
        assert!(out.row(0)[3].is_nan());
        assert!(out.row(0)[4].is_nan());
    }

    #[test]
    fn test_disjoint_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plane.grd");
        store(&src, &plane()).unwrap();
        let target = ResampleTarget {
            region: Region::new(10.0, 12.0, 0.0, 4.0).unwrap(),
            inc: Coord { x: 1.0, y: 1.0 },
            registration: Registration::Gridline,
        };
        assert!(resample(&src, &target, &dir.path().join("out.grd")).is_err());
    }

    #[test]
    fn test_reformat_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("plane.asc");
        let dst = dir.path().join("plane.grd");
        let grid = plane();
        store(&src, &grid).unwrap();
        let header = reformat(&src, &dst).unwrap();
        assert_eq!(header.region, grid.header.region);
        assert_eq!(load(&dst).unwrap().data, grid.data);
    }
}
