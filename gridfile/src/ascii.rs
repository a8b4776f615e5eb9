//! ESRI ASCII grid format.
//!
//! Supports `cellsize` or the common `dx`/`dy` extension. A lower-left
//! `*corner` origin maps to pixel registration and a `*center` origin
//! to gridline registration. The format has no random row access, so
//! it is only ever loaded or stored as a whole.

use crate::{Grid, GridError, GridHeader, Region, Registration};
use geo::geometry::Coord;
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

/// Sentinel written in place of NaN.
const NODATA: f32 = -9999.0;

#[derive(Default)]
struct Keys {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<(f64, bool)>,
    yll: Option<(f64, bool)>,
    dx: Option<f64>,
    dy: Option<f64>,
    nodata: Option<f32>,
}

/// Parses the header lines, leaving `lines` at the first data line.
fn parse_keys<I>(lines: &mut std::iter::Peekable<I>, path: &Path) -> Result<Keys, GridError>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    let mk_err = |reason: String| GridError::Header {
        path: path.to_owned(),
        reason,
    };
    let mut keys = Keys::default();
    while let Some(Ok(line)) = lines.peek() {
        let mut toks = line.split_whitespace();
        let Some(key) = toks.next() else {
            lines.next();
            continue;
        };
        if !key.starts_with(|c: char| c.is_ascii_alphabetic()) {
            break;
        }
        let val = toks
            .next()
            .ok_or_else(|| mk_err(format!("missing value for {key}")))?
            .to_owned();
        let num = || {
            val.parse::<f64>()
                .map_err(|_| mk_err(format!("bad value {val} for {key}")))
        };
        let count = || {
            val.parse::<usize>()
                .map_err(|_| mk_err(format!("bad value {val} for {key}")))
        };
        match key.to_ascii_lowercase().as_str() {
            "ncols" => keys.ncols = Some(count()?),
            "nrows" => keys.nrows = Some(count()?),
            "xllcorner" => keys.xll = Some((num()?, true)),
            "xllcenter" => keys.xll = Some((num()?, false)),
            "yllcorner" => keys.yll = Some((num()?, true)),
            "yllcenter" => keys.yll = Some((num()?, false)),
            "cellsize" => {
                keys.dx = Some(num()?);
                keys.dy = keys.dx;
            }
            "dx" => keys.dx = Some(num()?),
            "dy" => keys.dy = Some(num()?),
            #[allow(clippy::cast_possible_truncation)]
            "nodata_value" => keys.nodata = Some(num()? as f32),
            _ => return Err(mk_err(format!("unknown key {key}"))),
        }
        lines.next();
    }
    if let Some(Err(_)) = lines.peek() {
        if let Some(Err(e)) = lines.next() {
            return Err(e.into());
        }
    }
    Ok(keys)
}

fn header_from_keys(keys: &Keys, path: &Path) -> Result<GridHeader, GridError> {
    let mk_err = |reason: &str| GridError::Header {
        path: path.to_owned(),
        reason: reason.to_owned(),
    };
    let (ncols, nrows) = match (keys.ncols, keys.nrows) {
        (Some(c), Some(r)) if c > 0 && r > 0 => (c, r),
        _ => return Err(mk_err("missing ncols/nrows")),
    };
    let ((xll, x_corner), (yll, y_corner)) = match (keys.xll, keys.yll) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(mk_err("missing lower-left origin")),
    };
    if x_corner != y_corner {
        return Err(mk_err("mixed corner and center origins"));
    }
    let inc = match (keys.dx, keys.dy) {
        (Some(x), Some(y)) => Coord { x, y },
        _ => return Err(mk_err("missing cellsize")),
    };
    let registration = if x_corner {
        Registration::Pixel
    } else {
        Registration::Gridline
    };
    let span = |n: usize| -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let n = n as f64;
        if x_corner {
            n
        } else {
            n - 1.0
        }
    };
    let region = Region::new(
        xll,
        xll + span(ncols) * inc.x,
        yll,
        yll + span(nrows) * inc.y,
    )
    .map_err(|e| mk_err(&e.to_string()))?;
    GridHeader::new(region, inc, registration)
}

pub(crate) fn read_header(path: &Path) -> Result<GridHeader, GridError> {
    let mut lines = BufReader::new(File::open(path)?).lines().peekable();
    let keys = parse_keys(&mut lines, path)?;
    header_from_keys(&keys, path)
}

pub(crate) fn load(path: &Path) -> Result<Grid, GridError> {
    let mut lines = BufReader::new(File::open(path)?).lines().peekable();
    let keys = parse_keys(&mut lines, path)?;
    let header = header_from_keys(&keys, path)?;
    let mut grid = Grid::new(header);
    let mut n = 0;
    for line in lines {
        for tok in line?.split_whitespace() {
            let v: f32 = tok.parse().map_err(|_| GridError::Header {
                path: path.to_owned(),
                reason: format!("bad sample {tok}"),
            })?;
            let slot = grid.data.get_mut(n).ok_or_else(|| GridError::Header {
                path: path.to_owned(),
                reason: "more samples than ncols * nrows".to_owned(),
            })?;
            *slot = if Some(v) == keys.nodata { f32::NAN } else { v };
            n += 1;
        }
    }
    if n != grid.data.len() {
        return Err(GridError::Header {
            path: path.to_owned(),
            reason: format!("found {n} samples, expected {}", grid.data.len()),
        });
    }
    grid.update_extrema();
    Ok(grid)
}

pub(crate) fn store(path: &Path, grid: &Grid) -> Result<(), GridError> {
    let h = &grid.header;
    let mut wtr = BufWriter::new(File::create(path)?);
    let (x_key, y_key, x0, y0) = match h.registration {
        Registration::Pixel => ("xllcorner", "yllcorner", h.region.west, h.region.south),
        Registration::Gridline => ("xllcenter", "yllcenter", h.region.west, h.region.south),
    };
    writeln!(wtr, "ncols {}", h.n_columns)?;
    writeln!(wtr, "nrows {}", h.n_rows)?;
    writeln!(wtr, "{x_key} {x0}")?;
    writeln!(wtr, "{y_key} {y0}")?;
    #[allow(clippy::float_cmp)]
    if h.inc.x == h.inc.y {
        writeln!(wtr, "cellsize {}", h.inc.x)?;
    } else {
        writeln!(wtr, "dx {}", h.inc.x)?;
        writeln!(wtr, "dy {}", h.inc.y)?;
    }
    writeln!(wtr, "NODATA_value {NODATA}")?;
    for row in 0..h.n_rows {
        let line = grid
            .row(row)
            .iter()
            .map(|v| if v.is_nan() { NODATA } else { *v }.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(wtr, "{line}")?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load, read_header, store};
    use crate::{Grid, GridHeader, Region, Registration};
    use approx::assert_relative_eq;
    use geo::geometry::Coord;
    use std::io::Write;

    #[test]
    fn test_read_corner_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.asc");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            "ncols 3\nnrows 2\nxllcorner 10\nyllcorner -5\ncellsize 0.5\nNODATA_value -1\n1 2 3\n4 -1 6\n"
        )
        .unwrap();
        drop(f);

        let header = read_header(&path).unwrap();
        assert_eq!(header.registration, Registration::Pixel);
        assert_relative_eq!(header.region.east, 11.5);
        assert_relative_eq!(header.region.north, -4.0);

        let grid = load(&path).unwrap();
        assert_eq!(grid.row(0), &[1.0, 2.0, 3.0]);
        assert!(grid.row(1)[1].is_nan());
        assert_relative_eq!(grid.header.z_max, 6.0);
    }

    #[test]
    fn test_short_data_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.asc");
        std::fs::write(
            &path,
            "ncols 2\nnrows 2\nxllcenter 0\nyllcenter 0\ncellsize 1\n1 2 3\n",
        )
        .unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_store_keeps_geometry_and_nan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.asc");
        let header = GridHeader::new(
            Region::new(0.0, 2.0, 0.0, 1.0).unwrap(),
            Coord { x: 1.0, y: 0.5 },
            Registration::Gridline,
        )
        .unwrap();
        let mut grid = Grid::new(header);
        grid.data = vec![1.0, 2.0, 3.0, 4.0, f32::NAN, 6.0, 7.0, 8.0, 9.0];
        grid.update_extrema();
        store(&path, &grid).unwrap();

        let back = load(&path).unwrap();
        assert_eq!(back.header.region, grid.header.region);
        assert_eq!(back.header.registration, Registration::Gridline);
        assert_eq!(back.row(0), grid.row(0));
        assert!(back.row(1)[1].is_nan());
    }
}
