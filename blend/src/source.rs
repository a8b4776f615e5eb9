//! One contributing grid and its place in the output raster.

use crate::BlendError;
use gridfile::{Grid, GridHeader, GridRows, ReadMode, Region, RowReader};
use log::{debug, warn};
use std::{f64::consts::PI, fmt, path::PathBuf, sync::Arc};
use tempfile::TempPath;

/// Where a source's samples live.
#[derive(Debug, Clone)]
pub enum SourceLocation {
    File(PathBuf),
    Memory(Arc<Grid>),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory(grid) => write!(f, "<memory grid {}>", grid.header.region),
        }
    }
}

/// Cosine taper weight `distance` increments in from an outer edge.
///
/// `constant` is `π·inc / taper_width`; `None` marks a side without a
/// taper, which always has full weight.
pub fn taper_weight(distance: f64, constant: Option<f64>) -> f64 {
    constant.map_or(1.0, |c| 0.5 * (1.0 - (distance * c).cos()))
}

/// Per-side taper constants.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Taper {
    pub west: Option<f64>,
    pub east: Option<f64>,
    pub north: Option<f64>,
    pub south: Option<f64>,
}

impl Taper {
    /// Taper constants for `inner` within `outer`, sampled at `inc`.
    pub fn new(outer: &Region, inner: &Region, inc: geo::Coord<f64>) -> Self {
        let side = |inc: f64, width: f64| (width > 0.0).then(|| PI * inc / width);
        Self {
            west: side(inc.x, inner.west - outer.west),
            east: side(inc.x, outer.east - inner.east),
            north: side(inc.y, outer.north - inner.north),
            south: side(inc.y, inner.south - outer.south),
        }
    }
}

/// A source's outer and inner extents as output column and row
/// indices.
///
/// `out_*` bound the nodes the source has; `in_*0` and `in_*1` are the
/// last tapered index before, and the first tapered index after, the
/// full-weight block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceGeometry {
    pub out_i0: i64,
    pub out_i1: i64,
    pub in_i0: i64,
    pub in_i1: i64,
    pub out_j0: i64,
    pub out_j1: i64,
    pub in_j0: i64,
    pub in_j1: i64,
}

impl SourceGeometry {
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(out: &GridHeader, src: &GridHeader, inner: &Region) -> Self {
        let one_or_zero = 1 - out.registration.as_index();
        let src_reg = src.registration.as_index();
        let col = |x: f64| ((x - out.region.west) / out.inc.x).round() as i64;
        let row = |y: f64| ((out.region.north - y) / out.inc.y).round() as i64;
        Self {
            out_i0: col(src.region.west),
            in_i0: col(inner.west) - 1,
            in_i1: col(inner.east) + one_or_zero,
            out_i1: col(src.region.east) - src_reg,
            out_j0: row(src.region.north),
            in_j0: row(inner.north) - 1,
            in_j1: row(inner.south) + one_or_zero,
            out_j1: row(src.region.south) - src_reg,
        }
    }

    pub fn covers_row(&self, row: i64) -> bool {
        (self.out_j0..=self.out_j1).contains(&row)
    }

    /// Maps output column `col` to the output-space column `pcol` this
    /// source sees there, or `None` if the source doesn't reach `col`.
    ///
    /// With `nx_360` set, columns repeat every 360 degrees.
    pub fn wrap_col(&self, col: i64, nx_360: Option<i64>) -> Option<i64> {
        match nx_360 {
            Some(nx) if nx > 0 => {
                let mut pcol = col + nx;
                while pcol > self.out_i1 {
                    pcol -= nx;
                }
                (pcol >= self.out_i0).then_some(pcol)
            }
            _ => (self.out_i0..=self.out_i1).contains(&col).then_some(col),
        }
    }
}

pub(crate) enum SourceState {
    /// The output hasn't reached this source's rows yet.
    Before,

    /// Holding the source row matching the current output row.
    Active {
        reader: Box<dyn RowReader>,
        row: Vec<f32>,
        wt_y: f64,
    },

    /// Done; nothing held.
    After,
}

/// One input grid of a blend.
pub struct GridSource {
    location: SourceLocation,

    /// Header of what is actually read, after any longitude shift or
    /// resampling.
    header: GridHeader,

    inner: Region,

    weight: f64,

    invert: bool,

    /// Set when the source can't contribute to the output at all.
    ignore: bool,

    geometry: SourceGeometry,

    taper: Taper,

    /// First source row read, non-zero when the source starts north of
    /// the output.
    row_offset: usize,

    read_mode: ReadMode,

    /// Temporary resampled or reformatted copy this source reads from.
    artifact: Option<TempPath>,

    state: SourceState,
}

impl GridSource {
    pub(crate) fn new(
        location: SourceLocation,
        header: GridHeader,
        inner: Region,
        weight: f64,
        read_mode: ReadMode,
    ) -> Self {
        Self {
            location,
            header,
            inner,
            weight,
            invert: false,
            ignore: false,
            geometry: SourceGeometry::default(),
            taper: Taper::default(),
            row_offset: 0,
            read_mode,
            artifact: None,
            state: SourceState::Before,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn inner(&self) -> &Region {
        &self.inner
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    pub fn is_ignored(&self) -> bool {
        self.ignore
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SourceState::Active { .. })
    }

    pub fn geometry(&self) -> &SourceGeometry {
        &self.geometry
    }

    pub fn row_offset(&self) -> usize {
        self.row_offset
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    /// Horizontal taper weight at output-space column `pcol`.
    #[allow(clippy::cast_precision_loss)]
    pub fn wt_x(&self, pcol: i64, half: f64) -> f64 {
        let g = &self.geometry;
        if pcol <= g.in_i0 {
            taper_weight((pcol - g.out_i0) as f64 + half, self.taper.west)
        } else if pcol >= g.in_i1 {
            taper_weight((g.out_i1 - pcol) as f64 + half, self.taper.east)
        } else {
            1.0
        }
    }

    /// Vertical taper weight at output row `row`, scaled by the
    /// source weight.
    #[allow(clippy::cast_precision_loss)]
    pub fn wt_y(&self, row: i64, half: f64) -> f64 {
        let g = &self.geometry;
        let wt = if row <= g.in_j0 {
            taper_weight((row - g.out_j0) as f64 + half, self.taper.north)
        } else if row >= g.in_j1 {
            taper_weight((g.out_j1 - row) as f64 + half, self.taper.south)
        } else {
            1.0
        };
        wt * self.weight
    }

    /// The row held for the current output row and its vertical weight.
    pub(crate) fn active_row(&self) -> Option<(&[f32], f64)> {
        match &self.state {
            SourceState::Active { row, wt_y, .. } => Some((row, *wt_y)),
            _ => None,
        }
    }

    /// Brings this source in step with output row `row`, opening,
    /// reading, or retiring it as needed.
    ///
    /// Rows must be visited in increasing order.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub(crate) fn sync(&mut self, row: usize, half: f64) -> Result<(), BlendError> {
        if self.ignore {
            return Ok(());
        }
        let row = row as i64;
        if !self.geometry.covers_row(row) {
            if self.is_active() {
                self.retire();
            }
            return Ok(());
        }
        if matches!(self.state, SourceState::After) {
            return Ok(());
        }
        if matches!(self.state, SourceState::Before) {
            self.activate()?;
        }
        let wt = self.wt_y(row, half);
        let src_row = (row - self.geometry.out_j0) as usize;
        if let SourceState::Active { reader, row, wt_y } = &mut self.state {
            reader
                .read_row(src_row, row)
                .map_err(|source| BlendError::Read {
                    name: self.location.to_string(),
                    row: src_row,
                    source,
                })?;
            *wt_y = wt;
        }
        Ok(())
    }

    fn activate(&mut self) -> Result<(), BlendError> {
        let reader: Box<dyn RowReader> = match &self.location {
            SourceLocation::File(path) => {
                gridfile::open_rows(path, self.read_mode).map_err(|source| BlendError::Open {
                    path: path.clone(),
                    source,
                })?
            }
            SourceLocation::Memory(grid) => Box::new(GridRows::new(Arc::clone(grid))),
        };
        debug!(
            "opening {} starting at source row {}",
            self.location, self.row_offset
        );
        let row = vec![f32::NAN; reader.header().n_columns];
        self.state = SourceState::Active {
            reader,
            row,
            wt_y: 0.0,
        };
        Ok(())
    }

    fn retire(&mut self) {
        debug!("closing {}", self.location);
        self.state = SourceState::After;
        self.remove_artifact();
    }

    fn remove_artifact(&mut self) {
        if let Some(tmp) = self.artifact.take() {
            let path = tmp.to_path_buf();
            match tmp.close() {
                Ok(()) => debug!("deleted {}", path.display()),
                Err(e) => warn!("failed to delete {}: {e}", path.display()),
            }
        }
    }
}

/// Plan-time setters.
impl GridSource {
    pub(crate) fn set_ignore(&mut self) {
        self.ignore = true;
    }

    pub(crate) fn shift_lon(&mut self, delta: f64) {
        self.header.region = self.header.region.shift_lon(delta);
    }

    pub(crate) fn shift_inner_lon(&mut self, delta: f64) {
        self.inner = self.inner.shift_lon(delta);
    }

    /// Reads from `artifact` from now on, whose header is `header`.
    pub(crate) fn replace_with(&mut self, artifact: TempPath, header: GridHeader) {
        self.remove_artifact();
        self.location = SourceLocation::File(artifact.to_path_buf());
        self.header = header;
        self.artifact = Some(artifact);
    }

    pub(crate) fn set_inner(&mut self, inner: Region) {
        self.inner = inner;
    }

    pub(crate) fn resolve_weight(&mut self) {
        if self.weight < 0.0 {
            self.weight = self.weight.abs();
            self.invert = true;
        }
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub(crate) fn place(&mut self, out: &GridHeader) {
        self.geometry = SourceGeometry::new(out, &self.header, &self.inner);
        self.taper = Taper::new(&self.header.region, &self.inner, out.inc);
        self.row_offset = (-self.geometry.out_j0).max(0) as usize;
    }
}

impl Drop for GridSource {
    fn drop(&mut self) {
        self.remove_artifact();
    }
}
