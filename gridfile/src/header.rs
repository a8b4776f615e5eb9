use crate::{GridError, Region, Registration};
use geo::geometry::Coord;
use log::warn;

/// Relative tolerance on increments before two grids count as
/// differently spaced.
const INC_TOLERANCE: f64 = 0.002;

/// Fraction of an increment below which two node positions are
/// considered in phase.
const PHASE_TOLERANCE: f64 = 1e-8;

/// Fraction of an increment a region may be off before its bounds are
/// snapped to the increment.
const FIT_TOLERANCE: f64 = 1e-4;

/// Grid metadata: everything but the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct GridHeader {
    pub region: Region,

    /// Node spacing; `x` is the column increment, `y` the row increment.
    pub inc: Coord<f64>,

    pub registration: Registration,

    pub n_columns: usize,

    pub n_rows: usize,

    /// Lowest non-NaN value, NaN when unknown.
    pub z_min: f64,

    /// Highest non-NaN value, NaN when unknown.
    pub z_max: f64,
}

impl GridHeader {
    /// Returns a header for the given geometry, computing its dimensions.
    ///
    /// East and north are nudged onto the increment when the region
    /// isn't an integer number of increments wide.
    pub fn new(
        region: Region,
        inc: Coord<f64>,
        registration: Registration,
    ) -> Result<Self, GridError> {
        if !(inc.x > 0.0 && inc.y > 0.0 && inc.x.is_finite() && inc.y.is_finite()) {
            return Err(GridError::Increment(format!("{}/{}", inc.x, inc.y)));
        }
        let (n_x, east) = fit(region.west, region.east, inc.x, 'x');
        let (n_y, north) = fit(region.south, region.north, inc.y, 'y');
        let region = Region::new(region.west, east, region.south, north)?;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let (n_columns, n_rows) = {
            let one_or_zero = 1 - registration.as_index();
            ((n_x + one_or_zero) as usize, (n_y + one_or_zero) as usize)
        };
        Ok(Self {
            region,
            inc,
            registration,
            n_columns,
            n_rows,
            z_min: f64::NAN,
            z_max: f64::NAN,
        })
    }

    /// Total number of nodes.
    pub fn nm(&self) -> u64 {
        self.n_columns as u64 * self.n_rows as u64
    }

    pub fn xy_off(&self) -> f64 {
        self.registration.xy_off()
    }

    /// Returns the x coordinate of column `col`.
    #[allow(clippy::cast_precision_loss)]
    pub fn col_to_x(&self, col: i64) -> f64 {
        self.region.west + (col as f64 + self.xy_off()) * self.inc.x
    }

    /// Returns the y coordinate of row `row`, counting from the north.
    #[allow(clippy::cast_precision_loss)]
    pub fn row_to_y(&self, row: i64) -> f64 {
        self.region.north - (row as f64 + self.xy_off()) * self.inc.y
    }

    /// True if either increment differs from `other`'s by more than
    /// 0.2%.
    pub fn increment_differs(&self, other: &Self) -> bool {
        ((self.inc.x - other.inc.x) / other.inc.x).abs() > INC_TOLERANCE
            || ((self.inc.y - other.inc.y) / other.inc.y).abs() > INC_TOLERANCE
    }

    /// True if the nodes of `self` don't land on the node lattice of
    /// `other`.
    pub fn is_out_of_phase(&self, other: &Self) -> bool {
        let own = self.node_edges();
        let theirs = other.node_edges();
        let incs = [other.inc.x, other.inc.x, other.inc.y, other.inc.y];
        own.iter()
            .zip(theirs.iter())
            .zip(incs.iter())
            .any(|((a, b), inc)| {
                let frac = ((a - b) / inc).abs() % 1.0;
                frac >= PHASE_TOLERANCE && 1.0 - frac >= PHASE_TOLERANCE
            })
    }

    /// Returns the largest region made of whole cells of `self` whose
    /// nodes all fall inside the node hull of `other`.
    ///
    /// Used as the target when `other` must be resampled onto this
    /// grid's lattice.
    pub fn aligned_subregion(&self, other: &Self) -> Option<Region> {
        let [o_w, o_e, o_s, o_n] = other.node_edges();
        let n_cols = i64::try_from(self.n_columns).ok()?;
        let n_rows = i64::try_from(self.n_rows).ok()?;
        let (k0, k1) = node_span(
            self.region.west,
            self.inc.x,
            self.xy_off(),
            o_w,
            o_e,
            n_cols,
        )?;
        let (j0, j1) = node_span(
            self.region.south,
            self.inc.y,
            self.xy_off(),
            o_s,
            o_n,
            n_rows,
        )?;
        let reg = self.registration.as_index();
        #[allow(clippy::cast_precision_loss)]
        Region::new(
            self.region.west + k0 as f64 * self.inc.x,
            self.region.west + (k1 + reg) as f64 * self.inc.x,
            self.region.south + j0 as f64 * self.inc.y,
            self.region.south + (j1 + reg) as f64 * self.inc.y,
        )
        .ok()
    }

    /// Positions of the outermost nodes: `[west, east, south, north]`.
    fn node_edges(&self) -> [f64; 4] {
        let off = self.xy_off();
        [
            self.region.west + off * self.inc.x,
            self.region.east - off * self.inc.x,
            self.region.south + off * self.inc.y,
            self.region.north - off * self.inc.y,
        ]
    }
}

/// Returns (number of increments, adjusted upper bound).
#[allow(clippy::cast_possible_truncation)]
fn fit(lo: f64, hi: f64, inc: f64, axis: char) -> (i64, f64) {
    let n_f = (hi - lo) / inc;
    let n = n_f.round().max(1.0);
    if (n_f - n).abs() > FIT_TOLERANCE {
        let adjusted = lo + n * inc;
        warn!("{axis}-range {lo}/{hi} not a multiple of increment {inc}; upper bound reset to {adjusted}");
        (n as i64, adjusted)
    } else {
        (n as i64, hi)
    }
}

/// Returns the first and last lattice index whose node lies inside
/// `[lo, hi]`.
#[allow(clippy::cast_possible_truncation)]
fn node_span(origin: f64, inc: f64, off: f64, lo: f64, hi: f64, n: i64) -> Option<(i64, i64)> {
    let k0 = (((lo - origin) / inc - off) - PHASE_TOLERANCE).ceil() as i64;
    let k1 = (((hi - origin) / inc - off) + PHASE_TOLERANCE).floor() as i64;
    let (k0, k1) = (k0.max(0), k1.min(n - 1));
    (k0 < k1).then_some((k0, k1))
}

/// A grid held entirely in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub header: GridHeader,

    /// Samples in row-major order, north row first.
    pub data: Vec<f32>,
}

impl Grid {
    /// Returns a grid of `header`'s shape filled with NaN.
    pub fn new(header: GridHeader) -> Self {
        let data = vec![f32::NAN; header.n_columns * header.n_rows];
        Self { header, data }
    }

    pub fn row(&self, row: usize) -> &[f32] {
        let n = self.header.n_columns;
        &self.data[row * n..(row + 1) * n]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        let n = self.header.n_columns;
        &mut self.data[row * n..(row + 1) * n]
    }

    /// Recomputes `z_min` and `z_max` from the samples.
    pub fn update_extrema(&mut self) {
        let (lo, hi) = self
            .data
            .iter()
            .filter(|z| !z.is_nan())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), z| {
                (lo.min(f64::from(*z)), hi.max(f64::from(*z)))
            });
        if lo <= hi {
            self.header.z_min = lo;
            self.header.z_max = hi;
        } else {
            self.header.z_min = f64::NAN;
            self.header.z_max = f64::NAN;
        }
    }
}
