//! Blends many overlapping grids into one.
//!
//! Each source contributes inside its outer region with a cosine taper
//! that reaches full weight at its inner region. Output rows are built
//! one at a time, north to south, holding at most one row of each
//! source in memory:
//!
//! ```no_run
//! use blend::{BlendConfig, BlendJob, BlendPlan, Destination, OutputSpec, PlanOptions};
//!
//! let records = blend::records_from_files(["a.grd", "b.grd"]);
//! let plan = BlendPlan::build(records, &OutputSpec::default(), &PlanOptions::default())?;
//! let dest = Destination::File {
//!     path: "out.grd".into(),
//!     headerless: false,
//! };
//! let summary = BlendJob::new(plan, BlendConfig::default(), dest)?.run(|_, _| ())?;
//! println!("{} of {} nodes filled", summary.filled, summary.total);
//! # Ok::<(), blend::BlendError>(())
//! ```

mod compositor;
mod control;
mod error;
mod job;
mod plan;
mod source;
mod writer;

pub use crate::{
    compositor::{
        BlendConfig, ClobberMode, Combine, OutputValue, RowCompositor, RowStats, SignFilter,
    },
    control::{parse_control, records_from_files, BlendRecord, InnerRegion},
    error::BlendError,
    job::{BlendJob, BlendSummary},
    plan::{BlendPlan, OutputSpec, PlanOptions},
    source::{taper_weight, GridSource, SourceGeometry, SourceLocation, Taper},
    writer::{Destination, Writer},
};

#[cfg(test)]
pub(crate) mod tests {
    use geo::geometry::Coord;
    use gridfile::{Grid, GridHeader, Region, Registration};

    pub fn header(w: f64, e: f64, s: f64, n: f64, inc: f64, reg: Registration) -> GridHeader {
        GridHeader::new(
            Region::new(w, e, s, n).unwrap(),
            Coord { x: inc, y: inc },
            reg,
        )
        .unwrap()
    }

    /// Unit-spaced gridline grid over `w/e/s/n` with `z = f(x, y)`.
    #[allow(clippy::cast_possible_wrap)]
    pub fn grid<F: Fn(f64, f64) -> f32>(w: f64, e: f64, s: f64, n: f64, f: F) -> Grid {
        let mut grid = Grid::new(header(w, e, s, n, 1.0, Registration::Gridline));
        for row in 0..grid.header.n_rows {
            let y = grid.header.row_to_y(row as i64);
            for col in 0..grid.header.n_columns {
                let x = grid.header.col_to_x(col as i64);
                grid.row_mut(row)[col] = f(x, y);
            }
        }
        grid.update_extrema();
        grid
    }
}
