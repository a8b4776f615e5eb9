use crate::{BlendConfig, BlendError, BlendPlan, Destination, OutputValue, RowCompositor, Writer};
use gridfile::Grid;
use log::{info, trace};

/// Outcome of a completed blend.
#[derive(Debug)]
pub struct BlendSummary {
    pub n_columns: usize,
    pub n_rows: usize,

    /// Nodes that got a value.
    pub filled: u64,

    /// All nodes.
    pub total: u64,

    pub z_min: f64,
    pub z_max: f64,

    /// The output, for memory destinations.
    pub grid: Option<Grid>,
}

/// A plan bound to an output destination, ready to run.
pub struct BlendJob {
    plan: BlendPlan,
    compositor: RowCompositor,
    writer: Writer,
    dest: Destination,
    nodata: f32,
}

impl BlendJob {
    /// Prepares the output. Nothing is read from the sources yet.
    pub fn new(plan: BlendPlan, config: BlendConfig, dest: Destination) -> Result<Self, BlendError> {
        let writer = Writer::create(&dest, plan.header(), plan.tmp_dir())?;
        let compositor = RowCompositor::new(plan.header(), plan.is_geographic(), config);
        if announces_single_grid(plan.n_contributing(), &config) {
            info!("Only 1 grid found; no blending will take place");
        }
        Ok(Self {
            plan,
            compositor,
            writer,
            dest,
            nodata: config.nodata,
        })
    }

    /// Produces every output row in order, calling `on_row(row, n_rows)`
    /// after each is written.
    pub fn run<F>(mut self, mut on_row: F) -> Result<BlendSummary, BlendError>
    where
        F: FnMut(usize, usize),
    {
        let (n_columns, n_rows) = (self.plan.header().n_columns, self.plan.header().n_rows);
        info!("Blended grid size of {} is {n_columns} x {n_rows}", self.dest);

        let mut row_buf = vec![self.nodata; n_columns];
        for row in 0..n_rows {
            self.compositor
                .composite(row, self.plan.sources_mut(), &mut row_buf)?;
            self.writer.write_row(row, &row_buf)?;
            if row % 10 == 0 {
                trace!("processed row {row} of {n_rows}");
            }
            on_row(row, n_rows);
        }

        let stats = *self.compositor.stats();
        let (z_min, z_max) = stats.extrema();
        let grid = self.writer.finish(z_min, z_max)?;
        let total = self.plan.header().nm();
        if stats.filled == total {
            info!("All nodes assigned values");
        } else {
            let nodata = if self.nodata.is_nan() {
                "NaN".to_owned()
            } else {
                self.nodata.to_string()
            };
            info!(
                "{} nodes assigned values, {} set to {nodata}",
                stats.filled,
                total - stats.filled
            );
        }
        Ok(BlendSummary {
            n_columns,
            n_rows,
            filled: stats.filled,
            total,
            z_min,
            z_max,
            grid,
        })
    }
}

/// Weight output reports weights even for a lone grid, so only value
/// output is a no-op worth mentioning.
fn announces_single_grid(n_contributing: usize, config: &BlendConfig) -> bool {
    n_contributing == 1 && config.output == OutputValue::Blended
}
