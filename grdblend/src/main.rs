mod options;
mod progress;

use anyhow::Result;
use blend::{BlendJob, BlendPlan};
use clap::Parser;
use log::info;
use options::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    let records = cli.records()?;
    let plan = BlendPlan::build(records, &cli.output_spec(), &cli.plan_options())?;
    let n_rows = plan.header().n_rows as u64;
    let job = BlendJob::new(plan, cli.blend_config(), cli.destination())?;

    let pb = progress::bar(format!("Blending {}", cli.output.display()), n_rows, cli.progress)?;
    let summary = job.run(|row, _| pb.set_position(row as u64 + 1))?;
    pb.finish_and_clear();

    info!(
        "Wrote {} ({} x {}), z range {} to {}",
        cli.output.display(),
        summary.n_columns,
        summary.n_rows,
        summary.z_min,
        summary.z_max
    );
    Ok(())
}
