use anyhow::{bail, Context, Result};
use blend::{
    parse_control, records_from_files, BlendConfig, BlendRecord, Combine, Destination,
    OutputSpec, OutputValue, PlanOptions,
};
use clap::{Parser, ValueEnum};
use geo::geometry::Coord;
use gridfile::{parse_increment, ReadMode, Region, Registration};
use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
};

/// Blend several partially overlapping grids into one, tapering each
/// toward its edges.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output grid. The extension selects the format (`.asc` for ESRI
    /// ASCII, anything else for native binary).
    #[arg(short = 'G', long)]
    pub output: PathBuf,

    /// Output region "w/e/s/n". Defaults to the union of all inputs.
    #[arg(short = 'R', long, allow_hyphen_values = true)]
    pub region: Option<Region>,

    /// Output increment "dx[/dy]". Defaults to the inputs' common
    /// increment.
    #[arg(short = 'I', long, value_parser = parse_increment)]
    pub increment: Option<Coord<f64>>,

    /// Pixel registration for the output grid. Without it the inputs'
    /// common registration is used, or gridline if they disagree.
    #[arg(short = 'r', long)]
    pub pixel: bool,

    /// Treat x as longitude, periodic over 360 degrees.
    #[arg(long)]
    pub geographic: bool,

    /// Pick one value per node instead of blending:
    /// f|first, l|lowest, o|last, u|highest. Append +p or +n to only
    /// consider values >= 0 or <= 0.
    #[arg(short = 'C', long)]
    pub clobber: Option<Combine>,

    /// Value for nodes no input covers ("NaN" or a number).
    #[arg(short = 'N', long, allow_hyphen_values = true, default_value_t = f32::NAN)]
    pub nodata: f32,

    /// Write rows only, without a header. Native format only.
    #[arg(short = 'Q', long)]
    pub no_header: bool,

    /// Write summed weights instead of blended values; "=z" writes
    /// weight times value.
    #[arg(
        short = 'W',
        long,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "sum"
    )]
    pub weights: Option<Weights>,

    /// Multiply blended values by this factor.
    #[arg(short = 'Z', long, allow_hyphen_values = true)]
    pub scale: Option<f64>,

    /// Memory map native inputs instead of buffered reads.
    #[arg(long)]
    pub mmap: bool,

    /// Directory for resampled and reformatted intermediates.
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Show a progress bar.
    #[arg(long)]
    pub progress: bool,

    /// More logging; repeat for more.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// A control file ("-" or nothing for stdin), or two or more grids.
    ///
    /// Control file lines are "file [-Rw/e/s/n] [weight]".
    pub input: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Weights {
    Sum,
    Z,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    pub fn records(&self) -> Result<Vec<BlendRecord>> {
        let records = match &self.input[..] {
            [] => parse_control(io::stdin().lock())?,
            [path] if path.as_os_str() == "-" => parse_control(io::stdin().lock())?,
            [path] => {
                let file = File::open(path)
                    .with_context(|| format!("opening control file {}", path.display()))?;
                parse_control(BufReader::new(file))
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            paths => records_from_files(paths.iter().cloned()),
        };
        if records.is_empty() {
            bail!("no input grids given");
        }
        Ok(records)
    }

    pub fn output_spec(&self) -> OutputSpec {
        OutputSpec {
            region: self.region,
            inc: self.increment,
            registration: self.pixel.then_some(Registration::Pixel),
            geographic: self.geographic,
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            tmp_dir: self.tmp_dir.clone(),
            read_mode: if self.mmap {
                ReadMode::MemMap
            } else {
                ReadMode::Buffered
            },
        }
    }

    pub fn blend_config(&self) -> BlendConfig {
        BlendConfig {
            combine: self.clobber.unwrap_or_default(),
            output: match self.weights {
                None => OutputValue::Blended,
                Some(Weights::Sum) => OutputValue::WeightSum,
                Some(Weights::Z) => OutputValue::WeightedZ,
            },
            scale: self.scale,
            nodata: self.nodata,
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::File {
            path: self.output.clone(),
            headerless: self.no_header,
        }
    }
}
