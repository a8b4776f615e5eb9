//! Per-row combination of the active sources.

use crate::{BlendError, GridSource};
use gridfile::GridHeader;
use std::str::FromStr;

/// Which single source wins a cell in clobber mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClobberMode {
    /// Earliest listed source.
    First,
    /// Latest listed source.
    Last,
    Highest,
    Lowest,
}

/// Restricts which values may clobber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignFilter {
    #[default]
    Any,
    /// Only values ≥ 0 (`+p`).
    NonNegative,
    /// Only values ≤ 0 (`+n`).
    NonPositive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combine {
    /// Taper-weighted average.
    #[default]
    Blend,
    Clobber { mode: ClobberMode, sign: SignFilter },
}

/// What is written for a covered cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputValue {
    #[default]
    Blended,
    /// Sum of the weights.
    WeightSum,
    /// Sum of the weights times the blended value.
    WeightedZ,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendConfig {
    pub combine: Combine,
    pub output: OutputValue,

    /// Multiplies blended values.
    pub scale: Option<f64>,

    /// Written where no source contributes.
    pub nodata: f32,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            combine: Combine::default(),
            output: OutputValue::default(),
            scale: None,
            nodata: f32::NAN,
        }
    }
}

impl FromStr for Combine {
    type Err = String;

    /// Parses `f|l|o|u|first|last|lowest|highest`, optionally suffixed
    /// with `+p` or `+n`.
    fn from_str(s: &str) -> Result<Self, String> {
        let (mode, sign) = match s.split_once('+') {
            None => (s, SignFilter::Any),
            Some((mode, "p")) => (mode, SignFilter::NonNegative),
            Some((mode, "n")) => (mode, SignFilter::NonPositive),
            Some((_, other)) => return Err(format!("unknown clobber modifier +{other}")),
        };
        let mode = match mode {
            "f" | "first" => ClobberMode::First,
            "l" | "lowest" => ClobberMode::Lowest,
            "o" | "last" => ClobberMode::Last,
            "u" | "highest" => ClobberMode::Highest,
            other => return Err(format!("unknown clobber mode {other}")),
        };
        Ok(Self::Clobber { mode, sign })
    }
}

/// Running totals over every row produced so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowStats {
    /// Cells that got a value.
    pub filled: u64,
    pub z_min: f64,
    pub z_max: f64,
}

impl Default for RowStats {
    fn default() -> Self {
        Self {
            filled: 0,
            z_min: f64::INFINITY,
            z_max: f64::NEG_INFINITY,
        }
    }
}

impl RowStats {
    fn record(&mut self, z: f32) {
        let z = f64::from(z);
        self.filled += 1;
        self.z_min = self.z_min.min(z);
        self.z_max = self.z_max.max(z);
    }

    /// Extrema, or NaN when nothing was filled.
    pub fn extrema(&self) -> (f64, f64) {
        if self.filled == 0 {
            (f64::NAN, f64::NAN)
        } else {
            (self.z_min, self.z_max)
        }
    }
}

/// Accumulator for one output cell.
#[derive(Debug, Default)]
struct Cell {
    /// Weighted sum in blend mode, the kept value in clobber mode.
    z: f64,
    w: f64,
    /// Number of contributions.
    m: u32,
    /// A sign-filtered clobber has seen its first value.
    seeded: bool,
}

impl Cell {
    fn blend(&mut self, value: f64, wt: f64) {
        self.z += wt * value;
        self.w += wt;
        self.m += 1;
    }

    fn clobber(&mut self, value: f64, mode: ClobberMode, sign: SignFilter) {
        let keep_current = match mode {
            ClobberMode::First => self.m > 0,
            ClobberMode::Highest => self.m > 0 && value <= self.z,
            ClobberMode::Lowest => self.m > 0 && value >= self.z,
            ClobberMode::Last => false,
        };
        if keep_current {
            return;
        }
        // The first value seen is taken whatever its sign, so a cell
        // where nothing passes the filter still gets a value.
        match sign {
            SignFilter::Any => (),
            _ if !self.seeded => {
                self.z = value;
                self.seeded = true;
                return;
            }
            SignFilter::NonPositive if value > 0.0 => return,
            SignFilter::NonNegative if value < 0.0 => return,
            _ => (),
        }
        self.z = value;
        self.w = 1.0;
        self.m = 1;
    }

    fn finish(mut self, config: &BlendConfig) -> Option<f64> {
        if let Combine::Clobber { sign, .. } = config.combine {
            if sign != SignFilter::Any && self.m == 0 && self.seeded {
                self.m = 1;
                self.w = 1.0;
            }
        }
        if self.m == 0 {
            return None;
        }
        Some(match config.output {
            OutputValue::Blended => {
                let z = if self.w == 0.0 { 0.0 } else { self.z / self.w };
                z * config.scale.unwrap_or(1.0)
            }
            OutputValue::WeightSum => self.w,
            OutputValue::WeightedZ => self.z,
        })
    }
}

/// Produces blended output rows from a plan's sources.
pub struct RowCompositor {
    config: BlendConfig,

    /// Offset of a node from its cell edge, in increments.
    half: f64,

    /// Columns per 360 degrees, for periodic longitude.
    nx_360: Option<i64>,

    stats: RowStats,
}

impl RowCompositor {
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(header: &GridHeader, geographic: bool, config: BlendConfig) -> Self {
        let nx_360 = geographic.then(|| (360.0 / header.inc.x).round() as i64);
        Self {
            config,
            half: header.xy_off(),
            nx_360,
            stats: RowStats::default(),
        }
    }

    pub fn stats(&self) -> &RowStats {
        &self.stats
    }

    /// Brings every source up to `row` and writes the combined row into
    /// `out`.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    pub fn composite(
        &mut self,
        row: usize,
        sources: &mut [GridSource],
        out: &mut [f32],
    ) -> Result<(), BlendError> {
        for src in sources.iter_mut() {
            src.sync(row, self.half)?;
        }
        let active: Vec<(&GridSource, &[f32], f64)> = sources
            .iter()
            .filter_map(|src| src.active_row().map(|(buf, wt_y)| (src, buf, wt_y)))
            .collect();

        for (col, out_z) in out.iter_mut().enumerate() {
            let mut cell = Cell::default();
            for (src, buf, wt_y) in &active {
                let Some(pcol) = src.geometry().wrap_col(col as i64, self.nx_360) else {
                    continue;
                };
                let Some(&value) = buf.get((pcol - src.geometry().out_i0) as usize) else {
                    continue;
                };
                if value.is_nan() {
                    continue;
                }
                let value = f64::from(value);
                match self.config.combine {
                    Combine::Clobber { mode, sign } => cell.clobber(value, mode, sign),
                    Combine::Blend => {
                        let mut wt = src.wt_x(pcol, self.half) * wt_y;
                        if src.is_inverted() {
                            wt = src.weight() - wt;
                        }
                        cell.blend(value, wt);
                    }
                }
            }
            *out_z = match cell.finish(&self.config) {
                #[allow(clippy::cast_possible_truncation)]
                Some(z) => {
                    let z = z as f32;
                    self.stats.record(z);
                    z
                }
                None => self.config.nodata,
            };
        }
        Ok(())
    }
}
