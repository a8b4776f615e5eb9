//! Resolves a list of blend records against the output grid.

use crate::{BlendError, BlendRecord, GridSource, InnerRegion, SourceLocation};
use geo::geometry::Coord;
use gridfile::{
    Capability, GridFormat, GridHeader, ReadMode, Region, Registration, ResampleTarget,
};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Requested output geometry. Anything left `None` is derived from the
/// sources.
#[derive(Debug, Clone, Default)]
pub struct OutputSpec {
    pub region: Option<Region>,
    pub inc: Option<Coord<f64>>,
    pub registration: Option<Registration>,

    /// Treat x as longitude, periodic over 360 degrees.
    pub geographic: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Where resampled and reformatted copies go; the system temp
    /// directory when `None`.
    pub tmp_dir: Option<PathBuf>,

    pub read_mode: ReadMode,
}

/// Every source placed in the output raster, plus the output header.
pub struct BlendPlan {
    header: GridHeader,
    sources: Vec<GridSource>,
    geographic: bool,
    tmp_dir: Option<PathBuf>,
}

/// Why a source has to be rewritten before it can be streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewrite {
    /// Only the format is wrong.
    Reformat,
    /// Spacing, phase or registration differ from the output.
    Resample,
}

impl BlendPlan {
    pub fn build(
        records: Vec<BlendRecord>,
        spec: &OutputSpec,
        opts: &PlanOptions,
    ) -> Result<Self, BlendError> {
        if records.is_empty() {
            return Err(BlendError::NoInput);
        }

        let mut sources = Vec::with_capacity(records.len());
        for record in records {
            let header = source_header(&record.source)?;
            let inner = match record.inner {
                InnerRegion::Outer => header.region,
                InnerRegion::Explicit(region) => region,
            };
            sources.push((
                record.inner,
                GridSource::new(record.source, header, inner, record.weight, opts.read_mode),
            ));
        }

        let header = output_header(sources.iter().map(|(_, s)| s.header()), spec)?;
        info!(
            "output grid {} at {}/{} ({:?}), {} x {}",
            header.region,
            header.inc.x,
            header.inc.y,
            header.registration,
            header.n_columns,
            header.n_rows
        );

        let mut plan = Self {
            header,
            sources: Vec::with_capacity(sources.len()),
            geographic: spec.geographic,
            tmp_dir: opts.tmp_dir.clone(),
        };
        for (idx, (inner, mut src)) in sources.into_iter().enumerate() {
            plan.resolve(idx, inner, &mut src)?;
            plan.sources.push(src);
        }

        if plan.n_contributing() == 0 {
            warn!("no input grid overlaps the output region; output will be all no-data");
        }
        Ok(plan)
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn sources(&self) -> &[GridSource] {
        &self.sources
    }

    pub(crate) fn sources_mut(&mut self) -> &mut [GridSource] {
        &mut self.sources
    }

    pub fn is_geographic(&self) -> bool {
        self.geographic
    }

    pub fn tmp_dir(&self) -> Option<&Path> {
        self.tmp_dir.as_deref()
    }

    /// Number of sources that can contribute to the output.
    pub fn n_contributing(&self) -> usize {
        self.sources.iter().filter(|s| !s.is_ignored()).count()
    }
}

/// Private API.
impl BlendPlan {
    /// Decides whether `src` contributes, rewrites it if it can't be
    /// streamed as-is, and places it in the output raster.
    fn resolve(
        &self,
        idx: usize,
        inner: InnerRegion,
        src: &mut GridSource,
    ) -> Result<(), BlendError> {
        let name = src.location().to_string();
        let out = &self.header;

        if !out.region.overlaps_y(&src.header().region) {
            debug!("{name} entirely outside y-range of output region (skipped)");
            src.set_ignore();
            return Ok(());
        }
        if self.geographic {
            if !self.wrap_to_output(src, &name) {
                return Ok(());
            }
        } else if !out.region.overlaps(&src.header().region) {
            debug!("{name} entirely outside x-range of output region (skipped)");
            src.set_ignore();
            return Ok(());
        }

        if let Some(rewrite) = self.rewrite_needed(src, &name) {
            let (artifact, header) = self.rewrite(idx, rewrite, src, &name)?;
            src.replace_with(artifact, header);
            if self.geographic && !self.wrap_outer(src, &name) {
                return Ok(());
            }
            // The rewritten grid may be smaller than what was asked
            // for; keep the full-weight block inside it.
            let inner = match inner {
                InnerRegion::Outer => src.header().region,
                InnerRegion::Explicit(_) => src
                    .inner()
                    .intersection(&src.header().region)
                    .unwrap_or(src.header().region),
            };
            src.set_inner(inner);
        }

        src.resolve_weight();
        src.place(out);
        let g = src.geometry();
        debug!(
            "{name}: out: {}/{}/{}/{} in: {}/{}/{}/{} row offset: {} weight: {}{}",
            g.out_i0,
            g.out_i1,
            g.out_j1,
            g.out_j0,
            g.in_i0,
            g.in_i1,
            g.in_j1,
            g.in_j0,
            src.row_offset(),
            src.weight(),
            if src.is_inverted() { " (inverted)" } else { "" }
        );
        Ok(())
    }

    /// Shifts the outer and then the inner region of `src` by whole
    /// turns so they overlap the output longitudes. Returns false, and
    /// marks the source ignored, when no shift does.
    fn wrap_to_output(&self, src: &mut GridSource, name: &str) -> bool {
        if !self.wrap_outer(src, name) {
            return false;
        }
        let src_global = src.header().region.is_global_lon();
        match lon_shift(src.inner(), &self.header.region, src_global) {
            None => {
                debug!("{name} inner region entirely outside longitude range of output (skipped)");
                src.set_ignore();
                false
            }
            Some(delta) => {
                if delta != 0.0 {
                    debug!("{name} inner region shifted {delta} degrees to fit output region");
                    src.shift_inner_lon(delta);
                }
                true
            }
        }
    }

    fn wrap_outer(&self, src: &mut GridSource, name: &str) -> bool {
        let region = src.header().region;
        match lon_shift(&region, &self.header.region, region.is_global_lon()) {
            None => {
                debug!("{name} entirely outside longitude range of output region (skipped)");
                src.set_ignore();
                false
            }
            Some(delta) => {
                if delta != 0.0 {
                    debug!("{name} region shifted {delta} degrees to fit output region");
                    src.shift_lon(delta);
                }
                true
            }
        }
    }

    fn rewrite_needed(&self, src: &GridSource, name: &str) -> Option<Rewrite> {
        let out = &self.header;
        let h = src.header();
        let resample = if h.increment_differs(out) {
            debug!(
                "{name} has increments {}/{}, output has {}/{}; must resample",
                h.inc.x, h.inc.y, out.inc.x, out.inc.y
            );
            true
        } else if h.registration != out.registration {
            debug!("{name} has {:?} registration; must resample", h.registration);
            true
        } else if h.is_out_of_phase(out) {
            debug!("{name} is phase-shifted relative to the output grid; must resample");
            true
        } else {
            false
        };
        let streamable = match src.location() {
            SourceLocation::File(path) => {
                GridFormat::detect(path).capability() == Capability::Streamable
            }
            SourceLocation::Memory(_) => true,
        };
        if resample {
            Some(Rewrite::Resample)
        } else if !streamable {
            debug!("{name} can't be read row by row; must reformat");
            Some(Rewrite::Reformat)
        } else {
            None
        }
    }

    /// Writes a streamable, conformant copy of `src` to a temporary
    /// file and returns it with its header.
    fn rewrite(
        &self,
        idx: usize,
        rewrite: Rewrite,
        src: &GridSource,
        name: &str,
    ) -> Result<(TempPath, GridHeader), BlendError> {
        let mk_err = |source| BlendError::Resample {
            name: name.to_owned(),
            source,
        };
        let prefix = match rewrite {
            Rewrite::Reformat => format!("grdblend_reformatted_{idx}_"),
            Rewrite::Resample => format!("grdblend_resampled_{idx}_"),
        };
        let dst = self.temp_path(&prefix)?;

        // Memory grids are spilled to disk so both rewrites can work
        // from a file.
        let (spill, src_path) = match src.location() {
            SourceLocation::File(path) => (None, path.clone()),
            SourceLocation::Memory(grid) => {
                let spill = self.temp_path(&format!("grdblend_spill_{idx}_"))?;
                gridfile::store(&spill, grid).map_err(mk_err)?;
                let path = spill.to_path_buf();
                (Some(spill), path)
            }
        };

        // Headers in the plan may be shifted by whole turns; the file
        // on disk is not.
        let on_disk = source_header(src.location())?;
        let lon_delta = src.header().region.west - on_disk.region.west;

        match rewrite {
            Rewrite::Reformat => {
                info!("reformatting {name}");
                gridfile::reformat(&src_path, &dst).map_err(mk_err)?;
            }
            Rewrite::Resample => {
                let region = self
                    .header
                    .aligned_subregion(src.header())
                    .ok_or_else(|| {
                        mk_err(gridfile::GridError::EmptyResample(
                            src.header().region.to_string(),
                        ))
                    })?
                    .shift_lon(-lon_delta);
                let target = ResampleTarget {
                    region,
                    inc: self.header.inc,
                    registration: self.header.registration,
                };
                info!("resampling {name} onto {region}");
                gridfile::resample(&src_path, &target, &dst).map_err(mk_err)?;
            }
        }
        drop(spill);

        let header = gridfile::read_header(&dst).map_err(mk_err)?;
        Ok((dst, header))
    }

    fn temp_path(&self, prefix: &str) -> Result<TempPath, BlendError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(".grd");
        let file = match &self.tmp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.into_temp_path())
    }
}

fn source_header(location: &SourceLocation) -> Result<GridHeader, BlendError> {
    match location {
        SourceLocation::File(path) => {
            gridfile::read_header(path).map_err(|source| BlendError::Open {
                path: path.clone(),
                source,
            })
        }
        SourceLocation::Memory(grid) => Ok(grid.header.clone()),
    }
}

/// Builds the output header, deriving whatever `spec` leaves open from
/// the source headers.
fn output_header<'a, I>(headers: I, spec: &OutputSpec) -> Result<GridHeader, BlendError>
where
    I: Iterator<Item = &'a GridHeader> + Clone,
{
    let mut iter = headers.clone();
    let first = iter.next().ok_or(BlendError::NoInput)?;

    let region = match spec.region {
        Some(region) => region,
        None => headers
            .clone()
            .fold(first.region, |acc, h| acc.union(&h.region)),
    };

    let inc = match spec.inc {
        Some(inc) => inc,
        None => {
            if let Some(h) = headers.clone().find(|h| h.increment_differs(first)) {
                return Err(BlendError::IncrementMismatch(format!(
                    "{}/{} vs {}/{}",
                    first.inc.x, first.inc.y, h.inc.x, h.inc.y
                )));
            }
            first.inc
        }
    };

    let registration = match spec.registration {
        Some(reg) => reg,
        None => {
            let common = headers
                .clone()
                .all(|h| h.registration == first.registration);
            match (common, spec.inc) {
                (true, _) => first.registration,
                (false, Some(_)) => Registration::Gridline,
                (false, None) => return Err(BlendError::RegistrationMismatch),
            }
        }
    };

    Ok(GridHeader::new(region, inc, registration)?)
}

/// Returns the longitude shift, a multiple of 360, that makes `region`
/// overlap `out`, or `None` if no shift does.
fn lon_shift(region: &Region, out: &Region, src_global: bool) -> Option<f64> {
    if out.is_global_lon() || src_global {
        return Some(0.0);
    }
    let mut delta = -720.0;
    let (mut west, mut east) = (region.west + delta, region.east + delta);
    while east < out.west {
        west += 360.0;
        east += 360.0;
        delta += 360.0;
    }
    (west <= out.east).then_some(delta)
}

#[cfg(test)]
mod tests {
    use super::{lon_shift, BlendPlan, OutputSpec, PlanOptions};
    use crate::{
        control::records_from_files, tests::grid, BlendError, BlendRecord, InnerRegion,
        SourceLocation,
    };
    use approx::assert_relative_eq;
    use geo::geometry::Coord;
    use gridfile::{GridHeader, Region, Registration};
    use std::sync::Arc;

    fn mem(w: f64, e: f64, s: f64, n: f64) -> BlendRecord {
        BlendRecord::new(SourceLocation::Memory(Arc::new(grid(w, e, s, n, |x, _| {
            x as f32
        }))))
    }

    #[test]
    fn test_lon_shift() {
        let out = Region::new(0.0, 300.0, -10.0, 10.0).unwrap();
        let src = Region::new(-100.0, -80.0, -10.0, 10.0).unwrap();
        assert_eq!(lon_shift(&src, &out, false), Some(360.0));
        let src = Region::new(350.0, 370.0, -10.0, 10.0).unwrap();
        assert_eq!(lon_shift(&src, &out, false), Some(-360.0));
        let src = Region::new(10.0, 20.0, -10.0, 10.0).unwrap();
        assert_eq!(lon_shift(&src, &out, false), Some(0.0));
        let src = Region::new(310.0, 340.0, -10.0, 10.0).unwrap();
        assert_eq!(lon_shift(&src, &out, false), None);
        assert_eq!(lon_shift(&src, &out, true), Some(0.0));
        let global = Region::new(0.0, 360.0, -10.0, 10.0).unwrap();
        assert_eq!(lon_shift(&src, &global, false), Some(0.0));
    }

    #[test]
    fn test_derived_output_header() {
        let plan = BlendPlan::build(
            vec![mem(0.0, 10.0, 0.0, 5.0), mem(5.0, 15.0, 2.0, 8.0)],
            &OutputSpec::default(),
            &PlanOptions::default(),
        )
        .unwrap();
        let h = plan.header();
        assert_eq!(h.region, Region::new(0.0, 15.0, 0.0, 8.0).unwrap());
        assert_eq!(h.registration, Registration::Gridline);
        assert_eq!((h.n_columns, h.n_rows), (16, 9));
        assert_eq!(plan.n_contributing(), 2);
        let g = plan.sources()[1].geometry();
        assert_eq!((g.out_i0, g.out_i1, g.out_j0, g.out_j1), (5, 15, 0, 6));
    }

    #[test]
    fn test_differing_increments_need_explicit_increment() {
        let coarse = {
            let h = GridHeader::new(
                Region::new(0.0, 10.0, 0.0, 10.0).unwrap(),
                Coord { x: 2.0, y: 2.0 },
                Registration::Gridline,
            )
            .unwrap();
            BlendRecord::new(SourceLocation::Memory(Arc::new(gridfile::Grid::new(h))))
        };
        let result = BlendPlan::build(
            vec![mem(0.0, 10.0, 0.0, 10.0), coarse.clone()],
            &OutputSpec::default(),
            &PlanOptions::default(),
        );
        assert!(matches!(result, Err(BlendError::IncrementMismatch(_))));

        let dir = tempfile::tempdir().unwrap();
        let opts = PlanOptions {
            tmp_dir: Some(dir.path().to_owned()),
            ..PlanOptions::default()
        };
        let spec = OutputSpec {
            inc: Some(Coord { x: 1.0, y: 1.0 }),
            ..OutputSpec::default()
        };
        let plan = BlendPlan::build(vec![mem(0.0, 10.0, 0.0, 10.0), coarse], &spec, &opts).unwrap();
        assert!(!plan.sources()[0].has_artifact());
        assert!(plan.sources()[1].has_artifact());
        assert_relative_eq!(plan.sources()[1].header().inc.x, 1.0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        drop(plan);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sources_outside_output_are_ignored() {
        let spec = OutputSpec {
            region: Some(Region::new(0.0, 10.0, 0.0, 10.0).unwrap()),
            ..OutputSpec::default()
        };
        let plan = BlendPlan::build(
            vec![
                mem(0.0, 10.0, 0.0, 10.0),
                mem(20.0, 30.0, 0.0, 10.0),
                mem(0.0, 10.0, 20.0, 30.0),
            ],
            &spec,
            &PlanOptions::default(),
        )
        .unwrap();
        let ignored: Vec<bool> = plan.sources().iter().map(|s| s.is_ignored()).collect();
        assert_eq!(ignored, vec![false, true, true]);
        assert_eq!(plan.n_contributing(), 1);
    }

    #[test]
    fn test_phase_shift_resamples_onto_output_lattice() {
        let dir = tempfile::tempdir().unwrap();
        let opts = PlanOptions {
            tmp_dir: Some(dir.path().to_owned()),
            ..PlanOptions::default()
        };
        let spec = OutputSpec {
            region: Some(Region::new(0.0, 10.0, 0.0, 10.0).unwrap()),
            inc: Some(Coord { x: 1.0, y: 1.0 }),
            ..OutputSpec::default()
        };
        let plan = BlendPlan::build(vec![mem(2.5, 6.5, 3.0, 7.0)], &spec, &opts).unwrap();
        let src = &plan.sources()[0];
        assert!(src.has_artifact());
        assert_eq!(src.header().region, Region::new(3.0, 6.0, 3.0, 7.0).unwrap());
        assert_eq!(src.inner(), &src.header().region);
        let g = src.geometry();
        assert_eq!((g.out_i0, g.out_i1), (3, 6));
    }

    #[test]
    fn test_negative_weight_inverts() {
        let mut record = mem(0.0, 10.0, 0.0, 10.0);
        record.weight = -2.0;
        record.inner = InnerRegion::Explicit(Region::new(2.0, 8.0, 2.0, 8.0).unwrap());
        let plan =
            BlendPlan::build(vec![record], &OutputSpec::default(), &PlanOptions::default())
                .unwrap();
        let src = &plan.sources()[0];
        assert!(src.is_inverted());
        assert_relative_eq!(src.weight(), 2.0);
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = BlendPlan::build(
            records_from_files(["/nonexistent/a.grd"]),
            &OutputSpec::default(),
            &PlanOptions::default(),
        );
        assert!(matches!(result, Err(BlendError::Open { .. })));
    }
}
