use crate::BlendError;
use gridfile::{Grid, GridError, GridFormat, GridHeader, NativeWriter};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Where blended rows go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File {
        path: PathBuf,
        /// Rows only, no header. Native format only.
        headerless: bool,
    },

    /// Collect rows into a [`Grid`] returned by [`Writer::finish`].
    Memory,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File { path, .. } => write!(f, "{}", path.display()),
            Self::Memory => f.write_str("<memory>"),
        }
    }
}

/// Accepts finished output rows in order.
pub struct Writer {
    sink: Sink,
}

enum Sink {
    Direct {
        wtr: NativeWriter,
        path: PathBuf,
    },

    /// Streams into a native temporary file that is converted to
    /// `path`'s format at the end.
    Reformat {
        wtr: NativeWriter,
        tmp: TempPath,
        path: PathBuf,
    },

    Memory(Grid),
}

impl Writer {
    /// Prepares `dest` for a grid shaped like `header`.
    ///
    /// Fails before touching the file system if `dest` asks for
    /// something its format can't do.
    pub fn create(
        dest: &Destination,
        header: &GridHeader,
        tmp_dir: Option<&Path>,
    ) -> Result<Self, BlendError> {
        let sink = match dest {
            Destination::Memory => Sink::Memory(Grid::new(header.clone())),
            Destination::File { path, headerless } => {
                let format = GridFormat::detect(path);
                if *headerless && !format.supports_headerless() {
                    return Err(BlendError::Write {
                        path: path.clone(),
                        source: GridError::Headerless(format),
                    });
                }
                let mk_err = |source| BlendError::Write {
                    path: path.clone(),
                    source,
                };
                if format.is_streamable() {
                    let wtr = NativeWriter::create(path, header, *headerless).map_err(mk_err)?;
                    Sink::Direct {
                        wtr,
                        path: path.clone(),
                    }
                } else {
                    let mut builder = tempfile::Builder::new();
                    builder.prefix("grdblend_output_").suffix(".grd");
                    let tmp = match tmp_dir {
                        Some(dir) => builder.tempfile_in(dir)?,
                        None => builder.tempfile()?,
                    }
                    .into_temp_path();
                    debug!(
                        "{:?} output can't be streamed; writing {} first",
                        format,
                        tmp.display()
                    );
                    let wtr = NativeWriter::create(&tmp, header, false).map_err(mk_err)?;
                    Sink::Reformat {
                        wtr,
                        tmp,
                        path: path.clone(),
                    }
                }
            }
        };
        Ok(Self { sink })
    }

    pub fn write_row(&mut self, row: usize, values: &[f32]) -> Result<(), BlendError> {
        match &mut self.sink {
            Sink::Direct { wtr, path } | Sink::Reformat { wtr, path, .. } => {
                wtr.write_row(row, values)
                    .map_err(|source| BlendError::Write {
                        path: path.clone(),
                        source,
                    })
            }
            Sink::Memory(grid) => {
                if row >= grid.header.n_rows || values.len() != grid.header.n_columns {
                    return Err(BlendError::Config(format!(
                        "row {row} of {} values does not fit a {} x {} grid",
                        values.len(),
                        grid.header.n_columns,
                        grid.header.n_rows
                    )));
                }
                grid.row_mut(row).copy_from_slice(values);
                Ok(())
            }
        }
    }

    /// Completes the output, returning the grid for memory
    /// destinations.
    pub fn finish(self, z_min: f64, z_max: f64) -> Result<Option<Grid>, BlendError> {
        match self.sink {
            Sink::Direct { wtr, path } => {
                wtr.finish(z_min, z_max)
                    .map_err(|source| BlendError::Write { path, source })?;
                Ok(None)
            }
            Sink::Reformat { wtr, tmp, path } => {
                let mk_err = |source| BlendError::Write {
                    path: path.clone(),
                    source,
                };
                wtr.finish(z_min, z_max).map_err(mk_err)?;
                gridfile::reformat(&tmp, &path).map_err(mk_err)?;
                let tmp_path = tmp.to_path_buf();
                if let Err(e) = tmp.close() {
                    warn!("failed to delete {}: {e}", tmp_path.display());
                }
                Ok(None)
            }
            Sink::Memory(mut grid) => {
                grid.header.z_min = z_min;
                grid.header.z_max = z_max;
                Ok(Some(grid))
            }
        }
    }
}
