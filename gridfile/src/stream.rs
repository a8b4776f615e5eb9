use crate::{ascii, native, Grid, GridError, GridFormat, GridHeader, NativeReader, ReadMode};
use std::{path::Path, sync::Arc};

/// Random access to the rows of a grid.
///
/// Rows are numbered from the north edge. Readers are cheapest when
/// rows are requested in increasing order.
pub trait RowReader {
    fn header(&self) -> &GridHeader;

    /// Copies row `row` into `buf`, which must be exactly
    /// `header().n_columns` long.
    fn read_row(&mut self, row: usize, buf: &mut [f32]) -> Result<(), GridError>;
}

/// Row reader over a grid that is already in memory.
#[derive(Debug, Clone)]
pub struct GridRows {
    grid: Arc<Grid>,
}

impl GridRows {
    pub fn new(grid: Arc<Grid>) -> Self {
        Self { grid }
    }
}

impl RowReader for GridRows {
    fn header(&self) -> &GridHeader {
        &self.grid.header
    }

    fn read_row(&mut self, row: usize, buf: &mut [f32]) -> Result<(), GridError> {
        native::check_row(&self.grid.header, row, buf.len())?;
        buf.copy_from_slice(self.grid.row(row));
        Ok(())
    }
}

/// Reads just the header of the grid at `path`.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<GridHeader, GridError> {
    let path = path.as_ref();
    match GridFormat::detect(path) {
        GridFormat::Native => {
            let mut rdr = std::io::BufReader::new(std::fs::File::open(path)?);
            native::read_header(&mut rdr, path)
        }
        GridFormat::Ascii => ascii::read_header(path),
    }
}

/// Opens the grid at `path` for row-by-row reading.
///
/// Fails with [`GridError::NotStreamable`] for formats that must be
/// reformatted first.
pub fn open_rows<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Box<dyn RowReader>, GridError> {
    let path = path.as_ref();
    match GridFormat::detect(path) {
        GridFormat::Native => Ok(Box::new(NativeReader::open(path, mode)?)),
        format @ GridFormat::Ascii => Err(GridError::NotStreamable(format)),
    }
}

/// Reads a whole grid into memory.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Grid, GridError> {
    let path = path.as_ref();
    match GridFormat::detect(path) {
        GridFormat::Native => native::load(path),
        GridFormat::Ascii => ascii::load(path),
    }
}

/// Writes a whole grid in the format implied by `path`.
pub fn store<P: AsRef<Path>>(path: P, grid: &Grid) -> Result<(), GridError> {
    let path = path.as_ref();
    match GridFormat::detect(path) {
        GridFormat::Native => native::store(path, grid),
        GridFormat::Ascii => ascii::store(path, grid),
    }
}
