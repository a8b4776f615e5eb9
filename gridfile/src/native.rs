//! Native binary grid format.
//!
//! ```text
//! offset  size  field
//!      0     4  magic "NGRD"
//!      4     1  registration (0 gridline, 1 pixel)
//!      5     3  padding
//!      8     4  n_columns (u32)
//!     12     4  n_rows (u32)
//!     16    32  west, east, south, north (f64)
//!     48    16  x_inc, y_inc (f64)
//!     64    16  z_min, z_max (f64)
//!     80     -  n_rows * n_columns f32 samples, north row first
//! ```
//!
//! All values are little-endian. NaN marks a missing sample.

use crate::{Grid, GridError, GridHeader, Region, Registration, RowReader};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use geo::geometry::Coord;
use memmap2::Mmap;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    mem::size_of,
    path::Path,
};

pub const HEADER_LEN: u64 = 80;

const MAGIC: &[u8; 4] = b"NGRD";

/// How a native grid's rows are fetched from disk.
///
/// As with tile loading, whether mapping beats buffered reads depends
/// on the access pattern and the OS; measure before choosing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Buffered reads, seeking only when a row is skipped.
    #[default]
    Buffered,

    /// Memory map file contents.
    MemMap,
}

/// Row-by-row reader for a native grid file.
pub struct NativeReader {
    header: GridHeader,
    store: RowStore,
}

enum RowStore {
    Buffered {
        rdr: BufReader<File>,
        /// Row the file cursor currently points at.
        next_row: usize,
    },
    MemMap(Mmap),
}

impl NativeReader {
    pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Self, GridError> {
        let path = path.as_ref().to_owned();
        let mut rdr = BufReader::new(File::open(&path)?);
        let header = read_header(&mut rdr, &path)?;
        let store = match mode {
            ReadMode::Buffered => RowStore::Buffered { rdr, next_row: 0 },
            ReadMode::MemMap => {
                let file = rdr.into_inner();
                let mmap = unsafe { Mmap::map(&file)? };
                let needed = HEADER_LEN + header.nm() * size_of::<f32>() as u64;
                if (mmap.len() as u64) < needed {
                    return Err(GridError::Header {
                        path,
                        reason: format!("file holds {} bytes, need {needed}", mmap.len()),
                    });
                }
                RowStore::MemMap(mmap)
            }
        };
        Ok(Self { header, store })
    }

    fn row_offset(&self, row: usize) -> u64 {
        HEADER_LEN + (row * self.header.n_columns * size_of::<f32>()) as u64
    }
}

impl RowReader for NativeReader {
    fn header(&self) -> &GridHeader {
        &self.header
    }

    fn read_row(&mut self, row: usize, buf: &mut [f32]) -> Result<(), GridError> {
        check_row(&self.header, row, buf.len())?;
        let offset = self.row_offset(row);
        match &mut self.store {
            RowStore::Buffered { rdr, next_row } => {
                if *next_row != row {
                    rdr.seek(SeekFrom::Start(offset))?;
                }
                rdr.read_f32_into::<LE>(buf)?;
                *next_row = row + 1;
            }
            RowStore::MemMap(raw) => {
                #[allow(clippy::cast_possible_truncation)]
                let start = offset as usize;
                let end = start + buf.len() * size_of::<f32>();
                let bytes = &mut &raw.as_ref()[start..end];
                bytes.read_f32_into::<LE>(buf)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn check_row(header: &GridHeader, row: usize, len: usize) -> Result<(), GridError> {
    if row >= header.n_rows {
        return Err(GridError::RowOutOfRange {
            row,
            n_rows: header.n_rows,
        });
    }
    if len != header.n_columns {
        return Err(GridError::RowLen {
            got: len,
            expected: header.n_columns,
        });
    }
    Ok(())
}

/// Streams rows, in order, into a native grid file.
///
/// The header is written up front with unknown extrema and rewritten
/// by [`NativeWriter::finish`].
pub struct NativeWriter {
    header: GridHeader,
    wtr: BufWriter<File>,
    headerless: bool,
    next_row: usize,
}

impl NativeWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        header: &GridHeader,
        headerless: bool,
    ) -> Result<Self, GridError> {
        let mut wtr = BufWriter::new(File::create(path)?);
        if !headerless {
            write_header(&mut wtr, header)?;
        }
        Ok(Self {
            header: header.clone(),
            wtr,
            headerless,
            next_row: 0,
        })
    }

    pub fn write_row(&mut self, row: usize, values: &[f32]) -> Result<(), GridError> {
        if row != self.next_row {
            return Err(GridError::RowOrder {
                expected: self.next_row,
                got: row,
            });
        }
        check_row(&self.header, row, values.len())?;
        for v in values {
            self.wtr.write_f32::<LE>(*v)?;
        }
        self.next_row += 1;
        Ok(())
    }

    /// Flushes all rows and records the final extrema in the header.
    pub fn finish(mut self, z_min: f64, z_max: f64) -> Result<(), GridError> {
        if self.next_row != self.header.n_rows {
            return Err(GridError::RowOrder {
                expected: self.header.n_rows,
                got: self.next_row,
            });
        }
        if !self.headerless {
            self.header.z_min = z_min;
            self.header.z_max = z_max;
            self.wtr.seek(SeekFrom::Start(0))?;
            write_header(&mut self.wtr, &self.header)?;
        }
        self.wtr.flush()?;
        Ok(())
    }
}

pub(crate) fn read_header<R: Read>(rdr: &mut R, path: &Path) -> Result<GridHeader, GridError> {
    let mut magic = [0_u8; 4];
    rdr.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(GridError::Magic(path.to_owned()));
    }
    let mk_err = |reason: String| GridError::Header {
        path: path.to_owned(),
        reason,
    };
    let raw_reg = rdr.read_u8()?;
    let registration =
        Registration::from_u8(raw_reg).ok_or_else(|| mk_err(format!("registration {raw_reg}")))?;
    let mut pad = [0_u8; 3];
    rdr.read_exact(&mut pad)?;
    let n_columns = rdr.read_u32::<LE>()? as usize;
    let n_rows = rdr.read_u32::<LE>()? as usize;
    let west = rdr.read_f64::<LE>()?;
    let east = rdr.read_f64::<LE>()?;
    let south = rdr.read_f64::<LE>()?;
    let north = rdr.read_f64::<LE>()?;
    let inc = Coord {
        x: rdr.read_f64::<LE>()?,
        y: rdr.read_f64::<LE>()?,
    };
    let z_min = rdr.read_f64::<LE>()?;
    let z_max = rdr.read_f64::<LE>()?;

    let region = Region::new(west, east, south, north).map_err(|e| mk_err(e.to_string()))?;
    let mut header =
        GridHeader::new(region, inc, registration).map_err(|e| mk_err(e.to_string()))?;
    if (header.n_columns, header.n_rows) != (n_columns, n_rows) {
        return Err(mk_err(format!(
            "{n_columns} x {n_rows} nodes inconsistent with region {region} and increment {}/{}",
            inc.x, inc.y
        )));
    }
    header.z_min = z_min;
    header.z_max = z_max;
    Ok(header)
}

pub(crate) fn write_header<W: Write>(wtr: &mut W, header: &GridHeader) -> Result<(), GridError> {
    let GridHeader {
        region,
        inc,
        registration,
        n_columns,
        n_rows,
        z_min,
        z_max,
    } = header;
    let as_u32 = |n: usize| u32::try_from(n).map_err(|_| GridError::TooLarge(n));
    wtr.write_all(MAGIC)?;
    wtr.write_u8(registration.as_u8())?;
    wtr.write_all(&[0_u8; 3])?;
    wtr.write_u32::<LE>(as_u32(*n_columns)?)?;
    wtr.write_u32::<LE>(as_u32(*n_rows)?)?;
    for v in [
        region.west,
        region.east,
        region.south,
        region.north,
        inc.x,
        inc.y,
        *z_min,
        *z_max,
    ] {
        wtr.write_f64::<LE>(v)?;
    }
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<Grid, GridError> {
    let mut reader = NativeReader::open(path, ReadMode::Buffered)?;
    let mut grid = Grid::new(reader.header().clone());
    for row in 0..grid.header.n_rows {
        reader.read_row(row, grid.row_mut(row))?;
    }
    Ok(grid)
}

pub(crate) fn store(path: &Path, grid: &Grid) -> Result<(), GridError> {
    let mut wtr = NativeWriter::create(path, &grid.header, false)?;
    for row in 0..grid.header.n_rows {
        wtr.write_row(row, grid.row(row))?;
    }
    wtr.finish(grid.header.z_min, grid.header.z_max)
}

#[cfg(test)]
mod tests {
    use super::{load, store, NativeReader, NativeWriter, ReadMode, HEADER_LEN};
    use crate::{Grid, GridError, GridHeader, Region, Registration, RowReader};
    use geo::geometry::Coord;

    fn sample_grid() -> Grid {
        let header = GridHeader::new(
            Region::new(0.0, 3.0, 0.0, 2.0).unwrap(),
            Coord { x: 1.0, y: 1.0 },
            Registration::Gridline,
        )
        .unwrap();
        let mut grid = Grid::new(header);
        for (i, z) in grid.data.iter_mut().enumerate() {
            *z = i as f32;
        }
        grid.data[5] = f32::NAN;
        grid.update_extrema();
        grid
    }

    #[test]
    fn test_store_then_read_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.grd");
        let grid = sample_grid();
        store(&path, &grid).unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, HEADER_LEN + 12 * 4);

        for mode in [ReadMode::Buffered, ReadMode::MemMap] {
            let mut rdr = NativeReader::open(&path, mode).unwrap();
            assert_eq!(rdr.header().n_columns, 4);
            assert_eq!(rdr.header().z_max, 11.0);
            let mut row = vec![0.0; 4];
            // Out of order on purpose: forces a seek.
            rdr.read_row(2, &mut row).unwrap();
            assert_eq!(row, vec![8.0, 9.0, 10.0, 11.0]);
            rdr.read_row(1, &mut row).unwrap();
            assert_eq!(row[0], 4.0);
            assert!(row[1].is_nan());
            assert!(matches!(
                rdr.read_row(3, &mut row),
                Err(GridError::RowOutOfRange { row: 3, n_rows: 3 })
            ));
        }

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.header, grid.header);
    }

    #[test]
    fn test_writer_enforces_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.grd");
        let grid = sample_grid();
        let mut wtr = NativeWriter::create(&path, &grid.header, false).unwrap();
        assert!(matches!(
            wtr.write_row(1, grid.row(1)),
            Err(GridError::RowOrder {
                expected: 0,
                got: 1
            })
        ));
        wtr.write_row(0, grid.row(0)).unwrap();
        assert!(wtr.finish(0.0, 1.0).is_err());
    }

    #[test]
    fn test_headerless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.raw");
        let grid = sample_grid();
        let mut wtr = NativeWriter::create(&path, &grid.header, true).unwrap();
        for row in 0..3 {
            wtr.write_row(row, grid.row(row)).unwrap();
        }
        wtr.finish(0.0, 11.0).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 12 * 4);
        assert!(matches!(
            NativeReader::open(&path, ReadMode::Buffered),
            Err(GridError::Magic(_))
        ));
    }
}
