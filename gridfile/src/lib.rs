//! Regular 2-D grids on disk.
//!
//! A grid is a `west/east/south/north` region sampled at a fixed
//! increment, with nodes either on cell corners (gridline) or at cell
//! centers (pixel). Rows are numbered from the north edge.
//!
//! Two formats are understood:
//!
//! 1. The native format, a small binary header followed by `f32`
//!    rows, which can be streamed row by row in either direction.
//! 1. ESRI ASCII grids, which can only be loaded or stored whole and
//!    must be [`reformat`]ted before streaming.

mod ascii;
mod error;
mod format;
mod header;
mod native;
mod region;
mod resample;
mod stream;

pub use crate::{
    error::GridError,
    format::{Capability, GridFormat},
    header::{Grid, GridHeader},
    native::{NativeReader, NativeWriter, ReadMode, HEADER_LEN},
    region::{parse_increment, Region, Registration},
    resample::{reformat, resample, ResampleTarget},
    stream::{load, open_rows, read_header, store, GridRows, RowReader},
};
