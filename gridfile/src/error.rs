use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not a native grid file")]
    Magic(PathBuf),

    #[error("invalid region {0}")]
    Region(String),

    #[error("invalid increment {0}")]
    Increment(String),

    #[error("invalid grid header in {path}: {reason}")]
    Header { path: PathBuf, reason: String },

    #[error("row {row} outside grid with {n_rows} rows")]
    RowOutOfRange { row: usize, n_rows: usize },

    #[error("row of {got} values written to grid with {expected} columns")]
    RowLen { got: usize, expected: usize },

    #[error("rows must be written in order; expected row {expected}, got {got}")]
    RowOrder { expected: usize, got: usize },

    #[error("{0:?} format does not support headerless output")]
    Headerless(crate::GridFormat),

    #[error("{0:?} format does not support row-by-row i/o")]
    NotStreamable(crate::GridFormat),

    #[error("{0} nodes along one axis exceed the native format limit")]
    TooLarge(usize),

    #[error("resample target {0} does not overlap source grid")]
    EmptyResample(String),
}
