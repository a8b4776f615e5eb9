use gridfile::GridError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlendError {
    #[error("control file line {line}: {message}")]
    Control { line: usize, message: String },

    #[error("no input grids")]
    NoInput,

    #[error("unable to read {path}: {source}")]
    Open { path: PathBuf, source: GridError },

    #[error("must specify increment if grids differ ({0})")]
    IncrementMismatch(String),

    #[error("must specify registration if grids differ")]
    RegistrationMismatch,

    #[error("unable to resample {name}: {source}")]
    Resample { name: String, source: GridError },

    #[error("reading row {row} of {name}: {source}")]
    Read {
        name: String,
        row: usize,
        source: GridError,
    },

    #[error("writing {path}: {source}")]
    Write { path: PathBuf, source: GridError },

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Grid(#[from] GridError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
