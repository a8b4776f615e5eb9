//! Blend control files.
//!
//! One record per line:
//!
//! ```text
//! # comment
//! file [-Rw/e/s/n | -R | -] [weight]
//! ```
//!
//! `-R` with no bounds, or a lone `-`, means the inner region is the
//! whole grid. A negative weight flips the taper.

use crate::{BlendError, SourceLocation};
use gridfile::Region;
use std::{io::BufRead, path::PathBuf};

/// Part of a source that gets full weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InnerRegion {
    /// Same as the source's outer region: no taper.
    Outer,

    Explicit(Region),
}

/// One contributing grid, as requested by the user.
#[derive(Debug, Clone)]
pub struct BlendRecord {
    pub source: SourceLocation,
    pub inner: InnerRegion,
    pub weight: f64,
}

impl BlendRecord {
    pub fn new(source: SourceLocation) -> Self {
        Self {
            source,
            inner: InnerRegion::Outer,
            weight: 1.0,
        }
    }
}

/// Parses a control file into records, in file order.
pub fn parse_control<R: BufRead>(rdr: R) -> Result<Vec<BlendRecord>, BlendError> {
    let mut records = Vec::new();
    for (idx, line) in rdr.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        records.push(parse_record(trimmed).map_err(|message| BlendError::Control {
            line: idx + 1,
            message,
        })?);
    }
    Ok(records)
}

/// Returns one weight-1, untapered record per file.
pub fn records_from_files<I, P>(paths: I) -> Vec<BlendRecord>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths
        .into_iter()
        .map(|p| BlendRecord::new(SourceLocation::File(p.into())))
        .collect()
}

fn parse_record(line: &str) -> Result<BlendRecord, String> {
    let toks: Vec<&str> = line.split_whitespace().collect();
    let (file, region, weight) = match toks[..] {
        [file] => (file, None, None),
        [file, second] if is_region_token(second) => (file, Some(second), None),
        [file, weight] => (file, None, Some(weight)),
        [file, region, weight] => (file, Some(region), Some(weight)),
        _ => return Err(format!("expected 1 to 3 fields, found {}", toks.len())),
    };
    let inner = match region {
        None => InnerRegion::Outer,
        Some(tok) => parse_inner(tok)?,
    };
    let weight = match weight {
        None => 1.0,
        Some(tok) => match tok.parse::<f64>() {
            Ok(w) if w.is_finite() => w,
            _ => return Err(format!("invalid weight {tok}")),
        },
    };
    Ok(BlendRecord {
        source: SourceLocation::File(PathBuf::from(file)),
        inner,
        weight,
    })
}

fn is_region_token(tok: &str) -> bool {
    tok == "-" || tok.starts_with("-R")
}

fn parse_inner(tok: &str) -> Result<InnerRegion, String> {
    match tok.strip_prefix("-R") {
        _ if tok == "-" => Ok(InnerRegion::Outer),
        Some("") => Ok(InnerRegion::Outer),
        Some(bounds) => bounds
            .parse::<Region>()
            .map(InnerRegion::Explicit)
            .map_err(|e| e.to_string()),
        None => Err(format!("invalid inner region {tok}")),
    }
}
