use std::path::Path;

/// On-disk grid formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFormat {
    /// Little-endian binary header followed by `f32` rows.
    Native,

    /// ESRI ASCII grid.
    Ascii,
}

/// What a format can do without help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Rows can be read and written one at a time.
    Streamable,

    /// The whole grid must be converted to a streamable format first.
    NeedsReformat,
}

/// File extensions with a known format. Anything else is native.
static EXTENSIONS: &[(&str, GridFormat)] = &[
    ("asc", GridFormat::Ascii),
    ("ascii", GridFormat::Ascii),
    ("grd", GridFormat::Native),
    ("ngrd", GridFormat::Native),
];

impl GridFormat {
    /// Returns the format implied by `path`'s extension.
    pub fn detect<P: AsRef<Path>>(path: P) -> Self {
        path.as_ref()
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .and_then(|ext| {
                EXTENSIONS
                    .iter()
                    .find(|(known, _)| known.eq_ignore_ascii_case(ext))
                    .map(|(_, format)| *format)
            })
            .unwrap_or(Self::Native)
    }

    pub fn capability(self) -> Capability {
        match self {
            Self::Native => Capability::Streamable,
            Self::Ascii => Capability::NeedsReformat,
        }
    }

    pub fn is_streamable(self) -> bool {
        self.capability() == Capability::Streamable
    }

    /// Whether rows may be written without a leading header.
    pub fn supports_headerless(self) -> bool {
        matches!(self, Self::Native)
    }
}

#[cfg(test)]
mod tests {
    use super::{Capability, GridFormat};

    #[test]
    fn test_detect() {
        assert_eq!(GridFormat::detect("a/b/tile.asc"), GridFormat::Ascii);
        assert_eq!(GridFormat::detect("tile.ASC"), GridFormat::Ascii);
        assert_eq!(GridFormat::detect("tile.grd"), GridFormat::Native);
        assert_eq!(GridFormat::detect("tile"), GridFormat::Native);
        assert_eq!(GridFormat::detect("tile.nc"), GridFormat::Native);
    }

    #[test]
    fn test_capability() {
        assert_eq!(GridFormat::Native.capability(), Capability::Streamable);
        assert_eq!(GridFormat::Ascii.capability(), Capability::NeedsReformat);
        assert!(!GridFormat::Ascii.supports_headerless());
    }
}
