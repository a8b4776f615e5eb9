use crate::GridError;
use geo::geometry::{Coord, Rect};
use std::{fmt, str::FromStr};

/// Longitude span considered to wrap the whole globe.
const FULL_CIRCLE: f64 = 360.0;

/// Where grid nodes sit relative to the cells they represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Registration {
    /// Nodes on cell corners; the region boundary passes through nodes.
    #[default]
    Gridline,
    /// Nodes at cell centers; the region boundary is half a cell away.
    Pixel,
}

impl Registration {
    /// Offset, in increments, from a region edge to the first node.
    pub fn xy_off(self) -> f64 {
        match self {
            Self::Gridline => 0.0,
            Self::Pixel => 0.5,
        }
    }

    /// 0 for gridline, 1 for pixel registration.
    pub fn as_index(self) -> i64 {
        match self {
            Self::Gridline => 0,
            Self::Pixel => 1,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Gridline),
            1 => Some(Self::Pixel),
            _ => None,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Gridline => 0,
            Self::Pixel => 1,
        }
    }
}

/// A `west/east/south/north` box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Region {
    pub fn new(west: f64, east: f64, south: f64, north: f64) -> Result<Self, GridError> {
        let region = Self {
            west,
            east,
            south,
            north,
        };
        if [west, east, south, north].iter().all(|v| v.is_finite()) && west < east && south < north
        {
            Ok(region)
        } else {
            Err(GridError::Region(region.to_string()))
        }
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Returns the smallest region containing both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            west: self.west.min(other.west),
            east: self.east.max(other.east),
            south: self.south.min(other.south),
            north: self.north.max(other.north),
        }
    }

    /// Returns the common part of both regions, if they share any area.
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let west = self.west.max(other.west);
        let east = self.east.min(other.east);
        let south = self.south.max(other.south);
        let north = self.north.min(other.north);
        (west < east && south < north).then_some(Self {
            west,
            east,
            south,
            north,
        })
    }

    /// True when the row (latitude) extents touch or overlap.
    pub fn overlaps_y(&self, other: &Self) -> bool {
        !(self.south > other.north || self.north < other.south)
    }

    /// Cartesian overlap test, boundaries inclusive.
    pub fn overlaps(&self, other: &Self) -> bool {
        use geo::Intersects;
        self.to_rect().intersects(&other.to_rect())
    }

    /// Returns `self` moved by `delta` degrees of longitude.
    #[must_use]
    pub fn shift_lon(&self, delta: f64) -> Self {
        Self {
            west: self.west + delta,
            east: self.east + delta,
            ..*self
        }
    }

    /// True if this region spans all longitudes.
    pub fn is_global_lon(&self) -> bool {
        self.width() >= FULL_CIRCLE - 1e-8
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.west,
                y: self.south,
            },
            Coord {
                x: self.east,
                y: self.north,
            },
        )
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.west, self.east, self.south, self.north
        )
    }
}

impl FromStr for Region {
    type Err = GridError;

    /// Parses `w/e/s/n`.
    fn from_str(s: &str) -> Result<Self, GridError> {
        let mk_err = || GridError::Region(s.to_owned());
        let bounds = s
            .split('/')
            .map(|tok| tok.trim().parse::<f64>().map_err(|_| mk_err()))
            .collect::<Result<Vec<f64>, GridError>>()?;
        match bounds[..] {
            [west, east, south, north] => Self::new(west, east, south, north),
            _ => Err(mk_err()),
        }
    }
}

/// Parses a `dx` or `dx/dy` grid spacing.
pub fn parse_increment(s: &str) -> Result<Coord<f64>, GridError> {
    let mk_err = || GridError::Increment(s.to_owned());
    let parse = |tok: &str| -> Result<f64, GridError> {
        match tok.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
            _ => Err(mk_err()),
        }
    };
    match s.split_once('/') {
        None => {
            let d = parse(s)?;
            Ok(Coord { x: d, y: d })
        }
        Some((dx, dy)) => Ok(Coord {
            x: parse(dx)?,
            y: parse(dy)?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_increment, Coord, Region};

    #[test]
    fn test_parse_region() {
        let region: Region = "-10/10.5/-5/5".parse().unwrap();
        assert_eq!(region, Region::new(-10.0, 10.5, -5.0, 5.0).unwrap());
        assert!("1/2/3".parse::<Region>().is_err());
        assert!("10/0/0/1".parse::<Region>().is_err());
        assert!("a/b/c/d".parse::<Region>().is_err());
    }

    #[test]
    fn test_parse_increment() {
        assert_eq!(parse_increment("0.5").unwrap(), Coord { x: 0.5, y: 0.5 });
        assert_eq!(parse_increment("1/2").unwrap(), Coord { x: 1.0, y: 2.0 });
        assert!(parse_increment("0").is_err());
        assert!(parse_increment("-1/1").is_err());
    }

    #[test]
    fn test_union_and_intersection() {
        let a = Region::new(0.0, 10.0, 0.0, 10.0).unwrap();
        let b = Region::new(5.0, 15.0, -5.0, 5.0).unwrap();
        assert_eq!(a.union(&b), Region::new(0.0, 15.0, -5.0, 10.0).unwrap());
        assert_eq!(
            a.intersection(&b),
            Some(Region::new(5.0, 10.0, 0.0, 5.0).unwrap())
        );
        let c = Region::new(20.0, 30.0, 0.0, 10.0).unwrap();
        assert_eq!(a.intersection(&c), None);
        assert!(!a.overlaps(&c));
        assert!(a.overlaps(&b));
        assert!(a.overlaps_y(&c));
    }

    #[test]
    fn test_global_lon() {
        assert!(Region::new(0.0, 360.0, -90.0, 90.0).unwrap().is_global_lon());
        assert!(!Region::new(-10.0, 10.0, -90.0, 90.0)
            .unwrap()
            .is_global_lon());
    }
}
