//! Quadtree tile addressing for the global geodetic profile.
#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use rex_geom::{Extent, Vec2};
use serde::{Deserialize, Serialize};

/// Deepest level a key may address; keeps `x`/`y` inside `u32`.
pub const MAX_LOD: u32 = 30;

/// One tile of the global profile. LOD 0 is two tiles (west, east); every
/// level below splits each tile in four. Row 0 is the northernmost row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub lod: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    #[inline]
    pub const fn new(lod: u32, x: u32, y: u32) -> Self {
        Self { lod, x, y }
    }

    /// Tile counts `(wide, high)` at `lod`.
    #[inline]
    pub fn tiles_at(lod: u32) -> (u32, u32) {
        (2u32 << lod, 1u32 << lod)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        if self.lod > MAX_LOD {
            return false;
        }
        let (w, h) = Self::tiles_at(self.lod);
        self.x < w && self.y < h
    }

    pub fn parent(&self) -> Option<TileKey> {
        if self.lod == 0 {
            return None;
        }
        Some(TileKey::new(self.lod - 1, self.x / 2, self.y / 2))
    }

    /// Children in quadrant order: NW, NE, SW, SE. `None` at `MAX_LOD` or
    /// for an invalid key.
    pub fn children(&self) -> Option<[TileKey; 4]> {
        if self.lod >= MAX_LOD || !self.is_valid() {
            return None;
        }
        let lod = self.lod + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        Some([
            TileKey::new(lod, x, y),
            TileKey::new(lod, x + 1, y),
            TileKey::new(lod, x, y + 1),
            TileKey::new(lod, x + 1, y + 1),
        ])
    }

    /// Ancestor at `lod`, or `None` when `lod` is deeper than this key.
    pub fn ancestor_at(&self, lod: u32) -> Option<TileKey> {
        if lod > self.lod {
            return None;
        }
        let shift = self.lod - lod;
        Some(TileKey::new(lod, self.x >> shift, self.y >> shift))
    }

    pub fn extent(&self) -> Extent {
        let (w, h) = Self::tiles_at(self.lod);
        let tw = Extent::GLOBAL.width() / f64::from(w);
        let th = Extent::GLOBAL.height() / f64::from(h);
        let xmin = Extent::GLOBAL.min.x + tw * f64::from(self.x);
        let ymax = Extent::GLOBAL.max.y - th * f64::from(self.y);
        Extent::from_bounds(xmin, ymax - th, xmin + tw, ymax)
    }

    /// Key at `lod` whose extent contains the geographic point `p`.
    pub fn containing(lod: u32, p: Vec2) -> Option<TileKey> {
        if lod > MAX_LOD || !Extent::GLOBAL.contains(p) {
            return None;
        }
        let (w, h) = Self::tiles_at(lod);
        let u = (p.x - Extent::GLOBAL.min.x) / Extent::GLOBAL.width();
        let v = (Extent::GLOBAL.max.y - p.y) / Extent::GLOBAL.height();
        let x = ((u * f64::from(w)) as u32).min(w - 1);
        let y = ((v * f64::from(h)) as u32).min(h - 1);
        Some(TileKey::new(lod, x, y))
    }

    /// Chebyshev distance in tiles between two keys on the same level,
    /// going either way around in longitude.
    #[inline]
    pub fn ring_distance(&self, other: &TileKey) -> u32 {
        let (w, _) = Self::tiles_at(self.lod.min(MAX_LOD));
        let dx = self.x.abs_diff(other.x);
        dx.min(w.saturating_sub(dx)).max(self.y.abs_diff(other.y))
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.x, self.y)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileKeyParseError {
    Format(String),
    OutOfRange(TileKey),
}

impl fmt::Display for TileKeyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileKeyParseError::Format(s) => write!(f, "expected lod/x/y, got {:?}", s),
            TileKeyParseError::OutOfRange(k) => write!(f, "tile key {} out of range", k),
        }
    }
}

impl std::error::Error for TileKeyParseError {}

impl FromStr for TileKey {
    type Err = TileKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('/');
        let mut next = || -> Result<u32, TileKeyParseError> {
            parts
                .next()
                .and_then(|p| p.parse::<u32>().ok())
                .ok_or_else(|| TileKeyParseError::Format(s.to_string()))
        };
        let key = TileKey::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(TileKeyParseError::Format(s.to_string()));
        }
        if !key.is_valid() {
            return Err(TileKeyParseError::OutOfRange(key));
        }
        Ok(key)
    }
}
