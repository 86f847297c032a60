//! Hit and module types for pixel detector data.

use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier of a hit within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct HitId(pub u32);

impl HitId {
    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for HitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single detector measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Unique hit identifier.
    pub id: HitId,
    /// X position (detector frame).
    pub x: f64,
    /// Y position (detector frame).
    pub y: f64,
    /// Z position along the beam axis.
    pub z: f64,
    /// Detector module (layer) index.
    pub module: u16,
}

impl Hit {
    /// Creates a new hit.
    #[inline]
    #[must_use]
    pub fn new(id: u32, x: f64, y: f64, z: f64, module: u16) -> Self {
        Self {
            id: HitId(id),
            x,
            y,
            z,
            module,
        }
    }

    /// Transverse distance to another hit, ignoring z.
    #[inline]
    #[must_use]
    pub fn distance_xy(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Slopes `(dx/dz, dy/dz)` of the segment from this hit to `other`.
    ///
    /// Returns `None` when both hits share the same z.
    #[inline]
    #[must_use]
    pub fn slope_to(&self, other: &Self) -> Option<(f64, f64)> {
        let dz = other.z - self.z;
        if dz.abs() < f64::EPSILON {
            return None;
        }
        Some(((other.x - self.x) / dz, (other.y - self.y) / dz))
    }
}

/// A detector layer within an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module number.
    pub number: u16,
    /// Mean z of the hits on this module (0.0 when empty).
    pub z: f64,
    /// Range of hit indices belonging to this module.
    pub hit_range: Range<usize>,
}

impl Module {
    /// Returns the number of hits on the module.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hit_range.len()
    }

    /// Returns true if no hit was recorded on the module.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hit_range.is_empty()
    }
}
