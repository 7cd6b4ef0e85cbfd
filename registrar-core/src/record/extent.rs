//! Spatial and temporal extents attached to canonical records.

use std::fmt;

use geo::{Coord, Rect};
use thiserror::Error;

/// EPSG code of the single geographic reference system used for extents.
pub const WGS84_EPSG: u32 = 4326;

/// Coordinate reference system of a [`BoundingBox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// A reference system identified by its EPSG code.
    Epsg(u32),
}

impl Default for Crs {
    fn default() -> Self {
        Self::Epsg(WGS84_EPSG)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epsg(code) => write!(f, "EPSG:{code}"),
        }
    }
}

/// Errors returned when building a [`BoundingBox`] from raw coordinates.
#[derive(Debug, Error, PartialEq)]
pub enum BoundingBoxError {
    /// No coordinates were supplied.
    #[error("coordinate list is empty")]
    Empty,
    /// A flat lat/lon list did not contain whole pairs.
    #[error("coordinate list has {len} values; expected lat/lon pairs")]
    OddLength {
        /// Number of values in the list.
        len: usize,
    },
    /// A STAC bbox did not have four or six values.
    #[error("bbox has {len} values; expected 4 or 6")]
    InvalidArity {
        /// Number of values in the bbox.
        len: usize,
    },
    /// A STAC bbox with `west > east` spans the antimeridian, which a single
    /// rectangle cannot represent.
    #[error("bbox crosses the antimeridian (west {west}, east {east})")]
    CrossesAntimeridian {
        /// Western edge.
        west: f64,
        /// Eastern edge.
        east: f64,
    },
    /// A coordinate was NaN or infinite.
    #[error("coordinate value {value} is not finite")]
    NonFinite {
        /// Offending value.
        value: f64,
    },
}

/// Axis-aligned bounding box in a geographic reference system.
///
/// The rectangle follows `geo` conventions: `x` is longitude and `y` is
/// latitude, with `Rect::new` normalising corners so `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Extent rectangle (`x = longitude`, `y = latitude`).
    pub rect: Rect<f64>,
    /// Reference system of the rectangle.
    pub crs: Crs,
}

impl BoundingBox {
    /// Build a box from explicit corner values in the default CRS.
    ///
    /// # Examples
    ///
    /// ```
    /// use registrar_core::BoundingBox;
    ///
    /// let bbox = BoundingBox::from_corners(20.0, 10.0, 25.0, 15.0);
    /// assert_eq!(bbox.min_x(), 20.0);
    /// assert_eq!(bbox.max_y(), 15.0);
    /// ```
    #[must_use]
    pub fn from_corners(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            rect: Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y }),
            crs: Crs::default(),
        }
    }

    /// The whole globe, used for records without a native footprint.
    #[must_use]
    pub fn global() -> Self {
        Self::from_corners(-180.0, -90.0, 180.0, 90.0)
    }

    /// Build a box from a STAC `bbox` array.
    ///
    /// Both the 2D form `[west, south, east, north]` and the 3D form
    /// `[west, south, min_z, east, north, max_z]` are accepted; elevation is
    /// discarded. A box whose western edge lies east of its eastern edge is
    /// rejected rather than reordered.
    pub fn from_stac_bbox(values: &[f64]) -> Result<Self, BoundingBoxError> {
        ensure_finite(values)?;
        match *values {
            [west, _, east, _] | [west, _, _, east, _, _] if west > east => {
                Err(BoundingBoxError::CrossesAntimeridian { west, east })
            }
            [west, south, east, north] | [west, south, _, east, north, _] => {
                Ok(Self::from_corners(west, south, east, north))
            }
            _ => Err(BoundingBoxError::InvalidArity { len: values.len() }),
        }
    }

    /// Build a box from a flat, alternating latitude/longitude list.
    ///
    /// Even-indexed values are latitudes and odd-indexed values are
    /// longitudes. Minima and maxima are taken per axis, so the vertex order
    /// of the footprint does not matter.
    ///
    /// # Examples
    ///
    /// ```
    /// use registrar_core::BoundingBox;
    ///
    /// let bbox = BoundingBox::from_lat_lon_pairs(&[10.0, 20.0, 10.0, 25.0, 15.0, 25.0, 15.0, 20.0])?;
    /// assert_eq!(
    ///     (bbox.min_x(), bbox.min_y(), bbox.max_x(), bbox.max_y()),
    ///     (20.0, 10.0, 25.0, 15.0)
    /// );
    /// # Ok::<(), registrar_core::BoundingBoxError>(())
    /// ```
    pub fn from_lat_lon_pairs(values: &[f64]) -> Result<Self, BoundingBoxError> {
        if values.is_empty() {
            return Err(BoundingBoxError::Empty);
        }
        if !values.len().is_multiple_of(2) {
            return Err(BoundingBoxError::OddLength { len: values.len() });
        }
        ensure_finite(values)?;

        let lats = values.iter().step_by(2).copied();
        let lons = values.iter().skip(1).step_by(2).copied();
        let (min_y, max_y) = min_max(lats);
        let (min_x, max_x) = min_max(lons);
        Ok(Self::from_corners(min_x, min_y, max_x, max_y))
    }

    /// Western edge.
    #[must_use]
    pub fn min_x(&self) -> f64 {
        self.rect.min().x
    }

    /// Southern edge.
    #[must_use]
    pub fn min_y(&self) -> f64 {
        self.rect.min().y
    }

    /// Eastern edge.
    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.rect.max().x
    }

    /// Northern edge.
    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.rect.max().y
    }
}

fn ensure_finite(values: &[f64]) -> Result<(), BoundingBoxError> {
    match values.iter().find(|value| !value.is_finite()) {
        Some(&value) => Err(BoundingBoxError::NonFinite { value }),
        None => Ok(()),
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), value| {
        (lo.min(value), hi.max(value))
    })
}

/// Temporal coverage of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalExtent {
    /// A single ISO 8601 instant.
    Instant(String),
    /// A period; an absent end means the period is open.
    Interval {
        /// Start of the period.
        begin: String,
        /// End of the period, if closed.
        end: Option<String>,
    },
}
