//! Spatial primitives for Locus
//!
//! This module provides the geographic coordinate type, the great-circle
//! distance used by every proximity query, and the search windows the
//! spatial index uses to narrow a query down before the exact distance check.

use crate::error::{LocusError, Result};
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;

/// Mean Earth radius used by the Haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Relative and absolute widening applied to search windows so that
/// rounding in the distance computation can never push a match outside.
const WINDOW_SLACK: f64 = 1e-9;

/// A latitude/longitude pair in decimal degrees.
///
/// No range check happens on construction; use [`Coordinate::validate`] when
/// the values come from an untrusted source.
///
/// # Examples
///
/// ```rust
/// use locus::Coordinate;
///
/// let new_york = Coordinate::new(40.7128, -74.0060);
/// let london = Coordinate::new(51.5074, -0.1278);
///
/// let km = new_york.distance_km(&london);
/// assert!((km - 5570.0).abs() < 30.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in decimal degrees (-90.0 to +90.0)
    pub latitude: f64,
    /// Longitude in decimal degrees (-180.0 to +180.0)
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometres.
    ///
    /// See [`haversine_km`].
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        haversine_km(*self, *other)
    }

    /// True when both components are finite and inside their ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Fails with [`LocusError::InvalidCoordinate`] unless [`is_valid`](Self::is_valid).
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(LocusError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

impl From<Coordinate> for geo::Point<f64> {
    fn from(coordinate: Coordinate) -> Self {
        geo::Point::new(coordinate.longitude, coordinate.latitude)
    }
}

impl From<geo::Point<f64>> for Coordinate {
    fn from(point: geo::Point<f64>) -> Self {
        Coordinate::new(point.y(), point.x())
    }
}

/// Haversine term `a` for two coordinates, before any clamping.
fn haversine_term(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lon1 = from.longitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let lon2 = to.longitude.to_radians();

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let sin_half_dlat = (dlat * 0.5).sin();
    let sin_half_dlon = (dlon * 0.5).sin();

    sin_half_dlat * sin_half_dlat + lat1.cos() * lat2.cos() * sin_half_dlon * sin_half_dlon
}

fn central_angle(a: f64) -> f64 {
    // Rounding can leave `a` a hair above 1, which would make sqrt(1 - a) NaN.
    let a = a.clamp(0.0, 1.0);
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance in kilometres on a sphere of radius [`EARTH_RADIUS_KM`].
///
/// Symmetric, zero for identical coordinates, and monotone in angular
/// separation. Earth's oblateness is ignored and longitudes are not wrapped.
/// Non-finite input yields NaN, which compares false against any radius.
///
/// # Examples
///
/// ```rust
/// use locus::{haversine_km, Coordinate};
///
/// let origin = Coordinate::new(0.0, 0.0);
/// let quarter = Coordinate::new(0.0, 90.0);
/// let km = haversine_km(origin, quarter);
/// assert!((km - std::f64::consts::FRAC_PI_2 * 6371.0).abs() < 1e-6);
/// ```
pub fn haversine_km(from: Coordinate, to: Coordinate) -> f64 {
    EARTH_RADIUS_KM * central_angle(haversine_term(from, to))
}

/// Like [`haversine_km`], but reports non-finite input as
/// [`LocusError::NumericDomain`] instead of producing NaN.
pub fn checked_haversine_km(from: Coordinate, to: Coordinate) -> Result<f64> {
    for c in [from, to] {
        if !c.latitude.is_finite() || !c.longitude.is_finite() {
            return Err(LocusError::NumericDomain(format!(
                "non-finite coordinate {}",
                c
            )));
        }
    }

    let a = haversine_term(from, to);
    if !(0.0..=1.0).contains(&a) {
        tracing::trace!(a, %from, %to, "clamping haversine term");
    }
    Ok(EARTH_RADIUS_KM * central_angle(a))
}

fn window(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: min_lon,
            y: min_lat,
        },
        Coord {
            x: max_lon,
            y: max_lat,
        },
    )
}

/// Longitude/latitude rectangles (x = longitude, y = latitude) that together
/// contain every valid coordinate within `radius_km` of `center`.
///
/// The windows are split at the antimeridian, and span all longitudes when a
/// pole is within reach. Returns `None` when no sound window exists: an
/// out-of-range center, or a negative or non-finite radius.
pub fn search_windows(center: Coordinate, radius_km: f64) -> Option<Vec<Rect<f64>>> {
    if !center.is_valid() || !radius_km.is_finite() || radius_km < 0.0 {
        return None;
    }

    let delta = radius_km / EARTH_RADIUS_KM * (1.0 + WINDOW_SLACK) + WINDOW_SLACK;
    if delta >= PI {
        return Some(vec![window(-180.0, -90.0, 180.0, 90.0)]);
    }

    let lat = center.latitude.to_radians();
    let lon = center.longitude.to_radians();
    let min_lat = lat - delta;
    let max_lat = lat + delta;

    if min_lat <= -FRAC_PI_2 || max_lat >= FRAC_PI_2 {
        return Some(vec![window(
            -180.0,
            min_lat.to_degrees().max(-90.0),
            180.0,
            max_lat.to_degrees().min(90.0),
        )]);
    }

    let ratio = delta.sin() / lat.cos();
    if ratio >= 1.0 {
        return Some(vec![window(
            -180.0,
            min_lat.to_degrees(),
            180.0,
            max_lat.to_degrees(),
        )]);
    }

    let dlon = ratio.asin();
    let min_lon = (lon - dlon).to_degrees();
    let max_lon = (lon + dlon).to_degrees();
    let (min_lat, max_lat) = (min_lat.to_degrees(), max_lat.to_degrees());

    let windows = if min_lon < -180.0 {
        vec![
            window(min_lon + 360.0, min_lat, 180.0, max_lat),
            window(-180.0, min_lat, max_lon, max_lat),
        ]
    } else if max_lon > 180.0 {
        vec![
            window(min_lon, min_lat, 180.0, max_lat),
            window(-180.0, min_lat, max_lon - 360.0, max_lat),
        ]
    } else {
        vec![window(min_lon, min_lat, max_lon, max_lat)]
    };

    Some(windows)
}
