//! Coordinate value types shared by grids and shift operations.
//!
//! Angles are radians throughout; heights and generic offsets are metres.

use std::f64::consts::{PI, TAU};

use serde::Serialize;

/// Tolerance below which a longitude is considered already in range.
const ADJLON_SLACK: f64 = 1e-12;

/// One arc-second in radians.
pub const ARC_SECOND: f64 = PI / 180.0 / 3600.0;

/// Direction in which a shift is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source to target: add the correction
    Forward,
    /// Target to source: remove the correction
    Inverse,
}

/// A longitude/latitude pair in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Build from degrees.
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self::new(lon.to_radians(), lat.to_radians())
    }

    /// Convert to degrees as `(lon, lat)`.
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    pub fn is_nan(self) -> bool {
        self.lon.is_nan() || self.lat.is_nan()
    }
}

/// A longitude/latitude/height triple; angles in radians, height in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LonLatZ {
    pub lon: f64,
    pub lat: f64,
    pub z: f64,
}

impl LonLatZ {
    pub const fn new(lon: f64, lat: f64, z: f64) -> Self {
        Self { lon, lat, z }
    }

    #[inline]
    pub fn horizontal(self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }
}

/// A point in space and time: angles in radians, height in metres, time
/// in decimal years.
///
/// An unknown time is `f64::INFINITY`; time-restricted operations skip such
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
    pub z: f64,
    pub t: f64,
}

impl Coordinate {
    pub const fn new(lon: f64, lat: f64, z: f64, t: f64) -> Self {
        Self { lon, lat, z, t }
    }

    /// Build from degrees, height and time left as given.
    pub fn from_degrees(lon: f64, lat: f64, z: f64, t: f64) -> Self {
        Self::new(lon.to_radians(), lat.to_radians(), z, t)
    }

    /// Same point with angles in degrees.
    pub fn to_degrees(self) -> Self {
        Self::new(self.lon.to_degrees(), self.lat.to_degrees(), self.z, self.t)
    }

    #[inline]
    pub fn lon_lat(self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }

    #[inline]
    pub fn lon_lat_z(self) -> LonLatZ {
        LonLatZ::new(self.lon, self.lat, self.z)
    }

    /// Replace the spatial part, keeping the time.
    pub fn with_lon_lat_z(self, p: LonLatZ) -> Self {
        Self::new(p.lon, p.lat, p.z, self.t)
    }
}

/// Reduce a longitude into `[-π, π)`.
///
/// Values already within `π` (plus a tiny slack) are returned untouched so
/// that `±π` inputs survive unchanged.
pub fn adjlon(mut lon: f64) -> f64 {
    if lon.abs() < PI + ADJLON_SLACK {
        return lon;
    }
    lon += PI;
    lon -= TAU * (lon / TAU).floor();
    lon - PI
}
