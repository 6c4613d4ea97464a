use std::f64::consts::{FRAC_PI_2, PI, TAU};

use serde::Serialize;

/// Maximum |longitude| accepted in a grid header, in radians.
const MAX_ABS_LONGITUDE: f64 = 4.0 * PI;

/// Maximum |latitude| accepted in a grid header, in radians.
const MAX_ABS_LATITUDE: f64 = PI + 1e-5;

/// Smallest accepted node spacing.
const MIN_RESOLUTION: f64 = 1e-10;

/// Slack on the full-world longitude test.
const FULL_WORLD_SLACK: f64 = 1e-10;

/// Bounding box and node spacing of a grid.
///
/// Geographic grids are expressed in radians; projected GeoTIFF grids keep
/// their native unit. `west`/`south` is the centre of the first node and
/// `east`/`north` the centre of the last one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtentAndRes {
    pub is_geographic: bool,
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub res_x: f64,
    pub res_y: f64,
}

impl ExtentAndRes {
    /// Extent of the synthetic 3×3 null grid covering the whole globe.
    pub const fn global() -> Self {
        Self {
            is_geographic: true,
            west: -PI,
            south: -FRAC_PI_2,
            east: PI,
            north: FRAC_PI_2,
            res_x: PI,
            res_y: FRAC_PI_2,
        }
    }

    /// Whether the nodes wrap around the whole parallel.
    pub fn full_world_longitude(&self) -> bool {
        self.is_geographic && self.east - self.west + self.res_x >= TAU - FULL_WORLD_SLACK
    }

    /// Non-strict containment of `other`.
    pub fn contains(&self, other: &ExtentAndRes) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }

    /// Non-strict overlap with `other`.
    pub fn intersects(&self, other: &ExtentAndRes) -> bool {
        other.west <= self.east
            && other.east >= self.west
            && other.south <= self.north
            && other.north >= self.south
    }

    /// Point test, widened by `epsilon` on every side.
    ///
    /// Full-world grids accept any longitude.
    pub fn includes_point(&self, lon: f64, lat: f64, epsilon: f64) -> bool {
        (self.full_world_longitude() || (lon + epsilon >= self.west && lon - epsilon <= self.east))
            && lat + epsilon >= self.south
            && lat - epsilon <= self.north
    }

    /// Sanity check applied to every geographic header.
    pub fn validate(&self) -> Result<(), String> {
        let finite = [
            self.west, self.south, self.east, self.north, self.res_x, self.res_y,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err("non-finite extent".to_string());
        }
        if self.west.abs() > MAX_ABS_LONGITUDE || self.east.abs() > MAX_ABS_LONGITUDE {
            return Err(format!(
                "longitude range [{}, {}] out of bounds",
                self.west, self.east
            ));
        }
        if self.south.abs() > MAX_ABS_LATITUDE || self.north.abs() > MAX_ABS_LATITUDE {
            return Err(format!(
                "latitude range [{}, {}] out of bounds",
                self.south, self.north
            ));
        }
        if self.west >= self.east || self.south >= self.north {
            return Err("empty extent".to_string());
        }
        if self.res_x <= MIN_RESOLUTION || self.res_y <= MIN_RESOLUTION {
            return Err(format!("resolution ({}, {}) too small", self.res_x, self.res_y));
        }
        Ok(())
    }

    /// Node count along one axis when the header does not store it.
    pub fn dimension(range: f64, res: f64) -> u32 {
        ((range / res).abs() + 0.5).floor() as u32 + 1
    }

    /// Extent in degrees, for display.
    pub fn to_degrees(&self) -> Self {
        if !self.is_geographic {
            return *self;
        }
        Self {
            is_geographic: true,
            west: self.west.to_degrees(),
            south: self.south.to_degrees(),
            east: self.east.to_degrees(),
            north: self.north.to_degrees(),
            res_x: self.res_x.to_degrees(),
            res_y: self.res_y.to_degrees(),
        }
    }
}
