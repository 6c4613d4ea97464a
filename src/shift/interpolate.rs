//! Cell location and interpolation kernels.
//!
//! Positions are fractional node coordinates: `(lon - west) / res_x` along
//! a row and `(lat - south) / res_y` along a column.

use std::fmt;
use std::str::FromStr;

use crate::error::GridError;

/// Edge tolerance of the legacy horizontal path.
pub const LEGACY_EDGE_TOLERANCE: f64 = 1e-11;

/// Edge tolerance of the generic path (ten times the relative lookup slack).
pub const GENERIC_EDGE_TOLERANCE: f64 = 1e-4;

// =============================================================================
// Interpolation method
// =============================================================================

/// Interpolation method of the generic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Bilinear,
    /// Three-by-three window, quadratic along both axes
    Biquadratic,
}

impl Interpolation {
    pub fn as_str(self) -> &'static str {
        match self {
            Interpolation::Bilinear => "bilinear",
            Interpolation::Biquadratic => "biquadratic",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bilinear" => Ok(Interpolation::Bilinear),
            "biquadratic" => Ok(Interpolation::Biquadratic),
            other => Err(GridError::InvalidParameter {
                name: "interpolation",
                message: format!("unsupported value {:?}", other),
            }),
        }
    }
}

// =============================================================================
// Cell location
// =============================================================================

/// Lower node of the cell holding `pos` along an axis of `size` nodes, and
/// the fractional offset inside it.
///
/// A position within `tolerance` outside either edge snaps onto it; any
/// other position outside `[0, size - 1]` is a miss. A NaN position maps to
/// node 0 with a NaN fraction.
pub fn locate(pos: f64, size: u32, tolerance: f64) -> Option<(u32, f64)> {
    if size < 2 {
        return None;
    }
    let floor = if pos.is_nan() { 0.0 } else { pos.floor() };
    if !floor.is_finite() {
        return None;
    }
    let frac = pos - floor;
    let last = f64::from(size - 1);

    if floor < 0.0 {
        if floor == -1.0 && frac > 1.0 - tolerance {
            return Some((0, 0.0));
        }
        return None;
    }
    if floor >= last {
        if floor == last && frac < tolerance {
            return Some((size - 2, 1.0));
        }
        return None;
    }
    Some((floor as u32, frac))
}

// =============================================================================
// Kernels
// =============================================================================

/// Bilinear weights of the corners `(0,0)`, `(1,0)`, `(0,1)`, `(1,1)`.
#[inline]
pub fn bilinear_weights(fx: f64, fy: f64) -> [f64; 4] {
    [
        (1.0 - fx) * (1.0 - fy),
        fx * (1.0 - fy),
        (1.0 - fx) * fy,
        fx * fy,
    ]
}

/// Weighted sum of the four cell corners, in [`bilinear_weights`] order.
#[inline]
pub fn bilinear(fx: f64, fy: f64, corners: [f64; 4]) -> f64 {
    bilinear_weights(fx, fy)
        .iter()
        .zip(corners)
        .map(|(m, f)| m * f)
        .sum()
}

/// Parabola through `f(0) = f0`, `f(1) = f1`, `f(2) = f2`, evaluated at
/// `x ∈ [0, 2]`.
#[inline]
pub fn quadratic(x: f64, f0: f64, f1: f64, f2: f64) -> f64 {
    let df0 = f1 - f0;
    let df1 = f2 - f1;
    f0 + x * df0 + 0.5 * x * (x - 1.0) * (df1 - df0)
}

/// Move a bilinear cell to the first node of its three-node window.
///
/// The window starts one node earlier when the point lies in the first half
/// of the cell or the cell is the last one of the axis. Axes need at least
/// three nodes.
#[inline]
pub fn quadratic_window(index: u32, frac: f64, size: u32) -> (u32, f64) {
    if index > 0 && (frac <= 0.5 || index + 2 == size) {
        (index - 1, frac + 1.0)
    } else {
        (index, frac)
    }
}

/// Biquadratic value over a 3×3 window; `nodes[row][col]`, row 0 south.
pub fn biquadratic(fx: f64, fy: f64, nodes: &[[f64; 3]; 3]) -> f64 {
    let rows = nodes.map(|row| quadratic(fx, row[0], row[1], row[2]));
    quadratic(fy, rows[0], rows[1], rows[2])
}
