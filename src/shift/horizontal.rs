//! Longitude/latitude shifts from horizontal grid lists.

use std::f64::consts::PI;

use tracing::{debug, trace};

use crate::context::Context;
use crate::coord::{adjlon, Direction, LonLat};
use crate::error::GridError;
use crate::grid::{HorizontalGridSet, HorizontalShiftGrid};

use super::grid_list::find_grid;
use super::interpolate::{bilinear_weights, locate, LEGACY_EDGE_TOLERANCE};

/// Iteration cap of the inverse shift.
pub const MAX_ITERATIONS: u32 = 10;

/// Convergence threshold of the inverse shift, radians.
pub const INVERSE_TOLERANCE: f64 = 1e-12;

/// Bilinear shift at `offset`, measured from the grid's south-west node.
///
/// `None` when the point falls outside the grid or a corner cannot be read.
pub(crate) fn interpolate(grid: &HorizontalShiftGrid, offset: LonLat) -> Option<LonLat> {
    let extent = grid.extent();
    let (ix, fx) = locate(offset.lon / extent.res_x, grid.width(), LEGACY_EDGE_TOLERANCE)?;
    let (iy, fy) = locate(offset.lat / extent.res_y, grid.height(), LEGACY_EDGE_TOLERANCE)?;

    let fetch = |x: u32, y: u32| match grid.value_at(x, y) {
        Ok(shift) => Some(shift),
        Err(e) => {
            trace!(grid = %grid.name(), error = %e, "Corner fetch failed");
            None
        }
    };
    let corners = [
        fetch(ix, iy)?,
        fetch(ix + 1, iy)?,
        fetch(ix, iy + 1)?,
        fetch(ix + 1, iy + 1)?,
    ];

    let weights = bilinear_weights(fx, fy);
    let mut shift = LonLat::new(0.0, 0.0);
    for (m, corner) in weights.iter().zip(corners) {
        shift.lon += m * corner.lon;
        shift.lat += m * corner.lat;
    }
    Some(shift)
}

/// Offset of `lp` from the grid's south-west node, longitude in `[0, 2π)`.
fn origin_offset(grid: &HorizontalShiftGrid, lp: LonLat) -> LonLat {
    let extent = grid.extent();
    LonLat::new(
        adjlon(lp.lon - extent.west - PI) + PI,
        lp.lat - extent.south,
    )
}

/// Apply one grid in either direction.
///
/// `Ok(None)` means the point (or its first estimate) is not inside the
/// grid. When the inverse iteration leaves the grid midway the current
/// estimate is accepted.
pub(crate) fn convert(
    grid: &HorizontalShiftGrid,
    lp: LonLat,
    direction: Direction,
) -> Result<Option<LonLat>, GridError> {
    let target = origin_offset(grid, lp);
    let Some(shift) = interpolate(grid, target) else {
        return Ok(None);
    };

    if direction == Direction::Forward {
        return Ok(Some(LonLat::new(lp.lon + shift.lon, lp.lat + shift.lat)));
    }

    let extent = grid.extent();
    let to_lon_lat =
        |guess: LonLat| LonLat::new(adjlon(guess.lon + extent.west), guess.lat + extent.south);

    let mut guess = LonLat::new(target.lon - shift.lon, target.lat - shift.lat);
    let mut remaining = MAX_ITERATIONS;
    loop {
        let Some(delta) = interpolate(grid, guess) else {
            debug!(
                grid = %grid.name(),
                "Inverse iteration left the grid, using current approximation"
            );
            break;
        };

        let dif_lon = guess.lon + delta.lon - target.lon;
        let dif_lat = guess.lat + delta.lat - target.lat;
        guess.lon -= dif_lon;
        guess.lat -= dif_lat;

        remaining -= 1;
        if remaining == 0 {
            debug!(grid = %grid.name(), "Inverse grid shift failed to converge");
            return Err(GridError::NoConvergence {
                best: to_lon_lat(guess),
            });
        }
        if dif_lon * dif_lon + dif_lat * dif_lat <= INVERSE_TOLERANCE * INVERSE_TOLERANCE {
            break;
        }
    }

    Ok(Some(to_lon_lat(guess)))
}

/// Shift at `lp` from the first grid of the list covering it.
pub fn hgrid_value(sets: &[HorizontalGridSet], lp: LonLat) -> Result<LonLat, GridError> {
    let (_, grid) = find_grid(sets, lp.lon, lp.lat).ok_or(GridError::GridArea)?;
    interpolate(grid, origin_offset(grid, lp)).ok_or(GridError::GridArea)
}

/// Shift `lp` with the first grid of the list covering it.
///
/// A grid whose file changed on disk is reopened and the point retried
/// once. Points covered by the null grid pass through unchanged.
pub fn hgrid_apply(
    ctx: &Context,
    sets: &mut [HorizontalGridSet],
    lp: LonLat,
    direction: Direction,
) -> Result<LonLat, GridError> {
    let mut retried = false;
    loop {
        let (index, changed) = {
            let (index, grid) = find_grid(sets, lp.lon, lp.lat).ok_or(GridError::GridArea)?;
            if grid.is_null_grid() {
                return Ok(lp);
            }
            if let Some(out) = convert(grid, lp, direction)? {
                return Ok(out);
            }
            (index, grid.has_changed())
        };

        if !changed || retried {
            return Err(GridError::OutsideGrid);
        }
        sets[index].reopen(ctx)?;
        retried = true;
    }
}
