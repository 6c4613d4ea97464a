//! Height offsets from vertical grid lists.

use tracing::trace;

use crate::context::Context;
use crate::coord::LonLat;
use crate::error::GridError;
use crate::grid::{VerticalGridSet, VerticalShiftGrid};

use super::grid_list::find_grid;

/// Offset at `lp` read from one grid, multiplied by `multiplier`.
///
/// Nodata corners are dropped and the remaining weights renormalized.
/// `None` when every corner is nodata or a corner cannot be read.
pub(crate) fn interpolate(grid: &VerticalShiftGrid, lp: LonLat, multiplier: f64) -> Option<f64> {
    let extent = grid.extent();
    let (width, height) = (grid.width(), grid.height());
    let full_world = extent.full_world_longitude();

    let mut grid_x = (lp.lon - extent.west) / extent.res_x;
    if full_world {
        let w = f64::from(width);
        grid_x = ((grid_x + w) % w + w) % w;
    }
    let grid_y = (lp.lat - extent.south) / extent.res_y;

    let (fx_floor, fy_floor) = (grid_x.floor(), grid_y.floor());
    if !(0.0..f64::from(width)).contains(&fx_floor) || !(0.0..f64::from(height)).contains(&fy_floor)
    {
        return None;
    }
    let (ix, iy) = (fx_floor as u32, fy_floor as u32);
    let (fx, fy) = (grid_x - fx_floor, grid_y - fy_floor);

    let ix2 = match ix + 1 {
        next if next < width => next,
        _ if full_world => 0,
        _ => width - 1,
    };
    let iy2 = (iy + 1).min(height - 1);

    let fetch = |x: u32, y: u32| match grid.value_at(x, y) {
        Ok(v) => Some(v),
        Err(e) => {
            trace!(grid = %grid.name(), error = %e, "Corner fetch failed");
            None
        }
    };
    let corners = [
        (fetch(ix, iy)?, (1.0 - fx) * (1.0 - fy)),
        (fetch(ix2, iy)?, fx * (1.0 - fy)),
        (fetch(ix, iy2)?, (1.0 - fx) * fy),
        (fetch(ix2, iy2)?, fx * fy),
    ];

    let mut value = 0.0;
    let mut total_weight = 0.0;
    let mut weights = 0;
    for (v, weight) in corners {
        if grid.is_nodata(v, multiplier) {
            continue;
        }
        value += f64::from(v) * weight;
        total_weight += weight;
        weights += 1;
    }

    match weights {
        0 => None,
        4 => Some(value * multiplier),
        _ => Some(value / total_weight * multiplier),
    }
}

/// Offset at `lp` from the first grid of the list covering it.
///
/// NaN coordinates and points outside every grid yield
/// [`GridError::GridArea`]; so do points whose surrounding nodes are all
/// nodata. A grid whose file changed on disk is reopened and the point
/// retried once.
pub fn vgrid_value(
    ctx: &Context,
    sets: &mut [VerticalGridSet],
    lp: LonLat,
    multiplier: f64,
) -> Result<f64, GridError> {
    if lp.is_nan() {
        return Err(GridError::GridArea);
    }

    let mut retried = false;
    loop {
        let (index, changed) = {
            let (index, grid) = find_grid(sets, lp.lon, lp.lat).ok_or(GridError::GridArea)?;
            if grid.is_null_grid() {
                return Ok(0.0);
            }
            if let Some(value) = interpolate(grid, lp, multiplier) {
                trace!(
                    lon = lp.lon.to_degrees(),
                    lat = lp.lat.to_degrees(),
                    value,
                    "Vertical grid value"
                );
                return Ok(value);
            }
            (index, grid.has_changed())
        };

        if !changed || retried {
            return Err(GridError::GridArea);
        }
        sets[index].reopen(ctx)?;
        retried = true;
    }
}
