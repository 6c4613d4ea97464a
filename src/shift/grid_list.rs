//! Comma-separated grid lists.
//!
//! `"a.gsb,@b.gsb,null"` opens `a.gsb` (required), `b.gsb` (optional) and
//! the synthetic null grid, in that order.

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::GridError;
use crate::grid::{Grid, GridSet, LoadGrids};

/// Marker prefix of an optional grid.
pub const OPTIONAL_PREFIX: char = '@';

/// Open every grid set of a comma-separated list.
///
/// Optional entries that fail to open are skipped. A required entry that
/// fails aborts the whole list with [`GridError::FailedToLoadGrid`], even
/// when the resource simply does not exist.
pub fn open_list<S: ?Sized + LoadGrids>(
    ctx: &Context,
    names: &str,
) -> Result<Vec<GridSet<S>>, GridError> {
    let mut sets = Vec::new();
    for (name, optional) in parse_list(names) {
        match GridSet::<S>::open(ctx, name) {
            Ok(set) => sets.push(set),
            Err(e) if optional => {
                debug!(grid = %name, error = %e, "Skipping optional grid");
            }
            Err(e) if e.is_not_found() => {
                warn!(grid = %name, "Required grid not found");
                return Err(GridError::load(name, e.to_string()));
            }
            Err(e) => {
                warn!(grid = %name, error = %e, "Required grid could not be opened");
                return Err(e);
            }
        }
    }
    Ok(sets)
}

/// First grid of the list covering the point, with the index of its set.
pub fn find_grid<S: ?Sized + LoadGrids>(
    sets: &[GridSet<S>],
    lon: f64,
    lat: f64,
) -> Option<(usize, &Grid<S>)> {
    sets.iter()
        .enumerate()
        .find_map(|(i, set)| set.grid_at(lon, lat).map(|grid| (i, grid)))
}

/// Grid list names split into `(name, optional)` pairs.
pub fn parse_list(names: &str) -> Vec<(&str, bool)> {
    names
        .split(',')
        .map(|entry| match entry.strip_prefix(OPTIONAL_PREFIX) {
            Some(name) => (name, true),
            None => (entry, false),
        })
        .collect()
}
