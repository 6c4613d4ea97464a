//! Grid shift operations: `hgridshift`, `vgridshift` and `gridshift`.
//!
//! Each operation owns its grid list. The list is opened when the operation
//! is created, unless the context asks for deferred opening or the same
//! list already opened successfully for this operation kind; in both cases
//! the first transformed point opens it, and an opening failure is then
//! returned for every point.

use chrono::{Datelike, Local};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::context::Context;
use crate::coord::{Coordinate, Direction};
use crate::error::{ErrorCode, GridError};
use crate::grid::{
    GenericSampler, HorizontalGridSet, HorizontalSampler, VerticalGridSet, VerticalSampler,
};

use super::generic::GenericShifter;
use super::grid_list::open_list;
use super::horizontal::hgrid_apply;
use super::interpolate::Interpolation;
use super::known_grids::{self, RegistryKind};
use super::vertical::vgrid_value;

/// Multiplier of `vgridshift` when none is given: the forward direction
/// subtracts the grid value.
pub const DEFAULT_VERTICAL_MULTIPLIER: f64 = -1.0;

/// Legacy VERTCON grids stored millimetres; their GeoTIFF replacements
/// store metres.
const VERTCON_GRIDS: [&str; 3] = ["vertconw.gtx", "vertconc.gtx", "vertcone.gtx"];
const VERTCON_MILLIMETRE_MULTIPLIER: f64 = 0.001;

// =============================================================================
// Time bracket
// =============================================================================

/// Restricts a shift to coordinates observed before an epoch.
///
/// With both `t_epoch` and `t_final` set (non-zero), a point is shifted
/// only when `t < t_epoch` and `t_final > t_epoch`. Otherwise every point
/// is shifted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeBracket {
    pub t_epoch: f64,
    pub t_final: f64,
}

impl TimeBracket {
    pub fn new(t_epoch: f64, t_final: f64) -> Self {
        Self { t_epoch, t_final }
    }

    /// No restriction.
    pub fn always() -> Self {
        Self::default()
    }

    pub fn applies(&self, t: f64) -> bool {
        if self.t_epoch == 0.0 || self.t_final == 0.0 {
            return true;
        }
        t < self.t_epoch && self.t_final > self.t_epoch
    }
}

/// Parse a `t_final` value: a decimal year or `now`.
pub fn parse_t_final(value: &str) -> Result<f64, GridError> {
    if value.trim() == "now" {
        return Ok(current_decimal_year());
    }
    value.trim().parse().map_err(|_| GridError::InvalidParameter {
        name: "t_final",
        message: format!("expected a decimal year or \"now\", got {:?}", value),
    })
}

/// Local date as `year + day_of_year / 365`, day of year counted from 0.
pub fn current_decimal_year() -> f64 {
    let today = Local::now();
    f64::from(today.year()) + f64::from(today.ordinal0()) / 365.0
}

// =============================================================================
// Deferred opening
// =============================================================================

enum Opening<T> {
    Pending,
    Ready(T),
    Failed(GridError),
}

/// A grid list opened now or on first use.
struct GridList<T> {
    names: String,
    opening: Opening<T>,
}

impl<T> GridList<T> {
    /// Open `names` right away unless opening is deferred.
    ///
    /// A list opened right away is registered under `kind`, so that later
    /// operations on the same list defer their opening.
    fn init(
        ctx: &Context,
        kind: RegistryKind,
        names: &str,
        open: impl FnOnce(&Context, &str) -> Result<T, GridError>,
    ) -> Result<Self, GridError> {
        if names.is_empty() {
            return Err(GridError::InvalidParameter {
                name: "grids",
                message: "parameter missing".to_string(),
            });
        }

        if ctx.defer_grid_opening() || known_grids::is_known(kind, names) {
            debug!(grids = %names, "Deferring grid opening");
            return Ok(Self {
                names: names.to_string(),
                opening: Opening::Pending,
            });
        }

        let value = open(ctx, names).map_err(|e| {
            error!(grids = %names, error = %e, "Could not find required grid(s)");
            e
        })?;
        known_grids::insert(kind, names);
        Ok(Self {
            names: names.to_string(),
            opening: Opening::Ready(value),
        })
    }

    /// The opened list, opening it first if still pending.
    fn get(
        &mut self,
        ctx: &Context,
        open: impl FnOnce(&Context, &str) -> Result<T, GridError>,
    ) -> Result<&mut T, GridError> {
        if matches!(self.opening, Opening::Pending) {
            self.opening = match open(ctx, &self.names) {
                Ok(value) => {
                    info!(grids = %self.names, "Opened deferred grids");
                    Opening::Ready(value)
                }
                Err(e) => {
                    error!(grids = %self.names, error = %e, "Deferred grid opening failed");
                    Opening::Failed(e)
                }
            };
        }
        match &mut self.opening {
            Opening::Ready(value) => Ok(value),
            Opening::Failed(e) => Err(e.clone()),
            Opening::Pending => Err(GridError::load(&self.names, "grid list not opened")),
        }
    }

    fn names(&self) -> &str {
        &self.names
    }

    fn opened(&mut self) -> Option<&mut T> {
        match &mut self.opening {
            Opening::Ready(value) => Some(value),
            _ => None,
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// A grid-based coordinate operation.
pub trait GridOperation {
    /// Short operation name (`hgridshift`, ...)
    fn name(&self) -> &'static str;

    /// The `grids` parameter the operation was built with.
    fn grids(&self) -> &str;

    /// Shift one coordinate.
    ///
    /// Failures are returned and also recorded on `ctx`.
    fn apply(
        &mut self,
        ctx: &mut Context,
        coord: Coordinate,
        direction: Direction,
    ) -> Result<Coordinate, GridError>;

    /// Reopen the grids through another context.
    fn reassign_context(&mut self, ctx: &Context) -> Result<(), GridError>;
}

fn record<T>(ctx: &mut Context, result: Result<T, GridError>) -> Result<T, GridError> {
    if let Err(e) = &result {
        ctx.record(e);
    }
    result
}

// -----------------------------------------------------------------------------
// hgridshift
// -----------------------------------------------------------------------------

/// Horizontal shift through NTv1, CTable2, NTv2 or GeoTIFF grids.
pub struct HorizontalGridShift {
    grids: GridList<Vec<HorizontalGridSet>>,
    bracket: TimeBracket,
}

fn open_horizontal(ctx: &Context, names: &str) -> Result<Vec<HorizontalGridSet>, GridError> {
    open_list::<dyn HorizontalSampler>(ctx, names)
}

impl HorizontalGridShift {
    pub fn new(ctx: &Context, grids: &str, bracket: TimeBracket) -> Result<Self, GridError> {
        Ok(Self {
            grids: GridList::init(ctx, RegistryKind::Horizontal, grids, open_horizontal)?,
            bracket,
        })
    }

    pub fn time_bracket(&self) -> TimeBracket {
        self.bracket
    }
}

impl GridOperation for HorizontalGridShift {
    fn name(&self) -> &'static str {
        "hgridshift"
    }

    fn grids(&self) -> &str {
        self.grids.names()
    }

    fn apply(
        &mut self,
        ctx: &mut Context,
        coord: Coordinate,
        direction: Direction,
    ) -> Result<Coordinate, GridError> {
        if !self.bracket.applies(coord.t) {
            return Ok(coord);
        }
        let result = (|| {
            let sets = self.grids.get(ctx, open_horizontal)?;
            if sets.is_empty() {
                return Ok(coord);
            }
            let lp = hgrid_apply(ctx, sets, coord.lon_lat(), direction)?;
            Ok(Coordinate { lon: lp.lon, lat: lp.lat, ..coord })
        })();
        record(ctx, result)
    }

    fn reassign_context(&mut self, ctx: &Context) -> Result<(), GridError> {
        if let Some(sets) = self.grids.opened() {
            for set in sets {
                set.reassign_context(ctx)?;
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// vgridshift
// -----------------------------------------------------------------------------

/// Vertical shift through GTX or GeoTIFF grids.
///
/// Forward adds `multiplier × value` to the height; inverse subtracts it.
pub struct VerticalGridShift {
    grids: GridList<Vec<VerticalGridSet>>,
    bracket: TimeBracket,
    multiplier: f64,
}

fn open_vertical(ctx: &Context, names: &str) -> Result<Vec<VerticalGridSet>, GridError> {
    open_list::<dyn VerticalSampler>(ctx, names)
}

/// Multiplier to use with `sets` opened for `names`.
///
/// A millimetre multiplier on a VERTCON list served by a GeoTIFF grid is
/// replaced by `1.0`.
fn vertcon_multiplier(names: &str, sets: &[VerticalGridSet], multiplier: f64) -> f64 {
    if multiplier != VERTCON_MILLIMETRE_MULTIPLIER || !VERTCON_GRIDS.contains(&names) {
        return multiplier;
    }
    let first = sets.first().and_then(|set| set.grids().first());
    match first {
        Some(grid) if grid.name().contains(".tif") => {
            debug!(grids = %names, grid = %grid.name(), "VERTCON grid in metres");
            1.0
        }
        _ => multiplier,
    }
}

impl VerticalGridShift {
    /// `multiplier` defaults to [`DEFAULT_VERTICAL_MULTIPLIER`].
    pub fn new(
        ctx: &Context,
        grids: &str,
        bracket: TimeBracket,
        multiplier: Option<f64>,
    ) -> Result<Self, GridError> {
        let list = GridList::init(ctx, RegistryKind::Vertical, grids, open_vertical)?;
        let mut op = Self {
            grids: list,
            bracket,
            multiplier: multiplier.unwrap_or(DEFAULT_VERTICAL_MULTIPLIER),
        };
        op.adjust_multiplier();
        Ok(op)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn time_bracket(&self) -> TimeBracket {
        self.bracket
    }

    fn adjust_multiplier(&mut self) {
        let names = self.grids.names.clone();
        if let Some(sets) = self.grids.opened() {
            self.multiplier = vertcon_multiplier(&names, sets, self.multiplier);
        }
    }

    fn shift(
        &mut self,
        ctx: &Context,
        coord: Coordinate,
        direction: Direction,
    ) -> Result<Coordinate, GridError> {
        let was_pending = matches!(self.grids.opening, Opening::Pending);
        self.grids.get(ctx, open_vertical)?;
        if was_pending {
            self.adjust_multiplier();
        }

        let multiplier = self.multiplier;
        let sets = self.grids.get(ctx, open_vertical)?;
        if sets.is_empty() {
            return Ok(coord);
        }
        let value = vgrid_value(ctx, sets, coord.lon_lat(), multiplier)?;
        let z = match direction {
            Direction::Forward => coord.z + value,
            Direction::Inverse => coord.z - value,
        };
        Ok(Coordinate { z, ..coord })
    }
}

impl GridOperation for VerticalGridShift {
    fn name(&self) -> &'static str {
        "vgridshift"
    }

    fn grids(&self) -> &str {
        self.grids.names()
    }

    fn apply(
        &mut self,
        ctx: &mut Context,
        coord: Coordinate,
        direction: Direction,
    ) -> Result<Coordinate, GridError> {
        if !self.bracket.applies(coord.t) {
            return Ok(coord);
        }
        let result = self.shift(ctx, coord, direction);
        record(ctx, result)
    }

    fn reassign_context(&mut self, ctx: &Context) -> Result<(), GridError> {
        if let Some(sets) = self.grids.opened() {
            for set in sets {
                set.reassign_context(ctx)?;
            }
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// gridshift
// -----------------------------------------------------------------------------

/// Shift through GeoTIFF grids whose `TYPE` metadata selects the channels.
pub struct GenericGridShift {
    grids: GridList<GenericShifter>,
    interpolation: Option<Interpolation>,
}

impl GenericGridShift {
    /// `interpolation` overrides the grids' `interpolation_method` metadata.
    pub fn new(
        ctx: &Context,
        grids: &str,
        interpolation: Option<Interpolation>,
    ) -> Result<Self, GridError> {
        let open = move |ctx: &Context, names: &str| {
            GenericShifter::new(open_list::<dyn GenericSampler>(ctx, names)?, interpolation)
        };
        Ok(Self {
            grids: GridList::init(ctx, RegistryKind::Generic, grids, open)?,
            interpolation,
        })
    }

    /// Like [`new`](Self::new) with the method given by name.
    pub fn with_method(ctx: &Context, grids: &str, method: &str) -> Result<Self, GridError> {
        Self::new(ctx, grids, Some(method.parse()?))
    }

    pub fn interpolation(&self) -> Option<Interpolation> {
        self.interpolation
    }
}

impl GridOperation for GenericGridShift {
    fn name(&self) -> &'static str {
        "gridshift"
    }

    fn grids(&self) -> &str {
        self.grids.names()
    }

    fn apply(
        &mut self,
        ctx: &mut Context,
        coord: Coordinate,
        direction: Direction,
    ) -> Result<Coordinate, GridError> {
        let interpolation = self.interpolation;
        let result = self
            .grids
            .get(ctx, |ctx, names| {
                GenericShifter::new(open_list::<dyn GenericSampler>(ctx, names)?, interpolation)
            })
            .and_then(|shifter| shifter.apply(ctx, coord.lon_lat_z(), direction))
            .map(|p| coord.with_lon_lat_z(p));
        record(ctx, result)
    }

    fn reassign_context(&mut self, ctx: &Context) -> Result<(), GridError> {
        match self.grids.opened() {
            Some(shifter) => shifter.reassign_context(ctx),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Batch apply
// =============================================================================

/// Outcome of shifting one coordinate of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftedPoint {
    pub input: Coordinate,
    /// Shifted coordinate; the input when shifting failed
    pub output: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ShiftedPoint {
    pub fn is_ok(&self) -> bool {
        self.message.is_none()
    }

    /// Same outcome with angles in degrees.
    pub fn to_degrees(&self) -> Self {
        Self {
            input: self.input.to_degrees(),
            output: self.output.to_degrees(),
            error: self.error,
            message: self.message.clone(),
        }
    }
}

/// Shift every coordinate; a failure only affects its own point.
pub fn apply_batch<O: GridOperation + ?Sized>(
    op: &mut O,
    ctx: &mut Context,
    coords: &[Coordinate],
    direction: Direction,
) -> Vec<ShiftedPoint> {
    let mut failures = 0usize;
    let points: Vec<ShiftedPoint> = coords
        .iter()
        .map(|&input| match op.apply(ctx, input, direction) {
            Ok(output) => ShiftedPoint {
                input,
                output,
                error: None,
                message: None,
            },
            Err(e) => {
                failures += 1;
                debug!(
                    operation = op.name(),
                    lon = input.lon.to_degrees(),
                    lat = input.lat.to_degrees(),
                    error = %e,
                    "Point not shifted"
                );
                ShiftedPoint {
                    input,
                    output: input,
                    error: e.code(),
                    message: Some(e.to_string()),
                }
            }
        })
        .collect();

    if failures > 0 {
        info!(
            operation = op.name(),
            points = coords.len(),
            failures,
            "Batch shift finished with failures"
        );
    }
    points
}
