//! Grid sets: every grid read from one named resource.

use std::f64::consts::TAU;

use serde::Serialize;
use tracing::{debug, info};

use crate::context::{Context, Resource};
use crate::error::GridError;
use crate::format::{ctable2, detect_format, geotiff, gtx, ntv1, ntv2, read_detect_header};

pub use crate::format::GridFormat;

use super::{
    GenericSampler, GenericShiftGrid, Grid, GridKind, GridSummary, HorizontalSampler,
    VerticalSampler,
};

/// Per-kind mapping from file formats to readers.
pub trait LoadGrids: GridKind {
    /// Whether grids of this kind can be read from `format`.
    fn accepts(format: GridFormat) -> bool;

    fn load(
        ctx: &Context,
        format: GridFormat,
        resource: &Resource,
    ) -> Result<Vec<Grid<Self>>, GridError>;
}

impl LoadGrids for dyn HorizontalSampler {
    fn accepts(format: GridFormat) -> bool {
        matches!(
            format,
            GridFormat::Ntv1 | GridFormat::Ctable2 | GridFormat::Ntv2 | GridFormat::Gtiff
        )
    }

    fn load(
        ctx: &Context,
        format: GridFormat,
        resource: &Resource,
    ) -> Result<Vec<Grid<Self>>, GridError> {
        match format {
            GridFormat::Ntv1 => Ok(vec![ntv1::open(resource)?]),
            GridFormat::Ctable2 => Ok(vec![ctable2::open(resource)?]),
            GridFormat::Ntv2 => ntv2::open(resource),
            GridFormat::Gtiff => geotiff::open_horizontal(ctx, resource),
            _ => Err(GridError::UnrecognizedFormat(resource.name.clone())),
        }
    }
}

impl LoadGrids for dyn VerticalSampler {
    fn accepts(format: GridFormat) -> bool {
        matches!(format, GridFormat::Gtx | GridFormat::Gtiff)
    }

    fn load(
        ctx: &Context,
        format: GridFormat,
        resource: &Resource,
    ) -> Result<Vec<Grid<Self>>, GridError> {
        match format {
            GridFormat::Gtx => Ok(vec![gtx::open(resource)?]),
            GridFormat::Gtiff => geotiff::open_vertical(ctx, resource),
            _ => Err(GridError::UnrecognizedFormat(resource.name.clone())),
        }
    }
}

impl LoadGrids for dyn GenericSampler {
    fn accepts(format: GridFormat) -> bool {
        format == GridFormat::Gtiff
    }

    fn load(
        ctx: &Context,
        format: GridFormat,
        resource: &Resource,
    ) -> Result<Vec<Grid<Self>>, GridError> {
        match format {
            GridFormat::Gtiff => geotiff::open_generic(ctx, resource),
            _ => Err(GridError::UnrecognizedFormat(resource.name.clone())),
        }
    }
}

/// The grids of one resource, in file order.
pub struct GridSet<S: ?Sized> {
    name: String,
    format: GridFormat,
    grids: Vec<Grid<S>>,
}

impl<S: ?Sized + LoadGrids> GridSet<S> {
    /// Open `name`, or build the synthetic null set when `name` is `"null"`.
    ///
    /// A missing resource yields an error for which
    /// [`GridError::is_not_found`] holds.
    pub fn open(ctx: &Context, name: &str) -> Result<Self, GridError> {
        if name == "null" {
            return Ok(Self::null());
        }

        let resource = ctx.open_resource(name)?;
        let header = read_detect_header(resource.reader.as_ref())?;
        let format = match detect_format(&header, &resource.name) {
            Some(format) if S::accepts(format) => format,
            detected => {
                debug!(
                    grid = %name,
                    kind = S::LABEL,
                    detected = ?detected,
                    "Unrecognized or unsupported grid format"
                );
                return Err(GridError::UnrecognizedFormat(name.to_string()));
            }
        };

        let grids = S::load(ctx, format, &resource)?;
        info!(
            grid = %name,
            format = %format,
            kind = S::LABEL,
            grids = grids.iter().map(Grid::count).sum::<usize>(),
            "Loaded grid set"
        );
        Ok(Self {
            name: name.to_string(),
            format,
            grids,
        })
    }

    /// Close and reopen the resource, e.g. after it changed on disk.
    pub fn reopen(&mut self, ctx: &Context) -> Result<(), GridError> {
        debug!(grid = %self.name, "Reopening grid set");
        *self = Self::open(ctx, &self.name)?;
        Ok(())
    }

    /// Reopen the set's resources through another context.
    pub fn reassign_context(&mut self, ctx: &Context) -> Result<(), GridError> {
        if self.format == GridFormat::Null {
            return Ok(());
        }
        self.reopen(ctx)
    }
}

impl<S: ?Sized + GridKind> GridSet<S> {
    /// A set holding only the null grid.
    pub fn null() -> Self {
        Self {
            name: "null".to_string(),
            format: GridFormat::Null,
            grids: vec![Grid::null()],
        }
    }

    pub fn from_grids(name: impl Into<String>, format: GridFormat, grids: Vec<Grid<S>>) -> Self {
        Self {
            name: name.into(),
            format,
            grids,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> GridFormat {
        self.format
    }

    pub fn grids(&self) -> &[Grid<S>] {
        &self.grids
    }

    /// Deepest grid covering the point; the first covering top-level grid
    /// wins.
    pub fn grid_at(&self, lon: f64, lat: f64) -> Option<&Grid<S>> {
        self.grids
            .iter()
            .find(|grid| grid.covers(lon, lat))
            .map(|grid| grid.grid_at(lon, lat))
    }

    /// Whether any backing resource changed since the set was opened.
    pub fn has_changed(&self) -> bool {
        self.grids.iter().any(Grid::has_changed)
    }

    pub fn summary(&self) -> GridSetSummary {
        GridSetSummary {
            name: self.name.clone(),
            format: self.format,
            grids: self.grids.iter().map(Grid::summary).collect(),
        }
    }
}

impl GridSet<dyn GenericSampler> {
    /// Like [`grid_at`](Self::grid_at), restricted to grids whose `TYPE` is
    /// `grid_type`.
    ///
    /// Geographic grids are also tried with the longitude shifted by ±2π.
    pub fn grid_at_type(&self, grid_type: &str, lon: f64, lat: f64) -> Option<&GenericShiftGrid> {
        for grid in &self.grids {
            if grid.is_null_grid() {
                return Some(grid);
            }
            if grid.grid_type() != grid_type {
                continue;
            }
            let extent = grid.extent();
            let mut lon = lon;
            if extent.is_geographic && !extent.full_world_longitude() {
                if lon < extent.west {
                    lon += TAU;
                } else if lon > extent.east {
                    lon -= TAU;
                }
            }
            if grid.covers(lon, lat) {
                return Some(grid.grid_at(lon, lat));
            }
        }
        None
    }
}

impl<S: ?Sized> std::fmt::Debug for GridSet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridSet")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("grids", &self.grids)
            .finish()
    }
}

/// Serializable description of a grid set.
#[derive(Debug, Clone, Serialize)]
pub struct GridSetSummary {
    pub name: String,
    pub format: GridFormat,
    pub grids: Vec<GridSummary>,
}
