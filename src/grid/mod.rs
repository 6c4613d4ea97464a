//! Shift grids, their hierarchies and grid sets.
//!
//! A [`Grid`] is a regular lattice of correction values with an owned list
//! of finer child grids. The kind of correction is fixed by its sampler:
//!
//! - [`HorizontalSampler`]: longitude/latitude shifts (NTv1, CTable2, NTv2,
//!   GeoTIFF `HORIZONTAL_OFFSET`)
//! - [`VerticalSampler`]: one height offset per node (GTX, GeoTIFF)
//! - [`GenericSampler`]: any number of named channels (GeoTIFF)
//!
//! Node `(0, 0)` is always the south-west corner regardless of the storage
//! order of the underlying file.

mod extent;
mod hierarchy;
mod set;

pub use extent::ExtentAndRes;
pub use hierarchy::HierarchyBuilder;
pub use set::{GridFormat, GridSet, GridSetSummary, LoadGrids};

use serde::Serialize;

use crate::coord::LonLat;
use crate::error::GridError;

/// Relative tolerance used when matching a point against horizontal grids.
pub const HORIZONTAL_LOOKUP_TOLERANCE: f64 = 1e-4;

// =============================================================================
// Samplers
// =============================================================================

/// Node access for longitude/latitude shift grids.
pub trait HorizontalSampler: Send + Sync {
    /// Shift at node `(x, y)` in radians, longitude positive east.
    fn lon_lat_shift(&self, x: u32, y: u32) -> Result<LonLat, GridError>;

    /// Whether the backing resource changed on disk since it was opened.
    fn has_changed(&self) -> bool {
        false
    }
}

/// Node access for height offset grids.
pub trait VerticalSampler: Send + Sync {
    /// Raw stored value at node `(x, y)`.
    fn value(&self, x: u32, y: u32) -> Result<f32, GridError>;

    /// Whether `value` marks a hole, given the multiplier the caller applies.
    fn is_nodata(&self, value: f32, multiplier: f64) -> bool;

    fn has_changed(&self) -> bool {
        false
    }
}

/// Node access for multi-channel grids described by metadata.
pub trait GenericSampler: Send + Sync {
    fn samples_per_pixel(&self) -> u32;

    /// Value of channel `sample` at node `(x, y)`, scale and offset applied.
    fn value(&self, x: u32, y: u32, sample: u32) -> Result<f32, GridError>;

    /// Metadata item; `sample = None` addresses the dataset level.
    fn metadata_item(&self, key: &str, sample: Option<u32>) -> Option<&str>;

    /// Channel description (e.g. `longitude_offset`).
    fn description(&self, sample: u32) -> Option<&str> {
        self.metadata_item("DESCRIPTION", Some(sample))
    }

    /// Channel unit (e.g. `arc-second`, `metre`).
    fn unit(&self, sample: u32) -> Option<&str> {
        self.metadata_item("UNIT", Some(sample))
    }

    fn has_changed(&self) -> bool {
        false
    }
}

/// Sampler of the synthetic `null` grid: every shift is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSampler;

impl HorizontalSampler for NullSampler {
    fn lon_lat_shift(&self, _x: u32, _y: u32) -> Result<LonLat, GridError> {
        Ok(LonLat::new(0.0, 0.0))
    }
}

impl VerticalSampler for NullSampler {
    fn value(&self, _x: u32, _y: u32) -> Result<f32, GridError> {
        Ok(0.0)
    }

    fn is_nodata(&self, _value: f32, _multiplier: f64) -> bool {
        false
    }
}

impl GenericSampler for NullSampler {
    fn samples_per_pixel(&self) -> u32 {
        0
    }

    fn value(&self, _x: u32, _y: u32, _sample: u32) -> Result<f32, GridError> {
        Ok(0.0)
    }

    fn metadata_item(&self, _key: &str, _sample: Option<u32>) -> Option<&str> {
        None
    }
}

// =============================================================================
// GridKind
// =============================================================================

/// Behaviour shared by every grid of one kind.
pub trait GridKind {
    /// Short label used in logs and summaries.
    const LABEL: &'static str;

    /// Slack added to the extent when matching a point.
    fn lookup_epsilon(_extent: &ExtentAndRes) -> f64 {
        0.0
    }

    fn null_sampler() -> Box<Self>;

    fn sampler_changed(&self) -> bool;

    /// `TYPE` metadata used to keep unrelated grids out of each other's
    /// hierarchy.
    fn type_tag(&self) -> Option<&str> {
        None
    }
}

impl GridKind for dyn HorizontalSampler {
    const LABEL: &'static str = "horizontal";

    fn lookup_epsilon(extent: &ExtentAndRes) -> f64 {
        (extent.res_x + extent.res_y) * HORIZONTAL_LOOKUP_TOLERANCE
    }

    fn null_sampler() -> Box<Self> {
        Box::new(NullSampler)
    }

    fn sampler_changed(&self) -> bool {
        self.has_changed()
    }
}

impl GridKind for dyn VerticalSampler {
    const LABEL: &'static str = "vertical";

    fn null_sampler() -> Box<Self> {
        Box::new(NullSampler)
    }

    fn sampler_changed(&self) -> bool {
        self.has_changed()
    }
}

impl GridKind for dyn GenericSampler {
    const LABEL: &'static str = "generic";

    fn null_sampler() -> Box<Self> {
        Box::new(NullSampler)
    }

    fn sampler_changed(&self) -> bool {
        self.has_changed()
    }

    fn type_tag(&self) -> Option<&str> {
        self.metadata_item("TYPE", None).filter(|t| !t.is_empty())
    }
}

// =============================================================================
// Grid
// =============================================================================

/// A shift grid and its finer children.
pub struct Grid<S: ?Sized> {
    name: String,
    width: u32,
    height: u32,
    extent: ExtentAndRes,
    is_null: bool,
    /// Position in the order grids were read from their resource
    ordinal: usize,
    children: Vec<Grid<S>>,
    sampler: Box<S>,
}

pub type HorizontalShiftGrid = Grid<dyn HorizontalSampler>;
pub type VerticalShiftGrid = Grid<dyn VerticalSampler>;
pub type GenericShiftGrid = Grid<dyn GenericSampler>;

pub type HorizontalGridSet = GridSet<dyn HorizontalSampler>;
pub type VerticalGridSet = GridSet<dyn VerticalSampler>;
pub type GenericGridSet = GridSet<dyn GenericSampler>;

impl<S: ?Sized + GridKind> Grid<S> {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        extent: ExtentAndRes,
        sampler: Box<S>,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            extent,
            is_null: false,
            ordinal: 0,
            children: Vec::new(),
            sampler,
        }
    }

    /// The synthetic 3×3 global grid with zero shift.
    pub fn null() -> Self {
        Self {
            name: "null".to_string(),
            width: 3,
            height: 3,
            extent: ExtentAndRes::global(),
            is_null: true,
            ordinal: 0,
            children: Vec::new(),
            sampler: S::null_sampler(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extent(&self) -> &ExtentAndRes {
        &self.extent
    }

    pub fn is_null_grid(&self) -> bool {
        self.is_null
    }

    /// Read order of this grid within its set, unique per set.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub(crate) fn set_ordinal(&mut self, ordinal: usize) {
        self.ordinal = ordinal;
    }

    pub fn children(&self) -> &[Grid<S>] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Grid<S>> {
        &mut self.children
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn has_changed(&self) -> bool {
        self.sampler.sampler_changed()
    }

    pub fn type_tag(&self) -> Option<&str> {
        self.sampler.type_tag()
    }

    /// Whether `(lon, lat)` falls inside this grid for lookup purposes.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.is_null || self.extent.includes_point(lon, lat, S::lookup_epsilon(&self.extent))
    }

    /// Deepest grid of this subtree covering the point.
    ///
    /// Children are tried in order and the first match wins; the point is
    /// assumed to be covered by `self`.
    pub fn grid_at(&self, lon: f64, lat: f64) -> &Grid<S> {
        self.children
            .iter()
            .find(|child| child.covers(lon, lat))
            .map_or(self, |child| child.grid_at(lon, lat))
    }

    /// Number of grids in this subtree, `self` included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Grid::count).sum::<usize>()
    }

    pub fn summary(&self) -> GridSummary {
        GridSummary {
            name: self.name.clone(),
            kind: S::LABEL,
            width: self.width,
            height: self.height,
            extent: self.extent.to_degrees(),
            grid_type: self.type_tag().map(str::to_string),
            children: self.children.iter().map(Grid::summary).collect(),
        }
    }
}

impl HorizontalShiftGrid {
    /// Shift at node `(x, y)`, east-positive radians.
    pub fn value_at(&self, x: u32, y: u32) -> Result<LonLat, GridError> {
        self.sampler.lon_lat_shift(x, y)
    }
}

impl VerticalShiftGrid {
    pub fn value_at(&self, x: u32, y: u32) -> Result<f32, GridError> {
        self.sampler.value(x, y)
    }

    pub fn is_nodata(&self, value: f32, multiplier: f64) -> bool {
        self.sampler.is_nodata(value, multiplier)
    }
}

impl GenericShiftGrid {
    pub fn value_at(&self, x: u32, y: u32, sample: u32) -> Result<f32, GridError> {
        self.sampler.value(x, y, sample)
    }

    pub fn samples_per_pixel(&self) -> u32 {
        self.sampler.samples_per_pixel()
    }

    /// `TYPE` metadata, empty when absent.
    pub fn grid_type(&self) -> &str {
        self.sampler.metadata_item("TYPE", None).unwrap_or("")
    }

    pub fn metadata_item(&self, key: &str, sample: Option<u32>) -> Option<&str> {
        self.sampler.metadata_item(key, sample)
    }

    pub fn description(&self, sample: u32) -> Option<&str> {
        self.sampler.description(sample)
    }

    pub fn unit(&self, sample: u32) -> Option<&str> {
        self.sampler.unit(sample)
    }
}

impl<S: ?Sized> std::fmt::Debug for Grid<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("extent", &self.extent)
            .field("children", &self.children.len())
            .finish()
    }
}

/// Serializable description of a grid subtree.
#[derive(Debug, Clone, Serialize)]
pub struct GridSummary {
    pub name: String,
    pub kind: &'static str,
    pub width: u32,
    pub height: u32,
    /// Extent in degrees for geographic grids
    pub extent: ExtentAndRes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GridSummary>,
}
