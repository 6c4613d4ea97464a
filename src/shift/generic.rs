//! Multi-channel shifts driven by grid `TYPE` metadata.
//!
//! A generic grid list may mix horizontal offsets, 3D geographic offsets
//! and one kind of vertical offset. The main type is applied first; when
//! the list also carries a vertical type next to plain horizontal grids,
//! that auxiliary type is applied in a second, vertical-only pass.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::fmt;

use tracing::{debug, trace};

use crate::context::Context;
use crate::coord::{adjlon, Direction, LonLat, LonLatZ, ARC_SECOND};
use crate::error::GridError;
use crate::grid::{GenericGridSet, GenericShiftGrid};

use super::horizontal::{INVERSE_TOLERANCE, MAX_ITERATIONS};
use super::interpolate::{
    bilinear, biquadratic, locate, quadratic_window, Interpolation, GENERIC_EDGE_TOLERANCE,
};

/// Relative slack used when normalizing longitudes against a grid.
const LONGITUDE_SLACK: f64 = 1e-5;

// =============================================================================
// Grid types
// =============================================================================

/// Value of the `TYPE` metadata item of a generic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridType {
    HorizontalOffset,
    Geographic3dOffset,
    EllipsoidalHeightOffset,
    VerticalOffsetVerticalToVertical,
    VerticalOffsetGeographicToVertical,
}

impl GridType {
    pub fn as_str(self) -> &'static str {
        match self {
            GridType::HorizontalOffset => "HORIZONTAL_OFFSET",
            GridType::Geographic3dOffset => "GEOGRAPHIC_3D_OFFSET",
            GridType::EllipsoidalHeightOffset => "ELLIPSOIDAL_HEIGHT_OFFSET",
            GridType::VerticalOffsetVerticalToVertical => "VERTICAL_OFFSET_VERTICAL_TO_VERTICAL",
            GridType::VerticalOffsetGeographicToVertical => {
                "VERTICAL_OFFSET_GEOGRAPHIC_TO_VERTICAL"
            }
        }
    }

    pub fn from_metadata(value: &str) -> Option<Self> {
        match value {
            "HORIZONTAL_OFFSET" => Some(GridType::HorizontalOffset),
            "GEOGRAPHIC_3D_OFFSET" => Some(GridType::Geographic3dOffset),
            "ELLIPSOIDAL_HEIGHT_OFFSET" => Some(GridType::EllipsoidalHeightOffset),
            "VERTICAL_OFFSET_VERTICAL_TO_VERTICAL" => {
                Some(GridType::VerticalOffsetVerticalToVertical)
            }
            "VERTICAL_OFFSET_GEOGRAPHIC_TO_VERTICAL" => {
                Some(GridType::VerticalOffsetGeographicToVertical)
            }
            _ => None,
        }
    }

    fn needs_lon_lat(self) -> bool {
        matches!(self, GridType::HorizontalOffset | GridType::Geographic3dOffset)
    }

    fn needs_height(self) -> bool {
        self != GridType::HorizontalOffset
    }
}

impl fmt::Display for GridType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grid types present in a list and the order in which they apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridTypes {
    pub main: GridType,
    /// Vertical type applied after a horizontal main pass
    pub aux: Option<GridType>,
    pub has_horizontal: bool,
    pub has_geographic_3d: bool,
}

impl GridTypes {
    /// Classify the top-level grids of `sets`.
    ///
    /// Every non-null grid needs a recognized `TYPE`, and at most one kind
    /// of vertical offset may be present. A list holding only null grids
    /// is treated as horizontal.
    pub fn check(sets: &[GenericGridSet]) -> Result<Self, GridError> {
        let mut present: Vec<GridType> = Vec::new();
        for set in sets {
            for grid in set.grids().iter().filter(|g| !g.is_null_grid()) {
                let grid_type = match grid.grid_type() {
                    "" => {
                        return Err(GridError::load(
                            set.name(),
                            format!("missing TYPE metadata item in grid {}", grid.name()),
                        ))
                    }
                    value => GridType::from_metadata(value).ok_or_else(|| {
                        GridError::load(
                            set.name(),
                            format!("unhandled value {:?} for TYPE metadata item", value),
                        )
                    })?,
                };
                if !present.contains(&grid_type) {
                    present.push(grid_type);
                }
            }
        }

        let has = |t: GridType| present.contains(&t);
        let vertical = [
            GridType::EllipsoidalHeightOffset,
            GridType::VerticalOffsetGeographicToVertical,
            GridType::VerticalOffsetVerticalToVertical,
        ]
        .into_iter()
        .filter(|t| has(*t))
        .collect::<Vec<_>>();
        if vertical.len() > 1 {
            return Err(GridError::load(
                sets.iter().map(GenericGridSet::name).collect::<Vec<_>>().join(","),
                "unsupported mix of grid types",
            ));
        }

        let has_horizontal = has(GridType::HorizontalOffset);
        let has_geographic_3d = has(GridType::Geographic3dOffset);
        let main = if has_geographic_3d {
            GridType::Geographic3dOffset
        } else if has_horizontal {
            GridType::HorizontalOffset
        } else {
            vertical.first().copied().unwrap_or(GridType::HorizontalOffset)
        };
        let aux = if has_horizontal {
            vertical.first().copied()
        } else {
            None
        };

        Ok(Self {
            main,
            aux,
            has_horizontal,
            has_geographic_3d,
        })
    }

    /// Whether the main pass only changes heights.
    pub fn is_vertical_only(&self) -> bool {
        !(self.has_geographic_3d || self.has_horizontal)
    }
}

/// First grid of type `grid_type` covering the point, with its set index.
pub fn find_grid<'a>(
    sets: &'a [GenericGridSet],
    grid_type: GridType,
    lon: f64,
    lat: f64,
) -> Option<(usize, &'a GenericShiftGrid)> {
    sets.iter()
        .enumerate()
        .find_map(|(i, set)| set.grid_at_type(grid_type.as_str(), lon, lat).map(|g| (i, g)))
}

/// Bring `lp` within reach of a grid that does not wrap by itself.
fn normalize_longitude(grid: &GenericShiftGrid, lp: LonLat) -> LonLat {
    let extent = grid.extent();
    let epsilon = (extent.res_x + extent.res_y) * LONGITUDE_SLACK;
    let lon = if lp.lon < extent.west - epsilon {
        lp.lon + TAU
    } else if lp.lon > extent.east + epsilon {
        lp.lon - TAU
    } else {
        lp.lon
    };
    LonLat::new(lon, lp.lat)
}

// =============================================================================
// Channel selection
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Channel {
    sample: u32,
    /// Stored unit to radians, sign included
    factor: f64,
}

#[derive(Debug, Clone, Copy)]
struct ChannelInfo {
    /// `(latitude, longitude)` offsets
    lat_lon: Option<(Channel, Channel)>,
    height: Option<u32>,
    bilinear: bool,
}

fn angular_factor(grid: &GenericShiftGrid, sample: u32) -> Result<f64, GridError> {
    match grid.unit(sample).unwrap_or("") {
        "" | "arc-second" => Ok(ARC_SECOND),
        "radian" => Ok(1.0),
        "degree" => Ok(1f64.to_radians()),
        other => Err(GridError::load(
            grid.name(),
            format!("unsupported unit {:?} for angular offset", other),
        )),
    }
}

fn channel_info(
    grid: &GenericShiftGrid,
    interpolation: Option<Interpolation>,
) -> Result<ChannelInfo, GridError> {
    let grid_type = GridType::from_metadata(grid.grid_type());
    let samples = grid.samples_per_pixel();

    let mut lat = None;
    let mut lon = None;
    let mut height = None;
    for sample in 0..samples {
        match grid.description(sample).unwrap_or("") {
            "latitude_offset" => {
                lat = Some(Channel {
                    sample,
                    factor: angular_factor(grid, sample)?,
                });
            }
            "longitude_offset" => {
                let sign = match grid.metadata_item("positive_value", Some(sample)) {
                    Some("west") => -1.0,
                    _ => 1.0,
                };
                lon = Some(Channel {
                    sample,
                    factor: sign * angular_factor(grid, sample)?,
                });
            }
            "ellipsoidal_height_offset" | "geoid_undulation" | "vertical_offset" => {
                match grid.unit(sample).unwrap_or("") {
                    "" | "metre" => height = Some(sample),
                    other => {
                        return Err(GridError::load(
                            grid.name(),
                            format!("unsupported unit {:?} for height offset", other),
                        ))
                    }
                }
            }
            _ => {}
        }
    }

    if samples >= 2
        && lat.is_none()
        && lon.is_none()
        && grid_type == Some(GridType::HorizontalOffset)
    {
        lat = Some(Channel {
            sample: 0,
            factor: ARC_SECOND,
        });
        lon = Some(Channel {
            sample: 1,
            factor: ARC_SECOND,
        });
    }

    let lat_lon = lat.zip(lon);
    if let Some(t) = grid_type {
        if (t.needs_lon_lat() && lat_lon.is_none()) || (t.needs_height() && height.is_none()) {
            return Err(GridError::load(
                grid.name(),
                format!("grid lacks the samples expected for {}", t),
            ));
        }
    }

    let method = match interpolation {
        Some(method) => method,
        None => match grid.metadata_item("interpolation_method", None) {
            Some(value) if !value.is_empty() => value.parse()?,
            _ => Interpolation::Bilinear,
        },
    };

    Ok(ChannelInfo {
        lat_lon,
        height,
        bilinear: method == Interpolation::Bilinear || grid.width() < 3 || grid.height() < 3,
    })
}

// =============================================================================
// Interpolator
// =============================================================================

/// Per-grid channel selection, computed on first use.
#[derive(Debug, Default)]
struct Interpolator {
    method: Option<Interpolation>,
    /// Keyed by set index and grid ordinal
    info: HashMap<(usize, usize), ChannelInfo>,
}

impl Interpolator {
    /// Shift at `lp`: longitude/latitude in radians, height in metres.
    ///
    /// `Ok(None)` when the point is outside the grid or a node cannot be
    /// read; `Err` when the grid's metadata is unusable.
    fn shift(
        &mut self,
        set_index: usize,
        grid: &GenericShiftGrid,
        lp: LonLat,
    ) -> Result<Option<LonLatZ>, GridError> {
        let key = (set_index, grid.ordinal());
        let info = match self.info.get(&key) {
            Some(info) => *info,
            None => {
                let info = channel_info(grid, self.method)?;
                self.info.insert(key, info);
                info
            }
        };

        let extent = grid.extent();
        let x = (lp.lon - extent.west) / extent.res_x;
        let y = (lp.lat - extent.south) / extent.res_y;
        let Some((ix, fx)) = locate(x, grid.width(), GENERIC_EDGE_TOLERANCE) else {
            return Ok(None);
        };
        let Some((iy, fy)) = locate(y, grid.height(), GENERIC_EDGE_TOLERANCE) else {
            return Ok(None);
        };

        Ok(if info.bilinear {
            bilinear_shift(grid, &info, ix, fx, iy, fy)
        } else {
            let (ix, fx) = quadratic_window(ix, fx, grid.width());
            let (iy, fy) = quadratic_window(iy, fy, grid.height());
            biquadratic_shift(grid, &info, ix, fx, iy, fy)
        })
    }

    fn clear(&mut self) {
        self.info.clear();
    }
}

fn node(grid: &GenericShiftGrid, x: u32, y: u32, sample: u32) -> Option<f64> {
    match grid.value_at(x, y, sample) {
        Ok(v) => Some(f64::from(v)),
        Err(e) => {
            trace!(grid = %grid.name(), error = %e, "Node fetch failed");
            None
        }
    }
}

fn corners(grid: &GenericShiftGrid, ix: u32, iy: u32, sample: u32) -> Option<[f64; 4]> {
    Some([
        node(grid, ix, iy, sample)?,
        node(grid, ix + 1, iy, sample)?,
        node(grid, ix, iy + 1, sample)?,
        node(grid, ix + 1, iy + 1, sample)?,
    ])
}

fn window(grid: &GenericShiftGrid, ix: u32, iy: u32, sample: u32) -> Option<[[f64; 3]; 3]> {
    let mut nodes = [[0.0; 3]; 3];
    for (j, row) in (0u32..).zip(nodes.iter_mut()) {
        for (i, value) in (0u32..).zip(row.iter_mut()) {
            *value = node(grid, ix + i, iy + j, sample)?;
        }
    }
    Some(nodes)
}

fn bilinear_shift(
    grid: &GenericShiftGrid,
    info: &ChannelInfo,
    ix: u32,
    fx: f64,
    iy: u32,
    fy: f64,
) -> Option<LonLatZ> {
    let (lon, lat) = match info.lat_lon {
        Some((lat, lon)) => (
            bilinear(fx, fy, corners(grid, ix, iy, lon.sample)?) * lon.factor,
            bilinear(fx, fy, corners(grid, ix, iy, lat.sample)?) * lat.factor,
        ),
        None => (0.0, 0.0),
    };
    let z = match info.height {
        Some(sample) => bilinear(fx, fy, corners(grid, ix, iy, sample)?),
        None => 0.0,
    };
    Some(LonLatZ::new(lon, lat, z))
}

fn biquadratic_shift(
    grid: &GenericShiftGrid,
    info: &ChannelInfo,
    ix: u32,
    fx: f64,
    iy: u32,
    fy: f64,
) -> Option<LonLatZ> {
    let (lon, lat) = match info.lat_lon {
        Some((lat, lon)) => (
            biquadratic(fx, fy, &window(grid, ix, iy, lon.sample)?) * lon.factor,
            biquadratic(fx, fy, &window(grid, ix, iy, lat.sample)?) * lat.factor,
        ),
        None => (0.0, 0.0),
    };
    let z = match info.height {
        Some(sample) => biquadratic(fx, fy, &window(grid, ix, iy, sample)?),
        None => 0.0,
    };
    Some(LonLatZ::new(lon, lat, z))
}

// =============================================================================
// Shifter
// =============================================================================

enum Step {
    Done(LonLatZ),
    Miss,
    /// The grid's file changed; reopen this set and retry
    Changed(usize),
}

/// Applies a generic grid list to points.
#[derive(Debug)]
pub struct GenericShifter {
    sets: Vec<GenericGridSet>,
    types: GridTypes,
    interpolator: Interpolator,
}

impl GenericShifter {
    /// Wrap an opened list; fails when its grid types cannot be combined.
    ///
    /// `interpolation` overrides the `interpolation_method` metadata of
    /// every grid.
    pub fn new(
        sets: Vec<GenericGridSet>,
        interpolation: Option<Interpolation>,
    ) -> Result<Self, GridError> {
        let types = GridTypes::check(&sets)?;
        debug!(
            main = %types.main,
            aux = ?types.aux.map(GridType::as_str),
            "Classified generic grids"
        );
        Ok(Self {
            sets,
            types,
            interpolator: Interpolator {
                method: interpolation,
                info: HashMap::new(),
            },
        })
    }

    pub fn sets(&self) -> &[GenericGridSet] {
        &self.sets
    }

    pub fn types(&self) -> GridTypes {
        self.types
    }

    /// Shift at `lp` from the first grid of the main type covering it.
    pub fn value(&mut self, lp: LonLat) -> Result<LonLatZ, GridError> {
        let (index, grid) = find_grid(&self.sets, self.types.main, lp.lon, lp.lat)
            .ok_or(GridError::GridArea)?;
        if grid.is_null_grid() {
            return Ok(LonLatZ::new(0.0, 0.0, 0.0));
        }
        let lp = normalize_longitude(grid, lp);
        self.interpolator
            .shift(index, grid, lp)?
            .ok_or(GridError::GridArea)
    }

    /// Shift one point. An empty list leaves points unchanged.
    pub fn apply(
        &mut self,
        ctx: &Context,
        input: LonLatZ,
        direction: Direction,
    ) -> Result<LonLatZ, GridError> {
        if self.sets.is_empty() {
            return Ok(input);
        }
        let types = self.types;

        let mut candidates = vec![types.main];
        if types.main == GridType::Geographic3dOffset && types.has_horizontal {
            candidates.push(GridType::HorizontalOffset);
        }
        let (out, matched) =
            self.pass(ctx, &candidates, types.is_vertical_only(), input, direction)?;

        match types.aux {
            Some(aux) if matched != GridType::Geographic3dOffset => {
                let (out, _) = self.pass(ctx, &[aux], true, out, direction)?;
                Ok(out)
            }
            _ => Ok(out),
        }
    }

    /// Reopen every set through `ctx`.
    pub fn reassign_context(&mut self, ctx: &Context) -> Result<(), GridError> {
        self.interpolator.clear();
        for set in &mut self.sets {
            set.reassign_context(ctx)?;
        }
        Ok(())
    }

    /// Apply the first grid of the first candidate type covering `input`.
    fn pass(
        &mut self,
        ctx: &Context,
        candidates: &[GridType],
        vertical_only: bool,
        input: LonLatZ,
        direction: Direction,
    ) -> Result<(LonLatZ, GridType), GridError> {
        let mut retried = false;
        loop {
            let (step, matched) = {
                let sets = &self.sets;
                let (grid_type, index, grid) = candidates
                    .iter()
                    .find_map(|&t| {
                        find_grid(sets, t, input.lon, input.lat).map(|(i, g)| (t, i, g))
                    })
                    .ok_or(GridError::OutsideGrid)?;
                if grid.is_null_grid() {
                    return Ok((input, grid_type));
                }
                let step = apply_grid(
                    sets,
                    &mut self.interpolator,
                    grid_type,
                    vertical_only,
                    input,
                    direction,
                    index,
                    grid,
                )?;
                (step, grid_type)
            };

            match step {
                Step::Done(out) => return Ok((out, matched)),
                Step::Changed(index) if !retried => {
                    self.sets[index].reopen(ctx)?;
                    self.interpolator.clear();
                    retried = true;
                }
                Step::Miss | Step::Changed(_) => return Err(GridError::OutsideGrid),
            }
        }
    }
}

/// Apply one grid, following the inverse iteration into neighbouring
/// grids of the same type when it leaves the first one.
#[allow(clippy::too_many_arguments)]
fn apply_grid<'a>(
    sets: &'a [GenericGridSet],
    interpolator: &mut Interpolator,
    grid_type: GridType,
    vertical_only: bool,
    input: LonLatZ,
    direction: Direction,
    mut index: usize,
    mut grid: &'a GenericShiftGrid,
) -> Result<Step, GridError> {
    let mut normalized = normalize_longitude(grid, input.horizontal());
    let Some(shift) = interpolator.shift(index, grid, normalized)? else {
        if grid.has_changed() {
            return Ok(Step::Changed(index));
        }
        return Ok(Step::Miss);
    };

    match direction {
        Direction::Forward => {
            return Ok(Step::Done(LonLatZ::new(
                input.lon + shift.lon,
                input.lat + shift.lat,
                input.z + shift.z,
            )))
        }
        Direction::Inverse if vertical_only => {
            return Ok(Step::Done(LonLatZ::new(input.lon, input.lat, input.z - shift.z)))
        }
        Direction::Inverse => {}
    }

    let mut guess = LonLat::new(normalized.lon - shift.lon, normalized.lat - shift.lat);
    let mut z_shift = shift.z;
    let mut remaining = MAX_ITERATIONS;
    loop {
        let residual = match interpolator.shift(index, grid, guess)? {
            Some(shift) => {
                z_shift = shift.z;
                let dif_lon = guess.lon + shift.lon - normalized.lon;
                let dif_lat = guess.lat + shift.lat - normalized.lat;
                guess.lon -= dif_lon;
                guess.lat -= dif_lat;
                dif_lon * dif_lon + dif_lat * dif_lat
            }
            None => {
                if grid.has_changed() {
                    return Ok(Step::Changed(index));
                }
                match find_grid(sets, grid_type, guess.lon, guess.lat) {
                    Some((next_index, next))
                        if !std::ptr::eq(next, grid) && !next.is_null_grid() =>
                    {
                        trace!(from = %grid.name(), to = %next.name(), "Switching grid");
                        grid = next;
                        index = next_index;
                        normalized = normalize_longitude(grid, input.horizontal());
                        f64::INFINITY
                    }
                    _ => {
                        debug!(
                            grid = %grid.name(),
                            "Inverse iteration left the grid, using current approximation"
                        );
                        break;
                    }
                }
            }
        };

        remaining -= 1;
        if remaining == 0 {
            debug!(grid = %grid.name(), "Inverse grid shift failed to converge");
            return Err(GridError::NoConvergence {
                best: LonLat::new(adjlon(guess.lon), guess.lat),
            });
        }
        if residual <= INVERSE_TOLERANCE * INVERSE_TOLERANCE {
            break;
        }
    }

    Ok(Step::Done(LonLatZ::new(
        adjlon(guess.lon),
        guess.lat,
        input.z - z_shift,
    )))
}
