//! Grid shift application.
//!
//! - [`horizontal`]: longitude/latitude shifts with iterative inversion
//! - [`vertical`]: height offsets with nodata handling
//! - [`generic`]: metadata-driven shifts over GeoTIFF channels
//! - [`operation`]: the `hgridshift`, `vgridshift` and `gridshift`
//!   operations built on top of them

pub mod generic;
pub mod grid_list;
pub mod horizontal;
pub mod interpolate;
pub mod known_grids;
pub mod operation;
pub mod vertical;

pub use generic::{GenericShifter, GridType, GridTypes};
pub use grid_list::{open_list, OPTIONAL_PREFIX};
pub use horizontal::{hgrid_apply, hgrid_value};
pub use interpolate::Interpolation;
pub use known_grids::{
    clear_gridshift_known_grids, clear_hgridshift_known_grids, clear_vgridshift_known_grids,
};
pub use operation::{
    apply_batch, parse_t_final, GenericGridShift, GridOperation, HorizontalGridShift,
    ShiftedPoint, TimeBracket, VerticalGridShift, DEFAULT_VERTICAL_MULTIPLIER,
};
pub use vertical::vgrid_value;
