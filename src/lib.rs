//! # gridshift
//!
//! Datum-shift grid engine: reads correction grids from disk and applies
//! interpolated horizontal, vertical and generic shifts to coordinates.
//!
//! Grid files are read lazily: opening parses headers only, and node values
//! are fetched by offset when a point needs them. Tiled and stripped GeoTIFF
//! grids keep recently decoded blocks in a per-resource LRU cache.
//!
//! ## Features
//!
//! - **Formats**: NTv1, CTable2, NTv2 (either byte order), GTX and GeoTIFF
//!   (classic or BigTIFF, tiled or stripped, uncompressed, Deflate or LZW)
//! - **Hierarchies**: nested subgrids, finest covering grid wins
//! - **Interpolation**: bilinear and biquadratic, iterative inversion
//! - **Grid lists**: comma-separated names, `@` marks an optional grid
//!
//! ## Architecture
//!
//! - [`io`] - Range readers and the decoded block cache
//! - [`mod@format`] - Grid file readers and the TIFF container parser
//! - [`grid`] - Grids, hierarchies and grid sets
//! - [`shift`] - Interpolation and the shift operations
//! - [`context`] - Resource lookup and error state
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use gridshift::{Context, Coordinate, Direction, GridOperation, HorizontalGridShift, TimeBracket};
//!
//! let mut ctx = Context::new().with_search_paths(["/usr/share/proj"]);
//! let mut op = HorizontalGridShift::new(&ctx, "ntv1_can.dat", TimeBracket::always())?;
//!
//! let input = Coordinate::from_degrees(-80.5, 44.5, 0.0, f64::INFINITY);
//! let output = op.apply(&mut ctx, input, Direction::Forward)?;
//! println!("{:?}", output.to_degrees());
//! # Ok::<(), gridshift::GridError>(())
//! ```

pub mod config;
pub mod context;
pub mod coord;
pub mod error;
pub mod format;
pub mod grid;
pub mod io;
pub mod shift;

// Re-export commonly used types
pub use context::{Context, Resource};
pub use coord::{adjlon, Coordinate, Direction, LonLat, LonLatZ, ARC_SECOND};
pub use error::{ErrorCode, GridError, IoError, TiffError};
pub use format::{detect_format, is_tiff_header, GridFormat};
pub use grid::{
    ExtentAndRes, GenericGridSet, GenericSampler, GenericShiftGrid, Grid, GridSet,
    GridSetSummary, GridSummary, HierarchyBuilder, HorizontalGridSet, HorizontalSampler,
    HorizontalShiftGrid, VerticalGridSet, VerticalSampler, VerticalShiftGrid,
};
pub use io::{BlockCache, FileRangeReader, MemoryRangeReader, RangeReader};
pub use shift::{
    apply_batch, clear_gridshift_known_grids, clear_hgridshift_known_grids,
    clear_vgridshift_known_grids, hgrid_apply, hgrid_value, parse_t_final, vgrid_value,
    GenericGridShift, GenericShifter, GridOperation, GridType, HorizontalGridShift,
    Interpolation, ShiftedPoint, TimeBracket, VerticalGridShift, DEFAULT_VERTICAL_MULTIPLIER,
};
