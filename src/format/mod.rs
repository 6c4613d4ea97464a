//! Readers for datum-shift grid files.
//!
//! Each reader parses the header once and serves node values on demand by
//! absolute offset, so opening a large grid is cheap.
//!
//! # Format Detection
//!
//! Use [`detect::detect_format`] to identify the format of a resource.
//! Supported formats:
//!
//! - **NTv1**: Canadian national transformation, version 1 (horizontal)
//! - **CTable2**: binary horizontal table (horizontal)
//! - **NTv2**: nested subgrids, either byte order (horizontal)
//! - **GTX**: NOAA vertical offset grid (vertical)
//! - **GeoTIFF**: tiled or stripped TIFF with GDAL metadata (any kind)

pub mod ctable2;
pub mod detect;
pub mod geotiff;
pub mod gtx;
pub mod ntv1;
pub mod ntv2;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, read_detect_header, GridFormat};

use std::fmt::Display;

use bytes::Bytes;
use tracing::error;

use crate::context::Resource;
use crate::error::GridError;
use crate::grid::ExtentAndRes;

/// Read the fixed-size header of a legacy grid.
///
/// A resource shorter than the header is a corrupt grid, not a missing one.
pub(crate) fn read_header(resource: &Resource, len: usize) -> Result<Bytes, GridError> {
    resource
        .reader
        .read_exact_at(0, len)
        .map_err(|e| GridError::load(&resource.name, format!("short header read: {}", e)))
}

/// Reject headers whose georeferencing cannot describe a real grid.
pub(crate) fn check_extent(name: &str, extent: &ExtentAndRes) -> Result<(), GridError> {
    extent.validate().map_err(|reason| {
        error!(grid = %name, reason = %reason, "Inconsistent georeferencing");
        GridError::load(name, format!("inconsistent georeferencing: {}", reason))
    })
}

/// Failure to fetch one node.
pub(crate) fn sample_unavailable(grid: &str, x: u32, y: u32, reason: impl Display) -> GridError {
    GridError::SampleUnavailable {
        grid: grid.to_string(),
        x,
        y,
        reason: reason.to_string(),
    }
}
