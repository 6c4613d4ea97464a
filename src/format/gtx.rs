//! GTX reader.
//!
//! ```text
//! Offset  Type  Field
//! 0       f64   south-west node latitude (degrees)
//! 8       f64   south-west node longitude
//! 16      f64   latitude spacing
//! 24      f64   longitude spacing
//! 32      i32   rows
//! 36      i32   columns
//! 40      f32   values, rows south to north, west to east
//! ```
//!
//! Everything is big-endian.

use std::sync::Arc;

use tracing::{debug, error};

use crate::context::Resource;
use crate::error::GridError;
use crate::grid::{ExtentAndRes, VerticalSampler, VerticalShiftGrid};
use crate::io::RangeReader;

use super::tiff::ByteOrder;
use super::{read_header, sample_unavailable};

pub const GTX_HEADER_SIZE: usize = 40;

/// Official GTX nodata value.
pub const GTX_NODATA: f32 = -88.8888;

/// Scaled values beyond this magnitude are treated as holes.
const NODATA_LIMIT: f64 = 1000.0;

const ORDER: ByteOrder = ByteOrder::BigEndian;

struct GtxGrid {
    name: String,
    reader: Arc<dyn RangeReader>,
    width: u32,
}

impl VerticalSampler for GtxGrid {
    fn value(&self, x: u32, y: u32) -> Result<f32, GridError> {
        let offset = GTX_HEADER_SIZE as u64 + 4 * (u64::from(y) * u64::from(self.width) + u64::from(x));
        let bytes = self
            .reader
            .read_exact_at(offset, 4)
            .map_err(|e| sample_unavailable(&self.name, x, y, e))?;
        Ok(ORDER.read_f32(&bytes))
    }

    fn is_nodata(&self, value: f32, multiplier: f64) -> bool {
        // Some grids use other large values as holes
        let scaled = f64::from(value) * multiplier;
        scaled > NODATA_LIMIT || scaled < -NODATA_LIMIT || value == GTX_NODATA
    }

    fn has_changed(&self) -> bool {
        self.reader.has_changed()
    }
}

/// Open a GTX file as a single vertical grid.
pub fn open(resource: &Resource) -> Result<VerticalShiftGrid, GridError> {
    let name = resource.name.as_str();
    let header = read_header(resource, GTX_HEADER_SIZE)?;

    let y_origin = ORDER.read_f64(&header[0..8]);
    let mut x_origin = ORDER.read_f64(&header[8..16]);
    let y_step = ORDER.read_f64(&header[16..24]);
    let x_step = ORDER.read_f64(&header[24..32]);
    let rows = ORDER.read_i32(&header[32..36]);
    let columns = ORDER.read_i32(&header[36..40]);

    if !(-360.0..=360.0).contains(&x_origin) || !(-90.0..=90.0).contains(&y_origin) {
        error!(grid = %name, "gtx file header has invalid extents, corrupt?");
        return Err(GridError::load(name, "invalid GTX extents"));
    }
    if rows <= 0 || columns <= 0 {
        error!(grid = %name, rows, columns, "gtx file header has invalid dimensions");
        return Err(GridError::load(name, format!("invalid dimensions {}x{}", columns, rows)));
    }

    // Some files come in 0-360; grids spanning the dateline stay unsolved
    if x_origin >= 180.0 {
        x_origin -= 360.0;
    }
    if x_origin >= 0.0 && x_origin + x_step * f64::from(columns) > 180.0 {
        debug!(grid = %name, "This GTX spans the dateline! This will cause problems.");
    }

    let extent = ExtentAndRes {
        is_geographic: true,
        west: x_origin.to_radians(),
        south: y_origin.to_radians(),
        east: (x_origin + x_step * f64::from(columns - 1)).to_radians(),
        north: (y_origin + y_step * f64::from(rows - 1)).to_radians(),
        res_x: x_step.to_radians(),
        res_y: y_step.to_radians(),
    };
    let (width, height) = (columns as u32, rows as u32);
    debug!(grid = %name, width, height, "Opened GTX grid");

    let sampler = GtxGrid {
        name: name.to_string(),
        reader: Arc::clone(&resource.reader),
        width,
    };
    Ok(VerticalShiftGrid::new(name, width, height, extent, Box::new(sampler)))
}
