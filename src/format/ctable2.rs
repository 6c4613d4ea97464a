//! CTable2 reader.
//!
//! A 160-byte little-endian header starting with `CTABLE V2`, then
//! `(lon, lat)` f32 pairs in radians, rows south to north, west to east.

use std::sync::Arc;

use tracing::{debug, error};

use crate::context::Resource;
use crate::coord::LonLat;
use crate::error::GridError;
use crate::grid::{ExtentAndRes, HorizontalSampler, HorizontalShiftGrid};
use crate::io::RangeReader;

use super::tiff::ByteOrder;
use super::{read_header, sample_unavailable};

pub const CTABLE2_HEADER_SIZE: usize = 160;

const NODE_SIZE: u64 = 8;
const ORDER: ByteOrder = ByteOrder::LittleEndian;

struct Ctable2Grid {
    name: String,
    reader: Arc<dyn RangeReader>,
    width: u32,
}

impl HorizontalSampler for Ctable2Grid {
    fn lon_lat_shift(&self, x: u32, y: u32) -> Result<LonLat, GridError> {
        let offset = CTABLE2_HEADER_SIZE as u64
            + NODE_SIZE * (u64::from(y) * u64::from(self.width) + u64::from(x));
        let node = self
            .reader
            .read_exact_at(offset, NODE_SIZE as usize)
            .map_err(|e| sample_unavailable(&self.name, x, y, e))?;

        // Stored positive west
        let lon = ORDER.read_f32(&node[0..4]);
        let lat = ORDER.read_f32(&node[4..8]);
        Ok(LonLat::new(-f64::from(lon), f64::from(lat)))
    }

    fn has_changed(&self) -> bool {
        self.reader.has_changed()
    }
}

/// Open a CTable2 file as a single horizontal grid.
pub fn open(resource: &Resource) -> Result<HorizontalShiftGrid, GridError> {
    let name = resource.name.as_str();
    let header = read_header(resource, CTABLE2_HEADER_SIZE)?;

    let west = ORDER.read_f64(&header[96..104]);
    let south = ORDER.read_f64(&header[104..112]);
    let res_x = ORDER.read_f64(&header[112..120]);
    let res_y = ORDER.read_f64(&header[120..128]);
    let georef_ok = west.abs() <= 4.0 * std::f64::consts::PI
        && south.abs() <= std::f64::consts::PI + 1e-5
        && res_x > 1e-10
        && res_y > 1e-10;
    if !georef_ok {
        error!(grid = %name, "Inconsistent georeferencing");
        return Err(GridError::load(name, "inconsistent georeferencing"));
    }

    let width = ORDER.read_i32(&header[128..132]);
    let height = ORDER.read_i32(&header[132..136]);
    if width <= 0 || height <= 0 {
        return Err(GridError::load(
            name,
            format!("invalid dimensions {}x{}", width, height),
        ));
    }
    let (width, height) = (width as u32, height as u32);

    // The north edge is derived from the longitude spacing
    let extent = ExtentAndRes {
        is_geographic: true,
        west,
        south,
        east: west + f64::from(width - 1) * res_x,
        north: south + f64::from(height - 1) * res_x,
        res_x,
        res_y,
    };
    debug!(grid = %name, width, height, "Opened CTable2 grid");

    let sampler = Ctable2Grid {
        name: name.to_string(),
        reader: Arc::clone(&resource.reader),
        width,
    };
    Ok(HorizontalShiftGrid::new(name, width, height, extent, Box::new(sampler)))
}
