//! NTv1 reader.
//!
//! ```text
//! Offset  Type    Field
//! 8       i32     record count, always 12
//! 24      f64     south latitude (degrees)
//! 40      f64     north latitude
//! 56      f64     east longitude, positive west
//! 72      f64     west longitude, positive west
//! 88      f64     latitude spacing
//! 104     f64     longitude spacing
//! 192     data    (lat, lon) f64 pairs in arc-seconds, rows south to
//!                 north, each row stored east to west
//! ```
//!
//! Everything is big-endian.

use std::sync::Arc;

use tracing::{debug, error};

use crate::context::Resource;
use crate::coord::{LonLat, ARC_SECOND};
use crate::error::GridError;
use crate::grid::{ExtentAndRes, HorizontalSampler, HorizontalShiftGrid};
use crate::io::RangeReader;

use super::tiff::ByteOrder;
use super::{check_extent, read_header, sample_unavailable};

pub const NTV1_HEADER_SIZE: usize = 192;

const NODE_SIZE: u64 = 16;
const RECORD_COUNT: i32 = 12;
const ORDER: ByteOrder = ByteOrder::BigEndian;

struct Ntv1Grid {
    name: String,
    reader: Arc<dyn RangeReader>,
    width: u32,
}

impl HorizontalSampler for Ntv1Grid {
    fn lon_lat_shift(&self, x: u32, y: u32) -> Result<LonLat, GridError> {
        let Some(column) = (self.width - 1).checked_sub(x).map(u64::from) else {
            return Err(sample_unavailable(&self.name, x, y, "column out of range"));
        };
        let offset = NTV1_HEADER_SIZE as u64 + NODE_SIZE * (u64::from(y) * u64::from(self.width) + column);
        let node = self
            .reader
            .read_exact_at(offset, NODE_SIZE as usize)
            .map_err(|e| sample_unavailable(&self.name, x, y, e))?;

        let lat = (ORDER.read_f64(&node[0..8]) * ARC_SECOND) as f32;
        let lon = (ORDER.read_f64(&node[8..16]) * ARC_SECOND) as f32;
        Ok(LonLat::new(-f64::from(lon), f64::from(lat)))
    }

    fn has_changed(&self) -> bool {
        self.reader.has_changed()
    }
}

/// Open an NTv1 file as a single horizontal grid.
pub fn open(resource: &Resource) -> Result<HorizontalShiftGrid, GridError> {
    let name = resource.name.as_str();
    let header = read_header(resource, NTV1_HEADER_SIZE)?;

    if ORDER.read_i32(&header[8..12]) != RECORD_COUNT {
        error!(grid = %name, "NTv1 grid shift file has wrong record count, corrupt?");
        return Err(GridError::load(name, "wrong NTv1 record count"));
    }

    let extent = ExtentAndRes {
        is_geographic: true,
        west: -ORDER.read_f64(&header[72..80]).to_radians(),
        south: ORDER.read_f64(&header[24..32]).to_radians(),
        east: -ORDER.read_f64(&header[56..64]).to_radians(),
        north: ORDER.read_f64(&header[40..48]).to_radians(),
        res_x: ORDER.read_f64(&header[104..112]).to_radians(),
        res_y: ORDER.read_f64(&header[88..96]).to_radians(),
    };
    check_extent(name, &extent)?;

    let width = ExtentAndRes::dimension(extent.east - extent.west, extent.res_x);
    let height = ExtentAndRes::dimension(extent.north - extent.south, extent.res_y);
    debug!(grid = %name, width, height, "Opened NTv1 grid");

    let sampler = Ntv1Grid {
        name: name.to_string(),
        reader: Arc::clone(&resource.reader),
        width,
    };
    Ok(HorizontalShiftGrid::new(name, width, height, extent, Box::new(sampler)))
}
