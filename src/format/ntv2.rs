//! NTv2 reader.
//!
//! The file is an 11-record overview header followed by subfiles, each an
//! 11-record header and `GS_COUNT` nodes of four f32 (lat shift, lon shift,
//! lat accuracy, lon accuracy) in arc-seconds. Records are 16 bytes: an
//! 8-byte ASCII key and an 8-byte value.
//!
//! The byte order is not declared explicitly: the overview's first value
//! (`NUM_OREC = 11`) reads as 11 only in the file's own order.
//!
//! ```text
//! Subfile record  Key       Value
//! 0               SUB_NAME  grid name
//! 1               PARENT    parent name or NONE
//! 4               S_LAT     f64 arc-seconds
//! 5               N_LAT
//! 6               E_LONG    positive west
//! 7               W_LONG    positive west
//! 8               LAT_INC
//! 9               LONG_INC
//! 10              GS_COUNT  i32
//! ```

use std::sync::Arc;

use tracing::{debug, error};

use crate::context::Resource;
use crate::coord::{LonLat, ARC_SECOND};
use crate::error::GridError;
use crate::grid::{ExtentAndRes, HierarchyBuilder, HorizontalSampler, HorizontalShiftGrid};
use crate::io::RangeReader;

use super::tiff::ByteOrder;
use super::{check_extent, read_header, sample_unavailable};

/// Size of the overview header and of every subfile header.
pub const NTV2_HEADER_SIZE: usize = 11 * 16;

const NODE_SIZE: u64 = 16;
const NUM_OREC: u8 = 11;

struct Ntv2Subgrid {
    name: String,
    reader: Arc<dyn RangeReader>,
    byte_order: ByteOrder,
    data_offset: u64,
    width: u32,
}

impl HorizontalSampler for Ntv2Subgrid {
    fn lon_lat_shift(&self, x: u32, y: u32) -> Result<LonLat, GridError> {
        let Some(column) = (self.width - 1).checked_sub(x).map(u64::from) else {
            return Err(sample_unavailable(&self.name, x, y, "column out of range"));
        };
        // Rows run east to west
        let offset = self.data_offset + NODE_SIZE * (u64::from(y) * u64::from(self.width) + column);
        let node = self
            .reader
            .read_exact_at(offset, 8)
            .map_err(|e| sample_unavailable(&self.name, x, y, e))?;

        let lat = (f64::from(self.byte_order.read_f32(&node[0..4])) * ARC_SECOND) as f32;
        let lon = (f64::from(self.byte_order.read_f32(&node[4..8])) * ARC_SECOND) as f32;
        Ok(LonLat::new(-f64::from(lon), f64::from(lat)))
    }

    fn has_changed(&self) -> bool {
        self.reader.has_changed()
    }
}

/// Open an NTv2 file, threading subgrids to their parents by name.
pub fn open(resource: &Resource) -> Result<Vec<HorizontalShiftGrid>, GridError> {
    let name = resource.name.as_str();
    let overview = read_header(resource, NTV2_HEADER_SIZE)?;

    let byte_order = if overview[8] == NUM_OREC {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    };
    let num_subfiles = byte_order.read_u32(&overview[40..44]);
    debug!(grid = %name, num_subfiles, ?byte_order, "Reading NTv2 file");

    let mut builder = HierarchyBuilder::new();
    let mut offset = NTV2_HEADER_SIZE as u64;
    for _ in 0..num_subfiles {
        let header = resource
            .reader
            .read_exact_at(offset, NTV2_HEADER_SIZE)
            .map_err(|e| GridError::load(name, format!("truncated subfile header: {}", e)))?;
        if &header[0..8] != b"SUB_NAME" {
            return Err(GridError::load(name, "subfile header does not start with SUB_NAME"));
        }

        let grid_name = record_name(&header[8..16]);
        let parent_name = record_name(&header[24..32]);
        let record = |k: usize| byte_order.read_f64(&header[16 * k + 8..16 * k + 16]) * ARC_SECOND;

        let extent = ExtentAndRes {
            is_geographic: true,
            west: -record(7),
            south: record(4),
            east: -record(6),
            north: record(5),
            res_x: record(9),
            res_y: record(8),
        };
        check_extent(name, &extent)?;

        let columns = ExtentAndRes::dimension(extent.east - extent.west, extent.res_x);
        let rows = ExtentAndRes::dimension(extent.north - extent.south, extent.res_y);
        debug!(
            grid = %grid_name,
            columns,
            rows,
            west = extent.west.to_degrees(),
            south = extent.south.to_degrees(),
            east = extent.east.to_degrees(),
            north = extent.north.to_degrees(),
            "NTv2 subgrid"
        );

        let gs_count = byte_order.read_u32(&header[16 * 10 + 8..16 * 10 + 12]);
        if u64::from(gs_count) != u64::from(columns) * u64::from(rows) {
            error!(gs_count, columns, rows, "GS_COUNT does not match expected cells");
            return Err(GridError::load(
                name,
                format!("GS_COUNT({}) does not match expected cells ({}x{})", gs_count, columns, rows),
            ));
        }

        let data_offset = offset + NTV2_HEADER_SIZE as u64;
        let sampler = Ntv2Subgrid {
            name: grid_name.clone(),
            reader: Arc::clone(&resource.reader),
            byte_order,
            data_offset,
            width: columns,
        };
        let grid = HorizontalShiftGrid::new(grid_name.as_str(), columns, rows, extent, Box::new(sampler));
        builder.insert_by_name(grid, &grid_name, &parent_name);

        offset = data_offset + u64::from(gs_count) * NODE_SIZE;
    }

    Ok(builder.finish())
}

/// Decode an 8-byte name field, dropping trailing blanks and NULs.
fn record_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(|c| c == ' ' || c == '\0')
        .to_string()
}
