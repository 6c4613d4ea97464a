//! Format detection for grid resources.
//!
//! Legacy formats are recognized by fixed ASCII markers in their header,
//! GeoTIFF by the TIFF magic. GTX has no magic and is recognized by its
//! file extension.

use serde::Serialize;

use crate::error::GridError;
use crate::io::RangeReader;

use super::tiff::{ByteOrder, TIFF_HEADER_SIZE};

// =============================================================================
// GridFormat
// =============================================================================

/// On-disk encoding of a grid resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GridFormat {
    /// Canadian NTv1 (single grid, big-endian)
    Ntv1,
    /// CTable version 2 (single grid, little-endian)
    Ctable2,
    /// NTv2 with subgrids, either byte order
    Ntv2,
    /// NOAA vertical grid (big-endian)
    Gtx,
    /// GeoTIFF, one grid per image
    Gtiff,
    /// Synthetic zero-shift grid
    Null,
}

impl GridFormat {
    pub const fn name(self) -> &'static str {
        match self {
            GridFormat::Ntv1 => "ntv1",
            GridFormat::Ctable2 => "ctable2",
            GridFormat::Ntv2 => "ntv2",
            GridFormat::Gtx => "gtx",
            GridFormat::Gtiff => "gtiff",
            GridFormat::Null => "null",
        }
    }
}

impl std::fmt::Display for GridFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Bytes read from the start of a resource for detection.
pub const DETECT_HEADER_BYTES: usize = 160;

const NTV1_MARKERS: [(usize, &[u8]); 3] = [
    (0, b"HEADER"),
    (96, b"W GRID"),
    (144, b"TO      NAD83   "),
];

const CTABLE2_MAGIC: &[u8] = b"CTABLE V2";

const NTV2_MARKERS: [(usize, &[u8]); 2] = [(0, b"NUM_OREC"), (48, b"GS_TYPE")];

/// Read the detection header of a resource.
///
/// Resources shorter than [`DETECT_HEADER_BYTES`] yield what is there.
pub fn read_detect_header<R: RangeReader + ?Sized>(reader: &R) -> Result<Vec<u8>, GridError> {
    let len = reader.size().min(DETECT_HEADER_BYTES as u64) as usize;
    Ok(reader.read_exact_at(0, len)?.to_vec())
}

/// Identify a grid format from its header bytes and resource name.
///
/// Returns `None` when no format matches.
pub fn detect_format(header: &[u8], name: &str) -> Option<GridFormat> {
    if has_markers(header, &NTV1_MARKERS) {
        return Some(GridFormat::Ntv1);
    }
    if header.starts_with(CTABLE2_MAGIC) {
        return Some(GridFormat::Ctable2);
    }
    if has_markers(header, &NTV2_MARKERS) {
        return Some(GridFormat::Ntv2);
    }
    if is_tiff_header(header) {
        return Some(GridFormat::Gtiff);
    }
    if has_gtx_extension(name) {
        return Some(GridFormat::Gtx);
    }
    None
}

fn has_markers(header: &[u8], markers: &[(usize, &[u8])]) -> bool {
    markers
        .iter()
        .all(|(offset, marker)| header.get(*offset..offset + marker.len()) == Some(*marker))
}

fn has_gtx_extension(name: &str) -> bool {
    name.ends_with("gtx") || name.ends_with("GTX")
}

/// Check if bytes represent a valid TIFF header.
///
/// This is a quick check that can be used before attempting full parsing.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    // Check magic bytes
    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    if magic != 0x4949 && magic != 0x4D4D {
        return false;
    }

    // Check version
    let byte_order = if magic == 0x4949 {
        ByteOrder::LittleEndian
    } else {
        ByteOrder::BigEndian
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}

// =============================================================================
// Tests
// =============================================================================
