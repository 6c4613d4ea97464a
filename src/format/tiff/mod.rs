//! TIFF container parsing for GeoTIFF grids.
//!
//! This module handles the TIFF and BigTIFF structure underneath GeoTIFF
//! shift grids; georeferencing and sample access live in
//! [`geotiff`](crate::format::geotiff).
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Contains metadata and pointers to image data.
//!   Multi-grid files store one grid (or one subgrid of a hierarchy) per IFD.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.
//!
//! - **Blocks**: Sample data is split into tiles or strips, each compressed
//!   independently; [`codec`] turns one block back into raw samples.

mod codec;
mod parser;
mod tags;
mod values;

pub use codec::{decompress, sample_byte_order, undo_predictor, RowLayout};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{
    Compression, FieldType, Predictor, SampleFormat, TiffTag, ANGULAR_UNIT_DEGREE,
    ANGULAR_UNIT_RADIAN, GEOG_ANGULAR_UNITS_GEO_KEY, GT_MODEL_TYPE_GEO_KEY,
    GT_RASTER_TYPE_GEO_KEY, MODEL_TYPE_GEOGRAPHIC, MODEL_TYPE_PROJECTED, RASTER_PIXEL_IS_POINT,
};
pub use values::{parse_u64_array, ValueReader};
