//! Tile/strip decompression and predictor reversal.
//!
//! Grid rasters are lossless: uncompressed, LZW or zlib (Deflate), optionally
//! with horizontal differencing (integer samples) or the byte-plane
//! floating-point predictor. Decoding always yields the exact byte size of
//! one block so sample addressing never has to special-case short strips.

use std::io::Read;

use salzweg::decoder::TiffStyleDecoder;

use crate::error::TiffError;

use super::parser::ByteOrder;
use super::tags::{Compression, Predictor};

// =============================================================================
// Decompression
// =============================================================================

/// Decompress one encoded block.
///
/// The output is resized to `expected_len`: truncated streams are
/// zero-padded (the last strip of an image is often short) and trailing
/// garbage is dropped.
pub fn decompress(
    compression: Compression,
    encoded: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>, TiffError> {
    let mut decoded = match compression {
        Compression::None => encoded.to_vec(),
        Compression::Lzw => TiffStyleDecoder::decode_to_vec(encoded)
            .map_err(|e| TiffError::Decode(format!("LZW: {:?}", e)))?,
        Compression::Deflate | Compression::LegacyDeflate => {
            let mut buf = Vec::with_capacity(expected_len);
            flate2::read::ZlibDecoder::new(encoded)
                .read_to_end(&mut buf)
                .map_err(|e| TiffError::Decode(format!("Deflate: {}", e)))?;
            buf
        }
    };
    decoded.resize(expected_len, 0);
    Ok(decoded)
}

// =============================================================================
// Predictors
// =============================================================================

/// Geometry of the rows inside one decoded block.
#[derive(Debug, Clone, Copy)]
pub struct RowLayout {
    /// Samples per row (pixels × interleaved samples)
    pub samples_per_row: usize,
    /// Distance between consecutive samples of the same channel
    pub stride: usize,
    /// Bytes per sample
    pub bytes_per_sample: usize,
}

impl RowLayout {
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.samples_per_row * self.bytes_per_sample
    }
}

/// Undo the encoder-side predictor in place.
///
/// After [`Predictor::FloatingPoint`] the samples are big-endian regardless
/// of the file's byte order; see [`sample_byte_order`].
pub fn undo_predictor(
    predictor: Predictor,
    block: &mut [u8],
    layout: RowLayout,
    byte_order: ByteOrder,
) -> Result<(), TiffError> {
    let row_bytes = layout.row_bytes();
    if row_bytes == 0 {
        return Ok(());
    }
    match predictor {
        Predictor::None => Ok(()),
        Predictor::Horizontal => {
            for row in block.chunks_exact_mut(row_bytes) {
                undo_horizontal(row, layout, byte_order)?;
            }
            Ok(())
        }
        Predictor::FloatingPoint => {
            let mut scratch = vec![0u8; row_bytes];
            for row in block.chunks_exact_mut(row_bytes) {
                undo_floating_point(row, &mut scratch, layout);
            }
            Ok(())
        }
    }
}

/// Byte order of decoded samples for a given predictor.
#[inline]
pub fn sample_byte_order(predictor: Predictor, file_order: ByteOrder) -> ByteOrder {
    match predictor {
        Predictor::FloatingPoint => ByteOrder::BigEndian,
        _ => file_order,
    }
}

fn undo_horizontal(row: &mut [u8], layout: RowLayout, order: ByteOrder) -> Result<(), TiffError> {
    let bps = layout.bytes_per_sample;
    let stride = layout.stride;
    for i in stride..layout.samples_per_row {
        let (prev_at, cur_at) = ((i - stride) * bps, i * bps);
        match bps {
            1 => row[cur_at] = row[cur_at].wrapping_add(row[prev_at]),
            2 => {
                let v = order
                    .read_u16(&row[cur_at..])
                    .wrapping_add(order.read_u16(&row[prev_at..]));
                write_u16(&mut row[cur_at..cur_at + 2], v, order);
            }
            4 => {
                let v = order
                    .read_u32(&row[cur_at..])
                    .wrapping_add(order.read_u32(&row[prev_at..]));
                write_u32(&mut row[cur_at..cur_at + 4], v, order);
            }
            8 => {
                let v = order
                    .read_u64(&row[cur_at..])
                    .wrapping_add(order.read_u64(&row[prev_at..]));
                write_u64(&mut row[cur_at..cur_at + 8], v, order);
            }
            other => {
                return Err(TiffError::Decode(format!(
                    "horizontal predictor on {}-byte samples",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn undo_floating_point(row: &mut [u8], scratch: &mut [u8], layout: RowLayout) {
    let stride = layout.stride;
    // Byte-wise accumulation across the whole row
    for i in stride..row.len() {
        row[i] = row[i].wrapping_add(row[i - stride]);
    }
    // Planes hold the most significant byte of every sample first
    let count = layout.samples_per_row;
    let bps = layout.bytes_per_sample;
    scratch.copy_from_slice(row);
    for sample in 0..count {
        for byte in 0..bps {
            row[sample * bps + byte] = scratch[byte * count + sample];
        }
    }
}

fn write_u16(out: &mut [u8], v: u16, order: ByteOrder) {
    out.copy_from_slice(&match order {
        ByteOrder::LittleEndian => v.to_le_bytes(),
        ByteOrder::BigEndian => v.to_be_bytes(),
    });
}

fn write_u32(out: &mut [u8], v: u32, order: ByteOrder) {
    out.copy_from_slice(&match order {
        ByteOrder::LittleEndian => v.to_le_bytes(),
        ByteOrder::BigEndian => v.to_be_bytes(),
    });
}

fn write_u64(out: &mut [u8], v: u64, order: ByteOrder) {
    out.copy_from_slice(&match order {
        ByteOrder::LittleEndian => v.to_le_bytes(),
        ByteOrder::BigEndian => v.to_be_bytes(),
    });
}

// =============================================================================
// Tests
// =============================================================================
