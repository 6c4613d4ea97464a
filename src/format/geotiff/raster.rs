//! Sample layout of one GeoTIFF image: block geometry, codec and data type.
//!
//! A cache miss decodes into a new buffer whose ownership passes to the
//! block cache. There is no per-grid scratch buffer.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use crate::format::tiff::{
    decompress, sample_byte_order, undo_predictor, ByteOrder, Compression, Ifd, Predictor,
    RowLayout, SampleFormat, TiffTag, ValueReader,
};

/// Largest decoded block accepted from a file header.
const MAX_BLOCK_BYTES: usize = 1 << 28;

/// Numeric type of stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl SampleType {
    fn from_tags(bits: u64, format: u64) -> Result<Self, TiffError> {
        let format = SampleFormat::from_u16(format as u16);
        match (bits, format) {
            (16, Some(SampleFormat::Uint)) => Ok(SampleType::U16),
            (16, Some(SampleFormat::Int)) => Ok(SampleType::I16),
            (32, Some(SampleFormat::Uint)) => Ok(SampleType::U32),
            (32, Some(SampleFormat::Int)) => Ok(SampleType::I32),
            (32, Some(SampleFormat::IeeeFp)) => Ok(SampleType::F32),
            (64, Some(SampleFormat::IeeeFp)) => Ok(SampleType::F64),
            _ => Err(TiffError::UnsupportedSampleFormat {
                bits: bits as u16,
                format: format.map_or(0, |f| f as u16),
            }),
        }
    }

    pub const fn size(self) -> usize {
        match self {
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// Decode one sample from the start of `bytes`.
    pub fn read(self, bytes: &[u8], order: ByteOrder) -> f64 {
        match self {
            SampleType::U16 => f64::from(order.read_u16(bytes)),
            SampleType::I16 => f64::from(order.read_i16(bytes)),
            SampleType::U32 => f64::from(order.read_u32(bytes)),
            SampleType::I32 => f64::from(order.read_i32(bytes)),
            SampleType::F32 => f64::from(order.read_f32(bytes)),
            SampleType::F64 => order.read_f64(bytes),
        }
    }
}

/// Where a sample lives: which block, and which sample inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLocation {
    pub block_id: u64,
    pub index: usize,
}

/// Tile/strip organization of one image.
#[derive(Debug, Clone)]
pub struct RasterLayout {
    pub width: u32,
    pub height: u32,
    pub samples_per_pixel: u32,
    pub sample_type: SampleType,
    pub planar: bool,
    pub tiled: bool,
    pub block_width: u32,
    pub block_height: u32,
    pub blocks_per_row: u32,
    pub blocks_per_column: u32,
    pub compression: Compression,
    pub predictor: Predictor,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl RasterLayout {
    pub fn read<R: RangeReader + ?Sized>(
        values: &ValueReader<'_, R>,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let width = required_u32(values, ifd, TiffTag::ImageWidth, "ImageWidth")?;
        let height = required_u32(values, ifd, TiffTag::ImageLength, "ImageLength")?;
        if width == 0 || height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "ImageWidth",
                message: format!("empty image {}x{}", width, height),
            });
        }

        let samples_per_pixel = first_value(values, ifd, TiffTag::SamplesPerPixel)?.unwrap_or(1) as u32;
        let bits = first_value(values, ifd, TiffTag::BitsPerSample)?.unwrap_or(1);
        let format = first_value(values, ifd, TiffTag::SampleFormat)?.unwrap_or(1);
        let sample_type = SampleType::from_tags(bits, format)?;
        let planar = samples_per_pixel > 1
            && first_value(values, ifd, TiffTag::PlanarConfiguration)?.unwrap_or(1) == 2;

        let raw_compression = first_value(values, ifd, TiffTag::Compression)?.unwrap_or(1) as u16;
        let compression = Compression::from_u16(raw_compression)
            .ok_or(TiffError::UnsupportedCompression(raw_compression))?;
        let raw_predictor = first_value(values, ifd, TiffTag::Predictor)?.unwrap_or(1) as u16;
        let predictor =
            Predictor::from_u16(raw_predictor).ok_or(TiffError::UnsupportedPredictor(raw_predictor))?;

        let tiled = ifd.has_tag(TiffTag::TileWidth);
        let (block_width, block_height, offsets_tag, counts_tag) = if tiled {
            let tw = required_u32(values, ifd, TiffTag::TileWidth, "TileWidth")?;
            let th = required_u32(values, ifd, TiffTag::TileLength, "TileLength")?;
            (tw, th, TiffTag::TileOffsets, TiffTag::TileByteCounts)
        } else {
            let rows = first_value(values, ifd, TiffTag::RowsPerStrip)?
                .map_or(height, |r| r.min(u64::from(height)) as u32);
            (width, rows, TiffTag::StripOffsets, TiffTag::StripByteCounts)
        };
        if block_width == 0 || block_height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: if tiled { "TileWidth" } else { "RowsPerStrip" },
                message: "zero block dimension".into(),
            });
        }

        let offsets = required_array(values, ifd, offsets_tag)?;
        let byte_counts = required_array(values, ifd, counts_tag)?;
        let blocks_per_row = width.div_ceil(block_width);
        let blocks_per_column = height.div_ceil(block_height);
        let planes = if planar { u64::from(samples_per_pixel) } else { 1 };
        let expected = u64::from(blocks_per_row) * u64::from(blocks_per_column) * planes;
        if (offsets.len() as u64) < expected || (byte_counts.len() as u64) < expected {
            return Err(TiffError::InvalidTagValue {
                tag: offsets_tag.name(),
                message: format!(
                    "expected {} blocks, got {} offsets and {} byte counts",
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let layout = Self {
            width,
            height,
            samples_per_pixel,
            sample_type,
            planar,
            tiled,
            block_width,
            block_height,
            blocks_per_row,
            blocks_per_column,
            compression,
            predictor,
            offsets,
            byte_counts,
        };
        layout.block_bytes()?;
        Ok(layout)
    }

    /// Samples stored per pixel inside one block.
    fn interleaved(&self) -> usize {
        if self.planar {
            1
        } else {
            self.samples_per_pixel as usize
        }
    }

    /// Decoded size of one block in bytes.
    pub fn block_bytes(&self) -> Result<usize, TiffError> {
        (self.block_width as usize)
            .checked_mul(self.block_height as usize)
            .and_then(|n| n.checked_mul(self.interleaved()))
            .and_then(|n| n.checked_mul(self.sample_type.size()))
            .filter(|&n| n <= MAX_BLOCK_BYTES)
            .ok_or_else(|| {
                TiffError::Decode(format!(
                    "block of {}x{} pixels is too large",
                    self.block_width, self.block_height
                ))
            })
    }

    /// Locate a sample given its row in storage order.
    pub fn locate(&self, x: u32, file_row: u32, sample: u32) -> SampleLocation {
        let (bx, by) = (x / self.block_width, file_row / self.block_height);
        let mut block_id = u64::from(by) * u64::from(self.blocks_per_row) + u64::from(bx);
        if self.planar {
            block_id += u64::from(sample)
                * u64::from(self.blocks_per_row)
                * u64::from(self.blocks_per_column);
        }

        let pixel = (x % self.block_width) as usize
            + (file_row % self.block_height) as usize * self.block_width as usize;
        let index = if self.planar {
            pixel
        } else {
            pixel * self.samples_per_pixel as usize + sample as usize
        };
        SampleLocation { block_id, index }
    }

    /// Read, decompress and un-predict one block.
    pub fn decode_block<R: RangeReader + ?Sized>(
        &self,
        reader: &R,
        block_id: u64,
        file_order: ByteOrder,
    ) -> Result<Bytes, TiffError> {
        let i = usize::try_from(block_id).map_err(|_| TiffError::Decode("block id overflow".into()))?;
        let (Some(&offset), Some(&count)) = (self.offsets.get(i), self.byte_counts.get(i)) else {
            return Err(TiffError::Decode(format!("block {} out of range", block_id)));
        };

        let expected = self.block_bytes()?;
        // Sparse block: never written, reads as zeros
        if count == 0 {
            return Ok(Bytes::from(vec![0u8; expected]));
        }
        let len = usize::try_from(count).map_err(|_| TiffError::Decode("block too large".into()))?;
        let encoded = reader.read_exact_at(offset, len)?;
        let mut decoded = decompress(self.compression, &encoded, expected)?;

        let row = RowLayout {
            samples_per_row: self.block_width as usize * self.interleaved(),
            stride: self.interleaved(),
            bytes_per_sample: self.sample_type.size(),
        };
        undo_predictor(self.predictor, &mut decoded, row, file_order)?;
        Ok(Bytes::from(decoded))
    }

    /// Byte order of samples inside decoded blocks.
    pub fn sample_order(&self, file_order: ByteOrder) -> ByteOrder {
        sample_byte_order(self.predictor, file_order)
    }

    /// Decode sample `index` of a decoded block.
    pub fn sample(&self, block: &[u8], index: usize, order: ByteOrder) -> Option<f64> {
        let size = self.sample_type.size();
        let start = index.checked_mul(size)?;
        let bytes = block.get(start..start + size)?;
        Some(self.sample_type.read(bytes, order))
    }
}

pub(super) fn first_value<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Option<u64>, TiffError> {
    match ifd.get_entry_by_tag(tag) {
        Some(entry) => {
            if let Some(v) = entry.inline_u64(values.byte_order()) {
                return Ok(Some(v));
            }
            Ok(values.read_u64_array(entry)?.first().copied())
        }
        None => Ok(None),
    }
}

fn required_u32<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
    name: &'static str,
) -> Result<u32, TiffError> {
    let value = first_value(values, ifd, tag)?.ok_or(TiffError::MissingTag(name))?;
    u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
        tag: name,
        message: format!("{} does not fit in 32 bits", value),
    })
}

fn required_array<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
    tag: TiffTag,
) -> Result<Vec<u64>, TiffError> {
    let entry = ifd.get_entry_by_tag(tag).ok_or(TiffError::MissingTag(tag.name()))?;
    values.read_u64_array(entry)
}
