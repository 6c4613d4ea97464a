//! GeoTIFF grid reader.
//!
//! One file may hold several grids, one per image (IFD), nested through the
//! `grid_name` / `parent_grid_name` metadata items or by bounding box.
//!
//! The file's range reader and its [`BlockCache`] live in a `TiffDataset`.
//! Every image holds an `Arc` to that dataset, so the cache is shared by
//! reference counting and is dropped with the last grid of the set.
//!
//! # Channel selection
//!
//! - Horizontal grids read the `latitude_offset` and `longitude_offset`
//!   channels (channels 0 and 1 when no channel is described).
//! - Vertical grids read the first of `geoid_undulation`, `vertical_offset`,
//!   `hydroid_height` or `ellipsoidal_height_offset`, else channel 0.
//! - Generic grids expose every channel and leave the choice to the caller.

mod georef;
mod metadata;
mod raster;

pub use georef::Georeference;
pub use metadata::GdalMetadata;
pub use raster::{RasterLayout, SampleLocation, SampleType};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::context::{Context, Resource};
use crate::coord::{LonLat, ARC_SECOND};
use crate::error::{GridError, TiffError};
use crate::grid::{
    GenericSampler, GenericShiftGrid, Grid, GridKind, HierarchyBuilder, HorizontalSampler,
    HorizontalShiftGrid, VerticalSampler, VerticalShiftGrid,
};
use crate::io::{BlockCache, BlockKey, RangeReader};

use super::tiff::{Ifd, TiffHeader, TiffTag, ValueReader, BIGTIFF_HEADER_SIZE};
use super::{check_extent, sample_unavailable};

/// Descriptions accepted for the height channel, in order of preference.
const VERTICAL_CHANNELS: [&str; 4] = [
    "geoid_undulation",
    "vertical_offset",
    "hydroid_height",
    "ellipsoidal_height_offset",
];

// =============================================================================
// Dataset and images
// =============================================================================

/// State shared by every image of one file.
struct TiffDataset {
    name: String,
    reader: Arc<dyn RangeReader>,
    header: TiffHeader,
    cache: Mutex<BlockCache>,
}

impl TiffDataset {
    fn open(ctx: &Context, resource: &Resource) -> Result<Arc<Self>, GridError> {
        let reader = Arc::clone(&resource.reader);
        let len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let bytes = reader.read_exact_at(0, len)?;
        let header = TiffHeader::parse(&bytes, reader.size())?;
        debug!(
            grid = %resource.name,
            bigtiff = header.is_bigtiff,
            byte_order = ?header.byte_order,
            "Opened GeoTIFF"
        );
        Ok(Arc::new(Self {
            name: resource.name.clone(),
            reader,
            header,
            cache: Mutex::new(BlockCache::with_capacity(ctx.block_cache_capacity())),
        }))
    }
}

/// One georeferenced image of a GeoTIFF.
pub struct TiffImage {
    dataset: Arc<TiffDataset>,
    name: String,
    ifd_index: u32,
    subfile_type: u64,
    layout: RasterLayout,
    georef: Georeference,
    metadata: GdalMetadata,
    nodata: Option<f64>,
}

impl TiffImage {
    fn read(dataset: &Arc<TiffDataset>, ifd: &Ifd, ifd_index: u32) -> Result<Self, TiffError> {
        let values = ValueReader::new(dataset.reader.as_ref(), &dataset.header);

        let subfile_type = raster::first_value(&values, ifd, TiffTag::NewSubfileType)?.unwrap_or(0);
        let layout = RasterLayout::read(&values, ifd)?;
        let georef = Georeference::read(&values, ifd, layout.width, layout.height)?;

        let metadata = match ifd.get_entry_by_tag(TiffTag::GdalMetadata) {
            Some(entry) => GdalMetadata::parse(&values.read_string(entry)?)?,
            None => GdalMetadata::default(),
        };
        let nodata = match ifd.get_entry_by_tag(TiffTag::GdalNodata) {
            Some(entry) => {
                let text = values.read_string(entry)?;
                let parsed = text.trim().parse::<f64>().ok();
                if parsed.is_none() {
                    debug!(grid = %dataset.name, value = %text, "Ignoring unparsable GDAL_NODATA");
                }
                parsed
            }
            None => None,
        };

        let name = match metadata.item("grid_name", None) {
            Some(grid_name) if !grid_name.is_empty() => grid_name.to_string(),
            _ if ifd_index == 0 => dataset.name.clone(),
            _ => format!("{}#{}", dataset.name, ifd_index),
        };

        Ok(Self {
            dataset: Arc::clone(dataset),
            name,
            ifd_index,
            subfile_type,
            layout,
            georef,
            metadata,
            nodata,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ifd_index(&self) -> u32 {
        self.ifd_index
    }

    pub fn layout(&self) -> &RasterLayout {
        &self.layout
    }

    pub fn georeference(&self) -> &Georeference {
        &self.georef
    }

    pub fn metadata(&self) -> &GdalMetadata {
        &self.metadata
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn description(&self, sample: u32) -> &str {
        self.metadata.item("DESCRIPTION", Some(sample)).unwrap_or("")
    }

    fn unit(&self, sample: u32) -> &str {
        self.metadata.item("UNIT", Some(sample)).unwrap_or("")
    }

    /// `(grid_name, parent)` used to place the grid in its hierarchy.
    fn hierarchy_names(&self) -> (&str, &str) {
        let name = self.metadata.item("grid_name", None).unwrap_or("");
        let parent = self
            .metadata
            .item("parent_grid_name", None)
            .or_else(|| self.metadata.item("parent_name", None))
            .unwrap_or("");
        (name, parent)
    }

    /// Sample value at node `(x, y)`, y = 0 being the southern row, with
    /// the channel's scale and offset applied.
    pub fn value(&self, x: u32, y: u32, sample: u32) -> Result<f32, GridError> {
        let layout = &self.layout;
        if x >= layout.width || y >= layout.height || sample >= layout.samples_per_pixel {
            return Err(sample_unavailable(&self.name, x, y, "outside of image"));
        }
        let file_row = if self.georef.bottom_up {
            y
        } else {
            layout.height - 1 - y
        };
        let location = layout.locate(x, file_row, sample);

        let dataset = &self.dataset;
        let key = BlockKey::new(self.ifd_index, location.block_id);
        let block = {
            let mut cache = dataset
                .cache
                .lock()
                .map_err(|_| sample_unavailable(&self.name, x, y, "block cache poisoned"))?;
            cache.get_or_decode(key, || {
                layout.decode_block(
                    dataset.reader.as_ref(),
                    location.block_id,
                    dataset.header.byte_order,
                )
            })
        }
        .map_err(|e| sample_unavailable(&self.name, x, y, e))?;

        let order = layout.sample_order(dataset.header.byte_order);
        let raw = layout
            .sample(&block, location.index, order)
            .ok_or_else(|| sample_unavailable(&self.name, x, y, "sample outside of block"))?;

        let value = raw as f32;
        let (scale, offset) = self.metadata.scale_offset(sample);
        if scale != 1.0 || offset != 0.0 {
            return Ok((f64::from(value) * scale + offset) as f32);
        }
        Ok(value)
    }

    fn has_changed(&self) -> bool {
        self.dataset.reader.has_changed()
    }

    /// Cached blocks and `(hits, misses)` of the shared block cache.
    pub fn cache_stats(&self) -> (usize, (u64, u64)) {
        match self.dataset.cache.lock() {
            Ok(cache) => (cache.len(), cache.stats()),
            Err(_) => (0, (0, 0)),
        }
    }
}

/// Walk the IFD chain, handing every full-resolution image to `visit`.
///
/// Failing to read the first image is fatal; a later unreadable image ends
/// the walk and keeps what was read so far.
fn walk_images(
    ctx: &Context,
    resource: &Resource,
    mut visit: impl FnMut(TiffImage) -> Result<(), GridError>,
) -> Result<(), GridError> {
    let dataset = TiffDataset::open(ctx, resource)?;
    let name = dataset.name.as_str();

    let mut offset = dataset.header.first_ifd_offset;
    let mut seen = HashSet::new();
    let mut index = 0u32;
    while offset != 0 && seen.insert(offset) {
        let image = Ifd::read(dataset.reader.as_ref(), offset, &dataset.header).and_then(|ifd| {
            offset = ifd.next_ifd_offset;
            TiffImage::read(&dataset, &ifd, index)
        });
        let image = match image {
            Ok(image) => image,
            Err(e) if index == 0 => {
                error!(grid = %name, error = %e, "Cannot read first image");
                return Err(e.into());
            }
            Err(e) => {
                debug!(grid = %name, ifd = index, error = %e, "Stopping at unreadable image");
                break;
            }
        };

        if image.subfile_type != 0 {
            if index == 0 {
                return Err(GridError::load(
                    name,
                    format!("unsupported subfile type {} for first image", image.subfile_type),
                ));
            }
            debug!(
                grid = %name,
                ifd = index,
                subfile_type = image.subfile_type,
                "Ignoring image with unsupported subfile type"
            );
        } else {
            visit(image)?;
        }
        index += 1;
    }
    Ok(())
}

/// Validate the extent of an image about to become a grid.
fn image_extent(image: &TiffImage) -> Result<(), GridError> {
    let extent = &image.georef.extent;
    if extent.is_geographic {
        return check_extent(&image.name, extent);
    }
    if !(extent.res_x > 0.0 && extent.res_y > 0.0) || !(extent.west < extent.east) {
        return Err(GridError::load(&image.name, "inconsistent georeferencing"));
    }
    Ok(())
}

/// Open every accepted image of a file into one hierarchy.
///
/// `make` returns `Ok(None)` when an image lacks the channels of the kind;
/// such an image is fatal at IFD 0 and skipped afterwards.
fn open_grids<S: ?Sized + GridKind>(
    ctx: &Context,
    resource: &Resource,
    mut make: impl FnMut(TiffImage) -> Result<Option<Grid<S>>, GridError>,
) -> Result<Vec<Grid<S>>, GridError> {
    let mut builder = HierarchyBuilder::new();
    walk_images(ctx, resource, |image| {
        image_extent(&image)?;
        let ifd = image.ifd_index;
        let (grid_name, parent) = {
            let (n, p) = image.hierarchy_names();
            (n.to_string(), p.to_string())
        };
        match make(image)? {
            Some(grid) => {
                debug!(
                    grid = %grid.name(),
                    ifd,
                    width = grid.width(),
                    height = grid.height(),
                    kind = S::LABEL,
                    "Read GeoTIFF grid"
                );
                builder.insert(grid, &grid_name, &parent);
                Ok(())
            }
            None if ifd == 0 => Err(GridError::load(
                &resource.name,
                format!("no {} channel in first image", S::LABEL),
            )),
            None => {
                debug!(grid = %resource.name, ifd, "Skipping image without expected channels");
                Ok(())
            }
        }
    })?;

    if builder.is_empty() {
        return Err(GridError::load(&resource.name, "no usable grid"));
    }
    Ok(builder.finish())
}

// =============================================================================
// Horizontal
// =============================================================================

struct GeoTiffHorizontal {
    image: TiffImage,
    lat_sample: u32,
    lon_sample: u32,
    to_radians: f64,
    positive_east: bool,
}

impl GeoTiffHorizontal {
    fn from_image(image: TiffImage) -> Result<Option<Self>, GridError> {
        let spp = image.layout.samples_per_pixel;
        let mut described = false;
        let (mut lat, mut lon) = (None, None);
        for sample in 0..spp {
            match image.description(sample) {
                "" => {}
                "latitude_offset" => {
                    described = true;
                    lat = Some(sample);
                }
                "longitude_offset" => {
                    described = true;
                    lon = Some(sample);
                }
                _ => described = true,
            }
        }
        let (lat_sample, lon_sample) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ if !described && spp >= 2 => (0, 1),
            _ => return Ok(None),
        };

        let unit = image.unit(lat_sample);
        if unit != image.unit(lon_sample) {
            return Err(GridError::load(
                &image.name,
                "different units for latitude and longitude offsets",
            ));
        }
        let to_radians = match unit {
            "" | "arc-second" | "arc-seconds per year" => ARC_SECOND,
            "radian" => 1.0,
            "degree" => 1f64.to_radians(),
            other => {
                error!(grid = %image.name, unit = %other, "Unsupported unit");
                return Err(GridError::load(&image.name, format!("unsupported unit {}", other)));
            }
        };

        let positive_east = match image.metadata.item("positive_value", Some(lon_sample)) {
            None | Some("east") => true,
            Some("west") => false,
            Some(other) => {
                return Err(GridError::load(
                    &image.name,
                    format!("unsupported value {} for positive_value", other),
                ))
            }
        };

        if !image.georef.extent.is_geographic {
            return Err(GridError::load(&image.name, "horizontal grids must be geographic"));
        }

        Ok(Some(Self {
            image,
            lat_sample,
            lon_sample,
            to_radians,
            positive_east,
        }))
    }
}

impl HorizontalSampler for GeoTiffHorizontal {
    fn lon_lat_shift(&self, x: u32, y: u32) -> Result<LonLat, GridError> {
        let lat = self.image.value(x, y, self.lat_sample)?;
        let lon = self.image.value(x, y, self.lon_sample)?;
        let lat = (f64::from(lat) * self.to_radians) as f32;
        let lon = (f64::from(lon) * self.to_radians) as f32;
        let lon = if self.positive_east { lon } else { -lon };
        Ok(LonLat::new(f64::from(lon), f64::from(lat)))
    }

    fn has_changed(&self) -> bool {
        self.image.has_changed()
    }
}

/// Open a GeoTIFF as horizontal shift grids.
pub fn open_horizontal(
    ctx: &Context,
    resource: &Resource,
) -> Result<Vec<HorizontalShiftGrid>, GridError> {
    open_grids(ctx, resource, |image| {
        let Some(sampler) = GeoTiffHorizontal::from_image(image)? else {
            return Ok(None);
        };
        let image = &sampler.image;
        let grid = HorizontalShiftGrid::new(
            image.name.clone(),
            image.layout.width,
            image.layout.height,
            image.georef.extent,
            Box::new(sampler) as Box<dyn HorizontalSampler>,
        );
        Ok(Some(grid))
    })
}

// =============================================================================
// Vertical
// =============================================================================

struct GeoTiffVertical {
    image: TiffImage,
    sample: u32,
}

impl GeoTiffVertical {
    fn from_image(image: TiffImage) -> Result<Option<Self>, GridError> {
        let spp = image.layout.samples_per_pixel;
        let described = (0..spp).any(|s| !image.description(s).is_empty());
        let found = VERTICAL_CHANNELS
            .iter()
            .find_map(|channel| (0..spp).find(|&s| image.description(s) == *channel));
        let sample = match found {
            Some(sample) => sample,
            None if described => return Ok(None),
            None => 0,
        };

        let unit = image.unit(sample);
        if !unit.is_empty() && unit != "metre" {
            error!(grid = %image.name, unit = %unit, "Unsupported unit");
            return Err(GridError::load(&image.name, format!("unsupported unit {}", unit)));
        }
        Ok(Some(Self { image, sample }))
    }
}

impl VerticalSampler for GeoTiffVertical {
    fn value(&self, x: u32, y: u32) -> Result<f32, GridError> {
        self.image.value(x, y, self.sample)
    }

    fn is_nodata(&self, value: f32, _multiplier: f64) -> bool {
        value.is_nan() || self.image.nodata.is_some_and(|nodata| value == nodata as f32)
    }

    fn has_changed(&self) -> bool {
        self.image.has_changed()
    }
}

/// Open a GeoTIFF as vertical shift grids.
pub fn open_vertical(
    ctx: &Context,
    resource: &Resource,
) -> Result<Vec<VerticalShiftGrid>, GridError> {
    open_grids(ctx, resource, |image| {
        let Some(sampler) = GeoTiffVertical::from_image(image)? else {
            return Ok(None);
        };
        let image = &sampler.image;
        let grid = VerticalShiftGrid::new(
            image.name.clone(),
            image.layout.width,
            image.layout.height,
            image.georef.extent,
            Box::new(sampler) as Box<dyn VerticalSampler>,
        );
        Ok(Some(grid))
    })
}

// =============================================================================
// Generic
// =============================================================================

struct GeoTiffGeneric {
    image: TiffImage,
}

impl GenericSampler for GeoTiffGeneric {
    fn samples_per_pixel(&self) -> u32 {
        self.image.layout.samples_per_pixel
    }

    fn value(&self, x: u32, y: u32, sample: u32) -> Result<f32, GridError> {
        self.image.value(x, y, sample)
    }

    fn metadata_item(&self, key: &str, sample: Option<u32>) -> Option<&str> {
        self.image.metadata.item(key, sample)
    }

    fn has_changed(&self) -> bool {
        self.image.has_changed()
    }
}

/// Open a GeoTIFF as generic multi-channel grids.
pub fn open_generic(
    ctx: &Context,
    resource: &Resource,
) -> Result<Vec<GenericShiftGrid>, GridError> {
    open_grids(ctx, resource, |image| {
        let grid = GenericShiftGrid::new(
            image.name.clone(),
            image.layout.width,
            image.layout.height,
            image.georef.extent,
            Box::new(GeoTiffGeneric { image }) as Box<dyn GenericSampler>,
        );
        Ok(Some(grid))
    })
}
