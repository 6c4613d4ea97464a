//! Raster-to-model georeferencing of one GeoTIFF image.

use std::collections::HashMap;

use crate::error::TiffError;
use crate::grid::ExtentAndRes;
use crate::io::RangeReader;

use crate::format::tiff::{
    Ifd, TiffTag, ValueReader, ANGULAR_UNIT_DEGREE, ANGULAR_UNIT_RADIAN,
    GEOG_ANGULAR_UNITS_GEO_KEY, GT_MODEL_TYPE_GEO_KEY, GT_RASTER_TYPE_GEO_KEY,
    MODEL_TYPE_GEOGRAPHIC, MODEL_TYPE_PROJECTED, RASTER_PIXEL_IS_POINT,
};

/// Extent of an image plus the storage order of its rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Georeference {
    pub extent: ExtentAndRes,
    /// First stored row is the southern-most one
    pub bottom_up: bool,
}

impl Georeference {
    pub fn read<R: RangeReader + ?Sized>(
        values: &ValueReader<'_, R>,
        ifd: &Ifd,
        width: u32,
        height: u32,
    ) -> Result<Self, TiffError> {
        let keys = read_geokeys(values, ifd)?;

        let is_geographic = match keys.get(&GT_MODEL_TYPE_GEO_KEY).copied() {
            None | Some(MODEL_TYPE_GEOGRAPHIC) => true,
            Some(MODEL_TYPE_PROJECTED) => false,
            Some(other) => {
                return Err(TiffError::InvalidGeoreferencing(format!(
                    "unsupported GTModelTypeGeoKey {}",
                    other
                )))
            }
        };
        let pixel_is_point = keys.get(&GT_RASTER_TYPE_GEO_KEY) == Some(&RASTER_PIXEL_IS_POINT);

        // Model coordinates of the first stored pixel and the pixel size
        let (mut west, mut north, res_x, res_y) = read_transform(values, ifd)?;
        if !pixel_is_point {
            west += res_x / 2.0;
            north -= res_y / 2.0;
        }

        let to_model = if is_geographic {
            match keys.get(&GEOG_ANGULAR_UNITS_GEO_KEY).copied() {
                None | Some(ANGULAR_UNIT_DEGREE) => 1f64.to_radians(),
                Some(ANGULAR_UNIT_RADIAN) => 1.0,
                Some(other) => {
                    return Err(TiffError::InvalidGeoreferencing(format!(
                        "unsupported GeogAngularUnitsGeoKey {}",
                        other
                    )))
                }
            }
        } else {
            1.0
        };

        let bottom_up = res_y < 0.0;
        let res_x = res_x * to_model;
        let res_y = res_y.abs() * to_model;
        let west = west * to_model;
        let first_row = north * to_model;
        let span_y = res_y * f64::from(height.saturating_sub(1));
        let (south, north) = if bottom_up {
            (first_row, first_row + span_y)
        } else {
            (first_row - span_y, first_row)
        };

        Ok(Self {
            extent: ExtentAndRes {
                is_geographic,
                west,
                south,
                east: west + res_x * f64::from(width.saturating_sub(1)),
                north,
                res_x,
                res_y,
            },
            bottom_up,
        })
    }
}

/// `(west, north, res_x, res_y)` of the first stored pixel in model units.
///
/// `res_y` is negative when rows are stored south to north.
fn read_transform<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
) -> Result<(f64, f64, f64, f64), TiffError> {
    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ModelTransformation) {
        let m = values.read_f64_array(entry)?;
        if m.len() != 16 {
            return Err(TiffError::InvalidTagValue {
                tag: "ModelTransformation",
                message: format!("expected 16 values, got {}", m.len()),
            });
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(TiffError::InvalidGeoreferencing(
                "rotational terms not supported".into(),
            ));
        }
        return Ok((m[3], m[7], m[0], -m[5]));
    }

    let scale = ifd.get_entry_by_tag(TiffTag::ModelPixelScale);
    let tiepoint = ifd.get_entry_by_tag(TiffTag::ModelTiepoint);
    let (Some(scale), Some(tiepoint)) = (scale, tiepoint) else {
        return Err(TiffError::InvalidGeoreferencing(
            "missing ModelTransformation or ModelPixelScale/ModelTiepoint".into(),
        ));
    };
    let scale = values.read_f64_array(scale)?;
    let tie = values.read_f64_array(tiepoint)?;
    if scale.len() < 2 || tie.len() < 6 {
        return Err(TiffError::InvalidGeoreferencing(format!(
            "short ModelPixelScale ({}) or ModelTiepoint ({})",
            scale.len(),
            tie.len()
        )));
    }
    let (res_x, res_y) = (scale[0], scale[1]);
    Ok((tie[3] - tie[0] * res_x, tie[4] + tie[1] * res_y, res_x, res_y))
}

/// Short GeoKeys stored inline in the directory.
fn read_geokeys<R: RangeReader + ?Sized>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
) -> Result<HashMap<u16, u16>, TiffError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::GeoKeyDirectory) else {
        return Ok(HashMap::new());
    };
    let directory = values.read_u16_array(entry)?;
    Ok(parse_geokeys(&directory))
}

fn parse_geokeys(directory: &[u16]) -> HashMap<u16, u16> {
    let Some(&count) = directory.get(3) else {
        return HashMap::new();
    };
    directory[4..]
        .chunks_exact(4)
        .take(usize::from(count))
        // Location 0: value stored in place
        .filter(|key| key[1] == 0)
        .map(|key| (key[0], key[3]))
        .collect()
}
