//! Format-specific integration tests.
//!
//! Tests verify:
//! - Legacy readers place node (0, 0) at the south-west corner
//! - NTv2 files read identically in either byte order
//! - TIFF parser handles little-endian, big-endian and BigTIFF files
//! - Tiled, stripped, planar and compressed GeoTIFF grids agree
//! - Format detection and its failure modes

use gridshift::format::{ctable2, geotiff, gtx, ntv1, ntv2};
use gridshift::{Context, GridError, GridFormat, HorizontalGridSet, VerticalGridSet};

use super::test_utils::{
    assert_close, ctable2_file, gdal_metadata, geotiff_file, gtx_file, horizontal_geotiff_image,
    memory_resource, ntv1_file, ntv2_file, smooth_shift, vertical_geotiff_image, GridDir,
    Lattice, Ntv2Subgrid, Order, TiffImageSpec, TiffOptions, ARC_SECOND,
};

/// Radian tolerance covering the f32 storage of shifts.
const SHIFT_TOLERANCE: f64 = 1e-12;

fn lattice() -> Lattice {
    Lattice::new(-80.0, 44.0, 0.25, 5, 4)
}

fn assert_node_shift(actual: gridshift::LonLat, x: u32, y: u32) {
    let (lon, lat) = smooth_shift(x, y);
    assert_close(actual.lon, lon * ARC_SECOND, SHIFT_TOLERANCE);
    assert_close(actual.lat, lat * ARC_SECOND, SHIFT_TOLERANCE);
}

// =============================================================================
// Legacy Horizontal Formats
// =============================================================================

#[test]
fn test_ntv1_extent_and_nodes() {
    let l = lattice();
    let grid = ntv1::open(&memory_resource("test.dat", ntv1_file(l, &smooth_shift))).unwrap();

    assert_eq!((grid.width(), grid.height()), (5, 4));
    let e = grid.extent();
    assert_close(e.west, l.west.to_radians(), 1e-12);
    assert_close(e.east, l.east().to_radians(), 1e-12);
    assert_close(e.south, l.south.to_radians(), 1e-12);
    assert_close(e.north, l.north().to_radians(), 1e-12);

    for (x, y) in [(0, 0), (4, 0), (0, 3), (2, 1), (4, 3)] {
        assert_node_shift(grid.value_at(x, y).unwrap(), x, y);
    }
}

#[test]
fn test_ctable2_extent_and_nodes() {
    let l = lattice();
    let grid = ctable2::open(&memory_resource("test.ct2", ctable2_file(l, &smooth_shift))).unwrap();

    assert_eq!((grid.width(), grid.height()), (5, 4));
    assert_close(grid.extent().north, l.north().to_radians(), 1e-12);
    for (x, y) in [(0, 0), (4, 0), (3, 2), (4, 3)] {
        assert_node_shift(grid.value_at(x, y).unwrap(), x, y);
    }
}

#[test]
fn test_ntv2_byte_order_independent() {
    let l = lattice();
    let subgrids = [Ntv2Subgrid::new("CANADA", "NONE", l, &smooth_shift)];
    let le = ntv2::open(&memory_resource("le.gsb", ntv2_file(Order::Little, &subgrids))).unwrap();
    let be = ntv2::open(&memory_resource("be.gsb", ntv2_file(Order::Big, &subgrids))).unwrap();

    assert_eq!(le.len(), 1);
    assert_eq!(be.len(), 1);
    assert_eq!(le[0].name(), "CANADA");
    assert_eq!(le[0].extent(), be[0].extent());
    for y in 0..l.height {
        for x in 0..l.width {
            let a = le[0].value_at(x, y).unwrap();
            let b = be[0].value_at(x, y).unwrap();
            assert_eq!(a, b);
            assert_node_shift(a, x, y);
        }
    }
}

#[test]
fn test_ntv2_gs_count_mismatch_rejected() {
    let l = lattice();
    let mut sub = Ntv2Subgrid::new("BAD", "NONE", l, &smooth_shift);
    sub.gs_count = Some((l.width * (l.height - 1)) as i32);
    let err = ntv2::open(&memory_resource("bad.gsb", ntv2_file(Order::Little, &[sub]))).unwrap_err();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
    assert!(err.to_string().contains("GS_COUNT"));

    // One extra node still leaves the quotient equal to the row count
    let mut sub = Ntv2Subgrid::new("BAD", "NONE", l, &smooth_shift);
    sub.gs_count = Some((l.width * l.height + 1) as i32);
    let err = ntv2::open(&memory_resource("extra.gsb", ntv2_file(Order::Little, &[sub]))).unwrap_err();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
}

#[test]
fn test_ntv1_truncated_data_is_sample_error() {
    let mut data = ntv1_file(lattice(), &smooth_shift);
    data.truncate(192 + 16);
    let grid = ntv1::open(&memory_resource("short.dat", data)).unwrap();
    assert!(grid.value_at(4, 3).is_err());
}

// =============================================================================
// GTX
// =============================================================================

#[test]
fn test_gtx_values_south_to_north() {
    let l = Lattice::new(-10.0, 40.0, 1.0, 3, 3);
    let data = gtx_file(l.west, l, &|x, y| (10 * y + x) as f32);
    let grid = gtx::open(&memory_resource("geoid.gtx", data)).unwrap();

    assert_eq!(grid.value_at(0, 0).unwrap(), 0.0);
    assert_eq!(grid.value_at(2, 0).unwrap(), 2.0);
    assert_eq!(grid.value_at(1, 2).unwrap(), 21.0);
}

#[test]
fn test_gtx_origin_beyond_180_wraps() {
    let l = Lattice::new(-5.0, 10.0, 1.0, 3, 3);
    let grid = gtx::open(&memory_resource("wrap.gtx", gtx_file(355.0, l, &|_, _| 1.0))).unwrap();
    assert_close(grid.extent().west, (-5.0f64).to_radians(), 1e-12);
    assert_close(grid.extent().east, (-3.0f64).to_radians(), 1e-12);
}

#[test]
fn test_gtx_nodata_values() {
    let l = Lattice::new(0.0, 0.0, 1.0, 2, 2);
    let grid = gtx::open(&memory_resource("holes.gtx", gtx_file(0.0, l, &|_, _| 0.0))).unwrap();
    assert!(grid.is_nodata(-88.8888, 1.0));
    assert!(grid.is_nodata(2000.0, 1.0));
    assert!(!grid.is_nodata(2000.0, 0.001));
    assert!(!grid.is_nodata(12.5, -1.0));
}

// =============================================================================
// GeoTIFF Layouts
// =============================================================================

fn horizontal_tiff(options: TiffOptions) -> Vec<u8> {
    geotiff_file(options, &[horizontal_geotiff_image(lattice(), &smooth_shift)])
}

fn assert_horizontal_tiff_nodes(data: Vec<u8>) {
    let ctx = Context::new();
    let grids = geotiff::open_horizontal(&ctx, &memory_resource("test.tif", data)).unwrap();
    assert_eq!(grids.len(), 1);
    let grid = &grids[0];
    assert_eq!((grid.width(), grid.height()), (5, 4));
    assert_close(grid.extent().west, (-80.0f64).to_radians(), 1e-12);
    assert_close(grid.extent().south, 44.0f64.to_radians(), 1e-12);
    for y in 0..4 {
        for x in 0..5 {
            assert_node_shift(grid.value_at(x, y).unwrap(), x, y);
        }
    }
}

#[test]
fn test_geotiff_little_endian_strips() {
    let data = horizontal_tiff(TiffOptions::default());
    assert_eq!(&data[0..2], b"II");
    assert_horizontal_tiff_nodes(data);
}

#[test]
fn test_geotiff_big_endian_tiles() {
    let data = horizontal_tiff(TiffOptions::default().big_endian().tiled(16, 16));
    assert_eq!(&data[0..2], b"MM");
    assert_horizontal_tiff_nodes(data);
}

#[test]
fn test_geotiff_partial_tiles() {
    // 5x4 image in 2x3 tiles leaves padded edge tiles
    assert_horizontal_tiff_nodes(horizontal_tiff(TiffOptions::default().tiled(2, 3)));
}

#[test]
fn test_bigtiff() {
    let data = horizontal_tiff(TiffOptions::default().bigtiff().tiled(16, 16));
    assert_eq!(data[2], 43);
    assert_horizontal_tiff_nodes(data);
}

#[test]
fn test_geotiff_planar_multi_row_strips() {
    assert_horizontal_tiff_nodes(horizontal_tiff(
        TiffOptions::default().planar().rows_per_strip(3),
    ));
}

#[test]
fn test_geotiff_deflate() {
    assert_horizontal_tiff_nodes(horizontal_tiff(TiffOptions::default().deflate().tiled(16, 16)));
    assert_horizontal_tiff_nodes(horizontal_tiff(
        TiffOptions::default().big_endian().deflate().rows_per_strip(2),
    ));
}

#[test]
fn test_geotiff_undescribed_channels_default_to_lat_lon() {
    let image = TiffImageSpec::from_fn(lattice(), 2, &|s, x, y| {
        let (lon, lat) = smooth_shift(x, y);
        if s == 0 {
            lat as f32
        } else {
            lon as f32
        }
    });
    assert_horizontal_tiff_nodes(geotiff_file(TiffOptions::default(), &[image]));
}

#[test]
fn test_geotiff_positive_west_longitude() {
    let image = TiffImageSpec::from_fn(lattice(), 2, &|s, _, _| if s == 0 { 1.0 } else { 2.0 })
        .with_metadata(gdal_metadata(
            &[("TYPE", "HORIZONTAL_OFFSET")],
            &[
                (0, "DESCRIPTION", "latitude_offset"),
                (1, "DESCRIPTION", "longitude_offset"),
                (1, "positive_value", "west"),
            ],
        ));
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    let grids = geotiff::open_horizontal(&ctx, &memory_resource("west.tif", data)).unwrap();
    let shift = grids[0].value_at(1, 1).unwrap();
    assert_close(shift.lon, -2.0 * ARC_SECOND, SHIFT_TOLERANCE);
    assert_close(shift.lat, ARC_SECOND, SHIFT_TOLERANCE);
}

#[test]
fn test_geotiff_mismatched_units_rejected() {
    let image = TiffImageSpec::from_fn(lattice(), 2, &|_, _, _| 0.0).with_metadata(gdal_metadata(
        &[],
        &[
            (0, "DESCRIPTION", "latitude_offset"),
            (0, "UNITTYPE", "arc-second"),
            (1, "DESCRIPTION", "longitude_offset"),
            (1, "UNITTYPE", "degree"),
        ],
    ));
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    let err = geotiff::open_horizontal(&ctx, &memory_resource("units.tif", data)).unwrap_err();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
}

#[test]
fn test_geotiff_vertical_nodata_and_scale() {
    let l = Lattice::new(2.0, 48.0, 0.5, 3, 3);
    let image = TiffImageSpec::from_fn(l, 1, &|_, x, y| if (x, y) == (2, 2) { -32768.0 } else { (x + y) as f32 })
        .with_metadata(gdal_metadata(
            &[],
            &[
                (0, "DESCRIPTION", "geoid_undulation"),
                (0, "UNITTYPE", "metre"),
                (0, "SCALE", "2"),
                (0, "OFFSET", "0.5"),
            ],
        ))
        .with_nodata("-32768");
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    let grids = geotiff::open_vertical(&ctx, &memory_resource("geoid.tif", data)).unwrap();
    let grid = &grids[0];

    assert_eq!(grid.value_at(1, 0).unwrap(), 2.5);
    assert_eq!(grid.value_at(2, 1).unwrap(), 6.5);
    assert!(!grid.is_nodata(grid.value_at(0, 0).unwrap(), 1.0));
    assert!(grid.is_nodata(f32::NAN, 1.0));
}

#[test]
fn test_geotiff_vertical_nodata_holes() {
    let l = Lattice::new(2.0, 48.0, 0.5, 3, 3);
    let image = vertical_geotiff_image(l, "geoid_undulation", &|x, y| {
        if (x, y) == (2, 2) {
            -32768.0
        } else {
            1.0
        }
    })
    .with_nodata("-32768");
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    let grids = geotiff::open_vertical(&ctx, &memory_resource("holes.tif", data)).unwrap();
    let grid = &grids[0];

    assert!(grid.is_nodata(grid.value_at(2, 2).unwrap(), 1.0));
    assert!(!grid.is_nodata(grid.value_at(1, 1).unwrap(), 1.0));
}

#[test]
fn test_geotiff_vertical_rejects_foot_unit() {
    let l = Lattice::new(2.0, 48.0, 0.5, 3, 3);
    let image = TiffImageSpec::from_fn(l, 1, &|_, _, _| 1.0).with_metadata(gdal_metadata(
        &[],
        &[(0, "DESCRIPTION", "geoid_undulation"), (0, "UNITTYPE", "foot")],
    ));
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    assert!(geotiff::open_vertical(&ctx, &memory_resource("feet.tif", data)).is_err());
}

#[test]
fn test_geotiff_generic_channels_and_metadata() {
    let l = Lattice::new(2.0, 48.0, 0.5, 3, 3);
    let image = TiffImageSpec::from_fn(l, 3, &|s, x, y| (100 * s + 10 * y + x) as f32)
        .with_metadata(gdal_metadata(
            &[("TYPE", "GEOGRAPHIC_3D_OFFSET"), ("area_of_use", "test area")],
            &[
                (0, "DESCRIPTION", "latitude_offset"),
                (1, "DESCRIPTION", "longitude_offset"),
                (2, "DESCRIPTION", "ellipsoidal_height_offset"),
                (2, "UNITTYPE", "metre"),
            ],
        ));
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default().tiled(16, 16), &[image]);
    let grids = geotiff::open_generic(&ctx, &memory_resource("3d.tif", data)).unwrap();
    let grid = &grids[0];

    assert_eq!(grid.samples_per_pixel(), 3);
    assert_eq!(grid.grid_type(), "GEOGRAPHIC_3D_OFFSET");
    assert_eq!(grid.metadata_item("area_of_use", None), Some("test area"));
    assert_eq!(grid.description(2), Some("ellipsoidal_height_offset"));
    assert_eq!(grid.unit(2), Some("metre"));
    assert_eq!(grid.value_at(2, 1, 2).unwrap(), 212.0);
    assert!(grid.value_at(3, 0, 0).is_err());
    assert!(grid.value_at(0, 0, 3).is_err());
}

#[test]
fn test_geotiff_first_image_must_be_full_resolution() {
    let image = horizontal_geotiff_image(lattice(), &smooth_shift).with_subfile_type(1);
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    let err = geotiff::open_horizontal(&ctx, &memory_resource("ovr.tif", data)).unwrap_err();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
}

#[test]
fn test_geotiff_reduced_resolution_images_ignored() {
    let full = horizontal_geotiff_image(lattice(), &smooth_shift);
    let overview = horizontal_geotiff_image(Lattice::new(-80.0, 44.0, 0.5, 3, 2), &smooth_shift)
        .with_subfile_type(1);
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[full, overview]);
    let grids = geotiff::open_horizontal(&ctx, &memory_resource("pyr.tif", data)).unwrap();
    assert_eq!(grids.len(), 1);
    assert_eq!(grids[0].count(), 1);
}

#[test]
fn test_geotiff_vertical_only_file_is_not_horizontal() {
    let image = vertical_geotiff_image(lattice(), "geoid_undulation", &|_, _| 1.0);
    let ctx = Context::new();
    let data = geotiff_file(TiffOptions::default(), &[image]);
    let err = geotiff::open_horizontal(&ctx, &memory_resource("geoid.tif", data)).unwrap_err();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
}

// =============================================================================
// Detection
// =============================================================================

#[test]
fn test_grid_set_detects_each_format() {
    let dir = GridDir::new();
    let l = lattice();
    dir.write("a.dat", &ntv1_file(l, &smooth_shift));
    dir.write("b.ct2", &ctable2_file(l, &smooth_shift));
    dir.write(
        "c.gsb",
        &ntv2_file(Order::Big, &[Ntv2Subgrid::new("ALL", "NONE", l, &smooth_shift)]),
    );
    dir.write("d.tif", &horizontal_tiff(TiffOptions::default()));
    dir.write("e.gtx", &gtx_file(l.west, l, &|_, _| 1.0));
    let ctx = dir.context();

    let formats: Vec<GridFormat> = ["a.dat", "b.ct2", "c.gsb", "d.tif"]
        .iter()
        .map(|name| HorizontalGridSet::open(&ctx, name).unwrap().format())
        .collect();
    assert_eq!(
        formats,
        [GridFormat::Ntv1, GridFormat::Ctable2, GridFormat::Ntv2, GridFormat::Gtiff]
    );
    assert_eq!(VerticalGridSet::open(&ctx, "e.gtx").unwrap().format(), GridFormat::Gtx);
}

#[test]
fn test_wrong_kind_is_unrecognized() {
    let dir = GridDir::new();
    let l = lattice();
    dir.write("geoid.gtx", &gtx_file(l.west, l, &|_, _| 1.0));
    dir.write("shift.dat", &ntv1_file(l, &smooth_shift));
    let ctx = dir.context();

    assert!(matches!(
        HorizontalGridSet::open(&ctx, "geoid.gtx"),
        Err(GridError::UnrecognizedFormat(_))
    ));
    assert!(matches!(
        VerticalGridSet::open(&ctx, "shift.dat"),
        Err(GridError::UnrecognizedFormat(_))
    ));
}

#[test]
fn test_unrecognized_content() {
    let dir = GridDir::new();
    dir.write("junk.bin", b"this is not a grid file at all");
    let ctx = dir.context();

    let err = HorizontalGridSet::open(&ctx, "junk.bin").unwrap_err();
    assert!(matches!(err, GridError::UnrecognizedFormat(_)));
    assert!(!err.is_not_found());
}

#[test]
fn test_missing_grid_is_not_found() {
    let dir = GridDir::new();
    let ctx = dir.context();
    let err = HorizontalGridSet::open(&ctx, "absent.gsb").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.code(), None);
}

#[test]
fn test_null_grid_set() {
    let ctx = Context::new();
    let set = HorizontalGridSet::open(&ctx, "null").unwrap();
    assert_eq!(set.format(), GridFormat::Null);
    assert!(set.grids()[0].is_null_grid());
    assert!(set.grid_at(3.0, 1.5).is_some());
}
