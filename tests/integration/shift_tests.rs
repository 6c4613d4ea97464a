//! End-to-end shift integration tests.
//!
//! Tests verify:
//! - hgridshift forward and inverse through every horizontal format
//! - Bilinear interpolation between nodes
//! - vgridshift with multipliers and nodata holes
//! - gridshift driven by `TYPE` metadata, both interpolation methods
//! - Optional grids and points outside every grid

use gridshift::{
    Context, Coordinate, Direction, ErrorCode, GenericGridShift, GridError, GridOperation,
    HorizontalGridShift, Interpolation, TimeBracket, VerticalGridShift,
};

use super::test_utils::{
    assert_close, constant_shift, ctable2_file, gdal_metadata, geotiff_file, gtx_file,
    horizontal_geotiff_image, ntv1_file, ntv2_file, smooth_shift, vertical_geotiff_image, GridDir,
    Lattice, Ntv2Subgrid, Order, TiffImageSpec, TiffOptions, ARC_SECOND,
};

/// Radian tolerance of a forward/inverse round trip.
const ROUND_TRIP_TOLERANCE: f64 = 1e-10;

fn lattice() -> Lattice {
    Lattice::new(-80.0, 44.0, 0.25, 5, 4)
}

fn at(lon: f64, lat: f64) -> Coordinate {
    Coordinate::from_degrees(lon, lat, 0.0, f64::INFINITY)
}

/// Directory holding the same smooth shift in every horizontal format.
fn horizontal_grids() -> GridDir {
    let dir = GridDir::new();
    let l = lattice();
    dir.write("smooth.dat", &ntv1_file(l, &smooth_shift));
    dir.write("smooth.ct2", &ctable2_file(l, &smooth_shift));
    dir.write(
        "smooth.gsb",
        &ntv2_file(Order::Little, &[Ntv2Subgrid::new("SMOOTH", "NONE", l, &smooth_shift)]),
    );
    dir.write(
        "smooth.tif",
        &geotiff_file(
            TiffOptions::default().tiled(16, 16),
            &[horizontal_geotiff_image(l, &smooth_shift)],
        ),
    );
    dir
}

/// Expected forward shift of a point in lattice coordinates, radians.
fn expected_shift(fx: f64, fy: f64) -> (f64, f64) {
    let lon = 1.5 + 0.25 * fx - 0.1 * fy;
    let lat = -0.8 + 0.05 * fx + 0.2 * fy;
    (lon * ARC_SECOND, lat * ARC_SECOND)
}

// =============================================================================
// hgridshift
// =============================================================================

#[test]
fn test_hgridshift_interpolates_between_nodes() {
    let dir = horizontal_grids();
    let mut ctx = dir.context();
    let l = lattice();
    let (fx, fy) = (1.5, 2.25);
    let input = at(l.west + fx * l.res, l.south + fy * l.res);
    let (dlon, dlat) = expected_shift(fx, fy);

    for name in ["smooth.dat", "smooth.ct2", "smooth.gsb", "smooth.tif"] {
        let mut op = HorizontalGridShift::new(&ctx, name, TimeBracket::always()).unwrap();
        let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
        assert_close(out.lon, input.lon + dlon, 1e-12);
        assert_close(out.lat, input.lat + dlat, 1e-12);
        assert_eq!(out.z, input.z);
    }
    assert_eq!(ctx.errno(), None);
}

#[test]
fn test_hgridshift_round_trip() {
    let dir = horizontal_grids();
    let mut ctx = dir.context();

    for name in ["smooth.dat", "smooth.ct2", "smooth.gsb", "smooth.tif"] {
        let mut op = HorizontalGridShift::new(&ctx, name, TimeBracket::always()).unwrap();
        for input in [at(-79.9, 44.1), at(-79.37, 44.61), at(-79.05, 44.7)] {
            let forward = op.apply(&mut ctx, input, Direction::Forward).unwrap();
            assert_ne!(forward.lon, input.lon);
            let back = op.apply(&mut ctx, forward, Direction::Inverse).unwrap();
            assert_close(back.lon, input.lon, ROUND_TRIP_TOLERANCE);
            assert_close(back.lat, input.lat, ROUND_TRIP_TOLERANCE);
        }
    }
}

#[test]
fn test_hgridshift_grid_edge_is_inside() {
    let dir = horizontal_grids();
    let mut ctx = dir.context();
    let l = lattice();
    let mut op = HorizontalGridShift::new(&ctx, "smooth.gsb", TimeBracket::always()).unwrap();

    let corner = at(l.east(), l.north());
    let out = op.apply(&mut ctx, corner, Direction::Forward).unwrap();
    let (dlon, dlat) = expected_shift(4.0, 3.0);
    assert_close(out.lon, corner.lon + dlon, 1e-12);
    assert_close(out.lat, corner.lat + dlat, 1e-12);
}

#[test]
fn test_hgridshift_outside_grid_area() {
    let dir = horizontal_grids();
    let mut ctx = dir.context();
    let mut op = HorizontalGridShift::new(&ctx, "smooth.gsb", TimeBracket::always()).unwrap();

    let err = op.apply(&mut ctx, at(10.0, 10.0), Direction::Forward).unwrap_err();
    assert!(matches!(err, GridError::GridArea));
    assert_eq!(ctx.errno(), Some(ErrorCode::GridArea));
}

#[test]
fn test_hgridshift_falls_through_to_null() {
    let dir = horizontal_grids();
    let mut ctx = dir.context();
    let mut op = HorizontalGridShift::new(&ctx, "smooth.gsb,null", TimeBracket::always()).unwrap();

    let far = at(10.0, 10.0);
    assert_eq!(op.apply(&mut ctx, far, Direction::Forward).unwrap(), far);
    let near = at(-79.5, 44.5);
    assert_ne!(op.apply(&mut ctx, near, Direction::Forward).unwrap(), near);
}

#[test]
fn test_hgridshift_list_order_decides() {
    let dir = GridDir::new();
    let l = lattice();
    let first = constant_shift(1.0, 0.0);
    let second = constant_shift(2.0, 0.0);
    dir.write("first.ct2", &ctable2_file(l, &first));
    dir.write("second.ct2", &ctable2_file(l, &second));
    let mut ctx = dir.context();

    let input = at(-79.5, 44.5);
    let mut op =
        HorizontalGridShift::new(&ctx, "second.ct2,first.ct2", TimeBracket::always()).unwrap();
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.lon - input.lon, 2.0 * ARC_SECOND, 1e-12);
}

#[test]
fn test_optional_grids() {
    let dir = horizontal_grids();
    let mut ctx = dir.context();
    let input = at(-79.5, 44.5);

    let mut op =
        HorizontalGridShift::new(&ctx, "@missing.gsb,smooth.gsb", TimeBracket::always()).unwrap();
    assert_ne!(op.apply(&mut ctx, input, Direction::Forward).unwrap(), input);

    // Nothing left to apply: points pass through
    let mut op = HorizontalGridShift::new(&ctx, "@missing.gsb", TimeBracket::always()).unwrap();
    assert_eq!(op.apply(&mut ctx, input, Direction::Forward).unwrap(), input);

    let err = HorizontalGridShift::new(&ctx, "missing.gsb,smooth.gsb", TimeBracket::always())
        .err()
        .unwrap();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
}

// =============================================================================
// vgridshift
// =============================================================================

/// Geoid heights growing linearly with the node indices.
fn geoid(x: u32, y: u32) -> f32 {
    30.0 + x as f32 + 2.0 * y as f32
}

fn vertical_grids() -> GridDir {
    let dir = GridDir::new();
    let l = Lattice::new(2.0, 48.0, 0.5, 4, 4);
    dir.write("geoid.gtx", &gtx_file(l.west, l, &geoid));
    dir.write(
        "geoid.tif",
        &geotiff_file(
            TiffOptions::default(),
            &[vertical_geotiff_image(l, "geoid_undulation", &geoid)],
        ),
    );
    dir.write(
        "holes.gtx",
        &gtx_file(l.west, l, &|x, y| if (x, y) == (1, 1) { -88.8888 } else { 10.0 }),
    );
    dir
}

fn height_at(lon: f64, lat: f64, z: f64) -> Coordinate {
    Coordinate::from_degrees(lon, lat, z, f64::INFINITY)
}

#[test]
fn test_vgridshift_default_multiplier_subtracts() {
    let dir = vertical_grids();
    let mut ctx = dir.context();
    // Node (1, 2) plus half a cell east: 30 + 1.5 + 4
    let input = height_at(2.75, 49.0, 100.0);

    for name in ["geoid.gtx", "geoid.tif"] {
        let mut op = VerticalGridShift::new(&ctx, name, TimeBracket::always(), None).unwrap();
        assert_eq!(op.multiplier(), -1.0);
        let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
        assert_close(out.z, 100.0 - 35.5, 1e-9);
        assert_eq!((out.lon, out.lat), (input.lon, input.lat));

        let back = op.apply(&mut ctx, out, Direction::Inverse).unwrap();
        assert_close(back.z, 100.0, 1e-9);
    }
}

#[test]
fn test_vgridshift_multiplier() {
    let dir = vertical_grids();
    let mut ctx = dir.context();
    let mut op = VerticalGridShift::new(&ctx, "geoid.gtx", TimeBracket::always(), Some(0.5)).unwrap();
    let out = op.apply(&mut ctx, height_at(2.0, 48.0, 0.0), Direction::Forward).unwrap();
    assert_close(out.z, 15.0, 1e-9);
}

#[test]
fn test_vgridshift_skips_nodata_corners() {
    let dir = vertical_grids();
    let mut ctx = dir.context();
    let mut op = VerticalGridShift::new(&ctx, "holes.gtx", TimeBracket::always(), Some(1.0)).unwrap();

    // One of four corners is a hole; the remaining ones are reweighted
    let out = op.apply(&mut ctx, height_at(2.75, 48.25, 0.0), Direction::Forward).unwrap();
    assert_close(out.z, 10.0, 1e-6);
}

#[test]
fn test_vgridshift_outside_grid() {
    let dir = vertical_grids();
    let mut ctx = dir.context();
    let mut op = VerticalGridShift::new(&ctx, "geoid.gtx", TimeBracket::always(), None).unwrap();

    let err = op.apply(&mut ctx, height_at(20.0, 10.0, 0.0), Direction::Forward).unwrap_err();
    assert!(matches!(err, GridError::GridArea));
    assert_eq!(ctx.errno(), Some(ErrorCode::GridArea));
}

// =============================================================================
// gridshift
// =============================================================================

fn generic_grids() -> GridDir {
    let dir = GridDir::new();
    let l = lattice();
    dir.write(
        "hshift.tif",
        &geotiff_file(
            TiffOptions::default(),
            &[horizontal_geotiff_image(l, &smooth_shift)],
        ),
    );

    let image = TiffImageSpec::from_fn(l, 3, &|s, x, y| {
        let (lon, lat) = smooth_shift(x, y);
        match s {
            0 => lat as f32,
            1 => lon as f32,
            _ => 2.0 + 0.5 * x as f32,
        }
    })
    .with_metadata(gdal_metadata(
        &[("TYPE", "GEOGRAPHIC_3D_OFFSET")],
        &[
            (0, "DESCRIPTION", "latitude_offset"),
            (0, "UNITTYPE", "arc-second"),
            (1, "DESCRIPTION", "longitude_offset"),
            (1, "UNITTYPE", "arc-second"),
            (2, "DESCRIPTION", "ellipsoidal_height_offset"),
            (2, "UNITTYPE", "metre"),
        ],
    ));
    dir.write("3d.tif", &geotiff_file(TiffOptions::default().tiled(16, 16), &[image]));

    let geoid = TiffImageSpec::from_fn(l, 1, &|_, x, _| 40.0 + x as f32).with_metadata(
        gdal_metadata(
            &[("TYPE", "VERTICAL_OFFSET_GEOGRAPHIC_TO_VERTICAL")],
            &[(0, "DESCRIPTION", "geoid_undulation"), (0, "UNITTYPE", "metre")],
        ),
    );
    dir.write("vshift.tif", &geotiff_file(TiffOptions::default(), &[geoid]));

    let untyped = horizontal_geotiff_image(l, &smooth_shift).with_metadata(gdal_metadata(
        &[],
        &[
            (0, "DESCRIPTION", "latitude_offset"),
            (1, "DESCRIPTION", "longitude_offset"),
        ],
    ));
    dir.write("untyped.tif", &geotiff_file(TiffOptions::default(), &[untyped]));
    dir
}

#[test]
fn test_gridshift_horizontal_matches_hgridshift() {
    let dir = generic_grids();
    let mut ctx = dir.context();
    let l = lattice();
    let (fx, fy) = (2.5, 1.75);
    let input = at(l.west + fx * l.res, l.south + fy * l.res);
    let (dlon, dlat) = expected_shift(fx, fy);

    for method in [Interpolation::Bilinear, Interpolation::Biquadratic] {
        let mut op = GenericGridShift::new(&ctx, "hshift.tif", Some(method)).unwrap();
        let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
        assert_close(out.lon, input.lon + dlon, 1e-12);
        assert_close(out.lat, input.lat + dlat, 1e-12);

        let back = op.apply(&mut ctx, out, Direction::Inverse).unwrap();
        assert_close(back.lon, input.lon, ROUND_TRIP_TOLERANCE);
        assert_close(back.lat, input.lat, ROUND_TRIP_TOLERANCE);
    }
}

#[test]
fn test_gridshift_geographic_3d_offset() {
    let dir = generic_grids();
    let mut ctx = dir.context();
    let l = lattice();
    let input = Coordinate::from_degrees(l.west + 2.0 * l.res, l.south + l.res, 10.0, f64::INFINITY);

    let mut op = GenericGridShift::new(&ctx, "3d.tif", None).unwrap();
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    let (dlon, dlat) = expected_shift(2.0, 1.0);
    assert_close(out.lon, input.lon + dlon, 1e-12);
    assert_close(out.lat, input.lat + dlat, 1e-12);
    assert_close(out.z, 13.0, 1e-6);

    let back = op.apply(&mut ctx, out, Direction::Inverse).unwrap();
    assert_close(back.lon, input.lon, ROUND_TRIP_TOLERANCE);
    assert_close(back.z, 10.0, 1e-4);
}

#[test]
fn test_gridshift_horizontal_then_vertical() {
    let dir = generic_grids();
    let mut ctx = dir.context();
    let l = lattice();
    let input = Coordinate::from_degrees(l.west + l.res, l.south + l.res, 100.0, f64::INFINITY);

    let mut op = GenericGridShift::new(&ctx, "hshift.tif,vshift.tif", None).unwrap();
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_ne!(out.lon, input.lon);
    // The vertical pass samples at the shifted position, a few arc-seconds east of node x = 1
    assert_close(out.z, 141.0, 1e-2);
    assert!(out.z > 141.0);
}

#[test]
fn test_gridshift_vertical_only() {
    let dir = generic_grids();
    let mut ctx = dir.context();
    let l = lattice();
    let input = Coordinate::from_degrees(l.west + 3.0 * l.res, l.south, 5.0, f64::INFINITY);

    let mut op = GenericGridShift::new(&ctx, "vshift.tif", None).unwrap();
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_eq!((out.lon, out.lat), (input.lon, input.lat));
    assert_close(out.z, 48.0, 1e-6);
    let back = op.apply(&mut ctx, out, Direction::Inverse).unwrap();
    assert_close(back.z, 5.0, 1e-6);
}

#[test]
fn test_gridshift_requires_type() {
    let dir = generic_grids();
    let ctx = dir.context();
    let err = GenericGridShift::new(&ctx, "untyped.tif", None).err().unwrap();
    assert!(matches!(err, GridError::FailedToLoadGrid { .. }));
    assert!(err.to_string().contains("TYPE"));
}

#[test]
fn test_gridshift_outside_every_grid() {
    let dir = generic_grids();
    let mut ctx = dir.context();
    let mut op = GenericGridShift::new(&ctx, "hshift.tif", None).unwrap();
    let err = op.apply(&mut ctx, at(10.0, 10.0), Direction::Forward).unwrap_err();
    assert!(matches!(err, GridError::OutsideGrid));
    assert_eq!(ctx.errno(), Some(ErrorCode::OutsideGrid));
}

#[test]
fn test_gridshift_null_passes_points() {
    let mut ctx = Context::new();
    let mut op = GenericGridShift::new(&ctx, "null", None).unwrap();
    let input = at(120.0, -30.0);
    assert_eq!(op.apply(&mut ctx, input, Direction::Forward).unwrap(), input);
}

/// Two side-by-side horizontal grids with different constant shifts.
fn adjacent_grids() -> GridDir {
    let dir = GridDir::new();
    let west = Lattice::new(0.0, 44.0, 0.1, 11, 11);
    let east = Lattice::new(1.0, 44.0, 0.1, 11, 11);
    // 0.3 and 0.25 degrees of eastward shift
    let west_shift = constant_shift(1080.0, 0.0);
    let east_shift = constant_shift(900.0, 0.0);
    // Same grid name, different units: channel settings must stay per image
    let degrees = TiffImageSpec::from_fn(east, 2, &|s, _, _| if s == 0 { 0.0 } else { 0.25 })
        .with_metadata(gdal_metadata(
            &[("TYPE", "HORIZONTAL_OFFSET"), ("grid_name", "adjacent")],
            &[
                (0, "DESCRIPTION", "latitude_offset"),
                (0, "UNITTYPE", "degree"),
                (1, "DESCRIPTION", "longitude_offset"),
                (1, "UNITTYPE", "degree"),
            ],
        ));
    let arc_seconds = horizontal_geotiff_image(west, &west_shift).with_metadata(gdal_metadata(
        &[("TYPE", "HORIZONTAL_OFFSET"), ("grid_name", "adjacent")],
        &[
            (0, "DESCRIPTION", "latitude_offset"),
            (0, "UNITTYPE", "arc-second"),
            (1, "DESCRIPTION", "longitude_offset"),
            (1, "UNITTYPE", "arc-second"),
        ],
    ));
    dir.write(
        "pair.tif",
        &geotiff_file(TiffOptions::default(), &[arc_seconds, degrees]),
    );
    dir.write(
        "east_only.tif",
        &geotiff_file(TiffOptions::default(), &[horizontal_geotiff_image(east, &east_shift)]),
    );
    dir
}

#[test]
fn test_gridshift_inverse_follows_into_neighbour_grid() {
    let dir = adjacent_grids();
    let mut ctx = dir.context();
    let mut op = GenericGridShift::new(&ctx, "pair.tif", None).unwrap();
    assert_eq!(op.grids(), "pair.tif");

    let input = at(0.9, 44.5);
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.lon, 1.2f64.to_radians(), 1e-12);

    // The first estimate uses the east grid and lands in the west one
    let back = op.apply(&mut ctx, out, Direction::Inverse).unwrap();
    assert_close(back.lon, input.lon, ROUND_TRIP_TOLERANCE);
    assert_close(back.lat, input.lat, ROUND_TRIP_TOLERANCE);
}

#[test]
fn test_gridshift_inverse_without_neighbour_keeps_estimate() {
    let dir = adjacent_grids();
    let mut ctx = dir.context();
    let mut op = GenericGridShift::new(&ctx, "east_only.tif", None).unwrap();

    let back = op.apply(&mut ctx, at(1.2, 44.5), Direction::Inverse).unwrap();
    assert_close(back.lon, 0.95f64.to_radians(), ROUND_TRIP_TOLERANCE);
    assert_close(back.lat, 44.5f64.to_radians(), ROUND_TRIP_TOLERANCE);
}
