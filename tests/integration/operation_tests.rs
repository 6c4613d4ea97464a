//! Operation setup and lifecycle integration tests.
//!
//! Tests verify:
//! - Deferred opening and the known-grids registry
//! - The VERTCON millimetre multiplier on GeoTIFF replacements
//! - Time brackets, batch application and error codes
//! - Reopening grids that changed on disk or moved to another context

use gridshift::{
    apply_batch, clear_hgridshift_known_grids, Context, Coordinate, Direction, ErrorCode,
    GridOperation, HorizontalGridShift, TimeBracket, VerticalGridShift,
};

use super::test_utils::{
    assert_close, constant_shift, ctable2_file, geotiff_file, gtx_file, ntv1_file,
    vertical_geotiff_image, GridDir, Lattice, TiffOptions, ARC_SECOND,
};

fn lattice() -> Lattice {
    Lattice::new(-80.0, 44.0, 0.25, 5, 4)
}

fn at(lon: f64, lat: f64, t: f64) -> Coordinate {
    Coordinate::from_degrees(lon, lat, 0.0, t)
}

// =============================================================================
// Deferred Opening
// =============================================================================

#[test]
fn test_deferred_grid_created_after_construction() {
    let dir = GridDir::new();
    let mut ctx = dir.context();
    ctx.set_defer_grid_opening(true);

    let mut op = HorizontalGridShift::new(&ctx, "late.ct2", TimeBracket::always()).unwrap();
    let shift = constant_shift(3.0, -1.0);
    dir.write("late.ct2", &ctable2_file(lattice(), &shift));

    let input = at(-79.5, 44.5, f64::INFINITY);
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.lon - input.lon, 3.0 * ARC_SECOND, 1e-12);
    assert_close(out.lat - input.lat, -ARC_SECOND, 1e-12);
}

#[test]
fn test_deferred_missing_grid_fails_every_point() {
    let dir = GridDir::new();
    let mut ctx = dir.context();
    ctx.set_defer_grid_opening(true);

    let mut op = HorizontalGridShift::new(&ctx, "never.ct2", TimeBracket::always()).unwrap();
    let input = at(-79.5, 44.5, f64::INFINITY);
    assert!(op.apply(&mut ctx, input, Direction::Forward).is_err());

    // Failure is remembered even once the file shows up
    let shift = constant_shift(1.0, 1.0);
    dir.write("never.ct2", &ctable2_file(lattice(), &shift));
    let err = op.apply(&mut ctx, input, Direction::Forward).unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::FailedToLoadGrid));
    assert_eq!(ctx.errno(), Some(ErrorCode::FailedToLoadGrid));
}

#[test]
fn test_known_grids_defer_later_operations() {
    let dir = GridDir::new();
    let shift = constant_shift(1.0, 1.0);
    let path = dir.write("registry_probe.ct2", &ctable2_file(lattice(), &shift));
    let mut ctx = dir.context();

    HorizontalGridShift::new(&ctx, "registry_probe.ct2", TimeBracket::always()).unwrap();
    std::fs::remove_file(&path).unwrap();

    // Already known: construction succeeds and the failure surfaces on use
    let mut op = HorizontalGridShift::new(&ctx, "registry_probe.ct2", TimeBracket::always()).unwrap();
    let err = op
        .apply(&mut ctx, at(-79.5, 44.5, f64::INFINITY), Direction::Forward)
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::FailedToLoadGrid));

    clear_hgridshift_known_grids();
    assert!(HorizontalGridShift::new(&ctx, "registry_probe.ct2", TimeBracket::always()).is_err());
}

// =============================================================================
// VERTCON
// =============================================================================

#[test]
fn test_vertcon_geotiff_replacement_uses_metres() {
    let dir = GridDir::new();
    let l = Lattice::new(-100.0, 30.0, 1.0, 4, 4);
    dir.write(
        "vertconw.tif",
        &geotiff_file(
            TiffOptions::default(),
            &[vertical_geotiff_image(l, "vertical_offset", &|_, _| 0.25)],
        ),
    );
    let mut ctx = dir.context();
    ctx.add_grid_alternative("vertconw.gtx", "vertconw.tif");
    let input = Coordinate::from_degrees(-99.5, 31.5, 10.0, f64::INFINITY);

    let mut op =
        VerticalGridShift::new(&ctx, "vertconw.gtx", TimeBracket::always(), Some(0.001)).unwrap();
    assert_eq!(op.multiplier(), 1.0);
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.z, 10.25, 1e-6);

    // Deferred construction only knows after opening
    ctx.set_defer_grid_opening(true);
    let mut op =
        VerticalGridShift::new(&ctx, "vertconw.gtx", TimeBracket::always(), Some(0.001)).unwrap();
    assert_eq!(op.multiplier(), 0.001);
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_eq!(op.multiplier(), 1.0);
    assert_close(out.z, 10.25, 1e-6);
}

#[test]
fn test_vertcon_gtx_keeps_millimetres() {
    let dir = GridDir::new();
    let l = Lattice::new(-100.0, 30.0, 1.0, 4, 4);
    dir.write("vertconc.gtx", &gtx_file(l.west, l, &|_, _| 250.0));
    let mut ctx = dir.context();

    let mut op =
        VerticalGridShift::new(&ctx, "vertconc.gtx", TimeBracket::always(), Some(0.001)).unwrap();
    assert_eq!(op.multiplier(), 0.001);
    let out = op
        .apply(
            &mut ctx,
            Coordinate::from_degrees(-99.5, 31.5, 10.0, f64::INFINITY),
            Direction::Forward,
        )
        .unwrap();
    assert_close(out.z, 10.25, 1e-6);
}

// =============================================================================
// Time Bracket and Batches
// =============================================================================

#[test]
fn test_time_bracket_selects_points() {
    let dir = GridDir::new();
    let shift = constant_shift(2.0, 2.0);
    dir.write("bracket.ct2", &ctable2_file(lattice(), &shift));
    let mut ctx = dir.context();
    let mut op =
        HorizontalGridShift::new(&ctx, "bracket.ct2", TimeBracket::new(2010.0, 2020.0)).unwrap();

    let early = at(-79.5, 44.5, 2005.0);
    let late = at(-79.5, 44.5, 2015.0);
    let unknown = at(-79.5, 44.5, f64::INFINITY);
    assert_ne!(op.apply(&mut ctx, early, Direction::Forward).unwrap(), early);
    assert_eq!(op.apply(&mut ctx, late, Direction::Forward).unwrap(), late);
    assert_eq!(op.apply(&mut ctx, unknown, Direction::Forward).unwrap(), unknown);
}

#[test]
fn test_batch_isolates_failures() {
    let dir = GridDir::new();
    let shift = constant_shift(2.0, 2.0);
    dir.write("batch.ct2", &ctable2_file(lattice(), &shift));
    let mut ctx = dir.context();
    let mut op = HorizontalGridShift::new(&ctx, "batch.ct2", TimeBracket::always()).unwrap();

    let coords = [
        at(-79.5, 44.5, f64::INFINITY),
        at(10.0, 10.0, f64::INFINITY),
        at(-79.25, 44.25, f64::INFINITY),
    ];
    let results = apply_batch(&mut op, &mut ctx, &coords, Direction::Forward);

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[2].is_ok());
    assert_close(results[2].output.lon - coords[2].lon, 2.0 * ARC_SECOND, 1e-12);

    let failed = &results[1];
    assert!(!failed.is_ok());
    assert_eq!(failed.output, coords[1]);
    assert_eq!(failed.error, Some(ErrorCode::GridArea));
    assert!(failed.message.is_some());
    assert_eq!(ctx.errno(), Some(ErrorCode::GridArea));

    let json = serde_json::to_value(failed.to_degrees()).unwrap();
    assert_eq!(json["error"], "grid_area");
    assert_close(json["output"]["lon"].as_f64().unwrap(), 10.0, 1e-9);
}

// =============================================================================
// Reopening
// =============================================================================

#[test]
fn test_grid_changed_on_disk_is_reopened() {
    let dir = GridDir::new();
    let old = constant_shift(1.0, 1.0);
    dir.write("changing.dat", &ntv1_file(lattice(), &old));
    let mut ctx = dir.context();
    let mut op = HorizontalGridShift::new(&ctx, "changing.dat", TimeBracket::always()).unwrap();

    let input = at(-79.6, 44.4, f64::INFINITY);
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.lon - input.lon, ARC_SECOND, 1e-12);

    // Smaller replacement: the old layout now points past the end of the file
    let new = constant_shift(7.0, 7.0);
    dir.write("changing.dat", &ntv1_file(Lattice::new(-80.0, 44.0, 0.25, 3, 3), &new));
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.lon - input.lon, 7.0 * ARC_SECOND, 1e-12);
    assert_close(out.lat - input.lat, 7.0 * ARC_SECOND, 1e-12);
}

#[test]
fn test_reassign_context_reopens_grids() {
    let first = GridDir::new();
    let second = GridDir::new();
    let one = constant_shift(1.0, 0.0);
    let five = constant_shift(5.0, 0.0);
    first.write("moved.ct2", &ctable2_file(lattice(), &one));
    second.write("moved.ct2", &ctable2_file(lattice(), &five));

    let mut ctx = first.context();
    let mut op = HorizontalGridShift::new(&ctx, "moved.ct2", TimeBracket::always()).unwrap();
    let input = at(-79.5, 44.5, f64::INFINITY);
    let out = op.apply(&mut ctx, input, Direction::Forward).unwrap();
    assert_close(out.lon - input.lon, ARC_SECOND, 1e-12);

    let mut other = second.context();
    op.reassign_context(&other).unwrap();
    let out = op.apply(&mut other, input, Direction::Forward).unwrap();
    assert_close(out.lon - input.lon, 5.0 * ARC_SECOND, 1e-12);
}

#[test]
fn test_operation_reports_name_and_grids() {
    let ctx = Context::new();
    let op = HorizontalGridShift::new(&ctx, "null", TimeBracket::always()).unwrap();
    assert_eq!(op.name(), "hgridshift");
    assert_eq!(op.grids(), "null");
    let op = VerticalGridShift::new(&ctx, "null", TimeBracket::always(), None).unwrap();
    assert_eq!(op.name(), "vgridshift");
}
