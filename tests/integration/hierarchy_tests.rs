//! Grid hierarchy integration tests.
//!
//! Tests verify:
//! - NTv2 subgrids are threaded to their parents by name
//! - GeoTIFF images nest through `grid_name` / `parent_grid_name`
//! - Undeclared GeoTIFF images nest by bounding box, per `TYPE`
//! - Lookups return the finest grid covering a point

use gridshift::{hgrid_value, GenericGridSet, HorizontalGridSet, LonLat};

use super::test_utils::{
    assert_close, constant_shift, gdal_metadata, geotiff_file, horizontal_geotiff_image,
    ntv2_file, GridDir, Lattice, Ntv2Subgrid, Order, TiffImageSpec, TiffOptions, ARC_SECOND,
};

fn parent_lattice() -> Lattice {
    Lattice::new(-80.0, 44.0, 0.25, 5, 4)
}

fn child_lattice() -> Lattice {
    Lattice::new(-79.75, 44.25, 0.125, 3, 3)
}

fn point(lon: f64, lat: f64) -> LonLat {
    LonLat::from_degrees(lon, lat)
}

/// Horizontal image carrying hierarchy names.
fn named_image(lattice: Lattice, shift: (f64, f64), name: &str, parent: &str) -> TiffImageSpec {
    let (lon, lat) = shift;
    let mut dataset = vec![("TYPE", "HORIZONTAL_OFFSET"), ("grid_name", name)];
    if !parent.is_empty() {
        dataset.push(("parent_grid_name", parent));
    }
    TiffImageSpec::from_fn(lattice, 2, &|s, _, _| if s == 0 { lat as f32 } else { lon as f32 })
        .with_metadata(gdal_metadata(
            &dataset,
            &[
                (0, "DESCRIPTION", "latitude_offset"),
                (1, "DESCRIPTION", "longitude_offset"),
            ],
        ))
}

fn typed_image(lattice: Lattice, grid_type: &str, description: &str) -> TiffImageSpec {
    TiffImageSpec::from_fn(lattice, 1, &|_, _, _| 1.0).with_metadata(gdal_metadata(
        &[("TYPE", grid_type)],
        &[(0, "DESCRIPTION", description)],
    ))
}

// =============================================================================
// NTv2
// =============================================================================

#[test]
fn test_ntv2_child_attached_to_parent() {
    let dir = GridDir::new();
    let parent_shift = constant_shift(1.0, 2.0);
    let child_shift = constant_shift(10.0, 20.0);
    dir.write(
        "nested.gsb",
        &ntv2_file(
            Order::Little,
            &[
                Ntv2Subgrid::new("PARENT", "NONE", parent_lattice(), &parent_shift),
                Ntv2Subgrid::new("CHILD", "PARENT", child_lattice(), &child_shift),
            ],
        ),
    );
    let ctx = dir.context();
    let set = HorizontalGridSet::open(&ctx, "nested.gsb").unwrap();

    assert_eq!(set.grids().len(), 1);
    let root = &set.grids()[0];
    assert_eq!(root.name(), "PARENT");
    assert_eq!(root.children().len(), 1);
    assert_eq!(root.count(), 2);

    let inside = point(-79.6, 44.4);
    let outside = point(-79.1, 44.1);
    assert_eq!(set.grid_at(inside.lon, inside.lat).unwrap().name(), "CHILD");
    assert_eq!(set.grid_at(outside.lon, outside.lat).unwrap().name(), "PARENT");

    let sets = [set];
    let fine = hgrid_value(&sets, inside).unwrap();
    assert_close(fine.lon, 10.0 * ARC_SECOND, 1e-12);
    assert_close(fine.lat, 20.0 * ARC_SECOND, 1e-12);
    let coarse = hgrid_value(&sets, outside).unwrap();
    assert_close(coarse.lon, ARC_SECOND, 1e-12);
    assert_close(coarse.lat, 2.0 * ARC_SECOND, 1e-12);
}

#[test]
fn test_ntv2_unknown_parent_becomes_top_level() {
    let dir = GridDir::new();
    let shift = constant_shift(0.0, 0.0);
    dir.write(
        "orphan.gsb",
        &ntv2_file(
            Order::Big,
            &[
                Ntv2Subgrid::new("PARENT", "NONE", parent_lattice(), &shift),
                Ntv2Subgrid::new("ORPHAN", "MISSING", child_lattice(), &shift),
            ],
        ),
    );
    let ctx = dir.context();
    let set = HorizontalGridSet::open(&ctx, "orphan.gsb").unwrap();

    let names: Vec<&str> = set.grids().iter().map(|g| g.name()).collect();
    assert_eq!(names, ["PARENT", "ORPHAN"]);
    assert!(set.grids()[0].children().is_empty());
}

#[test]
fn test_ntv2_outside_every_subgrid() {
    let dir = GridDir::new();
    let shift = constant_shift(0.0, 0.0);
    dir.write(
        "small.gsb",
        &ntv2_file(
            Order::Little,
            &[Ntv2Subgrid::new("ONLY", "NONE", parent_lattice(), &shift)],
        ),
    );
    let ctx = dir.context();
    let set = HorizontalGridSet::open(&ctx, "small.gsb").unwrap();
    let far = point(10.0, 10.0);
    assert!(set.grid_at(far.lon, far.lat).is_none());
    assert!(hgrid_value(&[set], far).is_err());
}

// =============================================================================
// GeoTIFF
// =============================================================================

#[test]
fn test_geotiff_named_hierarchy() {
    let dir = GridDir::new();
    dir.write(
        "named.tif",
        &geotiff_file(
            TiffOptions::default(),
            &[
                named_image(parent_lattice(), (1.0, 2.0), "coarse", ""),
                named_image(child_lattice(), (10.0, 20.0), "fine", "coarse"),
            ],
        ),
    );
    let ctx = dir.context();
    let set = HorizontalGridSet::open(&ctx, "named.tif").unwrap();

    assert_eq!(set.grids().len(), 1);
    assert_eq!(set.grids()[0].name(), "coarse");
    assert_eq!(set.grids()[0].children()[0].name(), "fine");

    let inside = point(-79.6, 44.4);
    let shift = hgrid_value(&[set], inside).unwrap();
    assert_close(shift.lat, 20.0 * ARC_SECOND, 1e-12);
}

#[test]
fn test_geotiff_declared_parent_must_contain_child() {
    let dir = GridDir::new();
    let elsewhere = Lattice::new(-70.0, 30.0, 0.25, 3, 3);
    dir.write(
        "misplaced.tif",
        &geotiff_file(
            TiffOptions::default(),
            &[
                named_image(parent_lattice(), (0.0, 0.0), "coarse", ""),
                named_image(elsewhere, (0.0, 0.0), "stray", "coarse"),
            ],
        ),
    );
    let ctx = dir.context();
    let set = HorizontalGridSet::open(&ctx, "misplaced.tif").unwrap();
    let names: Vec<&str> = set.grids().iter().map(|g| g.name()).collect();
    assert_eq!(names, ["coarse", "stray"]);
}

#[test]
fn test_geotiff_bounding_box_hierarchy() {
    let dir = GridDir::new();
    let coarse = constant_shift(1.0, 1.0);
    let fine = constant_shift(5.0, 5.0);
    dir.write(
        "bbox.tif",
        &geotiff_file(
            TiffOptions::default().tiled(16, 16),
            &[
                horizontal_geotiff_image(parent_lattice(), &coarse),
                horizontal_geotiff_image(child_lattice(), &fine),
            ],
        ),
    );
    let ctx = dir.context();
    let set = HorizontalGridSet::open(&ctx, "bbox.tif").unwrap();

    assert_eq!(set.grids().len(), 1);
    let root = &set.grids()[0];
    assert_eq!(root.name(), "bbox.tif");
    assert_eq!(root.children()[0].name(), "bbox.tif#1");

    let summary = set.summary();
    assert_eq!(summary.grids.len(), 1);
    assert_eq!(summary.grids[0].children.len(), 1);
}

#[test]
fn test_geotiff_hierarchy_separates_types() {
    let dir = GridDir::new();
    dir.write(
        "mixed.tif",
        &geotiff_file(
            TiffOptions::default(),
            &[
                typed_image(
                    parent_lattice(),
                    "VERTICAL_OFFSET_GEOGRAPHIC_TO_VERTICAL",
                    "geoid_undulation",
                ),
                typed_image(
                    child_lattice(),
                    "ELLIPSOIDAL_HEIGHT_OFFSET",
                    "ellipsoidal_height_offset",
                ),
                typed_image(
                    child_lattice(),
                    "VERTICAL_OFFSET_GEOGRAPHIC_TO_VERTICAL",
                    "geoid_undulation",
                ),
            ],
        ),
    );
    let ctx = dir.context();
    let set = GenericGridSet::open(&ctx, "mixed.tif").unwrap();

    // The ellipsoidal grid lies inside the geoid grid but keeps its own tree
    assert_eq!(set.grids().len(), 2);
    assert_eq!(set.grids()[0].children().len(), 1);
    assert_eq!(set.grids()[0].children()[0].name(), "mixed.tif#2");
    assert!(set.grids()[1].children().is_empty());

    let inside = point(-79.6, 44.4);
    let grid = set
        .grid_at_type("ELLIPSOIDAL_HEIGHT_OFFSET", inside.lon, inside.lat)
        .unwrap();
    assert_eq!(grid.name(), "mixed.tif#1");
    let grid = set
        .grid_at_type("VERTICAL_OFFSET_GEOGRAPHIC_TO_VERTICAL", inside.lon, inside.lat)
        .unwrap();
    assert_eq!(grid.name(), "mixed.tif#2");
}
