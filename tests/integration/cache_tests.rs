//! Block cache effectiveness integration tests.
//!
//! Tests verify:
//! - Decoded GeoTIFF blocks are served from the cache on repeated access
//! - Nodes of one tile share a single read
//! - A tiny cache changes read counts but never values
//! - Images of one file share the cache without mixing blocks

use gridshift::format::geotiff;
use gridshift::Context;

use super::test_utils::{
    counting_resource, geotiff_file, horizontal_geotiff_image, memory_resource, smooth_shift,
    Lattice, TiffImageSpec, TiffOptions,
};

fn lattice() -> Lattice {
    Lattice::new(-80.0, 44.0, 0.25, 8, 8)
}

fn tiled_grid(options: TiffOptions) -> Vec<u8> {
    geotiff_file(options, &[horizontal_geotiff_image(lattice(), &smooth_shift)])
}

// =============================================================================
// Cache Hits
// =============================================================================

#[test]
fn test_repeated_node_served_from_cache() {
    let ctx = Context::new();
    let (resource, reader) = counting_resource("tiles.tif", tiled_grid(TiffOptions::default().tiled(4, 4)));
    let grids = geotiff::open_horizontal(&ctx, &resource).unwrap();
    let grid = &grids[0];

    reader.reset();
    let first = grid.value_at(1, 1).unwrap();
    let after_first = reader.read_count();
    assert!(after_first > 0, "first access must read the block");

    let second = grid.value_at(1, 1).unwrap();
    assert_eq!(first, second);
    assert_eq!(reader.read_count(), after_first, "second access must be a cache hit");
}

#[test]
fn test_nodes_of_one_tile_share_a_read() {
    let ctx = Context::new();
    let (resource, reader) = counting_resource("tiles.tif", tiled_grid(TiffOptions::default().tiled(4, 4)));
    let grids = geotiff::open_horizontal(&ctx, &resource).unwrap();
    let grid = &grids[0];

    reader.reset();
    // The south-west 4x4 nodes are the bottom-left tile
    grid.value_at(0, 0).unwrap();
    let one_tile = reader.read_count();
    for y in 0..4 {
        for x in 0..4 {
            grid.value_at(x, y).unwrap();
        }
    }
    assert_eq!(reader.read_count(), one_tile);

    // A node of another tile costs a new read
    grid.value_at(7, 7).unwrap();
    assert!(reader.read_count() > one_tile);
}

#[test]
fn test_compressed_blocks_decoded_once() {
    let ctx = Context::new();
    let data = tiled_grid(TiffOptions::default().deflate().rows_per_strip(2));
    let (resource, reader) = counting_resource("strips.tif", data);
    let grids = geotiff::open_horizontal(&ctx, &resource).unwrap();
    let grid = &grids[0];

    reader.reset();
    grid.value_at(3, 0).unwrap();
    let one_strip = reader.read_count();
    for x in 0..8 {
        grid.value_at(x, 0).unwrap();
        grid.value_at(x, 1).unwrap();
    }
    assert_eq!(reader.read_count(), one_strip);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_tiny_cache_keeps_values_identical() {
    let data = tiled_grid(TiffOptions::default().tiled(2, 2));
    let roomy = Context::new();
    let tiny = Context::new().with_block_cache_capacity(1);

    let reference = geotiff::open_horizontal(&roomy, &memory_resource("a.tif", data.clone())).unwrap();
    let (resource, reader) = counting_resource("b.tif", data);
    let evicting = geotiff::open_horizontal(&tiny, &resource).unwrap();

    reader.reset();
    for _ in 0..2 {
        for y in 0..8 {
            for x in 0..8 {
                let expected = reference[0].value_at(x, y).unwrap();
                let actual = evicting[0].value_at(x, y).unwrap();
                assert_eq!(expected.lon.to_bits(), actual.lon.to_bits());
                assert_eq!(expected.lat.to_bits(), actual.lat.to_bits());
            }
        }
    }
    // Every revisit of the 16 tiles had to read again
    assert!(reader.read_count() >= 2 * 16);
}

#[test]
fn test_planar_channels_alternate_with_tiny_cache() {
    let data = tiled_grid(TiffOptions::default().planar().tiled(4, 4));
    let ctx = Context::new().with_block_cache_capacity(1);
    let grids = geotiff::open_horizontal(&ctx, &memory_resource("planar.tif", data.clone())).unwrap();
    let reference = geotiff::open_horizontal(&Context::new(), &memory_resource("ref.tif", data)).unwrap();

    for (x, y) in [(0, 0), (5, 2), (0, 0), (7, 7)] {
        assert_eq!(grids[0].value_at(x, y).unwrap(), reference[0].value_at(x, y).unwrap());
    }
}

#[test]
fn test_images_share_cache_without_mixing() {
    let l = lattice();
    let first = TiffImageSpec::from_fn(l, 2, &|s, _, _| if s == 0 { 1.0 } else { 2.0 });
    let second = TiffImageSpec::from_fn(Lattice::new(10.0, 10.0, 0.25, 8, 8), 2, &|s, _, _| {
        if s == 0 {
            3.0
        } else {
            4.0
        }
    });
    let data = geotiff_file(TiffOptions::default().tiled(8, 8), &[first, second]);
    let ctx = Context::new();
    let grids = geotiff::open_horizontal(&ctx, &memory_resource("two.tif", data)).unwrap();

    assert_eq!(grids.len(), 2);
    let a = grids[0].value_at(0, 0).unwrap();
    let b = grids[1].value_at(0, 0).unwrap();
    assert_ne!(a, b);
    assert_eq!(grids[0].value_at(0, 0).unwrap(), a);
}
