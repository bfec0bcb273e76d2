// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Convolution output shapes and tile edge filtering.

use std::sync::Arc;

use ndarray::Array2;
use synforge_connectivity::connected_pre_tiles;
use synforge_connectivity::prelude::*;

fn grid(id: u32, label: &str, extent: Extent2) -> Arc<Population> {
    Arc::new(
        Population::new(
            id,
            label,
            extent.to_population_shape(),
            &["excitatory", "inhibitory"],
        )
        .unwrap(),
    )
}

fn request(pre: Arc<Population>, post: Arc<Population>) -> ConnectionRequest {
    ConnectionRequest::builder(0, pre, post)
        .receptor("excitatory")
        .build()
        .unwrap()
}

/// Tiles of at most `tile` covering a `width` x `height` grid, with running atom offsets
fn tiles(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Vec<VertexSlice> {
    let mut slices = Vec::new();
    let mut lo_atom = 0;
    for y in (0..height).step_by(tile_height as usize) {
        for x in (0..width).step_by(tile_width as usize) {
            let shape = vec![tile_width.min(width - x), tile_height.min(height - y)];
            let slice = VertexSlice::with_shape(lo_atom, shape, vec![x, y]).unwrap();
            lo_atom = slice.hi_atom + 1;
            slices.push(slice);
        }
    }
    slices
}

// ============================================================================
// Output shape
// ============================================================================

#[test]
fn test_post_shape_table() {
    let cases = [
        // (pre, kernel, stride, padding, expected)
        ((10, 10), (5, 5), (1, 1), (2, 2), (10, 10)),
        ((8, 8), (3, 3), (2, 2), (0, 0), (3, 3)),
        ((32, 32), (3, 3), (1, 1), (0, 0), (30, 30)),
        ((32, 32), (3, 3), (1, 1), (1, 1), (32, 32)),
        ((32, 32), (5, 5), (2, 2), (2, 2), (16, 16)),
        ((28, 20), (5, 3), (1, 2), (0, 1), (24, 10)),
        ((4, 4), (7, 7), (1, 1), (0, 0), (1, 1)),
    ];
    for (pre, kernel, stride, padding, expected) in cases {
        let spec = KernelSpec::uniform(
            1.0,
            Extent2::new(kernel.0, kernel.1),
            Extent2::new(stride.0, stride.1),
            Extent2::new(padding.0, padding.1),
        )
        .unwrap();
        assert_eq!(
            spec.post_shape(Extent2::new(pre.0, pre.1)),
            Extent2::new(expected.0, expected.1),
            "pre {:?} kernel {:?} stride {:?} padding {:?}",
            pre,
            kernel,
            stride,
            padding
        );
    }
}

#[test]
fn test_pooling_shrinks_input_before_kernel() {
    let spec = KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(1, 1), Extent2::new(0, 0))
        .unwrap()
        .with_pooling(Extent2::new(2, 2), None)
        .unwrap();
    assert_eq!(spec.pooled_shape(Extent2::new(16, 12)), Extent2::new(8, 6));
    assert_eq!(spec.post_shape(Extent2::new(16, 12)), Extent2::new(6, 4));
}

// ============================================================================
// Edge filtering against brute-force enumeration
// ============================================================================

/// Checks every (pre tile, post tile) pair: a pair with any enumerated
/// connection must never be filtered out
fn assert_filter_sound(kernel: KernelSpec, pre: Extent2, exact: bool) {
    let post = kernel.post_shape(pre);
    let pre_pop = grid(0, "pre", pre);
    let post_pop = grid(1, "post", post);
    let req = request(pre_pop, post_pop);
    let mut connector = ConvolutionConnector::new(kernel);
    connector.validate(&req).unwrap();

    let pre_tiles = tiles(pre.width, pre.height, 4, 5);
    let post_tiles = tiles(post.width, post.height, 3, 3);
    let mut ctx = BuildContext::new(1);

    for post_tile in &post_tiles {
        let block = connector.enumerate(post_tile, &req, &mut ctx).unwrap();
        let kept = connected_pre_tiles(&connector, &req, &pre_tiles, post_tile);
        for (index, pre_tile) in pre_tiles.iter().enumerate() {
            let reached = block
                .iter()
                .any(|record| pre_tile.contains_raster(record.source, &req.pre().shape));
            let passes = kept.contains(&index);
            if reached {
                assert!(passes, "pre tile {:?} wrongly filtered for {:?}", pre_tile, post_tile);
            }
            if exact {
                assert_eq!(passes, reached, "pre tile {:?} post tile {:?}", pre_tile, post_tile);
            }
        }
    }
}

#[test]
fn test_edge_filter_exact_for_odd_kernel_unit_stride() {
    let kernel =
        KernelSpec::uniform(0.5, Extent2::new(3, 3), Extent2::new(1, 1), Extent2::new(1, 1))
            .unwrap();
    assert_filter_sound(kernel, Extent2::new(10, 12), true);
}

#[test]
fn test_edge_filter_sound_with_stride_and_pooling() {
    let kernel =
        KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(2, 2), Extent2::new(1, 1))
            .unwrap()
            .with_pooling(Extent2::new(2, 2), None)
            .unwrap();
    assert_filter_sound(kernel, Extent2::new(20, 24), false);
}

#[test]
fn test_edge_filter_sound_for_even_kernel() {
    let weights = Array2::from_shape_fn((2, 4), |(r, c)| if (r + c) % 2 == 0 { 1.0 } else { -1.0 });
    let kernel = KernelSpec::new(weights, Extent2::new(1, 2), Extent2::new(1, 0)).unwrap();
    assert_filter_sound(kernel, Extent2::new(11, 14), false);
}

#[test]
fn test_filter_disabled_keeps_every_tile() {
    let kernel =
        KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(1, 1), Extent2::new(0, 0))
            .unwrap();
    let pre = Extent2::new(16, 16);
    let post = kernel.post_shape(pre);
    let req = request(grid(0, "pre", pre), grid(1, "post", post));
    let connector = ConvolutionConnector::new(kernel).with_filter_edges(false);

    let pre_tiles = tiles(16, 16, 4, 4);
    let post_tile = &tiles(post.width, post.height, 2, 2)[0];
    assert_eq!(
        connected_pre_tiles(&connector, &req, &pre_tiles, post_tile).len(),
        pre_tiles.len()
    );
}
