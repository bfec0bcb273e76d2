// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Capacity bounds checked against seeded random draws.
//!
//! A bound that undercounts truncates rows on the device, so each test draws
//! many seeded selections and verifies observed counts stay within the bound
//! at the configured failure rate.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use synforge_connectivity::bounds::DEFAULT_EXACT_TRIAL_LIMIT;
use synforge_connectivity::prelude::*;

fn population(id: u32, label: &str, n: u32) -> Arc<Population> {
    Arc::new(Population::new(id, label, vec![n], &["excitatory"]).unwrap())
}

fn request(pre: Arc<Population>, post: Arc<Population>) -> ConnectionRequest {
    ConnectionRequest::builder(0, pre, post)
        .receptor("excitatory")
        .build()
        .unwrap()
}

// ============================================================================
// Binomial quantile
// ============================================================================

#[test]
fn test_binomial_bound_holds_over_100k_trials() {
    let failure_chance = 1e-3;
    let estimator = BoundEstimator::new(failure_chance, DEFAULT_EXACT_TRIAL_LIMIT).unwrap();
    let (n, p) = (100u64, 0.1);
    let bound = estimator.max_connections(n, p);

    let mut rng = StdRng::seed_from_u64(0x5EED);
    let mut above_bound = 0u32;
    let mut at_or_above_bound = 0u32;
    for _ in 0..100_000 {
        let selected = (0..n).filter(|_| rng.gen::<f64>() < p).count() as u64;
        if selected > bound {
            above_bound += 1;
        }
        if selected >= bound {
            at_or_above_bound += 1;
        }
    }

    // Expected at most 100 exceedances; the exact quantile is also tight,
    // so one less than the bound is exceeded noticeably more often
    assert!(above_bound <= 150, "{} draws exceeded bound {}", above_bound, bound);
    assert!(at_or_above_bound >= 50, "bound {} is loose", bound);
}

#[test]
fn test_bound_is_monotonic_across_exact_limit() {
    let estimator = BoundEstimator::new(1e-5, 1_000).unwrap();
    let mut previous = 0;
    for n in (800..=1_200).step_by(10) {
        let bound = estimator.max_connections(n, 0.05);
        assert!(bound >= previous, "bound fell from {} to {} at n = {}", previous, bound, n);
        previous = bound;
    }

    let mut previous = 0;
    for step in 1..=50 {
        let bound = estimator.max_connections(2_000, f64::from(step) / 100.0);
        assert!(bound >= previous);
        previous = bound;
    }
}

// ============================================================================
// Connector bounds against enumerated blocks
// ============================================================================

#[test]
fn test_fixed_probability_fan_out_and_fan_in_within_bounds() {
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 400);
    let post = population(1, "post", 120);
    let req = request(pre, post.clone());
    let slice = VertexSlice::whole(&post);

    for seed in 0..100 {
        let mut connector = FixedProbabilityConnector::new(0.1, true).unwrap();
        let fan_out_bound =
            connector.max_connections_from_one_source(slice.n_atoms(), &req, &bounds, None);
        let fan_in_bound = connector.max_connections_to_one_target(&req, &bounds);

        let mut ctx = BuildContext::new(seed);
        let block = connector.enumerate(&slice, &req, &mut ctx).unwrap();
        assert!(block.max_fan_out() <= fan_out_bound, "seed {}", seed);
        assert!(block.max_fan_in() <= fan_in_bound, "seed {}", seed);
    }
}

#[test]
fn test_fixed_number_post_fan_in_within_bound() {
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 200);
    let post = population(1, "post", 100);
    let req = request(pre, post.clone());
    let slice = VertexSlice::whole(&post);

    for seed in 0..50 {
        let mut connector = FixedNumberConnector::post(10);
        connector.validate(&req).unwrap();
        let fan_in_bound = connector.max_connections_to_one_target(&req, &bounds);

        let mut ctx = BuildContext::new(seed);
        let block = connector.enumerate(&slice, &req, &mut ctx).unwrap();
        assert_eq!(block.max_fan_out(), 10);
        assert!(block.max_fan_in() <= fan_in_bound, "seed {}", seed);
    }
}

#[test]
fn test_fixed_number_post_split_slices_within_fan_out_bound() {
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 64);
    let post = population(1, "post", 256);
    let req = request(pre, post);
    let slices: Vec<VertexSlice> = (0..4)
        .map(|i| VertexSlice::linear(i * 64, i * 64 + 63).unwrap())
        .collect();

    for seed in 0..20 {
        let mut connector = FixedNumberConnector::post(32);
        let mut ctx = BuildContext::new(seed);
        for slice in &slices {
            let bound =
                connector.max_connections_from_one_source(slice.n_atoms(), &req, &bounds, None);
            let block = connector.enumerate(slice, &req, &mut ctx).unwrap();
            assert!(block.max_fan_out() <= bound, "seed {} slice {:?}", seed, slice);
        }
    }
}

#[test]
fn test_fixed_number_post_with_replacement_fan_out_within_bound() {
    // Fifty draws over ten targets land on a single target several times
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 1);
    let post = population(1, "post", 10);
    let req = request(pre, post);
    let slice = VertexSlice::linear(0, 0).unwrap();

    for seed in 0..20 {
        let mut connector = FixedNumberConnector::post(50).with_replacement(true);
        connector.validate(&req).unwrap();
        let bound = connector.max_connections_from_one_source(1, &req, &bounds, None);

        let mut ctx = BuildContext::new(seed);
        let block = connector.enumerate(&slice, &req, &mut ctx).unwrap();
        assert!(
            block.max_fan_out() <= bound,
            "seed {}: bound {} below observed {}",
            seed,
            bound,
            block.max_fan_out()
        );
    }
}

#[test]
fn test_fixed_number_post_single_atom_slices_within_bounds() {
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 30);
    let post = population(1, "post", 12);
    let req = request(pre, post);

    for with_replacement in [false, true] {
        for seed in 0..10 {
            let mut connector = FixedNumberConnector::post(8).with_replacement(with_replacement);
            connector.validate(&req).unwrap();
            let fan_in_bound = connector.max_connections_to_one_target(&req, &bounds);
            let mut ctx = BuildContext::new(seed);
            for atom in 0..12 {
                let slice = VertexSlice::linear(atom, atom).unwrap();
                let bound = connector.max_connections_from_one_source(1, &req, &bounds, None);
                let block = connector.enumerate(&slice, &req, &mut ctx).unwrap();
                assert!(
                    block.max_fan_out() <= bound,
                    "replacement {} seed {} atom {}",
                    with_replacement,
                    seed,
                    atom
                );
                assert!(block.max_fan_in() <= fan_in_bound);
            }
        }
    }
}

#[test]
fn test_fixed_number_pre_fan_out_and_fan_in_within_bounds() {
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 40);
    let post = population(1, "post", 150);
    let req = request(pre, post);
    let slices: Vec<VertexSlice> = (0..3)
        .map(|i| VertexSlice::linear(i * 50, i * 50 + 49).unwrap())
        .collect();

    for with_replacement in [false, true] {
        for seed in 0..20 {
            let mut connector = FixedNumberConnector::pre(12).with_replacement(with_replacement);
            connector.validate(&req).unwrap();
            let fan_in_bound = connector.max_connections_to_one_target(&req, &bounds);
            let mut ctx = BuildContext::new(seed);
            for slice in &slices {
                let bound =
                    connector.max_connections_from_one_source(slice.n_atoms(), &req, &bounds, None);
                let block = connector.enumerate(slice, &req, &mut ctx).unwrap();
                assert!(
                    block.max_fan_out() <= bound,
                    "replacement {} seed {} slice {:?}",
                    with_replacement,
                    seed,
                    slice
                );
                assert!(block.max_fan_in() <= fan_in_bound);
                assert_eq!(block.len(), 50 * 12);
            }
        }
    }
}

#[test]
fn test_fixed_number_pre_single_atom_slices_within_bounds() {
    let bounds = BoundEstimator::default();
    let pre = population(0, "pre", 6);
    let post = population(1, "post", 20);
    let req = request(pre, post);

    for with_replacement in [false, true] {
        let mut connector = FixedNumberConnector::pre(5).with_replacement(with_replacement);
        let bound = connector.max_connections_from_one_source(1, &req, &bounds, None);
        for seed in 0..10 {
            let mut ctx = BuildContext::new(seed);
            for atom in 0..20 {
                let slice = VertexSlice::linear(atom, atom).unwrap();
                let block = connector.enumerate(&slice, &req, &mut ctx).unwrap();
                assert!(block.max_fan_out() <= bound);
                assert_eq!(block.max_fan_in(), 5);
            }
        }
    }
}
