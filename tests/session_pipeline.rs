// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Config file to synapse lists through a build session.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use synforge::config::load_config;
use synforge::prelude::*;
use tempfile::tempdir;

fn write_config(dir: &Path, dump_dir: &Path) -> std::path::PathBuf {
    let path = dir.join("synforge.toml");
    fs::write(
        &path,
        format!(
            r#"
[timing]
time_step_ms = 0.5

[build]
seed = 7

[diagnostics]
enabled = true
output_dir = "{}"
"#,
            dump_dir.display()
        ),
    )
    .unwrap();
    path
}

fn population(id: u32, label: &str, shape: Vec<u32>) -> Arc<Population> {
    Arc::new(Population::new(id, label, shape, &["excitatory", "inhibitory"]).unwrap())
}

fn fixed_number_projection(session: &BuildSession) -> Projection {
    let pre = population(0, "lgn", vec![40]);
    let post = population(1, "cortex", vec![60]);
    let request = session
        .request(3, pre, post)
        .receptor("inhibitory")
        .delays(ParameterDescriptor::Fixed(2.0))
        .build()
        .unwrap();
    Projection::new(request, FixedNumberConnector::post(5).with_verbose(true)).unwrap()
}

// ============================================================================
// Session from a config file
// ============================================================================

#[test]
fn test_session_builds_reproducible_blocks() {
    let dir = tempdir().unwrap();
    let dumps = dir.path().join("dumps");
    let config = load_config(Some(&write_config(dir.path(), &dumps)), None).unwrap();
    assert_eq!(config.build.seed, 7);

    let slice = VertexSlice::linear(0, 59).unwrap();
    let mut first = BuildSession::from_config(&config).unwrap();
    let mut second = BuildSession::from_config(&config).unwrap();
    let mut projection_a = fixed_number_projection(&first);
    let mut projection_b = fixed_number_projection(&second);
    let block_a = first.build_block(&mut projection_a, &slice).unwrap();
    let block_b = second.build_block(&mut projection_b, &slice).unwrap();

    assert_eq!(block_a, block_b);
    assert_eq!(block_a.len(), 40 * 5);
    assert!(block_a.iter().all(|record| record.delay == 4));
}

#[test]
fn test_session_writes_selection_dump() {
    let dir = tempdir().unwrap();
    let dumps = dir.path().join("dumps");
    let config = load_config(Some(&write_config(dir.path(), &dumps)), None).unwrap();
    let mut session = BuildSession::from_config(&config).unwrap();

    let mut projection = fixed_number_projection(&session);
    session
        .build_block(&mut projection, &VertexSlice::linear(0, 29).unwrap())
        .unwrap();

    let csv = fs::read_to_string(dumps.join("lgn_to_cortex_fixednumberpost-conn.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("40,60,5"));
    assert_eq!(lines.count(), 40);
}

#[test]
fn test_session_convolution_honours_filter_setting() {
    let mut config = SynforgeConfig::default();
    config.build.seed = 1;
    config.build.filter_edges = false;
    let mut session = BuildSession::from_config(&config).unwrap();

    let kernel =
        KernelSpec::uniform(1.0, Extent2::new(3, 3), Extent2::new(1, 1), Extent2::new(1, 1))
            .unwrap();
    let pre_shape = Extent2::new(6, 6);
    let post_shape = kernel.post_shape(pre_shape);
    let pre = population(0, "retina", pre_shape.to_population_shape());
    let post = population(1, "v1", post_shape.to_population_shape());
    let request = session.request(0, pre, post).receptor("excitatory").build().unwrap();

    let connector = session.convolution(kernel);
    assert!(!connector.filter_edges());
    let mut projection = Projection::new(request, connector).unwrap();
    let block = session
        .build_block(&mut projection, &VertexSlice::linear(0, 35).unwrap())
        .unwrap();
    // 6x6 with padding 1: corners see 4 inputs, edges 6, interior 9
    assert_eq!(block.len(), 4 * 4 + 16 * 6 + 16 * 9);
}

#[test]
fn test_session_routing_uses_device_limits() {
    let mut config = SynforgeConfig::default();
    config.build.seed = 1;
    config.device.max_atoms_per_core = 256;
    config.device.n_colour_bits = 2;
    let session = BuildSession::from_config(&config).unwrap();

    let routing = session.source_routing(0x3, 4).unwrap();
    assert_eq!(routing.mask_shift, 8 + 2);
    assert_eq!(routing.core_mask, 0b11);
    assert!(session.source_routing(u32::MAX, 4).is_err());
}
