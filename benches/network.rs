//! Criterion benchmarks for network generation and the update cycle.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use neuroweave::prelude::*;

fn make_config(inputs: usize, shells: usize, seed: u64) -> NetworkConfig {
    let mut cfg = NetworkConfig::default().with_seed(seed);
    cfg.sites[0].inputs = inputs;
    cfg.sites[0].outputs = inputs / 2;
    cfg.sites[0].shells = shells;
    cfg
}

/// Procedural generation, dominated by the neighbor scan.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for shells in [5, 10, 20].iter() {
        let cfg = make_config(24, *shells, 42);
        group.bench_with_input(BenchmarkId::new("shells", shells), &cfg, |b, cfg| {
            b.iter(|| black_box(build_network(cfg).connections().len()));
        });
    }

    group.bench_function("twin_sites", |b| {
        let cfg = NetworkConfig::twin_sites().with_seed(42);
        b.iter(|| black_box(build_network(&cfg).connections().len()));
    });

    group.finish();
}

/// One buffer+commit tick with varying network sizes.
fn bench_tick_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_size");

    for shells in [5, 10, 20].iter() {
        let mut network = build_network(&make_config(24, *shells, 42));
        network.set_execution_tier(ExecutionTier::Scalar);
        network.randomize_sensors();
        group.throughput(Throughput::Elements(network.connections().len() as u64));

        group.bench_function(BenchmarkId::new("scalar", shells), |b| {
            b.iter(|| {
                network.randomize_random_sensor();
                network.tick(1.0 / 60.0);
                black_box(network.cycles())
            });
        });
    }

    group.finish();
}

/// Tick comparing execution tiers at a fixed size.
fn bench_tick_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_tier");
    let cfg = make_config(48, 20, 42);

    for (name, tier) in [
        ("scalar", ExecutionTier::Scalar),
        // Falls back to scalar if the `parallel` feature is not enabled.
        ("parallel", ExecutionTier::Parallel),
    ] {
        let mut network = build_network(&cfg);
        network.set_execution_tier(tier);
        network.randomize_sensors();
        group.throughput(Throughput::Elements(network.connections().len() as u64));

        group.bench_function(name, |b| {
            b.iter(|| {
                network.tick(1.0 / 60.0);
                black_box(network.cycles())
            });
        });
    }

    group.finish();
}

fn bench_image(c: &mut Criterion) {
    let mut network = build_network(&make_config(24, 10, 42));
    network.run_cycles(10);
    let bytes = match network.save_image_bytes() {
        Ok(b) => b,
        Err(e) => panic!("save failed: {e}"),
    };

    let mut group = c.benchmark_group("image");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("save", |b| {
        b.iter(|| black_box(network.save_image_bytes().map(|v| v.len()).unwrap_or(0)));
    });
    group.bench_function("load", |b| {
        b.iter(|| black_box(Network::load_image_bytes(&bytes).map(|n| n.cycles()).unwrap_or(0)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_tick_sizes,
    bench_tick_tiers,
    bench_image
);
criterion_main!(benches);
