// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Benchmarks for manifest group demotion and delete resolution.
//!
//! Run with: `cargo bench --bench demotion_scaling -p iceberg-mdv`

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use iceberg_mdv::DeleteMetadataConfig;
use iceberg_mdv::placement::plan_group;
use iceberg_mdv::resolution::{DeleteResolver, ResolutionBudget, resolve};
use iceberg_mdv::spec::{DataFile, DeleteMarker, MarkerStats};

const GROUP_SIZES: [usize; 4] = [1_000, 5_000, 10_000, 50_000];
const MARKER_BYTES: i64 = 100 * 1024;

/// Markers of varying size and density, all in the middle band.
fn group_stats(n: usize) -> Vec<MarkerStats> {
    (0..n)
        .map(|i| {
            let size = MARKER_BYTES + ((i * 7919) % 4096) as i64;
            let cardinality = 20_000 + ((i * 104_729) % 60_000) as u64;
            MarkerStats::new(size, cardinality, 100_000)
        })
        .collect()
}

/// Cap that keeps roughly 70% of the payload inline.
fn group_config(n: usize) -> DeleteMetadataConfig {
    DeleteMetadataConfig::builder()
        .group_inline_cap_bytes((n as u64 * MARKER_BYTES as u64) * 7 / 10)
        .build()
        .unwrap()
}

fn bench_demotion(c: &mut Criterion) {
    let mut group = c.benchmark_group("demotion_scaling");

    for n in GROUP_SIZES {
        let stats = group_stats(n);
        let config = group_config(n);

        let planned = plan_group(&stats, &config).unwrap();
        let bound = (n as f64 * (n as f64).log2()).ceil() as u64;
        println!(
            "n={n} demoted={} pushes={} pops={} n_log_n={bound}",
            planned.demotion().demoted,
            planned.demotion().heap_pushes,
            planned.demotion().heap_pops,
        );

        group.bench_with_input(BenchmarkId::from_parameter(n), &stats, |b, stats| {
            b.iter(|| black_box(plan_group(stats, &config).unwrap()))
        });
    }

    group.finish();
}

fn markers(rows: u64, count: u64) -> Vec<Arc<DeleteMarker>> {
    (0..count)
        .map(|m| {
            Arc::new(DeleteMarker::from_vector(
                "bench-file",
                m as i64,
                rows,
                (m..rows).step_by(count as usize * 3).collect(),
            ))
        })
        .collect()
}

fn bench_resolution(c: &mut Criterion) {
    let rows = 1_000_000;
    let markers = markers(rows, 4);
    let stable = DataFile::new("bench-file", rows);
    let unstable = DataFile::new("bench-file", rows).with_unstable_ordinals();
    let budget = ResolutionBudget::unlimited();

    let mut group = c.benchmark_group("resolution");
    group.bench_function("folded_positional", |b| {
        b.iter(|| black_box(resolve(&stable, &markers, &budget).unwrap()))
    });
    group.bench_function("folded_hash_keyed", |b| {
        b.iter(|| black_box(resolve(&unstable, &markers, &budget).unwrap()))
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let resolver = DeleteResolver::default();
    group.bench_function("memoized", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(resolver.resolve(1, &stable, &markers, &budget).await.unwrap())
        })
    });
    group.finish();

    let positional = resolve(&stable, &markers, &budget).unwrap();
    let keyed = resolve(&unstable, &markers, &budget).unwrap();
    println!(
        "deleted={} positional_bytes={} hash_keyed_bytes={}",
        positional.deleted_count(),
        positional.memory_bytes(),
        keyed.memory_bytes(),
    );
}

criterion_group!(benches, bench_demotion, bench_resolution);
criterion_main!(benches);
