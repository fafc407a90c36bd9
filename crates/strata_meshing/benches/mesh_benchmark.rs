//! # Meshing Benchmark
//!
//! TARGET: a terrain sub-chunk meshed and merged in well under a millisecond
//! on one core; the worker pool scales with cores.
//!
//! Run with: `cargo bench --package strata_meshing --bench mesh_benchmark`

// Benchmarks don't need docs
#![allow(missing_docs)]
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_core::{HostGpuContext, SubChunkId};
use strata_meshing::voxel::{BlockDef, BufferSink, VecSink};
use strata_meshing::{
    BlockCatalog, BlockRegistry, BlockState, HaloVolume, MemoryWorld, MeshingConfig, MeshingEngine, SubChunk,
    VoxelMesher, WorldProvider,
};

fn registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    for def in [
        BlockDef::solid(1, "stone", [1, 0]),
        BlockDef::solid(2, "dirt", [2, 0]),
    ] {
        registry.register(def).unwrap_or_else(|e| panic!("{e}"));
    }
    registry
}

fn terrain(seed: i32) -> SubChunk {
    let mut chunk = SubChunk::new();
    for z in 0..16 {
        for x in 0..16 {
            let height = 3 + ((x as i32 * 5 + z as i32 * 3 + seed) & 7) as usize;
            for y in 0..height {
                let id = if y + 1 == height { 2 } else { 1 };
                chunk.set_block(x, y, z, BlockState::new(id, 0));
            }
        }
    }
    chunk
}

/// Benchmark: one sub-chunk through the mesher, merged and unmerged.
fn bench_single_sub_chunk(c: &mut Criterion) {
    let registry = registry();
    let solid = HaloVolume::isolated(&SubChunk::filled(BlockState::new(1, 0)));
    let hills = HaloVolume::isolated(&terrain(0));

    let mut group = c.benchmark_group("mesh_sub_chunk");
    for merge in [false, true] {
        for (name, halo) in [("solid", &solid), ("terrain", &hills)] {
            let mut mesher = VoxelMesher::new(merge);
            let mut opaque = BufferSink::new();
            let mut alpha = VecSink::new();
            let label = format!("{name}/merge={merge}");
            group.bench_function(BenchmarkId::from_parameter(label), |b| {
                b.iter(|| {
                    opaque.reset();
                    alpha.clear();
                    black_box(mesher.mesh(halo, &registry, &mut opaque, &mut alpha))
                });
            });
        }
    }
    group.finish();
}

/// Benchmark: a 8x8 sub-chunk area through the engine with 0, 2 and 4 workers.
fn bench_engine_throughput(c: &mut Criterion) {
    let world = Arc::new(MemoryWorld::new());
    let ids: Vec<SubChunkId> = (0..64).map(|i| SubChunkId::new(i % 8, 0, i / 8)).collect();
    for id in &ids {
        world.insert(*id, terrain(id.x * 3 + id.z));
    }
    let catalog = Arc::new(registry());

    let mut group = c.benchmark_group("engine_throughput");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ids.len() as u64));

    for workers in [0, 2, 4] {
        let config = MeshingConfig {
            workers,
            staging_slots: 256,
            ..MeshingConfig::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(workers), &config, |b, config| {
            let mut engine = MeshingEngine::new(
                config.clone(),
                Arc::clone(&catalog) as Arc<dyn BlockCatalog>,
                Arc::clone(&world) as Arc<dyn WorldProvider>,
                HostGpuContext::new(),
            )
            .unwrap_or_else(|e| panic!("{e}"));

            b.iter(|| {
                engine.submit(ids.iter().copied()).unwrap_or_else(|e| panic!("{e}"));
                let mut done = 0;
                while done < ids.len() {
                    done += engine.poll_completed().unwrap_or_else(|e| panic!("{e}")).len();
                    if done < ids.len() {
                        std::thread::sleep(Duration::from_micros(50));
                    }
                }
                black_box(engine.stats())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_sub_chunk, bench_engine_throughput);
criterion_main!(benches);
