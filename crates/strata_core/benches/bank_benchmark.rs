//! # Bank Allocator Benchmark
//!
//! Simulates a player walking: meshes are rebuilt, grown and unloaded while
//! the allocator keeps its free lists coalesced.
//!
//! Run with: `cargo bench --package strata_core`

// Benchmarks don't need docs
#![allow(missing_docs)]
#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::{BankAllocator, CancelToken, HostGpuContext, StagingArena, SubChunkId};

/// Size of one packed quad.
const QUAD_BYTES: u32 = 28;

fn next(seed: &mut u32) -> u32 {
    *seed ^= *seed << 13;
    *seed ^= *seed >> 17;
    *seed ^= *seed << 5;
    *seed
}

/// Benchmark: alloc/replace/free churn over a fixed population of sub-chunks.
fn bench_bank_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("bank_churn");

    for population in [256, 2048] {
        group.bench_with_input(
            BenchmarkId::from_parameter(population),
            &population,
            |b, &population| {
                let mut ctx = HostGpuContext::new();
                let mut banks = BankAllocator::new(4 << 20, QUAD_BYTES);
                let mut seed = 0x9e37_79b9_u32;

                b.iter(|| {
                    for _ in 0..1000 {
                        let roll = next(&mut seed);
                        let owner = SubChunkId::new((roll % population) as i32, 0, 0);
                        if roll & 0x300 == 0 {
                            banks.free(owner);
                        } else {
                            let quads = 1 + (roll >> 16) % 2000;
                            black_box(banks.alloc(&mut ctx, owner, quads * QUAD_BYTES).ok());
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark: uncontended acquire/release of staging slots.
fn bench_staging_cycle(c: &mut Criterion) {
    let arena: StagingArena<()> = StagingArena::new(256).unwrap_or_else(|e| panic!("{e}"));
    let cancel = CancelToken::new();
    let owner = SubChunkId::new(0, 0, 0);

    c.bench_function("staging_acquire_release", |b| {
        b.iter(|| {
            if let Ok(slot) = arena.acquire(owner, &cancel) {
                arena.release(black_box(slot));
            }
        });
    });
}

criterion_group!(benches, bench_bank_churn, bench_staging_cycle);
criterion_main!(benches);
