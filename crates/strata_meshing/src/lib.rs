//! # STRATA Meshing
//!
//! Turns 16x16x16 sub-chunks of block ids into packed quad streams and
//! streams them into GPU banks without stalling the frame.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        MESHING PIPELINE                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  submit ──> job queue ──> worker: load neighbors, gather halo    │
//! │                                 │                                │
//! │                                 ▼                                │
//! │              cube/shape/cross/model faces ──> merge table        │
//! │                                 │            greedy merge        │
//! │                                 ▼                                │
//! │                     staging slots (opaque, alpha chains)         │
//! │                                 │ mark_ready                     │
//! │                                 ▼                                │
//! │  poll_completed ──> bank allocator ──> map, copy, unmap          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - A sub-chunk is never queued twice; resubmits while in flight requeue once
//! - A quad is never split across two staging slots
//! - Meshing is deterministic: the same halo yields the same bytes
//! - Stopping the pool returns every staging slot
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_core::{HostGpuContext, SubChunkId};
//! use strata_meshing::{BlockRegistry, MemoryWorld, MeshingConfig, MeshingEngine};
//!
//! let catalog = Arc::new(BlockRegistry::from_toml_str(BLOCKS)?);
//! let world = Arc::new(MemoryWorld::new());
//! let mut engine = MeshingEngine::new(
//!     MeshingConfig::default(),
//!     catalog,
//!     world,
//!     HostGpuContext::new(),
//! )?;
//! engine.submit_chunk_job(SubChunkId::new(0, 4, 0))?;
//! for id in engine.poll_completed()? {
//!     println!("{id} ready");
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod pipeline;
pub mod voxel;

pub use pipeline::{
    DrawCommand, EngineStats, MeshRecord, MeshingConfig, MeshingEngine, NeighborLoader,
    StopMode, WorkerState,
};
pub use voxel::{
    BlockCatalog, BlockRegistry, BlockState, CaveGraph, CustomModel, Face, FaceSet, HaloVolume,
    Light, MemoryWorld, MeshOutcome, MeshSink, PackedQuad, QuadMergeTable, RenderKind, Shape,
    SubChunk, VoxelMesher, WorldProvider,
};
