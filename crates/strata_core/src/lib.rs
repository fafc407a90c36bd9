//! # STRATA Core
//!
//! Bounded memory and synchronization for the sub-chunk meshing pipeline:
//! - A fixed-slot staging arena that meshing workers fill concurrently
//! - A coalescing allocator that places finished meshes into GPU banks
//! - Counting semaphore and cancellation token used at every suspension point
//!
//! ## Ownership Rules
//!
//! 1. **A staging slot has exactly one owner** - free, a worker, or a ready mesh
//! 2. **Banks belong to the main thread** - the allocator is never shared
//! 3. **Cancellation is cooperative** - checked when a worker would block
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_core::{CancelToken, StagingArena, SubChunkId};
//!
//! let arena: StagingArena<()> = StagingArena::new(256)?;
//! let cancel = CancelToken::new();
//! let slot = arena.acquire(SubChunkId::new(0, 4, 0), &cancel)?;
//! arena.release(slot);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;
pub mod sync;

mod id;

pub use error::{StrataError, StrataResult};
pub use id::SubChunkId;
pub use memory::{
    BankAllocator, BankRange, BankStats, GpuContext, HostGpuContext, ReadyMesh, SlotHeader,
    SlotState, StagingArena, StagingSlot,
};
pub use sync::{CancelToken, Semaphore};
