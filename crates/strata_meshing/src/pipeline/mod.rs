//! Meshing jobs from submission to GPU upload.
//!
//! ## Threads
//!
//! ```text
//! main thread                         worker threads (N)
//! ───────────                         ──────────────────
//! submit_chunk_job ──> job queue ──>  load neighbors
//!                                     gather halo, mesh into staging slots
//! poll_completed  <── ready queue <── mark_ready
//!   alloc bank range, copy, release slots
//! ```
//!
//! With zero workers the main thread meshes inside `submit_chunk_job` into
//! reusable 64 KiB buffers and uploads right away.

mod config;
mod engine;
mod loader;
mod staging_sink;
mod stats;
mod worker;

pub use config::MeshingConfig;
pub use engine::{DrawCommand, MeshRecord, MeshingEngine, StopMode};
pub use loader::{LoadOutcome, NeighborLoader};
pub use staging_sink::{JobSlots, StagedChain, StagedMesh, StagingSink};
pub use stats::EngineStats;
pub use worker::{WorkerState, WorkerStatus};
