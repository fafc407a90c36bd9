//! Meshing worker threads.
//!
//! ## Job Lifecycle
//!
//! ```text
//! submit ──> Queued ──worker picks──> Running ──mark_ready──> (removed)
//!              ▲                         │ resubmit
//!              │                         ▼
//!              └──────requeue─────── Stale ──mark_ready──┘
//! ```
//!
//! A sub-chunk has at most one entry in the job book, so it is never queued
//! twice. A resubmit while its job runs marks the job stale: the mesh being
//! built may predate the edit, so the id is queued once more when the job
//! completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use strata_core::{CancelToken, StagingArena, StrataError, StrataResult, SubChunkId};

use super::config::MeshingConfig;
use super::loader::NeighborLoader;
use super::staging_sink::{JobSlots, StagedMesh, StagingSink};
use crate::voxel::{BlockCatalog, HaloVolume, MeshOutcome, VoxelMesher, WorldProvider};

// =============================================================================
// WORKER STATE
// =============================================================================

/// What a worker is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Blocked on the job queue.
    WaitingForJob = 0,
    /// Loading, meshing or writing slots.
    Running = 1,
    /// Blocked until a staging slot frees up.
    WaitingForBuffer = 2,
    /// Thread has returned.
    Exited = 3,
}

impl WorkerState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::WaitingForJob,
            1 => Self::Running,
            2 => Self::WaitingForBuffer,
            _ => Self::Exited,
        }
    }
}

/// Lock-free cell holding a [`WorkerState`].
#[derive(Debug)]
pub struct WorkerStatus(AtomicU8);

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerStatus {
    /// Starts in [`WorkerState::WaitingForJob`].
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(WorkerState::WaitingForJob as u8))
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn get(&self) -> WorkerState {
        WorkerState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Publishes a new state.
    #[inline]
    pub fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    Running,
    Stale,
}

#[derive(Default)]
struct JobBook {
    jobs: HashMap<SubChunkId, JobState>,
    requeue: Vec<SubChunkId>,
}

/// Result of [`WorkerPool::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Submitted {
    Queued,
    Deduplicated,
}

/// Everything the workers and the main thread share.
pub(crate) struct PipelineShared {
    pub(crate) catalog: Arc<dyn BlockCatalog>,
    pub(crate) world: Arc<dyn WorldProvider>,
    pub(crate) arena: StagingArena<StagedMesh>,
    pub(crate) loader: NeighborLoader,
    /// Fails blocked slot waits.
    pub(crate) cancel: CancelToken,
    /// Abandons running and queued jobs.
    pub(crate) abort: CancelToken,
    merge_quads: bool,
    book: Mutex<JobBook>,
    statuses: Vec<WorkerStatus>,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

impl PipelineShared {
    pub(crate) fn new(
        config: &MeshingConfig,
        catalog: Arc<dyn BlockCatalog>,
        world: Arc<dyn WorldProvider>,
    ) -> StrataResult<Self> {
        Ok(Self {
            catalog,
            world,
            arena: StagingArena::new(config.staging_slots)?,
            loader: NeighborLoader::new(config.neighbor_wait()),
            cancel: CancelToken::new(),
            abort: CancelToken::new(),
            merge_quads: config.merge_quads,
            book: Mutex::new(JobBook::default()),
            statuses: (0..config.workers).map(|_| WorkerStatus::new()).collect(),
            cancelled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub(crate) fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn worker_states(&self) -> Vec<WorkerState> {
        self.statuses.iter().map(WorkerStatus::get).collect()
    }

    pub(crate) fn is_pending(&self, id: SubChunkId) -> bool {
        self.book.lock().jobs.contains_key(&id)
    }

    fn start_job(&self, id: SubChunkId) {
        self.book.lock().jobs.insert(id, JobState::Running);
    }

    /// Drops the job entry; a stale job goes back to the requeue list.
    fn end_job(&self, id: SubChunkId, requeue: bool) {
        let mut book = self.book.lock();
        if book.jobs.remove(&id) == Some(JobState::Stale) && requeue {
            book.jobs.insert(id, JobState::Queued);
            book.requeue.push(id);
        }
    }

    fn count_cancelled(&self, id: SubChunkId) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.end_job(id, false);
    }
}

// =============================================================================
// WORKER LOOP
// =============================================================================

fn mesh_job(
    shared: &PipelineShared,
    status: &WorkerStatus,
    mesher: &mut VoxelMesher,
    halo: &mut HaloVolume,
    id: SubChunkId,
) -> StrataResult<()> {
    shared.loader.ensure_with_neighbors(shared.world.as_ref(), id)?;
    let present = halo.gather(shared.world.as_ref(), id);

    let job = JobSlots::new();
    let mut opaque = StagingSink::new(&shared.arena, id, &job, &shared.cancel, &shared.abort).with_status(status);
    let mut alpha = StagingSink::new(&shared.arena, id, &job, &shared.cancel, &shared.abort).with_status(status);
    let outcome = if present {
        mesher.mesh(halo, shared.catalog.as_ref(), &mut opaque, &mut alpha)?
    } else {
        MeshOutcome::default()
    };

    tracing::debug!(
        "meshed {}: {} quads, {} discardable, {} alpha, {} merged",
        id,
        outcome.quads,
        outcome.discardable,
        outcome.alpha_quads,
        outcome.merged
    );
    let (opaque, alpha) = (opaque.finish(), alpha.finish());
    let staged = StagedMesh {
        outcome,
        overflow: [opaque.overflow, alpha.overflow],
    };
    shared.arena.mark_ready(id, vec![opaque.slots, alpha.slots], staged)
}

fn run_worker(shared: &PipelineShared, index: usize, jobs: &Receiver<SubChunkId>) {
    let status = &shared.statuses[index];
    let mut mesher = VoxelMesher::new(shared.merge_quads);
    let mut halo = HaloVolume::new();

    loop {
        status.set(WorkerState::WaitingForJob);
        let Ok(id) = jobs.recv() else {
            break;
        };
        if shared.abort.is_cancelled() {
            shared.count_cancelled(id);
            continue;
        }

        status.set(WorkerState::Running);
        shared.start_job(id);
        match mesh_job(shared, status, &mut mesher, &mut halo, id) {
            Ok(()) => shared.end_job(id, true),
            Err(StrataError::Cancelled) => {
                tracing::warn!("worker {} cancelled job {}", index, id);
                shared.count_cancelled(id);
            }
            Err(err) => {
                tracing::warn!("worker {} failed job {}: {}", index, id, err);
                shared.failed.fetch_add(1, Ordering::Relaxed);
                shared.end_job(id, false);
            }
        }
    }

    status.set(WorkerState::Exited);
    tracing::debug!("meshing worker {} exited", index);
}

// =============================================================================
// POOL
// =============================================================================

/// Long-lived worker threads fed by an unbounded job channel.
pub(crate) struct WorkerPool {
    shared: Arc<PipelineShared>,
    sender: Option<Sender<SubChunkId>>,
    /// Kept to drain queued jobs on an immediate stop.
    queue: Receiver<SubChunkId>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns one thread per configured worker.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Spawn`] if a thread cannot be started; workers
    /// started before it are stopped again.
    pub(crate) fn spawn(shared: Arc<PipelineShared>) -> StrataResult<Self> {
        let (sender, queue) = crossbeam_channel::unbounded();
        let mut pool = Self {
            shared,
            sender: Some(sender),
            queue,
            handles: Vec::new(),
        };

        for index in 0..pool.shared.statuses.len() {
            let shared = Arc::clone(&pool.shared);
            let jobs = pool.queue.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("strata-mesher-{index}"))
                .spawn(move || run_worker(&shared, index, &jobs));
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(err) => {
                    // Workers already running are joined; a panic there is secondary.
                    let _ = pool.stop(true);
                    return Err(StrataError::Spawn(err.to_string()));
                }
            }
        }

        tracing::info!("started {} meshing workers", pool.handles.len());
        Ok(pool)
    }

    fn send(&self, id: SubChunkId) -> StrataResult<()> {
        let sender = self.sender.as_ref().ok_or(StrataError::Cancelled)?;
        sender.send(id).map_err(|_| StrataError::Cancelled)
    }

    /// Queues `id` unless it is already queued or running.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Cancelled`] once the pool is stopping.
    pub(crate) fn submit(&self, id: SubChunkId) -> StrataResult<Submitted> {
        if self.sender.is_none() {
            return Err(StrataError::Cancelled);
        }
        let mut book = self.shared.book.lock();
        match book.jobs.get(&id).copied() {
            Some(JobState::Queued | JobState::Stale) => return Ok(Submitted::Deduplicated),
            Some(JobState::Running) => {
                book.jobs.insert(id, JobState::Stale);
                return Ok(Submitted::Deduplicated);
            }
            None => {
                book.jobs.insert(id, JobState::Queued);
            }
        }
        drop(book);

        if let Err(err) = self.send(id) {
            self.shared.book.lock().jobs.remove(&id);
            return Err(err);
        }
        Ok(Submitted::Queued)
    }

    /// Sends stale jobs that completed back to the queue. Returns how many.
    pub(crate) fn requeue_stale(&self) -> usize {
        let requeue = std::mem::take(&mut self.shared.book.lock().requeue);
        let mut sent = 0;
        for id in requeue {
            if self.send(id).is_ok() {
                tracing::trace!("requeued stale job {}", id);
                sent += 1;
            } else {
                self.shared.book.lock().jobs.remove(&id);
            }
        }
        sent
    }

    /// Stops all workers and joins them.
    ///
    /// Closing the queue lets workers finish what is queued; slot waits fail
    /// from now on. With `abort`, running jobs stop at their next flush and
    /// queued jobs are dropped. Returns the number of dropped jobs.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::WorkerPanicked`] for the first worker that
    /// panicked; all workers are joined regardless.
    pub(crate) fn stop(&mut self, abort: bool) -> StrataResult<u64> {
        self.shared.cancel.cancel();
        if abort {
            self.shared.abort.cancel();
        }
        self.sender = None;
        self.shared.arena.interrupt();

        let mut dropped = 0;
        if abort {
            while let Ok(id) = self.queue.try_recv() {
                self.shared.count_cancelled(id);
                dropped += 1;
            }
        }

        let mut result = Ok(dropped);
        for (index, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                tracing::warn!("meshing worker {} panicked", index);
                if result.is_ok() {
                    result = Err(StrataError::WorkerPanicked(index));
                }
            }
        }
        self.shared.book.lock().requeue.clear();
        result
    }
}
