//! The meshing engine: one object owning workers, staging and GPU banks.
//!
//! ## Frame Protocol
//!
//! ```text
//! engine.submit_chunk_job(id)?;          // any number per frame
//! let ready = engine.poll_completed()?;  // once per frame, never blocks
//! let draws = engine.draw_commands(visible);
//! ```
//!
//! Bank layout of one mesh:
//!
//! ```text
//! offset ─┬─ opaque quads ─┬─ discardable quads ─┬─ alpha quads ─┐
//!         first_quad                            alpha_first
//! ```
//!
//! Discardable quads are stored newest first, whatever the size of the
//! regions they were staged in, so both meshing paths upload the same bytes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use strata_core::{
    BankAllocator, BankRange, BankStats, GpuContext, ReadyMesh, StagingSlot, StrataError,
    StrataResult, SubChunkId,
};

use super::config::MeshingConfig;
use super::staging_sink::StagedMesh;
use super::stats::EngineStats;
use super::worker::{PipelineShared, Submitted, WorkerPool, WorkerState};
use crate::voxel::{
    BlockCatalog, BufferSink, HaloVolume, MeshOutcome, VoxelMesher, WorldProvider, QUAD_BYTES,
};

#[allow(clippy::cast_possible_truncation)]
const RECORD_BYTES: u32 = QUAD_BYTES as u32;

/// How [`MeshingEngine::stop`] treats outstanding work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopMode {
    /// Workers finish queued jobs that need no slot wait; finished meshes
    /// are uploaded before the arena is reset.
    #[default]
    Cooperative,
    /// Running jobs stop at their next flush, queued jobs are dropped, and
    /// finished meshes are dropped without upload.
    Immediate,
}

/// Where and how big a sub-chunk's mesh is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshRecord {
    /// Bank range, `None` for an empty mesh.
    pub range: Option<BankRange>,
    /// Bytes of normal opaque quads.
    pub opaque_bytes: u32,
    /// Bytes of discardable quads following them.
    pub discard_bytes: u32,
    /// Bytes of alpha quads following those.
    pub alpha_bytes: u32,
    /// What the mesher reported.
    pub outcome: MeshOutcome,
}

impl MeshRecord {
    /// Bytes actually written into the range.
    #[inline]
    #[must_use]
    pub const fn mesh_bytes(&self) -> u32 {
        self.opaque_bytes + self.discard_bytes + self.alpha_bytes
    }

    /// Quads in the range.
    #[inline]
    #[must_use]
    pub const fn quad_count(&self) -> u32 {
        self.mesh_bytes() / RECORD_BYTES
    }
}

/// One draw's worth of quads for a visible sub-chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommand {
    /// Sub-chunk drawn.
    pub owner: SubChunkId,
    /// Bank holding the quads.
    pub bank: usize,
    /// First opaque quad, in quads from the start of the bank.
    pub first_quad: u32,
    /// Normal opaque quads.
    pub opaque_quads: u32,
    /// Discardable quads right after them; skip at distance.
    pub discardable_quads: u32,
    /// First alpha quad.
    pub alpha_first: u32,
    /// Alpha quads.
    pub alpha_quads: u32,
}

/// Meshing on the calling thread.
struct InlineMesher {
    mesher: VoxelMesher,
    halo: HaloVolume,
    opaque: BufferSink,
    alpha: BufferSink,
}

/// Owns the worker pool, the staging arena, the GPU banks and the mesh records.
///
/// Every method is called from the thread that owns the GPU context.
///
/// # Example
///
/// ```rust,ignore
/// let mut engine = MeshingEngine::new(config, catalog, world, HostGpuContext::new())?;
/// engine.submit_chunk_job(SubChunkId::new(0, 4, 0))?;
/// loop {
///     for id in engine.poll_completed()? {
///         // mesh of `id` is now drawable
///     }
/// }
/// ```
pub struct MeshingEngine<C: GpuContext> {
    config: MeshingConfig,
    shared: Arc<PipelineShared>,
    pool: Option<WorkerPool>,
    inline: Option<InlineMesher>,
    ctx: C,
    banks: BankAllocator<C::Bank>,
    records: HashMap<SubChunkId, MeshRecord>,
    /// Uploaded but not yet reported by `poll_completed`.
    completed: Vec<SubChunkId>,
    /// Unloaded while a job was in flight; its result is dropped.
    unloaded: HashSet<SubChunkId>,
    stats: EngineStats,
    stopped: bool,
}

impl<C: GpuContext> MeshingEngine<C> {
    /// Validates `config` and starts the workers.
    ///
    /// # Errors
    ///
    /// - [`StrataError::InvalidConfig`] if the config does not validate
    /// - [`StrataError::Spawn`] if a worker thread cannot be started
    pub fn new(
        config: MeshingConfig,
        catalog: Arc<dyn BlockCatalog>,
        world: Arc<dyn WorldProvider>,
        ctx: C,
    ) -> StrataResult<Self> {
        config.validate()?;
        let shared = Arc::new(PipelineShared::new(&config, catalog, world)?);

        let (pool, inline) = if config.workers == 0 {
            let inline = InlineMesher {
                mesher: VoxelMesher::new(config.merge_quads),
                halo: HaloVolume::new(),
                opaque: BufferSink::new(),
                alpha: BufferSink::new(),
            };
            (None, Some(inline))
        } else {
            (Some(WorkerPool::spawn(Arc::clone(&shared))?), None)
        };

        tracing::info!(
            "meshing engine started: {} workers, {} staging slots, {} KiB min bank",
            config.workers,
            config.staging_slots,
            config.min_bank_size / 1024
        );

        Ok(Self {
            banks: BankAllocator::new(config.min_bank_size, RECORD_BYTES),
            config,
            shared,
            pool,
            inline,
            ctx,
            records: HashMap::new(),
            completed: Vec::new(),
            unloaded: HashSet::new(),
            stats: EngineStats::default(),
            stopped: false,
        })
    }

    /// Configuration the engine runs with.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &MeshingConfig {
        &self.config
    }

    // =========================================================================
    // SUBMISSION
    // =========================================================================

    /// Requests a (re)mesh of `id`.
    ///
    /// With workers the job is queued unless `id` is already queued or
    /// running. Without workers the mesh is built and uploaded right away
    /// and reported by the next [`poll_completed`](Self::poll_completed).
    ///
    /// # Errors
    ///
    /// - [`StrataError::Cancelled`] after [`stop`](Self::stop)
    /// - Without workers, any meshing or upload error
    pub fn submit_chunk_job(&mut self, id: SubChunkId) -> StrataResult<()> {
        if self.stopped {
            return Err(StrataError::Cancelled);
        }
        self.unloaded.remove(&id);

        if let Some(pool) = &self.pool {
            match pool.submit(id)? {
                Submitted::Queued => self.stats.jobs_submitted += 1,
                Submitted::Deduplicated => self.stats.jobs_deduplicated += 1,
            }
            return Ok(());
        }

        let mut inline = self
            .inline
            .take()
            .ok_or_else(|| StrataError::Invariant("engine has neither workers nor inline mesher".into()))?;
        self.stats.jobs_submitted += 1;
        let result = self.mesh_inline(&mut inline, id);
        self.inline = Some(inline);
        if result.is_err() {
            self.stats.jobs_failed += 1;
        }
        result
    }

    /// Submits several jobs. Returns how many were accepted (queued or meshed).
    ///
    /// # Errors
    ///
    /// Stops at the first error from [`submit_chunk_job`](Self::submit_chunk_job).
    pub fn submit(&mut self, ids: impl IntoIterator<Item = SubChunkId>) -> StrataResult<usize> {
        let before = self.stats.jobs_submitted;
        for id in ids {
            self.submit_chunk_job(id)?;
        }
        Ok(usize::try_from(self.stats.jobs_submitted - before).unwrap_or(usize::MAX))
    }

    fn mesh_inline(&mut self, inline: &mut InlineMesher, id: SubChunkId) -> StrataResult<()> {
        let world = self.shared.world.as_ref();
        self.shared.loader.ensure_with_neighbors(world, id)?;
        let present = inline.halo.gather(world, id);

        inline.opaque.reset();
        inline.alpha.reset();
        let outcome = if present {
            inline.mesher.mesh(
                &inline.halo,
                self.shared.catalog.as_ref(),
                &mut inline.opaque,
                &mut inline.alpha,
            )?
        } else {
            MeshOutcome::default()
        };

        let opaque: Vec<&[u32]> = inline.opaque.used_regions().collect();
        let mut discard: Vec<&[u32]> = inline.opaque.discard_regions().collect();
        discard.reverse();
        let mut alpha_discard: Vec<&[u32]> = inline.alpha.discard_regions().collect();
        alpha_discard.reverse();
        let alpha: Vec<&[u32]> = inline.alpha.used_regions().chain(alpha_discard).collect();
        self.upload(id, outcome, [&opaque[..], &discard[..], &alpha[..]])?;
        self.completed.push(id);
        Ok(())
    }

    // =========================================================================
    // COMPLETION
    // =========================================================================

    /// Uploads every mesh the workers finished and returns the ids that
    /// became ready since the last call. Never waits for a worker.
    ///
    /// # Errors
    ///
    /// Returns the first upload error. Every other mesh is still uploaded,
    /// every staging slot is still released, and the ids uploaded so far are
    /// reported by the next call.
    pub fn poll_completed(&mut self) -> StrataResult<Vec<SubChunkId>> {
        if let Some(pool) = &self.pool {
            self.stats.jobs_submitted += pool.requeue_stale() as u64;
        }
        self.upload_ready()?;
        Ok(std::mem::take(&mut self.completed))
    }

    fn upload_ready(&mut self) -> StrataResult<()> {
        let mut first_error = None;
        for mesh in self.shared.arena.drain_ready() {
            let owner = mesh.owner;
            match self.upload_staged(&mesh) {
                Ok(true) => self.completed.push(owner),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!("upload of {} failed: {}", owner, err);
                    self.stats.jobs_failed += 1;
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Copies one ready mesh into a bank and releases its slots.
    ///
    /// Returns false if the sub-chunk was unloaded in the meantime.
    fn upload_staged(&mut self, mesh: &ReadyMesh<StagedMesh>) -> StrataResult<bool> {
        let mut chains: Vec<Vec<StagingSlot>> = Vec::with_capacity(mesh.heads.len());
        let mut taken = Ok(());
        for head in &mesh.heads {
            match self.shared.arena.take_chain(mesh.owner, *head) {
                Ok(chain) => chains.push(chain),
                Err(err) => {
                    taken = Err(err);
                    break;
                }
            }
        }

        let result = taken.and_then(|()| {
            if self.unloaded.remove(&mesh.owner) {
                tracing::debug!("dropping mesh of unloaded {}", mesh.owner);
                self.stats.jobs_cancelled += 1;
                return Ok(false);
            }
            let empty = Vec::new();
            let [opaque_heap, alpha_heap] = &mesh.meta.overflow;
            let (opaque, discard) = staged_regions(chains.first().unwrap_or(&empty), opaque_heap.as_ref());
            let (mut alpha, alpha_discard) = staged_regions(chains.get(1).unwrap_or(&empty), alpha_heap.as_ref());
            alpha.extend(alpha_discard);

            if mesh.meta.overflowed() {
                self.stats.staging_overflows += 1;
            }
            self.upload(mesh.owner, mesh.meta.outcome, [&opaque[..], &discard[..], &alpha[..]])?;
            Ok(true)
        });

        self.shared.arena.release_all(chains.into_iter().flatten());
        result
    }

    /// Places a mesh made of `[opaque, discard, alpha]` regions into a bank.
    fn upload(&mut self, id: SubChunkId, outcome: MeshOutcome, parts: [&[&[u32]]; 3]) -> StrataResult<()> {
        let mut sizes = [0u32; 3];
        for (size, regions) in sizes.iter_mut().zip(parts) {
            let bytes = regions.iter().map(|region| region.len() * 4).sum::<usize>();
            *size = u32::try_from(bytes).map_err(|_| StrataError::MeshTooLarge {
                size: bytes,
                max: u32::MAX as usize,
            })?;
        }
        let total = sizes.iter().try_fold(0u32, |sum, size| sum.checked_add(*size)).ok_or(
            StrataError::MeshTooLarge {
                size: sizes.iter().map(|size| *size as usize).sum(),
                max: u32::MAX as usize,
            },
        )?;

        let mut record = MeshRecord {
            range: None,
            opaque_bytes: sizes[0],
            discard_bytes: sizes[1],
            alpha_bytes: sizes[2],
            outcome,
        };
        if total == 0 {
            if let Some(old) = self.banks.free(id) {
                tracing::trace!("{} is empty now, freed {} bytes in bank {}", id, old.size, old.bank);
            }
            self.stats.empty_meshes += 1;
            self.stats.jobs_completed += 1;
            self.records.insert(id, record);
            return Ok(());
        }

        let range = self.banks.alloc(&mut self.ctx, id, total)?;
        if let Err(err) = Self::copy_into(&mut self.ctx, &self.banks, range, total, parts) {
            self.banks.free(id);
            self.records.remove(&id);
            return Err(err);
        }

        record.range = Some(range);
        self.records.insert(id, record);
        self.stats.jobs_completed += 1;
        self.stats.quads_merged += outcome.merged as u64;
        self.stats.quads_uploaded += u64::from(total / RECORD_BYTES);
        self.stats.bytes_uploaded += u64::from(total);
        tracing::trace!("uploaded {} bytes of {} at bank {} + {}", total, id, range.bank, range.offset);
        Ok(())
    }

    fn copy_into(
        ctx: &mut C,
        banks: &BankAllocator<C::Bank>,
        range: BankRange,
        total: u32,
        parts: [&[&[u32]]; 3],
    ) -> StrataResult<()> {
        let bank = banks
            .bank_handle(range.bank)
            .ok_or_else(|| StrataError::Invariant(format!("range in missing bank {}", range.bank)))?;
        let view = ctx.map_range(bank, range.offset, total)?;

        let mut at = 0;
        for region in parts.into_iter().flatten().copied() {
            let bytes: &[u8] = bytemuck::cast_slice(region);
            view[at..at + bytes.len()].copy_from_slice(bytes);
            at += bytes.len();
        }
        ctx.unmap(bank);
        Ok(())
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// True once `id` has an uploaded mesh, possibly empty.
    #[must_use]
    pub fn is_ready(&self, id: SubChunkId) -> bool {
        self.records.contains_key(&id)
    }

    /// Record of the current mesh of `id`.
    #[must_use]
    pub fn mesh_info(&self, id: SubChunkId) -> Option<&MeshRecord> {
        self.records.get(&id)
    }

    /// True while a job for `id` is queued or running.
    #[must_use]
    pub fn is_pending(&self, id: SubChunkId) -> bool {
        self.shared.is_pending(id)
    }

    /// Forgets the mesh of `id` and frees its bank range. A job still in
    /// flight for it is discarded when it completes.
    ///
    /// Returns true if `id` had a mesh.
    pub fn unload(&mut self, id: SubChunkId) -> bool {
        // Pending first: a job hands its mesh over before it stops being pending.
        if self.shared.is_pending(id) || self.shared.arena.has_ready(id) {
            self.unloaded.insert(id);
        }
        self.banks.free(id);
        self.records.remove(&id).is_some()
    }

    /// Draw commands for the visible sub-chunks that have quads, ordered by
    /// bank and offset.
    #[must_use]
    pub fn draw_commands(&self, visible: impl IntoIterator<Item = SubChunkId>) -> Vec<DrawCommand> {
        let mut commands: Vec<DrawCommand> = visible
            .into_iter()
            .filter_map(|id| {
                let record = self.records.get(&id)?;
                let range = record.range?;
                let first_quad = range.offset / RECORD_BYTES;
                let opaque_quads = record.opaque_bytes / RECORD_BYTES;
                let discardable_quads = record.discard_bytes / RECORD_BYTES;
                Some(DrawCommand {
                    owner: id,
                    bank: range.bank,
                    first_quad,
                    opaque_quads,
                    discardable_quads,
                    alpha_first: first_quad + opaque_quads + discardable_quads,
                    alpha_quads: record.alpha_bytes / RECORD_BYTES,
                })
            })
            .collect();
        commands.sort_unstable_by_key(|command| (command.bank, command.first_quad));
        commands.dedup_by_key(|command| command.owner);
        commands
    }

    /// Drops every mesh and empties the banks, keeping them for reuse.
    pub fn clear_banks(&mut self) {
        self.banks.clear();
        self.records.clear();
        tracing::debug!("cleared {} banks", self.banks.bank_count());
    }

    /// Occupancy of every bank.
    #[must_use]
    pub fn bank_stats(&self) -> Vec<BankStats> {
        self.banks.stats()
    }

    /// Checks bank conservation and non-overlap.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] describing the first violation.
    pub fn validate_banks(&self) -> StrataResult<()> {
        self.banks.validate()
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            jobs_cancelled: self.stats.jobs_cancelled + self.shared.cancelled(),
            jobs_failed: self.stats.jobs_failed + self.shared.failed(),
            ..self.stats
        }
    }

    /// State of every worker, empty without workers.
    #[must_use]
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.shared.worker_states()
    }

    /// Staging slots currently free.
    #[must_use]
    pub fn free_staging_slots(&self) -> usize {
        self.shared.arena.free_slots()
    }

    /// The GPU context.
    #[inline]
    #[must_use]
    pub const fn context(&self) -> &C {
        &self.ctx
    }

    /// The bank allocator.
    #[inline]
    #[must_use]
    pub const fn banks(&self) -> &BankAllocator<C::Bank> {
        &self.banks
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Stops and joins the workers, then returns every staging slot.
    ///
    /// After a cooperative stop the meshes finished during shutdown are
    /// uploaded and reported by the next [`poll_completed`](Self::poll_completed).
    /// Calling `stop` again does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::WorkerPanicked`] if a worker panicked, or the
    /// first upload error of a cooperative stop. The arena is reset either way.
    pub fn stop(&mut self, mode: StopMode) -> StrataResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let mut result = Ok(());
        if let Some(mut pool) = self.pool.take() {
            result = pool.stop(mode == StopMode::Immediate).map(|dropped| {
                if dropped > 0 {
                    tracing::debug!("dropped {} queued jobs", dropped);
                }
            });
            if mode == StopMode::Cooperative {
                let uploaded = self.upload_ready();
                result = result.and(uploaded);
            } else {
                let dropped = self.shared.arena.drain_ready().len();
                self.stats.jobs_cancelled += dropped as u64;
            }
        }
        self.shared.arena.reset();
        tracing::info!("meshing engine stopped ({:?})", mode);
        result
    }
}

/// Used and discard regions of one staged chain followed by its heap
/// overflow. Discard regions come newest first.
fn staged_regions<'m>(
    slots: &'m [StagingSlot],
    overflow: Option<&'m BufferSink>,
) -> (Vec<&'m [u32]>, Vec<&'m [u32]>) {
    let used = slots
        .iter()
        .map(StagingSlot::used)
        .chain(overflow.into_iter().flat_map(BufferSink::used_regions))
        .collect();
    let mut discard: Vec<&[u32]> = slots
        .iter()
        .map(StagingSlot::discarded)
        .chain(overflow.into_iter().flat_map(BufferSink::discard_regions))
        .collect();
    discard.reverse();
    (used, discard)
}

impl<C: GpuContext> Drop for MeshingEngine<C> {
    fn drop(&mut self) {
        if let Err(err) = self.stop(StopMode::Immediate) {
            tracing::warn!("meshing engine shutdown: {}", err);
        }
    }
}
