//! [`MeshSink`] over a chain of staging slots.
//!
//! A job never blocks for a slot while it holds one. Slots only come back
//! once the main thread drains finished meshes, so a worker waiting with a
//! partial chain could wait on memory that only its own completion frees.
//! When the arena runs dry under a job that already holds slots, its sinks
//! continue in heap regions of the same size and hand those over with the
//! chain.

use std::cell::Cell;

use strata_core::memory::PAYLOAD_WORDS;
use strata_core::{CancelToken, SlotHeader, StagingArena, StagingSlot, StrataError, StrataResult, SubChunkId};

use super::worker::{WorkerState, WorkerStatus};
use crate::voxel::{BufferSink, MeshOutcome, MeshSink, PackedQuad, RegionCursor};

/// Metadata handed to the main thread with a finished mesh.
#[derive(Default)]
pub struct StagedMesh {
    /// What the mesher reported.
    pub outcome: MeshOutcome,
    /// Heap regions of the opaque and alpha chains, if the arena ran out.
    pub overflow: [Option<BufferSink>; 2],
}

impl StagedMesh {
    /// True if any part of the mesh lives outside the arena.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflow.iter().any(Option::is_some)
    }
}

/// What a [`StagingSink`] hands over.
pub struct StagedChain {
    /// Slots in write order, linked through their headers.
    pub slots: Vec<StagingSlot>,
    /// Regions written after the arena ran out.
    pub overflow: Option<BufferSink>,
}

/// Staging slots held by all sinks of one job.
#[derive(Debug, Default)]
pub struct JobSlots(Cell<usize>);

impl JobSlots {
    /// No slots held.
    #[must_use]
    pub const fn new() -> Self {
        Self(Cell::new(0))
    }

    /// Slots held right now.
    #[inline]
    #[must_use]
    pub fn held(&self) -> usize {
        self.0.get()
    }

    fn take(&self) {
        self.0.set(self.0.get() + 1);
    }

    fn give_back(&self, count: usize) {
        self.0.set(self.0.get().saturating_sub(count));
    }
}

/// Writes quads into staging slots checked out for one sub-chunk.
///
/// Slots are taken on the first write and whenever the current one is full;
/// each new slot is linked from the previous one's header. A sink that is
/// dropped without [`finish`](Self::finish) gives its slots back.
pub struct StagingSink<'a> {
    arena: &'a StagingArena<StagedMesh>,
    owner: SubChunkId,
    job: &'a JobSlots,
    cancel: &'a CancelToken,
    abort: &'a CancelToken,
    status: Option<&'a WorkerStatus>,
    chain: Vec<StagingSlot>,
    cursor: RegionCursor,
    overflow: Option<BufferSink>,
}

impl<'a> StagingSink<'a> {
    /// Creates an empty sink for `owner`.
    ///
    /// Every sink of one job shares `job`. `cancel` interrupts a wait for a
    /// free slot; `abort` fails the sink at its next flush even when slots
    /// are available.
    #[must_use]
    pub fn new(
        arena: &'a StagingArena<StagedMesh>,
        owner: SubChunkId,
        job: &'a JobSlots,
        cancel: &'a CancelToken,
        abort: &'a CancelToken,
    ) -> Self {
        Self {
            arena,
            owner,
            job,
            cancel,
            abort,
            status: None,
            chain: Vec::new(),
            cursor: RegionCursor::new(PAYLOAD_WORDS),
            overflow: None,
        }
    }

    /// Reports slot waits through `status`.
    #[must_use]
    pub fn with_status(mut self, status: &'a WorkerStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Slots held so far.
    #[must_use]
    pub fn slots(&self) -> usize {
        self.chain.len()
    }

    /// True once the sink writes to the heap.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflow.is_some()
    }

    /// Records the header of the last slot and hands everything over.
    #[must_use]
    pub fn finish(mut self) -> StagedChain {
        self.record_header();
        let slots = std::mem::take(&mut self.chain);
        self.job.give_back(slots.len());
        StagedChain {
            slots,
            overflow: self.overflow.take(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn record_header(&mut self) {
        if let Some(slot) = self.chain.last_mut() {
            let mut header = slot.header();
            header.used_words = self.cursor.used() as u16;
            header.discard_words = self.cursor.discarded() as u16;
            slot.set_header(header);
        }
    }

    /// Moves on to a fresh slot, or to the heap if the job already holds
    /// slots and none is free.
    fn next_region(&mut self) -> StrataResult<()> {
        if self.abort.is_cancelled() {
            return Err(StrataError::Cancelled);
        }
        let slot = match self.arena.try_acquire(self.owner) {
            Some(slot) => slot,
            None if self.job.held() > 0 => {
                tracing::debug!(
                    "staging full, {} continues on the heap after {} slots",
                    self.owner,
                    self.chain.len()
                );
                self.overflow = Some(BufferSink::with_buffer_words(PAYLOAD_WORDS));
                return Ok(());
            }
            None => {
                if let Some(status) = self.status {
                    status.set(WorkerState::WaitingForBuffer);
                }
                let acquired = self.arena.acquire(self.owner, self.cancel);
                if let Some(status) = self.status {
                    status.set(WorkerState::Running);
                }
                acquired?
            }
        };

        if let Some(previous) = self.chain.last_mut() {
            previous.set_header(SlotHeader {
                next: Some(slot.index()),
                ..previous.header()
            });
        }
        self.chain.push(slot);
        self.job.take();
        self.cursor = RegionCursor::new(PAYLOAD_WORDS);
        Ok(())
    }

    fn ensure_region(&mut self) -> StrataResult<()> {
        if self.chain.is_empty() && self.overflow.is_none() {
            self.next_region()?;
        }
        Ok(())
    }
}

impl MeshSink for StagingSink<'_> {
    fn room(&self) -> usize {
        match &self.overflow {
            Some(overflow) => overflow.room(),
            None => self.cursor.room(),
        }
    }

    fn write(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        self.ensure_region()?;
        match (&mut self.overflow, self.chain.last_mut()) {
            (Some(overflow), _) => overflow.write(quad),
            (None, Some(slot)) => self.cursor.place(slot.payload_mut(), quad),
            (None, None) => Err(StrataError::Invariant("staging sink has no region".into())),
        }
    }

    fn write_discardable(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        self.ensure_region()?;
        match (&mut self.overflow, self.chain.last_mut()) {
            (Some(overflow), _) => overflow.write_discardable(quad),
            (None, Some(slot)) => self.cursor.place_discardable(slot.payload_mut(), quad),
            (None, None) => Err(StrataError::Invariant("staging sink has no region".into())),
        }
    }

    fn flush(&mut self) -> StrataResult<()> {
        if self.abort.is_cancelled() {
            return Err(StrataError::Cancelled);
        }
        if let Some(overflow) = &mut self.overflow {
            return overflow.flush();
        }
        self.record_header();
        if self.cursor.room() == 0 {
            self.next_region()?;
        }
        Ok(())
    }
}

impl Drop for StagingSink<'_> {
    fn drop(&mut self) {
        if !self.chain.is_empty() {
            tracing::trace!("releasing {} unfinished slots of {}", self.chain.len(), self.owner);
            self.job.give_back(self.chain.len());
            self.arena.release_all(self.chain.drain(..));
        }
    }
}
