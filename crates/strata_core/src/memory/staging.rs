//! # Staging Arena
//!
//! Fixed pool of 4 KiB slots that meshing workers write into and the main
//! thread drains into GPU banks.
//!
//! ## Slot Layout
//!
//! ```text
//! word 0      owner tag (SubChunkId::tag)
//! word 1      SlotHeader: used words | discarded words | next slot + 1
//! word 2..    payload, written upward from the start
//!   ...       discard region, written downward from the end
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! Free ──acquire──> Writing(owner) ──mark_ready──> Ready(owner) ──take_chain/recycle──> Free
//!                         └──────────────release──────────────────────────────────────┘
//! ```
//!
//! While a slot is `Writing` its buffer is moved out of the arena into the
//! [`StagingSlot`] the worker holds, so no other thread can even see it.

use crate::error::{StrataError, StrataResult};
use crate::id::SubChunkId;
use crate::sync::{CancelToken, Semaphore};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Words per slot.
pub const SLOT_WORDS: usize = 1024;

/// Bytes per slot.
pub const SLOT_BYTES: usize = SLOT_WORDS * 4;

/// Header words at the start of every slot.
pub const HEADER_WORDS: usize = 2;

/// Payload words per slot.
pub const PAYLOAD_WORDS: usize = SLOT_WORDS - HEADER_WORDS;

/// Largest arena the 10-bit next link can address.
pub const MAX_SLOTS: usize = 1023;

const FIELD_BITS: u32 = 10;
const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;

/// Decoded form of header word 1.
///
/// Layout:
/// - Bits 0-9: payload words written from the start
/// - Bits 10-19: payload words written from the end (discard region)
/// - Bits 20-29: index of the next slot in the chain plus one, 0 = last slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotHeader {
    /// Words used at the start of the payload.
    pub used_words: u16,
    /// Words used at the end of the payload.
    pub discard_words: u16,
    /// Next slot of the chain.
    pub next: Option<u16>,
}

impl SlotHeader {
    /// Packs the header into its on-slot word.
    #[must_use]
    pub fn pack(self) -> u32 {
        let next = self.next.map_or(0, |n| u32::from(n) + 1);
        (u32::from(self.used_words) & FIELD_MASK)
            | ((u32::from(self.discard_words) & FIELD_MASK) << FIELD_BITS)
            | ((next & FIELD_MASK) << (2 * FIELD_BITS))
    }

    /// Unpacks a header word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn unpack(word: u32) -> Self {
        let next = (word >> (2 * FIELD_BITS)) & FIELD_MASK;
        Self {
            used_words: (word & FIELD_MASK) as u16,
            discard_words: ((word >> FIELD_BITS) & FIELD_MASK) as u16,
            next: next.checked_sub(1).map(|n| n as u16),
        }
    }
}

/// Ownership state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// In the free pool.
    Free,
    /// Held by a worker that is still meshing this owner.
    Writing(SubChunkId),
    /// Holds a finished mesh waiting for the main thread.
    Ready(SubChunkId),
}

/// A slot checked out of the arena.
///
/// Must be handed back with [`StagingArena::release`] or
/// [`StagingArena::mark_ready`].
#[derive(Debug)]
pub struct StagingSlot {
    index: u16,
    owner: SubChunkId,
    words: Box<[u32]>,
}

impl StagingSlot {
    /// Slot index inside the arena.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> u16 {
        self.index
    }

    /// Sub-chunk this slot is tagged with.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> SubChunkId {
        self.owner
    }

    /// Decoded header.
    #[inline]
    #[must_use]
    pub fn header(&self) -> SlotHeader {
        SlotHeader::unpack(self.words[1])
    }

    /// Overwrites the header.
    #[inline]
    pub fn set_header(&mut self, header: SlotHeader) {
        self.words[1] = header.pack();
    }

    /// Owner tag stored in word 0.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> u32 {
        self.words[0]
    }

    /// Whole payload area.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u32] {
        &self.words[HEADER_WORDS..]
    }

    /// Whole payload area, writable.
    #[inline]
    pub fn payload_mut(&mut self) -> &mut [u32] {
        &mut self.words[HEADER_WORDS..]
    }

    /// Words written from the start, as recorded in the header.
    #[must_use]
    pub fn used(&self) -> &[u32] {
        let used = usize::from(self.header().used_words).min(PAYLOAD_WORDS);
        &self.payload()[..used]
    }

    /// Words written from the end, as recorded in the header.
    #[must_use]
    pub fn discarded(&self) -> &[u32] {
        let discard = usize::from(self.header().discard_words).min(PAYLOAD_WORDS);
        &self.payload()[PAYLOAD_WORDS - discard..]
    }
}

/// A finished mesh handed over by a worker.
#[derive(Debug)]
pub struct ReadyMesh<M> {
    /// Sub-chunk the mesh belongs to.
    pub owner: SubChunkId,
    /// First slot of each chain, in the order the chains were handed over.
    pub heads: Vec<Option<u16>>,
    /// Caller-defined metadata travelling with the mesh.
    pub meta: M,
}

struct ArenaState<M> {
    /// Slot buffers; `None` while checked out.
    buffers: Vec<Option<Box<[u32]>>>,
    states: Vec<SlotState>,
    /// Free indices, popped from the back.
    free: Vec<u16>,
    ready: VecDeque<ReadyMesh<M>>,
}

/// Fixed-capacity pool of staging slots.
///
/// # Thread Safety
///
/// Shared by reference between workers and the main thread. Bookkeeping sits
/// behind one mutex; slot contents are only touched by whoever holds the
/// [`StagingSlot`], outside the lock.
pub struct StagingArena<M> {
    state: Mutex<ArenaState<M>>,
    /// One permit per free slot.
    permits: Semaphore,
    capacity: usize,
}

impl<M> StagingArena<M> {
    /// Creates an arena of `slots` slots, all memory allocated upfront.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidSlotCount`] unless `1 <= slots <= MAX_SLOTS`.
    pub fn new(slots: usize) -> StrataResult<Self> {
        if slots == 0 || slots > MAX_SLOTS {
            return Err(StrataError::InvalidSlotCount {
                requested: slots,
                max: MAX_SLOTS,
            });
        }

        let buffers = (0..slots)
            .map(|_| Some(vec![0u32; SLOT_WORDS].into_boxed_slice()))
            .collect();

        Ok(Self {
            state: Mutex::new(ArenaState {
                buffers,
                states: vec![SlotState::Free; slots],
                free: Self::full_free_list(slots),
                ready: VecDeque::new(),
            }),
            permits: Semaphore::new(slots),
            capacity: slots,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn full_free_list(slots: usize) -> Vec<u16> {
        (0..slots as u16).rev().collect()
    }

    /// Total slot count.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently in the free pool.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Number of meshes waiting to be drained.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// True if a mesh of `owner` waits to be drained.
    #[must_use]
    pub fn has_ready(&self, owner: SubChunkId) -> bool {
        self.state.lock().ready.iter().any(|mesh| mesh.owner == owner)
    }

    /// State of one slot, `None` if out of range.
    #[must_use]
    pub fn slot_state(&self, index: u16) -> Option<SlotState> {
        self.state.lock().states.get(usize::from(index)).copied()
    }

    /// Snapshot of every slot state.
    #[must_use]
    pub fn slot_states(&self) -> Vec<SlotState> {
        self.state.lock().states.clone()
    }

    /// Takes a free slot for `owner`, blocking while the arena is full.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Cancelled`] if `cancel` fires while waiting.
    pub fn acquire(&self, owner: SubChunkId, cancel: &CancelToken) -> StrataResult<StagingSlot> {
        self.permits.acquire(cancel)?;
        self.checkout(owner).map_err(|err| {
            self.permits.release(1);
            err
        })
    }

    /// Takes a free slot if one is available right now.
    #[must_use]
    pub fn try_acquire(&self, owner: SubChunkId) -> Option<StagingSlot> {
        if !self.permits.try_acquire() {
            return None;
        }
        match self.checkout(owner) {
            Ok(slot) => Some(slot),
            Err(_) => {
                self.permits.release(1);
                None
            }
        }
    }

    fn checkout(&self, owner: SubChunkId) -> StrataResult<StagingSlot> {
        let mut state = self.state.lock();
        let index = state
            .free
            .pop()
            .ok_or_else(|| StrataError::Invariant("permit granted with empty free list".into()))?;
        let slot = usize::from(index);
        let Some(mut words) = state.buffers[slot].take() else {
            state.free.push(index);
            return Err(StrataError::Invariant(format!("free slot {index} has no buffer")));
        };
        state.states[slot] = SlotState::Writing(owner);
        drop(state);

        words[0] = owner.tag();
        words[1] = 0;
        Ok(StagingSlot { index, owner, words })
    }

    /// Returns a slot to the free pool.
    pub fn release(&self, slot: StagingSlot) {
        self.release_all(std::iter::once(slot));
    }

    /// Returns several slots to the free pool with a single wake-up.
    pub fn release_all(&self, slots: impl IntoIterator<Item = StagingSlot>) {
        let mut state = self.state.lock();
        let mut count = 0;
        for slot in slots {
            let index = usize::from(slot.index);
            state.buffers[index] = Some(slot.words);
            state.states[index] = SlotState::Free;
            state.free.push(slot.index);
            count += 1;
        }
        drop(state);
        self.permits.release(count);
    }

    /// Hands finished chains over to the main thread.
    ///
    /// After this call the worker no longer holds any of the slots; they are
    /// tagged `Ready(owner)` until drained.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] if a slot belongs to another owner.
    /// The slots are released in that case.
    pub fn mark_ready(
        &self,
        owner: SubChunkId,
        chains: Vec<Vec<StagingSlot>>,
        meta: M,
    ) -> StrataResult<()> {
        let stray = chains
            .iter()
            .flatten()
            .find(|slot| slot.owner != owner)
            .map(StagingSlot::index);
        if let Some(index) = stray {
            self.release_all(chains.into_iter().flatten());
            return Err(StrataError::Invariant(format!(
                "slot {index} handed over by the wrong owner {owner}"
            )));
        }

        let mut state = self.state.lock();
        let mut heads = Vec::with_capacity(chains.len());
        for chain in chains {
            heads.push(chain.first().map(StagingSlot::index));
            for slot in chain {
                let index = usize::from(slot.index);
                state.buffers[index] = Some(slot.words);
                state.states[index] = SlotState::Ready(owner);
            }
        }
        state.ready.push_back(ReadyMesh { owner, heads, meta });
        Ok(())
    }

    /// Removes every mesh that finished since the last call, oldest first.
    #[must_use]
    pub fn drain_ready(&self) -> Vec<ReadyMesh<M>> {
        self.state.lock().ready.drain(..).collect()
    }

    /// Checks out a ready chain by following the header links from `head`.
    ///
    /// The slots stay `Ready(owner)` until passed to
    /// [`release_all`](Self::release_all).
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::BrokenChain`] if a link leaves the arena, loops,
    /// or reaches a slot that does not belong to `owner`. Slots already taken
    /// are put back untouched.
    pub fn take_chain(&self, owner: SubChunkId, head: Option<u16>) -> StrataResult<Vec<StagingSlot>> {
        let mut state = self.state.lock();
        let mut chain: Vec<StagingSlot> = Vec::new();
        let mut next = head;

        while let Some(index) = next {
            let slot = usize::from(index);
            let valid = chain.len() < self.capacity
                && state.states.get(slot) == Some(&SlotState::Ready(owner));
            let words = if valid { state.buffers[slot].take() } else { None };

            let Some(words) = words else {
                for taken in chain {
                    state.buffers[usize::from(taken.index)] = Some(taken.words);
                }
                return Err(StrataError::BrokenChain(index));
            };

            next = SlotHeader::unpack(words[1]).next;
            chain.push(StagingSlot { index, owner, words });
        }
        Ok(chain)
    }

    /// Wakes workers blocked in [`acquire`](Self::acquire) so they re-check
    /// their cancel token.
    pub fn interrupt(&self) {
        self.permits.interrupt();
    }

    /// Puts every slot back in the free pool and drops pending ready meshes.
    ///
    /// Only call once no worker can still hold a slot.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        for (index, buffer) in state.buffers.iter_mut().enumerate() {
            if buffer.is_none() {
                tracing::warn!("staging slot {} was not returned before reset", index);
                *buffer = Some(vec![0u32; SLOT_WORDS].into_boxed_slice());
            }
        }
        state.states.fill(SlotState::Free);
        state.free = Self::full_free_list(self.capacity);
        let dropped = state.ready.len();
        state.ready.clear();
        drop(state);

        if dropped > 0 {
            tracing::debug!("staging reset dropped {} undrained meshes", dropped);
        }
        self.permits.reset(self.capacity);
    }
}
