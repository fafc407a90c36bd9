//! Bounded quad output regions.
//!
//! A sink writes normal quads upward from the start of its current region
//! and discardable quads downward from the end. When fewer than one quad
//! of space is left the mesher flushes, which publishes the region and
//! moves on to a fresh one. A quad is never split across regions.

use strata_core::{StrataError, StrataResult};

use super::quad::{PackedQuad, QUAD_WORDS};

/// Words of one single-thread mesh buffer (64 KiB, trimmed to whole quads).
pub const MESH_BUFFER_WORDS: usize = (64 * 1024 / 4) / QUAD_WORDS * QUAD_WORDS;

/// Destination for the quads of one mesh.
pub trait MeshSink {
    /// Whole quads that still fit in the current region.
    fn room(&self) -> usize;

    /// Appends a quad to the current region.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] if the region has no room.
    fn write(&mut self, quad: &PackedQuad) -> StrataResult<()>;

    /// Appends a quad to the discard region at the end.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] if the region has no room.
    fn write_discardable(&mut self, quad: &PackedQuad) -> StrataResult<()>;

    /// Publishes the current region. If no quad fits any more, moves to a
    /// new region first.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Cancelled`] if waiting for a region was
    /// interrupted by a stop request.
    fn flush(&mut self) -> StrataResult<()>;

    /// Writes a quad, flushing first if the region is full.
    ///
    /// # Errors
    ///
    /// Propagates [`flush`](Self::flush) errors.
    fn push(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        if self.room() == 0 {
            self.flush()?;
        }
        self.write(quad)
    }

    /// Writes a discardable quad, flushing first if the region is full.
    ///
    /// # Errors
    ///
    /// Propagates [`flush`](Self::flush) errors.
    fn push_discardable(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        if self.room() == 0 {
            self.flush()?;
        }
        self.write_discardable(quad)
    }
}

/// Write positions inside one region of `capacity` words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionCursor {
    used: usize,
    discard: usize,
    capacity: usize,
}

impl RegionCursor {
    /// Empty cursor over `capacity` words.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            used: 0,
            discard: 0,
            capacity,
        }
    }

    /// Whole quads left.
    #[inline]
    #[must_use]
    pub const fn room(&self) -> usize {
        (self.capacity - self.used - self.discard) / QUAD_WORDS
    }

    /// Words written from the start.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Words written from the end.
    #[inline]
    #[must_use]
    pub const fn discarded(&self) -> usize {
        self.discard
    }

    /// Copies `quad` after the used words of `region`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] if it does not fit.
    pub fn place(&mut self, region: &mut [u32], quad: &PackedQuad) -> StrataResult<()> {
        self.check_room()?;
        region[self.used..self.used + QUAD_WORDS].copy_from_slice(&quad.words);
        self.used += QUAD_WORDS;
        Ok(())
    }

    /// Copies `quad` before the discarded words at the end of `region`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] if it does not fit.
    pub fn place_discardable(&mut self, region: &mut [u32], quad: &PackedQuad) -> StrataResult<()> {
        self.check_room()?;
        self.discard += QUAD_WORDS;
        let start = self.capacity - self.discard;
        region[start..start + QUAD_WORDS].copy_from_slice(&quad.words);
        Ok(())
    }

    fn check_room(&self) -> StrataResult<()> {
        if self.room() == 0 {
            return Err(StrataError::Invariant(format!(
                "region of {} words is full",
                self.capacity
            )));
        }
        Ok(())
    }
}

/// Unbounded in-memory sink, for tools and tests.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    /// Normal quads in write order.
    pub quads: Vec<PackedQuad>,
    /// Discardable quads in write order.
    pub discardable: Vec<PackedQuad>,
    /// Number of flushes requested.
    pub flushes: usize,
}

impl VecSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normal then discardable quads.
    pub fn all(&self) -> impl Iterator<Item = &PackedQuad> {
        self.quads.iter().chain(&self.discardable)
    }

    /// Total quads written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quads.len() + self.discardable.len()
    }

    /// True if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets all quads.
    pub fn clear(&mut self) {
        self.quads.clear();
        self.discardable.clear();
        self.flushes = 0;
    }
}

impl MeshSink for VecSink {
    fn room(&self) -> usize {
        usize::MAX
    }

    fn write(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        self.quads.push(*quad);
        Ok(())
    }

    fn write_discardable(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        self.discardable.push(*quad);
        Ok(())
    }

    fn flush(&mut self) -> StrataResult<()> {
        self.flushes += 1;
        Ok(())
    }
}

struct MeshBuffer {
    words: Box<[u32]>,
    cursor: RegionCursor,
}

/// Chain of reusable fixed-size buffers for meshing on the main thread.
///
/// Buffers are allocated on first use and kept across [`reset`](Self::reset)s.
pub struct BufferSink {
    buffers: Vec<MeshBuffer>,
    /// Buffers in use by the current mesh.
    active: usize,
    buffer_words: usize,
}

impl Default for BufferSink {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferSink {
    /// Sink of 64 KiB buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_words(MESH_BUFFER_WORDS)
    }

    /// Sink of `words`-word buffers, rounded down to whole quads (at least one).
    #[must_use]
    pub fn with_buffer_words(words: usize) -> Self {
        let buffer_words = (words / QUAD_WORDS).max(1) * QUAD_WORDS;
        Self {
            buffers: Vec::new(),
            active: 0,
            buffer_words,
        }
    }

    /// Starts a new mesh, keeping the buffers.
    pub fn reset(&mut self) {
        for buffer in &mut self.buffers[..self.active] {
            buffer.cursor = RegionCursor::new(self.buffer_words);
        }
        self.active = 0;
    }

    fn current(&mut self) -> &mut MeshBuffer {
        if self.active == 0 {
            self.advance();
        }
        let index = self.active - 1;
        &mut self.buffers[index]
    }

    fn advance(&mut self) {
        if self.active == self.buffers.len() {
            self.buffers.push(MeshBuffer {
                words: vec![0; self.buffer_words].into_boxed_slice(),
                cursor: RegionCursor::new(self.buffer_words),
            });
        } else {
            self.buffers[self.active].cursor = RegionCursor::new(self.buffer_words);
        }
        self.active += 1;
    }

    /// Buffers touched by the current mesh.
    #[must_use]
    pub fn buffers_used(&self) -> usize {
        self.active
    }

    /// Buffers allocated so far.
    #[must_use]
    pub fn buffers_allocated(&self) -> usize {
        self.buffers.len()
    }

    /// Used words of each active buffer, in order.
    pub fn used_regions(&self) -> impl Iterator<Item = &[u32]> {
        self.buffers[..self.active]
            .iter()
            .map(|b| &b.words[..b.cursor.used()])
    }

    /// Discarded words of each active buffer, in order.
    pub fn discard_regions(&self) -> impl Iterator<Item = &[u32]> {
        let words = self.buffer_words;
        self.buffers[..self.active]
            .iter()
            .map(move |b| &b.words[words - b.cursor.discarded()..])
    }

    /// Total words written for the current mesh.
    #[must_use]
    pub fn total_words(&self) -> usize {
        self.buffers[..self.active]
            .iter()
            .map(|b| b.cursor.used() + b.cursor.discarded())
            .sum()
    }
}

impl MeshSink for BufferSink {
    fn room(&self) -> usize {
        match self.active {
            0 => self.buffer_words / QUAD_WORDS,
            n => self.buffers[n - 1].cursor.room(),
        }
    }

    fn write(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        let buffer = self.current();
        buffer.cursor.place(&mut buffer.words, quad)
    }

    fn write_discardable(&mut self, quad: &PackedQuad) -> StrataResult<()> {
        let buffer = self.current();
        buffer.cursor.place_discardable(&mut buffer.words, quad)
    }

    fn flush(&mut self) -> StrataResult<()> {
        if self.room() == 0 {
            self.advance();
        }
        Ok(())
    }
}
