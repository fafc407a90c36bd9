//! # GPU Bank Allocator
//!
//! Places finished meshes into large GPU buffers ("banks") and recycles the
//! ranges when meshes are replaced or unloaded.
//!
//! ## Bank Layout
//!
//! ```text
//! 0                                    watermark                  capacity
//! |used A|free|used B|used C|  free  |used D|......... tail ........|
//! ```
//!
//! Everything below the watermark is covered by exactly one used or free
//! range; the tail above it is implicitly free. Hence for every bank:
//! `sum(used) + sum(free) + (capacity - watermark) == capacity`.
//!
//! ## Thread Safety
//!
//! Main thread only. The allocator owns no locks.

use crate::error::{StrataError, StrataResult};
use crate::id::SubChunkId;
use std::collections::HashMap;

/// Banks are sized in multiples of this.
pub const BANK_GRANULARITY: u32 = 16 * 1024;

/// Replacement ranges are rounded up to this before being trimmed to whole records.
pub const RANGE_ROUNDING: u32 = 4096;

/// A free range whose leftover after a split would be smaller than this is taken whole.
pub const FRAGMENT_THRESHOLD: u32 = 2 * 4096;

/// GPU resource collaborator.
///
/// The allocator only asks for new banks and raw writable views; it never
/// issues draw calls.
pub trait GpuContext {
    /// Handle to one GPU buffer.
    type Bank;

    /// Creates a bank of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Gpu`] if the device refuses.
    fn create_bank(&mut self, capacity: u32) -> StrataResult<Self::Bank>;

    /// Maps `size` bytes at `offset` of `bank` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Gpu`] if the range cannot be mapped.
    fn map_range(&mut self, bank: &Self::Bank, offset: u32, size: u32) -> StrataResult<&mut [u8]>;

    /// Ends the mapping started by [`map_range`](Self::map_range).
    fn unmap(&mut self, bank: &Self::Bank);
}

/// Location of one mesh inside the bank set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankRange {
    /// Bank index, in creation order.
    pub bank: usize,
    /// Byte offset inside the bank.
    pub offset: u32,
    /// Reserved bytes (may exceed the mesh size).
    pub size: u32,
}

/// A live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsedRange {
    /// Sub-chunk whose mesh lives here.
    pub owner: SubChunkId,
    /// Byte offset.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

/// A hole below the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    /// Byte offset.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

impl FreeRange {
    #[inline]
    const fn end(self) -> u32 {
        self.offset + self.size
    }
}

/// Per-bank occupancy snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankStats {
    /// Bank size in bytes.
    pub capacity: u32,
    /// Highest byte ever handed out and not yet reclaimed.
    pub watermark: u32,
    /// Live meshes.
    pub used_ranges: usize,
    /// Bytes held by live meshes.
    pub used_bytes: u32,
    /// Holes below the watermark.
    pub free_ranges: usize,
    /// Bytes in those holes.
    pub free_bytes: u32,
    /// Largest contiguous free space, tail included.
    pub largest_free: u32,
}

struct GpuBank<B> {
    handle: B,
    capacity: u32,
    watermark: u32,
    /// Unordered; removal swaps with the last entry.
    used: Vec<UsedRange>,
    /// Sorted by offset, never adjacent to each other or to the watermark.
    free: Vec<FreeRange>,
}

impl<B> GpuBank<B> {
    fn new(handle: B, capacity: u32) -> Self {
        Self {
            handle,
            capacity,
            watermark: 0,
            used: Vec::new(),
            free: Vec::new(),
        }
    }

    /// First fit over the free list, then the tail. Returns `(offset, reserved)`.
    fn take(&mut self, size: u32) -> Option<(u32, u32)> {
        if let Some(pos) = self.free.iter().position(|range| range.size >= size) {
            let range = self.free[pos];
            if range.size - size < FRAGMENT_THRESHOLD {
                self.free.remove(pos);
                return Some((range.offset, range.size));
            }
            self.free[pos] = FreeRange {
                offset: range.offset + size,
                size: range.size - size,
            };
            return Some((range.offset, size));
        }

        if self.capacity - self.watermark >= size {
            let offset = self.watermark;
            self.watermark += size;
            return Some((offset, size));
        }
        None
    }

    fn fits(&self, size: u32) -> bool {
        self.capacity - self.watermark >= size || self.free.iter().any(|range| range.size >= size)
    }

    /// Inserts a range into the free list and coalesces it with its neighbors.
    fn give_back(&mut self, offset: u32, size: u32) {
        let pos = self.free.partition_point(|range| range.offset < offset);
        let mut merged = FreeRange { offset, size };
        let mut start = pos;
        let mut end = pos;

        if pos > 0 && self.free[pos - 1].end() == offset {
            start = pos - 1;
            merged.offset = self.free[start].offset;
            merged.size += self.free[start].size;
        }
        if pos < self.free.len() && self.free[pos].offset == offset + size {
            merged.size += self.free[pos].size;
            end = pos + 1;
        }

        for _ in start..end {
            self.free.remove(start);
        }
        if merged.end() == self.watermark {
            // last range below the watermark: shrink instead of keeping it
            self.watermark = merged.offset;
        } else {
            self.free.insert(start, merged);
        }
    }

    fn release(&mut self, owner: SubChunkId) -> Option<UsedRange> {
        let pos = self.used.iter().position(|range| range.owner == owner)?;
        let range = self.used.swap_remove(pos);
        self.give_back(range.offset, range.size);
        Some(range)
    }

    fn largest_free(&self) -> u32 {
        self.free
            .iter()
            .map(|range| range.size)
            .chain(std::iter::once(self.capacity - self.watermark))
            .max()
            .unwrap_or(0)
    }

    fn stats(&self) -> BankStats {
        BankStats {
            capacity: self.capacity,
            watermark: self.watermark,
            used_ranges: self.used.len(),
            used_bytes: self.used.iter().map(|range| range.size).sum(),
            free_ranges: self.free.len(),
            free_bytes: self.free.iter().map(|range| range.size).sum(),
            largest_free: self.largest_free(),
        }
    }

    fn validate(&self, index: usize) -> StrataResult<()> {
        let fail = |msg: String| Err(StrataError::Invariant(format!("bank {index}: {msg}")));

        let mut ranges: Vec<(u32, u32, bool)> = self
            .used
            .iter()
            .map(|range| (range.offset, range.size, true))
            .chain(self.free.iter().map(|range| (range.offset, range.size, false)))
            .collect();
        ranges.sort_unstable();

        let mut cursor = 0u32;
        for (offset, size, used) in ranges {
            if size == 0 {
                return fail(format!("empty range at {offset}"));
            }
            if offset != cursor {
                return fail(format!("gap or overlap at {offset}, expected {cursor}"));
            }
            if !used && offset + size == self.watermark {
                return fail(format!("free range at {offset} touches the watermark"));
            }
            cursor = offset + size;
        }
        if cursor != self.watermark {
            return fail(format!("ranges end at {cursor}, watermark is {}", self.watermark));
        }
        if self.watermark > self.capacity {
            return fail(format!("watermark {} beyond capacity {}", self.watermark, self.capacity));
        }
        if self.free.windows(2).any(|pair| pair[0].end() >= pair[1].offset) {
            return fail("free list not sorted and coalesced".into());
        }
        Ok(())
    }
}

/// First-fit allocator over a growable set of GPU banks.
///
/// # Example
///
/// ```rust,ignore
/// let mut ctx = HostGpuContext::new();
/// let mut banks = BankAllocator::new(1 << 20, 28);
///
/// let range = banks.alloc(&mut ctx, id, 28 * 600)?;
/// banks.free(id);
/// ```
pub struct BankAllocator<B> {
    banks: Vec<GpuBank<B>>,
    /// Owner to bank index, for O(1) lookup of the bank to scan.
    owners: HashMap<SubChunkId, usize>,
    min_bank_size: u32,
    record_size: u32,
}

impl<B> BankAllocator<B> {
    /// Creates an empty allocator.
    ///
    /// # Arguments
    ///
    /// * `min_bank_size` - Smallest bank ever created
    /// * `record_size` - Size of one mesh record; replacement ranges are
    ///   trimmed to a multiple of it
    #[must_use]
    pub fn new(min_bank_size: u32, record_size: u32) -> Self {
        Self {
            banks: Vec::new(),
            owners: HashMap::new(),
            min_bank_size: min_bank_size.max(BANK_GRANULARITY),
            record_size: record_size.max(1),
        }
    }

    /// Number of banks created so far.
    #[inline]
    #[must_use]
    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Number of live allocations.
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.owners.len()
    }

    /// Handle of bank `index`.
    #[must_use]
    pub fn bank_handle(&self, index: usize) -> Option<&B> {
        self.banks.get(index).map(|bank| &bank.handle)
    }

    /// Current range of `owner`, if any.
    #[must_use]
    pub fn range_of(&self, owner: SubChunkId) -> Option<BankRange> {
        let bank = *self.owners.get(&owner)?;
        self.banks[bank]
            .used
            .iter()
            .find(|range| range.owner == owner)
            .map(|range| BankRange {
                bank,
                offset: range.offset,
                size: range.size,
            })
    }

    /// Used ranges of one bank, in list order.
    #[must_use]
    pub fn used_ranges(&self, bank: usize) -> &[UsedRange] {
        self.banks.get(bank).map_or(&[], |bank| bank.used.as_slice())
    }

    /// Free ranges of one bank, sorted by offset.
    #[must_use]
    pub fn free_ranges(&self, bank: usize) -> &[FreeRange] {
        self.banks.get(bank).map_or(&[], |bank| bank.free.as_slice())
    }

    /// Size reserved when a mesh outgrows its current range: rounded up to
    /// [`RANGE_ROUNDING`], then trimmed to whole records.
    #[must_use]
    pub fn replacement_size(&self, size: u32) -> u32 {
        let rounded = size.div_ceil(RANGE_ROUNDING).saturating_mul(RANGE_ROUNDING);
        let trimmed = rounded - rounded % self.record_size;
        trimmed.max(size)
    }

    /// Reserves `size` bytes for `owner`.
    ///
    /// An owner that already has a range large enough keeps it. A larger mesh
    /// releases the old range and asks for [`replacement_size`](Self::replacement_size)
    /// bytes, leaving headroom for the next rebuild.
    ///
    /// # Errors
    ///
    /// - [`StrataError::EmptyAllocation`] if `size` is zero
    /// - [`StrataError::Gpu`] if a new bank was needed and could not be created
    pub fn alloc<C>(&mut self, ctx: &mut C, owner: SubChunkId, size: u32) -> StrataResult<BankRange>
    where
        C: GpuContext<Bank = B>,
    {
        if size == 0 {
            return Err(StrataError::EmptyAllocation(owner));
        }

        let mut request = size;
        if let Some(current) = self.range_of(owner) {
            if size <= current.size {
                return Ok(current);
            }
            self.free(owner);
            request = self.replacement_size(size);
        }

        if let Some(range) = self.place(owner, request) {
            return Ok(range);
        }
        self.grow_if_needed(ctx, request)?;
        self.place(owner, request)
            .ok_or(StrataError::BankExhausted { size: request })
    }

    fn place(&mut self, owner: SubChunkId, size: u32) -> Option<BankRange> {
        for (index, bank) in self.banks.iter_mut().enumerate() {
            if let Some((offset, reserved)) = bank.take(size) {
                bank.used.push(UsedRange {
                    owner,
                    offset,
                    size: reserved,
                });
                self.owners.insert(owner, index);
                return Some(BankRange {
                    bank: index,
                    offset,
                    size: reserved,
                });
            }
        }
        None
    }

    /// Adds a bank if no existing one can hold `size` contiguous bytes.
    ///
    /// New banks hold at least twice the request, rounded up to
    /// [`BANK_GRANULARITY`], and never less than the configured minimum.
    /// Returns true if a bank was created.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Gpu`] if the context fails to create the bank.
    pub fn grow_if_needed<C>(&mut self, ctx: &mut C, size: u32) -> StrataResult<bool>
    where
        C: GpuContext<Bank = B>,
    {
        if self.banks.iter().any(|bank| bank.fits(size)) {
            return Ok(false);
        }

        let doubled = size
            .checked_mul(2)
            .and_then(|bytes| bytes.checked_add(BANK_GRANULARITY - 1))
            .ok_or(StrataError::BankExhausted { size })?;
        let capacity = (doubled & !(BANK_GRANULARITY - 1)).max(self.min_bank_size);

        let handle = ctx.create_bank(capacity)?;
        self.banks.push(GpuBank::new(handle, capacity));
        tracing::info!(
            "created GPU bank #{} of {} KiB for a {} byte request",
            self.banks.len() - 1,
            capacity / 1024,
            size
        );
        Ok(true)
    }

    /// Releases the range owned by `owner`, coalescing it with free neighbors.
    ///
    /// Returns the released range, or `None` if the owner had none.
    pub fn free(&mut self, owner: SubChunkId) -> Option<BankRange> {
        let bank = self.owners.remove(&owner)?;
        let range = self.banks[bank].release(owner)?;
        Some(BankRange {
            bank,
            offset: range.offset,
            size: range.size,
        })
    }

    /// Forgets every allocation; banks are kept for reuse.
    pub fn clear(&mut self) {
        for bank in &mut self.banks {
            bank.used.clear();
            bank.free.clear();
            bank.watermark = 0;
        }
        self.owners.clear();
    }

    /// Occupancy of every bank.
    #[must_use]
    pub fn stats(&self) -> Vec<BankStats> {
        self.banks.iter().map(GpuBank::stats).collect()
    }

    /// Checks conservation and non-overlap on every bank.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Invariant`] describing the first violation.
    pub fn validate(&self) -> StrataResult<()> {
        for (index, bank) in self.banks.iter().enumerate() {
            bank.validate(index)?;
        }
        let tracked: usize = self.banks.iter().map(|bank| bank.used.len()).sum();
        if tracked != self.owners.len() {
            return Err(StrataError::Invariant(format!(
                "{} used ranges but {} owners",
                tracked,
                self.owners.len()
            )));
        }
        Ok(())
    }
}
