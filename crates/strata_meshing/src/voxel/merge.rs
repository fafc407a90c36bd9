//! Open hash table of unit quads keyed by position, normal and texture.
//!
//! Entries live in one arena in insertion order; buckets hold the index of
//! the newest entry and each entry links to the next one in its chain. A
//! reset keeps both allocations, so a worker's table reaches its working
//! size once and stays there.

use super::quad::PackedQuad;

const NIL: u32 = u32::MAX;

/// Smallest bucket count.
const MIN_BUCKETS: usize = 256;

/// Fixed-point step of one block along any axis.
const FIXED_PER_BLOCK: i32 = 2048;

/// What makes two quads candidates for merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuadKey {
    /// Origin in packed fixed point.
    pub origin: [u16; 3],
    /// Packed normal field.
    pub normal: u8,
    /// Packed texture origin.
    pub tex: u32,
}

impl QuadKey {
    /// Key of a packed quad.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn of(quad: &PackedQuad) -> Self {
        Self {
            origin: quad.origin_fixed(),
            normal: ((quad.words[5] >> 9) & 7) as u8,
            tex: quad.words[4] >> 12,
        }
    }

    /// Same key moved by `blocks` whole blocks along `axis`.
    ///
    /// Returns `None` if the result leaves the fixed-point range.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn shifted(&self, axis: usize, blocks: i32) -> Option<Self> {
        let moved = i32::from(self.origin[axis]) + blocks * FIXED_PER_BLOCK;
        if !(0..=0xffff).contains(&moved) {
            return None;
        }
        let mut key = *self;
        key.origin[axis] = moved as u16;
        Some(key)
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn hash(&self) -> u32 {
        let mut h = u64::from(self.origin[0])
            | u64::from(self.origin[1]) << 16
            | u64::from(self.origin[2]) << 32
            | u64::from(self.normal) << 48;
        h ^= u64::from(self.tex).rotate_left(29);
        h = h.wrapping_mul(0x9e37_79b9_7f4a_7c15);
        (h >> 32) as u32
    }
}

/// Index of an entry, stable until the next reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryHandle(u32);

impl EntryHandle {
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub(super) const fn at(index: usize) -> Self {
        Self(index as u32)
    }

    /// Insertion index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

struct Entry {
    quad: PackedQuad,
    key: QuadKey,
    next: u32,
    absorbed: bool,
}

/// Merge candidates of one sub-chunk.
pub struct QuadMergeTable {
    buckets: Vec<u32>,
    entries: Vec<Entry>,
}

impl Default for QuadMergeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl QuadMergeTable {
    /// Creates a table with the minimum bucket count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MIN_BUCKETS)
    }

    /// Creates a table sized for `quads` entries without growing.
    #[must_use]
    pub fn with_capacity(quads: usize) -> Self {
        let buckets = (quads * 4 / 3 + 1).next_power_of_two().max(MIN_BUCKETS);
        Self {
            buckets: vec![NIL; buckets],
            entries: Vec::with_capacity(quads),
        }
    }

    /// Number of entries, absorbed ones included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was added since the last reset.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current bucket count.
    #[inline]
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, key: &QuadKey) -> usize {
        key.hash() as usize & (self.buckets.len() - 1)
    }

    /// Adds a quad and returns its handle.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add(&mut self, quad: PackedQuad) -> EntryHandle {
        if (self.entries.len() + 1) * 4 > self.buckets.len() * 3 {
            self.grow();
        }
        let key = QuadKey::of(&quad);
        let bucket = self.bucket_of(&key);
        let handle = self.entries.len() as u32;
        self.entries.push(Entry {
            quad,
            key,
            next: self.buckets[bucket],
            absorbed: false,
        });
        self.buckets[bucket] = handle;
        EntryHandle(handle)
    }

    /// Doubles the bucket count and relinks every entry in insertion order.
    #[allow(clippy::cast_possible_truncation)]
    fn grow(&mut self) {
        let size = self.buckets.len() * 2;
        self.buckets.clear();
        self.buckets.resize(size, NIL);
        for index in 0..self.entries.len() {
            let bucket = self.bucket_of(&self.entries[index].key);
            self.entries[index].next = self.buckets[bucket];
            self.buckets[bucket] = index as u32;
        }
    }

    /// Newest entry with `key`, absorbed or not.
    #[must_use]
    pub fn find(&self, key: &QuadKey) -> Option<EntryHandle> {
        let mut cursor = self.buckets[self.bucket_of(key)];
        while cursor != NIL {
            let entry = &self.entries[cursor as usize];
            if entry.key == *key {
                return Some(EntryHandle(cursor));
            }
            cursor = entry.next;
        }
        None
    }

    /// Quad behind a handle.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: EntryHandle) -> &PackedQuad {
        &self.entries[handle.index()].quad
    }

    /// Mutable quad behind a handle. Changing position, normal or texture
    /// does not rehash the entry.
    #[inline]
    pub fn get_mut(&mut self, handle: EntryHandle) -> &mut PackedQuad {
        &mut self.entries[handle.index()].quad
    }

    /// True once the entry was merged into another.
    #[inline]
    #[must_use]
    pub fn is_absorbed(&self, handle: EntryHandle) -> bool {
        self.entries[handle.index()].absorbed
    }

    /// Marks the entry as merged into another.
    #[inline]
    pub fn absorb(&mut self, handle: EntryHandle) {
        self.entries[handle.index()].absorbed = true;
    }

    /// All handles in insertion order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn handles(&self) -> impl Iterator<Item = EntryHandle> {
        (0..self.entries.len() as u32).map(EntryHandle)
    }

    /// Entries not absorbed, in insertion order.
    pub fn survivors(&self) -> impl Iterator<Item = &PackedQuad> {
        self.entries
            .iter()
            .filter(|entry| !entry.absorbed)
            .map(|entry| &entry.quad)
    }

    /// Forgets every entry, keeping both allocations.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.buckets.fill(NIL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::face::Face;
    use crate::voxel::greedy_mesh::merge_coplanar;
    use crate::voxel::quad::QuadBuilder;

    fn unit(x: i32, z: i32) -> PackedQuad {
        unit_at(x, 1, z)
    }

    fn unit_at(x: i32, y: i32, z: i32) -> PackedQuad {
        QuadBuilder::new([x * 16, y * 16, z * 16], [16, 0, 0], [0, 0, 16])
            .normal(Face::Top)
            .build()
    }

    /// Three ragged layers of top faces, 600-odd quads.
    fn ragged_layers() -> Vec<PackedQuad> {
        let mut quads = Vec::new();
        for y in 0..3 {
            for z in 0..16 {
                for x in 0..16 {
                    if (x * 3 + z * 5 + y) % 7 != 0 {
                        quads.push(unit_at(x, y, z));
                    }
                }
            }
        }
        quads
    }

    #[test]
    fn test_add_find() {
        let mut table = QuadMergeTable::new();
        let a = table.add(unit(0, 0));
        let b = table.add(unit(1, 0));

        assert_eq!(table.find(&QuadKey::of(&unit(0, 0))), Some(a));
        assert_eq!(table.find(&QuadKey::of(&unit(1, 0))), Some(b));
        assert_eq!(table.find(&QuadKey::of(&unit(2, 0))), None);

        let shifted = QuadKey::of(&unit(0, 0)).shifted(0, 1).unwrap();
        assert_eq!(table.find(&shifted), Some(b));
    }

    #[test]
    fn test_growth_keeps_entries_findable() {
        let mut table = QuadMergeTable::with_capacity(4);
        let initial = table.bucket_count();
        for x in 0..16 {
            for z in 0..16 {
                table.add(unit(x, z));
            }
        }
        assert!(table.bucket_count() > initial);
        assert_eq!(table.len(), 256);
        for (i, handle) in table.handles().enumerate() {
            assert_eq!(handle.index(), i);
            assert_eq!(table.find(&QuadKey::of(table.get(handle))), Some(handle));
        }
    }

    #[test]
    fn test_growth_keeps_merge_order() {
        let quads = ragged_layers();
        let mut grown = QuadMergeTable::with_capacity(4);
        let mut sized = QuadMergeTable::with_capacity(quads.len());
        let initial = grown.bucket_count();
        for quad in &quads {
            grown.add(*quad);
            sized.add(*quad);
        }
        assert!(grown.bucket_count() >= initial * 4, "table grew only to {}", grown.bucket_count());
        assert_eq!(sized.bucket_count(), grown.bucket_count());

        let absorbed = merge_coplanar(&mut grown);
        assert_eq!(merge_coplanar(&mut sized), absorbed);
        assert!(absorbed > 0);
        let a: Vec<PackedQuad> = grown.survivors().copied().collect();
        let b: Vec<PackedQuad> = sized.survivors().copied().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reset_keeps_capacity() {
        let mut table = QuadMergeTable::with_capacity(1000);
        let buckets = table.bucket_count();
        let h = table.add(unit(3, 3));
        table.absorb(h);
        assert_eq!(table.survivors().count(), 0);

        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), buckets);
        assert_eq!(table.find(&QuadKey::of(&unit(3, 3))), None);
    }
}
