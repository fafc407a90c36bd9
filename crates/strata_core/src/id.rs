//! Sub-chunk identity.

use std::fmt;

/// Identifies one 16x16x16 sub-chunk: chunk column (X, Z) plus vertical layer Y.
///
/// All three coordinates are in sub-chunk units, so `(1, 0, 0)` is the
/// sub-chunk whose first voxel sits at world X = 16.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubChunkId {
    /// Column X.
    pub x: i32,
    /// Layer index.
    pub y: i32,
    /// Column Z.
    pub z: i32,
}

impl SubChunkId {
    /// Creates a new sub-chunk id.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns the id displaced by the given amount of sub-chunks.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// 32-bit tag written into staging slot headers.
    ///
    /// FNV-1a over the three coordinates; only used to cross-check that a
    /// chain being drained still belongs to the owner the arena recorded.
    #[must_use]
    pub fn tag(self) -> u32 {
        let mut hash: u32 = 0x811c_9dc5;
        for coord in [self.x, self.y, self.z] {
            for byte in coord.to_le_bytes() {
                hash ^= u32::from(byte);
                hash = hash.wrapping_mul(0x0100_0193);
            }
        }
        hash
    }
}

impl fmt::Display for SubChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}
