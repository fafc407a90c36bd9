//! Sub-chunk block and light storage.
//!
//! Sub-chunks are 16x16x16 voxels; the mesher never sees anything larger.

use bytemuck::{Pod, Zeroable};

/// Sub-chunk dimension - 16 voxels per axis.
pub const SUB_CHUNK_SIZE: usize = 16;

/// Total voxels per sub-chunk.
pub const SUB_CHUNK_VOLUME: usize = SUB_CHUNK_SIZE * SUB_CHUNK_SIZE * SUB_CHUNK_SIZE;

/// A block id plus its 4-bit metadata, packed into 2 bytes.
///
/// Layout:
/// - Bits 0-3: Metadata (orientation, variant)
/// - Bits 4-15: Block id (4096 ids, 0 = air)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable, PartialEq, Eq, Hash)]
pub struct BlockState(u16);

impl BlockState {
    /// Air - the only block that is always invisible.
    pub const AIR: Self = Self(0);

    /// Largest valid block id.
    pub const MAX_ID: u16 = 0x0fff;

    /// Creates a state from id and metadata.
    ///
    /// Ids above [`MAX_ID`](Self::MAX_ID) and metadata above 15 are masked.
    #[inline]
    #[must_use]
    pub const fn new(id: u16, meta: u8) -> Self {
        Self(((id & Self::MAX_ID) << 4) | (meta as u16 & 0xf))
    }

    /// Block id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> u16 {
        self.0 >> 4
    }

    /// Metadata nibble.
    #[inline]
    #[must_use]
    pub const fn meta(self) -> u8 {
        (self.0 & 0xf) as u8
    }

    /// True for air.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.id() == 0
    }

    /// Raw packed value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// Sky and block light of one voxel.
///
/// Layout:
/// - Bits 0-3: Block light (0-15)
/// - Bits 4-7: Sky light (0-15)
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable, PartialEq, Eq, Hash)]
pub struct Light(u8);

impl Light {
    /// Open sky, no torches.
    pub const FULL_SKY: Self = Self(0xf0);

    /// Pitch dark.
    pub const DARK: Self = Self(0);

    /// Creates a light value; both levels are clamped to 15.
    #[inline]
    #[must_use]
    pub const fn new(sky: u8, block: u8) -> Self {
        let sky = if sky > 15 { 15 } else { sky };
        let block = if block > 15 { 15 } else { block };
        Self((sky << 4) | block)
    }

    /// Sky light level.
    #[inline]
    #[must_use]
    pub const fn sky(self) -> u8 {
        self.0 >> 4
    }

    /// Block light level.
    #[inline]
    #[must_use]
    pub const fn block(self) -> u8 {
        self.0 & 0xf
    }

    /// Raw packed value, as stored per vertex in a quad.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// A 16x16x16 block of voxels with per-voxel light.
///
/// Voxels are stored in Y-Z-X order: `index = x + z * 16 + y * 256`, so a
/// horizontal layer is contiguous.
#[derive(Clone)]
pub struct SubChunk {
    blocks: Box<[BlockState]>,
    light: Box<[Light]>,
    /// Non-air voxels, for quick empty checks.
    solid_count: u32,
}

impl Default for SubChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SubChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubChunk")
            .field("solid_count", &self.solid_count)
            .finish_non_exhaustive()
    }
}

impl SubChunk {
    /// Creates an all-air sub-chunk under open sky.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: vec![BlockState::AIR; SUB_CHUNK_VOLUME].into_boxed_slice(),
            light: vec![Light::FULL_SKY; SUB_CHUNK_VOLUME].into_boxed_slice(),
            solid_count: 0,
        }
    }

    /// Creates a sub-chunk where every voxel is `block` and unlit.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn filled(block: BlockState) -> Self {
        let (light, solid_count) = if block.is_air() {
            (Light::FULL_SKY, 0)
        } else {
            (Light::DARK, SUB_CHUNK_VOLUME as u32)
        };
        Self {
            blocks: vec![block; SUB_CHUNK_VOLUME].into_boxed_slice(),
            light: vec![light; SUB_CHUNK_VOLUME].into_boxed_slice(),
            solid_count,
        }
    }

    /// Linear index of a local coordinate.
    #[inline]
    #[must_use]
    pub const fn index(x: usize, y: usize, z: usize) -> usize {
        x + z * SUB_CHUNK_SIZE + y * SUB_CHUNK_SIZE * SUB_CHUNK_SIZE
    }

    /// Block at a local coordinate.
    ///
    /// # Panics
    ///
    /// Panics if a coordinate is 16 or more.
    #[inline]
    #[must_use]
    pub fn block(&self, x: usize, y: usize, z: usize) -> BlockState {
        self.blocks[Self::index(x, y, z)]
    }

    /// Light at a local coordinate.
    #[inline]
    #[must_use]
    pub fn light(&self, x: usize, y: usize, z: usize) -> Light {
        self.light[Self::index(x, y, z)]
    }

    /// Sets the block at a local coordinate.
    #[inline]
    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: BlockState) {
        let slot = &mut self.blocks[Self::index(x, y, z)];
        match (slot.is_air(), block.is_air()) {
            (true, false) => self.solid_count += 1,
            (false, true) => self.solid_count -= 1,
            _ => {}
        }
        *slot = block;
    }

    /// Sets the light at a local coordinate.
    #[inline]
    pub fn set_light(&mut self, x: usize, y: usize, z: usize, light: Light) {
        self.light[Self::index(x, y, z)] = light;
    }

    /// Sets every voxel's light.
    pub fn fill_light(&mut self, light: Light) {
        self.light.fill(light);
    }

    /// All blocks in storage order.
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[BlockState] {
        &self.blocks
    }

    /// All light values in storage order.
    #[inline]
    #[must_use]
    pub fn lights(&self) -> &[Light] {
        &self.light
    }

    /// Number of non-air voxels.
    #[inline]
    #[must_use]
    pub const fn solid_count(&self) -> u32 {
        self.solid_count
    }

    /// True if every voxel is air.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.solid_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_state_packing() {
        let state = BlockState::new(300, 7);
        assert_eq!(state.id(), 300);
        assert_eq!(state.meta(), 7);
        assert!(!state.is_air());
        assert!(BlockState::new(0, 3).is_air());
        assert_eq!(BlockState::new(0x1fff, 0x1f).id(), BlockState::MAX_ID);
    }

    #[test]
    fn test_light_clamps() {
        let light = Light::new(20, 9);
        assert_eq!(light.sky(), 15);
        assert_eq!(light.block(), 9);
        assert_eq!(Light::FULL_SKY.raw(), 0xf0);
    }

    #[test]
    fn test_solid_count_tracks_edits() {
        let mut chunk = SubChunk::new();
        assert!(chunk.is_empty());

        chunk.set_block(1, 2, 3, BlockState::new(1, 0));
        chunk.set_block(1, 2, 3, BlockState::new(2, 0));
        assert_eq!(chunk.solid_count(), 1);
        assert_eq!(chunk.block(1, 2, 3).id(), 2);

        chunk.set_block(1, 2, 3, BlockState::AIR);
        assert!(chunk.is_empty());
        assert_eq!(SubChunk::filled(BlockState::new(1, 0)).solid_count(), 4096);
    }

    #[test]
    fn test_layer_is_contiguous() {
        assert_eq!(SubChunk::index(15, 0, 15), 255);
        assert_eq!(SubChunk::index(0, 1, 0), 256);
    }
}
