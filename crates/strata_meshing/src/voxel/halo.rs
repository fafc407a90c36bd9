//! A sub-chunk plus a one-voxel border copied from its 26 neighbors.
//!
//! The mesher only reads from this volume, so neighbor lookups never leave
//! one flat array and never touch the world while meshing.

use ndshape::{ConstShape, ConstShape3u32};
use strata_core::SubChunkId;

use super::chunk::{BlockState, Light, SubChunk, SUB_CHUNK_SIZE};
use super::world::WorldProvider;

/// Halo size per axis (16 + 2 for the neighbor border).
pub const HALO_SIZE: u32 = 18;

/// Shape of the halo array.
pub type HaloShape = ConstShape3u32<HALO_SIZE, HALO_SIZE, HALO_SIZE>;

/// Total voxels in the halo.
pub const HALO_VOLUME: usize = (HALO_SIZE * HALO_SIZE * HALO_SIZE) as usize;

/// Blocks and light of a sub-chunk and its border.
///
/// Coordinates are local to the center sub-chunk and range over `-1..=16`.
/// Border voxels of missing neighbors read as air under open sky.
pub struct HaloVolume {
    blocks: Box<[BlockState]>,
    light: Box<[Light]>,
}

impl Default for HaloVolume {
    fn default() -> Self {
        Self::new()
    }
}

impl HaloVolume {
    /// All air, full sky light.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: vec![BlockState::AIR; HALO_VOLUME].into_boxed_slice(),
            light: vec![Light::FULL_SKY; HALO_VOLUME].into_boxed_slice(),
        }
    }

    /// Index of a local coordinate in `-1..=16`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn index(x: i32, y: i32, z: i32) -> usize {
        HaloShape::linearize([(x + 1) as u32, (y + 1) as u32, (z + 1) as u32]) as usize
    }

    /// Block at a local coordinate; anything outside the halo reads as air.
    #[inline]
    #[must_use]
    pub fn block(&self, x: i32, y: i32, z: i32) -> BlockState {
        if Self::in_bounds(x, y, z) {
            self.blocks[Self::index(x, y, z)]
        } else {
            BlockState::AIR
        }
    }

    /// Light at a local coordinate.
    #[inline]
    #[must_use]
    pub fn light(&self, x: i32, y: i32, z: i32) -> Light {
        if Self::in_bounds(x, y, z) {
            self.light[Self::index(x, y, z)]
        } else {
            Light::FULL_SKY
        }
    }

    /// Writes a voxel at a local coordinate; out-of-range writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, z: i32, block: BlockState, light: Light) {
        if Self::in_bounds(x, y, z) {
            let index = Self::index(x, y, z);
            self.blocks[index] = block;
            self.light[index] = light;
        }
    }

    #[inline]
    fn in_bounds(x: i32, y: i32, z: i32) -> bool {
        (-1..=16).contains(&x) && (-1..=16).contains(&y) && (-1..=16).contains(&z)
    }

    /// Resets to air under open sky, keeping the allocation.
    pub fn clear(&mut self) {
        self.blocks.fill(BlockState::AIR);
        self.light.fill(Light::FULL_SKY);
    }

    /// Copies the part of `chunk` that lands in the halo when it sits at
    /// offset `(dx, dy, dz)` from the center (each in `-1..=1`).
    #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
    pub fn copy_from(&mut self, chunk: &SubChunk, dx: i32, dy: i32, dz: i32) {
        const N: i32 = SUB_CHUNK_SIZE as i32;
        let span = |d: i32| match d {
            -1 => (N - 1)..N,
            0 => 0..N,
            _ => 0..1,
        };
        for ly in span(dy) {
            for lz in span(dz) {
                for lx in span(dx) {
                    let (x, y, z) = (lx + dx * N, ly + dy * N, lz + dz * N);
                    let index = Self::index(x, y, z);
                    let (ux, uy, uz) = (lx as usize, ly as usize, lz as usize);
                    self.blocks[index] = chunk.block(ux, uy, uz);
                    self.light[index] = chunk.light(ux, uy, uz);
                }
            }
        }
    }

    /// Fills the halo for `id` from resident world data.
    ///
    /// Returns `false` if the center sub-chunk is not resident; the halo is
    /// then all air.
    pub fn gather(&mut self, world: &dyn WorldProvider, id: SubChunkId) -> bool {
        self.clear();
        let mut center = false;
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    if let Some(chunk) = world.sub_chunk(id.offset(dx, dy, dz)) {
                        self.copy_from(&chunk, dx, dy, dz);
                        center |= (dx, dy, dz) == (0, 0, 0);
                    }
                }
            }
        }
        center
    }

    /// Builds a halo around a lone sub-chunk with no neighbors.
    #[must_use]
    pub fn isolated(chunk: &SubChunk) -> Self {
        let mut halo = Self::new();
        halo.copy_from(chunk, 0, 0, 0);
        halo
    }
}
