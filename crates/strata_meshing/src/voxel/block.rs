//! Block rendering properties as the mesher sees them.

use serde::{Deserialize, Serialize};

use super::chunk::BlockState;
use super::face::{Face, FaceSet};
use super::model::CustomModel;

/// How a block turns into geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderKind {
    /// Nothing is drawn (air, barriers).
    #[default]
    Invisible,
    /// Up to six faces, shaped by [`Shape`].
    Cube,
    /// Two crossed diagonal quads (plants).
    Cross,
    /// Faces from a [`CustomModel`].
    Custom,
}

/// Atlas tile coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TexTile {
    /// Column in the atlas (0-63).
    pub u: u8,
    /// Row in the atlas (0-63).
    pub v: u8,
}

impl TexTile {
    /// Creates a tile reference.
    #[inline]
    #[must_use]
    pub const fn new(u: u8, v: u8) -> Self {
        Self { u, v }
    }
}

/// Rendering flags of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockFlags(u8);

impl BlockFlags {
    /// No flag.
    pub const NONE: Self = Self(0);
    /// Goes to the blended pass.
    pub const ALPHA: Self = Self(1);
    /// Liquid surface rules: dual-sided, lowered top, culls against itself.
    pub const LIQUID: Self = Self(1 << 1);
    /// Leaves never cull against neighbors; leaf-leaf faces are discardable.
    pub const LEAVES: Self = Self(1 << 2);
    /// Translucent block whose faces vanish against the same block (glass).
    pub const CULL_SAME: Self = Self(1 << 3);

    /// True if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: BlockFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union.
    #[inline]
    #[must_use]
    pub const fn with(self, other: BlockFlags) -> BlockFlags {
        BlockFlags(self.0 | other.0)
    }

    /// True if the block is not an opaque full occluder because of a flag.
    #[inline]
    #[must_use]
    pub const fn is_translucent(self) -> bool {
        self.0 != 0
    }
}

/// Occupancy of a block as a 2x2x2 grid of half-block octants.
///
/// Bit `x | z << 1 | y << 2` is set when that octant is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape(u8);

impl Default for Shape {
    fn default() -> Self {
        Self::FULL
    }
}

impl Shape {
    /// Whole block.
    pub const FULL: Shape = Shape(0xff);
    /// Nothing.
    pub const EMPTY: Shape = Shape(0);
    /// Lower half.
    pub const SLAB_BOTTOM: Shape = Shape(0x0f);
    /// Upper half.
    pub const SLAB_TOP: Shape = Shape(0xf0);

    /// Shape from raw octant bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw octant bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Bit index of an octant.
    #[inline]
    #[must_use]
    pub const fn octant_bit(x: usize, y: usize, z: usize) -> u8 {
        1 << (x | (z << 1) | (y << 2))
    }

    /// True if the octant is filled.
    #[inline]
    #[must_use]
    pub const fn octant(self, x: usize, y: usize, z: usize) -> bool {
        self.0 & Self::octant_bit(x, y, z) != 0
    }

    /// Stairs: a slab plus the half of the other layer on the `ascend` side.
    ///
    /// `upside_down` swaps which layer is the slab.
    #[must_use]
    pub fn stairs(ascend: Face, upside_down: bool) -> Shape {
        let (slab, step_y) = if upside_down {
            (Self::SLAB_TOP, 0)
        } else {
            (Self::SLAB_BOTTOM, 1)
        };
        let mut bits = slab.0;
        for x in 0..2 {
            for z in 0..2 {
                let on_side = match ascend {
                    Face::South => z == 1,
                    Face::North => z == 0,
                    Face::East => x == 1,
                    Face::West => x == 0,
                    Face::Top | Face::Bottom => true,
                };
                if on_side {
                    bits |= Self::octant_bit(x, step_y, z);
                }
            }
        }
        Shape(bits)
    }

    /// True if the four octants touching `face` are all filled.
    #[must_use]
    pub fn covers(self, face: Face) -> bool {
        let axis = face.normal_axis();
        let layer = usize::from(face.is_positive());
        (0..8usize).all(|bit| {
            let coords = [bit & 1, bit >> 2, (bit >> 1) & 1];
            coords[axis] != layer || self.0 & (1 << bit) != 0
        })
    }

    /// Faces this shape completely covers.
    #[must_use]
    pub fn occlusion_mask(self) -> FaceSet {
        Face::ALL.into_iter().filter(|face| self.covers(*face)).collect()
    }
}

/// Read-only block catalog the mesher queries per voxel.
///
/// Implementations must be cheap to query and safe to share between worker
/// threads.
pub trait BlockCatalog: Send + Sync {
    /// How the block is drawn.
    fn render_kind(&self, block: BlockState) -> RenderKind;

    /// Atlas tile for one face of the block.
    fn face_texture(&self, block: BlockState, face: Face) -> TexTile;

    /// Model for [`RenderKind::Custom`] blocks.
    fn custom_model(&self, block: BlockState) -> Option<&CustomModel>;

    /// True for opaque full cubes: they stop cave floods, darken corners and
    /// hide every neighboring face.
    fn is_fully_solid(&self, block: BlockState) -> bool;

    /// Drawn geometry of a [`RenderKind::Cube`] block.
    fn shape(&self, block: BlockState) -> Shape;

    /// Rendering flags.
    fn flags(&self, block: BlockState) -> BlockFlags;

    /// Group for connecting models (fences join fences of the same group).
    fn connect_group(&self, _block: BlockState) -> Option<u8> {
        None
    }

    /// Octants that hide neighboring faces.
    fn occluder(&self, block: BlockState) -> Shape {
        if self.is_fully_solid(block) {
            Shape::FULL
        } else {
            Shape::EMPTY
        }
    }

    /// Faces of the block that fully hide the touching neighbor face.
    fn occlusion(&self, block: BlockState) -> FaceSet {
        self.occluder(block).occlusion_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_and_slab_cover() {
        assert_eq!(Shape::FULL.occlusion_mask(), FaceSet::ALL);
        assert!(Shape::EMPTY.occlusion_mask().is_empty());

        let slab = Shape::SLAB_BOTTOM.occlusion_mask();
        assert_eq!(slab, [Face::Bottom].into_iter().collect());
        assert!(Shape::SLAB_TOP.covers(Face::Top));
        assert!(!Shape::SLAB_TOP.covers(Face::South));
    }

    #[test]
    fn test_stairs_cover_back_and_bottom() {
        let stairs = Shape::stairs(Face::South, false);
        assert_eq!(stairs.bits().count_ones(), 6);
        assert!(stairs.covers(Face::Bottom));
        assert!(stairs.covers(Face::South));
        assert!(!stairs.covers(Face::North));
        assert!(!stairs.covers(Face::Top));

        let flipped = Shape::stairs(Face::West, true);
        assert!(flipped.covers(Face::Top));
        assert!(flipped.covers(Face::West));
        assert!(!flipped.covers(Face::Bottom));
    }

    #[test]
    fn test_flags() {
        let flags = BlockFlags::ALPHA.with(BlockFlags::LIQUID);
        assert!(flags.contains(BlockFlags::LIQUID));
        assert!(!flags.contains(BlockFlags::LEAVES));
        assert!(flags.is_translucent());
        assert!(!BlockFlags::NONE.is_translucent());
    }
}
