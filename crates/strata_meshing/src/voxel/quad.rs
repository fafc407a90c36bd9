//! The packed quad record the GPU consumes.
//!
//! ## Layout (7 little-endian words, 28 bytes)
//!
//! ```text
//! w0  origin X (0-15) | origin Y (16-31)                  fixed point
//! w1  origin Z (0-15) | edge U.x (16-27) | liquid edges (28-31)
//! w2  edge U.y (0-11) | edge U.z (12-23) | ALPHA 24 | DISCARDABLE 25
//! w3  edge V.x (0-11) | edge V.y (12-23)
//! w4  edge V.z (0-11) | tex U (12-21) | tex V (22-31)
//! w5  ambient occlusion (0-7) | REPEAT 8 | normal (9-11) | KEEPX 12
//!     DUAL_SIDE 13 | UNDERWATER 14 | TRIANGLE 15 | tex W (16-23) | tex H (24-31)
//! w6  light per vertex, one byte each (sky << 4 | block)
//! ```
//!
//! Positions are in 1/16 block units relative to the sub-chunk minimum
//! corner. The origin is stored as `units * 128 + 15360`; edges are 12-bit
//! values biased by 2048. Vertices go origin, origin+U, origin+U+V, origin+V
//! and occlusion and light bytes follow that order.

use bytemuck::{Pod, Zeroable};

use super::block::TexTile;
use super::chunk::Light;
use super::face::Face;

/// Words per quad.
pub const QUAD_WORDS: usize = 7;

/// Bytes per quad.
pub const QUAD_BYTES: usize = QUAD_WORDS * 4;

/// Position units per block.
pub const UNITS_PER_BLOCK: i32 = 16;

/// Fixed-point steps per position unit.
const FIXED_PER_UNIT: i32 = 128;

/// Fixed-point value of coordinate 0.
const ORIGIN_BIAS: i32 = 15360;

const EDGE_BIAS: i32 = 2048;
const EDGE_MASK: u32 = 0xfff;

/// Normal field value for quads with no face normal (crosses, slanted faces).
const NORMAL_NONE: u32 = 6;

const ALPHA_BIT: u32 = 1 << 24;
const DISCARD_BIT: u32 = 1 << 25;

/// One quad, ready to be copied to the GPU as-is.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedQuad {
    /// Raw words, see the module docs for the layout.
    pub words: [u32; QUAD_WORDS],
}

#[inline]
#[allow(clippy::cast_sign_loss)]
fn pack_origin(units: i32) -> u32 {
    (units * FIXED_PER_UNIT + ORIGIN_BIAS).clamp(0, 0xffff) as u32
}

#[inline]
#[allow(clippy::cast_possible_wrap)]
fn unpack_origin(bits: u32) -> i32 {
    ((bits & 0xffff) as i32 - ORIGIN_BIAS) / FIXED_PER_UNIT
}

#[inline]
#[allow(clippy::cast_sign_loss)]
fn pack_edge(units: i32) -> u32 {
    (units + EDGE_BIAS).clamp(0, EDGE_MASK as i32) as u32
}

#[inline]
#[allow(clippy::cast_possible_wrap)]
fn unpack_edge(bits: u32) -> i32 {
    (bits & EDGE_MASK) as i32 - EDGE_BIAS
}

impl PackedQuad {
    /// Texture repeats instead of stretching; tex W/H hold repeat counts.
    pub const FLAG_REPEAT: u32 = 1 << 8;
    /// Keep the texture X orientation regardless of the normal.
    pub const FLAG_KEEPX: u32 = 1 << 12;
    /// Render both sides.
    pub const FLAG_DUAL_SIDE: u32 = 1 << 13;
    /// Face is seen from inside a liquid.
    pub const FLAG_UNDERWATER: u32 = 1 << 14;
    /// Only the first three vertices are used.
    pub const FLAG_TRIANGLE: u32 = 1 << 15;

    /// Origin in units.
    #[inline]
    #[must_use]
    pub fn origin(&self) -> [i32; 3] {
        [
            unpack_origin(self.words[0]),
            unpack_origin(self.words[0] >> 16),
            unpack_origin(self.words[1]),
        ]
    }

    /// Origin in raw fixed point, as used for merge lookups.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn origin_fixed(&self) -> [u16; 3] {
        [
            self.words[0] as u16,
            (self.words[0] >> 16) as u16,
            self.words[1] as u16,
        ]
    }

    /// First edge in units.
    #[inline]
    #[must_use]
    pub fn edge_u(&self) -> [i32; 3] {
        [
            unpack_edge(self.words[1] >> 16),
            unpack_edge(self.words[2]),
            unpack_edge(self.words[2] >> 12),
        ]
    }

    /// Second edge in units.
    #[inline]
    #[must_use]
    pub fn edge_v(&self) -> [i32; 3] {
        [
            unpack_edge(self.words[3]),
            unpack_edge(self.words[3] >> 12),
            unpack_edge(self.words[4]),
        ]
    }

    /// The four vertex positions in units.
    #[must_use]
    pub fn corners(&self) -> [[i32; 3]; 4] {
        let o = self.origin();
        let u = self.edge_u();
        let v = self.edge_v();
        let add = |a: [i32; 3], b: [i32; 3]| [a[0] + b[0], a[1] + b[1], a[2] + b[2]];
        [o, add(o, u), add(add(o, u), v), add(o, v)]
    }

    /// Face normal, if the quad is axis-aligned.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn normal(&self) -> Option<Face> {
        Face::from_index(((self.words[5] >> 9) & 7) as u8)
    }

    /// Occlusion level (0-3) per vertex.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn occlusion(&self) -> [u8; 4] {
        let ocs = self.words[5];
        [
            (ocs & 3) as u8,
            ((ocs >> 2) & 3) as u8,
            ((ocs >> 4) & 3) as u8,
            ((ocs >> 6) & 3) as u8,
        ]
    }

    /// Light per vertex.
    #[inline]
    #[must_use]
    pub fn light(&self) -> [Light; 4] {
        let [a, b, c, d] = self.words[6].to_le_bytes();
        [a, b, c, d].map(|raw| Light::new(raw >> 4, raw & 0xf))
    }

    /// Texture origin in 1/16 tile units.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn tex_origin(&self) -> (u16, u16) {
        (
            ((self.words[4] >> 12) & 0x3ff) as u16,
            ((self.words[4] >> 22) & 0x3ff) as u16,
        )
    }

    /// Texture size in 1/16 tile units, or `None` for repeating quads.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn tex_size(&self) -> Option<(i32, i32)> {
        if self.has_flag(Self::FLAG_REPEAT) {
            return None;
        }
        let w = ((self.words[5] >> 16) & 0xff) as i32 - 128;
        let h = ((self.words[5] >> 24) & 0xff) as i32 - 128;
        Some((w, h))
    }

    /// Tile repeat counts along U and V for merged quads.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn repeat(&self) -> Option<(u8, u8)> {
        self.has_flag(Self::FLAG_REPEAT)
            .then(|| ((self.words[5] >> 16) as u8, (self.words[5] >> 24) as u8))
    }

    /// Liquid edge bits (which edges sit against the same liquid).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn liquid_edges(&self) -> u8 {
        (self.words[1] >> 28) as u8
    }

    /// True if `flag` (one of the `FLAG_*` constants) is set.
    #[inline]
    #[must_use]
    pub const fn has_flag(&self, flag: u32) -> bool {
        self.words[5] & flag != 0
    }

    /// True for quads rendered in the blended pass.
    #[inline]
    #[must_use]
    pub const fn is_alpha(&self) -> bool {
        self.words[2] & ALPHA_BIT != 0
    }

    /// True for quads that may be dropped by distant-detail renderers.
    #[inline]
    #[must_use]
    pub const fn is_discardable(&self) -> bool {
        self.words[2] & DISCARD_BIT != 0
    }

    /// Sets or clears the discardable bit.
    #[inline]
    pub fn set_discardable(&mut self, on: bool) {
        if on {
            self.words[2] |= DISCARD_BIT;
        } else {
            self.words[2] &= !DISCARD_BIT;
        }
    }

    /// Grows a unit quad to `w` by `h` unit quads with a repeating texture.
    pub fn widen(&mut self, w: u8, h: u8) {
        let scale = |e: [i32; 3], n: u8| e.map(|c| c * i32::from(n));
        let u = scale(self.edge_u(), w);
        let v = scale(self.edge_v(), h);

        self.words[1] = (self.words[1] & 0xf000_ffff) | (pack_edge(u[0]) << 16);
        self.words[2] = (self.words[2] & 0xff00_0000) | pack_edge(u[1]) | (pack_edge(u[2]) << 12);
        self.words[3] = (self.words[3] & 0xff00_0000) | pack_edge(v[0]) | (pack_edge(v[1]) << 12);
        self.words[4] = (self.words[4] & 0xffff_f000) | pack_edge(v[2]);
        self.words[5] = (self.words[5] & 0x0000_ffff)
            | Self::FLAG_REPEAT
            | (u32::from(w) << 16)
            | (u32::from(h) << 24);
    }

    /// Surface area in square units, for axis-aligned quads.
    #[must_use]
    pub fn area_units(&self) -> i64 {
        let len = |e: [i32; 3]| i64::from(e[0].abs() + e[1].abs() + e[2].abs());
        len(self.edge_u()) * len(self.edge_v())
    }

    /// Raw bytes in upload order.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Assembles a [`PackedQuad`] field by field.
#[derive(Debug, Clone, Copy)]
pub struct QuadBuilder {
    origin: [i32; 3],
    edge_u: [i32; 3],
    edge_v: [i32; 3],
    normal: Option<Face>,
    tex_u: u32,
    tex_v: u32,
    tex_w: i32,
    tex_h: i32,
    occlusion: [u8; 4],
    light: [Light; 4],
    flags: u32,
    alpha: bool,
    discardable: bool,
    liquid_edges: u8,
}

impl QuadBuilder {
    /// Starts a quad spanning `edge_u` and `edge_v` from `origin` (all in units).
    #[must_use]
    pub fn new(origin: [i32; 3], edge_u: [i32; 3], edge_v: [i32; 3]) -> Self {
        Self {
            origin,
            edge_u,
            edge_v,
            normal: None,
            tex_u: 0,
            tex_v: 0,
            tex_w: UNITS_PER_BLOCK,
            tex_h: UNITS_PER_BLOCK,
            occlusion: [0; 4],
            light: [Light::FULL_SKY; 4],
            flags: 0,
            alpha: false,
            discardable: false,
            liquid_edges: 0,
        }
    }

    /// Face normal.
    #[must_use]
    pub fn normal(mut self, face: Face) -> Self {
        self.normal = Some(face);
        self
    }

    /// Texture tile plus a sub-rectangle `[u, v, w, h]` in 1/16 tile units.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn texture(mut self, tile: TexTile, rect: [i32; 4]) -> Self {
        self.tex_u = (i32::from(tile.u) * UNITS_PER_BLOCK + rect[0]).clamp(0, 0x3ff) as u32;
        self.tex_v = (i32::from(tile.v) * UNITS_PER_BLOCK + rect[1]).clamp(0, 0x3ff) as u32;
        self.tex_w = rect[2];
        self.tex_h = rect[3];
        self
    }

    /// Occlusion level per vertex.
    #[must_use]
    pub fn occlusion(mut self, occlusion: [u8; 4]) -> Self {
        self.occlusion = occlusion;
        self
    }

    /// Light per vertex.
    #[must_use]
    pub fn light(mut self, light: [Light; 4]) -> Self {
        self.light = light;
        self
    }

    /// Adds `FLAG_*` bits.
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags |= flags;
        self
    }

    /// Marks the quad for the blended pass.
    #[must_use]
    pub fn alpha(mut self, on: bool) -> Self {
        self.alpha = on;
        self
    }

    /// Marks the quad as discardable.
    #[must_use]
    pub fn discardable(mut self, on: bool) -> Self {
        self.discardable = on;
        self
    }

    /// Liquid edge bits.
    #[must_use]
    pub fn liquid_edges(mut self, edges: u8) -> Self {
        self.liquid_edges = edges & 0xf;
        self
    }

    /// Packs the quad.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn build(self) -> PackedQuad {
        let ocs = self
            .occlusion
            .iter()
            .enumerate()
            .fold(0u32, |acc, (k, level)| acc | (u32::from(level & 3) << (k * 2)));
        let normal = self.normal.map_or(NORMAL_NONE, |face| face as u32);
        let tex_w = ((self.tex_w + 128).clamp(0, 0xff)) as u32;
        let tex_h = ((self.tex_h + 128).clamp(0, 0xff)) as u32;
        let mut extra = 0;
        if self.alpha {
            extra |= ALPHA_BIT;
        }
        if self.discardable {
            extra |= DISCARD_BIT;
        }

        PackedQuad {
            words: [
                pack_origin(self.origin[0]) | (pack_origin(self.origin[1]) << 16),
                pack_origin(self.origin[2])
                    | (pack_edge(self.edge_u[0]) << 16)
                    | (u32::from(self.liquid_edges) << 28),
                pack_edge(self.edge_u[1]) | (pack_edge(self.edge_u[2]) << 12) | extra,
                pack_edge(self.edge_v[0]) | (pack_edge(self.edge_v[1]) << 12),
                pack_edge(self.edge_v[2]) | (self.tex_u << 12) | (self.tex_v << 22),
                ocs | (normal << 9) | self.flags | (tex_w << 16) | (tex_h << 24),
                u32::from_le_bytes(self.light.map(Light::raw)),
            ],
        }
    }
}
