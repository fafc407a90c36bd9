//! Sub-chunk mesher.
//!
//! Walks the 4096 voxels of a [`HaloVolume`] center in Y, Z, X order and
//! writes one quad per visible face:
//!
//! - **Cubes** cull against neighbor occluders and get per-vertex ambient
//!   occlusion and smooth light. Opaque unit faces go through the merge
//!   table and come out greedy-merged after the walk.
//! - **Half blocks and stairs** emit one quad per exposed octant face.
//! - **Crosses** emit two dual-sided diagonal quads.
//! - **Custom models** emit the faces their neighbor connections allow.
//!
//! Blended faces go to the alpha sink; everything else to the opaque sink,
//! discardable leaf faces into its discard region.

use strata_core::StrataResult;

use super::block::{BlockCatalog, BlockFlags, RenderKind, Shape};
use super::cave::{CaveFlood, CaveGraph};
use super::chunk::{BlockState, Light, SUB_CHUNK_SIZE};
use super::face::Face;
use super::greedy_mesh::merge_coplanar;
use super::halo::HaloVolume;
use super::merge::QuadMergeTable;
use super::model::box_face;
use super::quad::{PackedQuad, QuadBuilder, UNITS_PER_BLOCK};
use super::sink::MeshSink;

#[allow(clippy::cast_possible_wrap)]
const EXTENT: i32 = SUB_CHUNK_SIZE as i32;

/// Half a block in units.
const HALF: i32 = UNITS_PER_BLOCK / 2;

/// How far a liquid surface sits below the block top, in units.
const LIQUID_DROP: i32 = 2;

/// In-plane step signs of the four quad vertices.
const CORNER_SIGNS: [(i32, i32); 4] = [(-1, -1), (1, -1), (1, 1), (-1, 1)];

/// Summary of one meshing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshOutcome {
    /// Quads written to the opaque sink's normal region.
    pub quads: usize,
    /// Quads written to the opaque sink's discard region.
    pub discardable: usize,
    /// Quads written to the alpha sink.
    pub alpha_quads: usize,
    /// Unit quads absorbed by greedy merging.
    pub merged: usize,
    /// True if all alpha quads lie in one plane per normal, so the alpha
    /// pass needs no sorting.
    pub alpha_coplanar: bool,
    /// Face connectivity through the sub-chunk.
    pub cave: CaveGraph,
    /// True if the sub-chunk holds only air.
    pub air_only: bool,
}

impl Default for MeshOutcome {
    fn default() -> Self {
        Self {
            quads: 0,
            discardable: 0,
            alpha_quads: 0,
            merged: 0,
            alpha_coplanar: true,
            cave: CaveGraph::OPEN,
            air_only: true,
        }
    }
}

impl MeshOutcome {
    /// Every quad written, in both sinks.
    #[inline]
    #[must_use]
    pub const fn total_quads(&self) -> usize {
        self.quads + self.discardable + self.alpha_quads
    }

    /// True if nothing is drawn.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_quads() == 0
    }
}

/// Tracks whether quads stay on one plane per normal.
struct Coplanar {
    planes: [Option<u16>; 6],
    flat: bool,
}

impl Coplanar {
    const fn new() -> Self {
        Self {
            planes: [None; 6],
            flat: true,
        }
    }

    fn observe(&mut self, quad: &PackedQuad) {
        let Some(face) = quad.normal() else {
            self.flat = false;
            return;
        };
        let plane = quad.origin_fixed()[face.normal_axis()];
        match self.planes[face.index()] {
            None => self.planes[face.index()] = Some(plane),
            Some(seen) if seen != plane => self.flat = false,
            Some(_) => {}
        }
    }
}

#[inline]
fn add(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
fn scale(a: [i32; 3], s: i32) -> [i32; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

/// Smooth light: brightest block light, dimmest non-zero sky light.
fn blend(front: Light, samples: &[Light]) -> Light {
    let mut sky = front.sky();
    let mut block = front.block();
    for sample in samples {
        block = block.max(sample.block());
        if sample.sky() > 0 && (sky == 0 || sample.sky() < sky) {
            sky = sample.sky();
        }
    }
    Light::new(sky, block)
}

/// Where an emitted quad goes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Opaque unit face, eligible for merging.
    Merge,
    /// Opaque sink, discard region if the quad is discardable.
    Opaque,
    /// Alpha sink.
    Alpha,
}

/// State of one meshing pass.
struct Pass<'a> {
    halo: &'a HaloVolume,
    catalog: &'a dyn BlockCatalog,
    opaque: &'a mut dyn MeshSink,
    alpha: &'a mut dyn MeshSink,
    table: Option<&'a mut QuadMergeTable>,
    outcome: MeshOutcome,
    coplanar: Coplanar,
}

impl<'a> Pass<'a> {
    #[inline]
    fn block(&self, p: [i32; 3]) -> BlockState {
        self.halo.block(p[0], p[1], p[2])
    }

    #[inline]
    fn light(&self, p: [i32; 3]) -> Light {
        self.halo.light(p[0], p[1], p[2])
    }

    #[inline]
    fn solid(&self, p: [i32; 3]) -> bool {
        self.catalog.is_fully_solid(self.block(p))
    }

    fn emit(&mut self, quad: &PackedQuad, target: Target) -> StrataResult<()> {
        match target {
            Target::Merge => {
                if let Some(table) = self.table.as_deref_mut() {
                    table.add(*quad);
                    return Ok(());
                }
                self.emit(quad, Target::Opaque)
            }
            Target::Opaque if quad.is_discardable() => {
                self.opaque.push_discardable(quad)?;
                self.outcome.discardable += 1;
                Ok(())
            }
            Target::Opaque => {
                self.opaque.push(quad)?;
                self.outcome.quads += 1;
                Ok(())
            }
            Target::Alpha => {
                self.coplanar.observe(quad);
                if quad.is_discardable() {
                    self.alpha.push_discardable(quad)?;
                } else {
                    self.alpha.push(quad)?;
                }
                self.outcome.alpha_quads += 1;
                Ok(())
            }
        }
    }

    /// Ambient occlusion and light for the four vertices of a full face.
    fn shade(&self, p: [i32; 3], face: Face) -> ([u8; 4], [Light; 4]) {
        let front = add(p, face.offset());
        let (u_axis, v_axis) = face.plane_axes();
        let front_light = self.light(front);
        let mut occlusion = [0u8; 4];
        let mut light = [front_light; 4];

        for (k, (su, sv)) in CORNER_SIGNS.into_iter().enumerate() {
            let mut side_u = front;
            side_u[u_axis] += su;
            let mut side_v = front;
            side_v[v_axis] += sv;
            let mut corner = side_u;
            corner[v_axis] += sv;

            let (solid_u, solid_v) = (self.solid(side_u), self.solid(side_v));
            occlusion[k] = match (solid_u, solid_v) {
                (true, true) => 3,
                (true, false) | (false, true) => 1,
                (false, false) => u8::from(self.solid(corner)),
            };
            light[k] = if solid_u && solid_v {
                blend(front_light, &[self.light(side_u), self.light(side_v)])
            } else {
                blend(
                    front_light,
                    &[self.light(side_u), self.light(side_v), self.light(corner)],
                )
            };
        }
        (occlusion, light)
    }

    fn cube(&mut self, p: [i32; 3], block: BlockState) -> StrataResult<()> {
        let catalog = self.catalog;
        let flags = catalog.flags(block);
        let liquid = flags.contains(BlockFlags::LIQUID);
        let leaves = flags.contains(BlockFlags::LEAVES);
        let alpha = flags.contains(BlockFlags::ALPHA);
        let cull_same = flags.contains(BlockFlags::CULL_SAME) || liquid;
        let lowered = liquid && self.block(add(p, Face::Top.offset())).id() != block.id();

        let min = scale(p, UNITS_PER_BLOCK);
        let max = add(min, [UNITS_PER_BLOCK; 3]);

        for face in Face::ALL {
            let front = add(p, face.offset());
            let neighbor = self.block(front);
            let mut discardable = false;

            if leaves {
                if catalog.is_fully_solid(neighbor) {
                    continue;
                }
                discardable = catalog.flags(neighbor).contains(BlockFlags::LEAVES);
            } else {
                let hidden = catalog.occlusion(neighbor).contains(face.opposite());
                if hidden && !(liquid && face == Face::Top) {
                    continue;
                }
                if cull_same && neighbor.id() == block.id() {
                    continue;
                }
            }

            let (mut origin, edge_u, mut edge_v) = box_face(face, min, max);
            let mut rect = [0, 0, UNITS_PER_BLOCK, UNITS_PER_BLOCK];
            if lowered {
                match face {
                    Face::Top => origin[1] -= LIQUID_DROP,
                    Face::Bottom => {}
                    _ => {
                        edge_v[1] -= LIQUID_DROP;
                        rect[3] -= LIQUID_DROP;
                    }
                }
            }

            let (occlusion, light) = self.shade(p, face);
            let mut quad_flags = 0;
            let mut liquid_edges = 0;
            if liquid {
                quad_flags |= PackedQuad::FLAG_DUAL_SIDE;
                if face == Face::Top {
                    for side in Face::HORIZONTAL {
                        if self.block(add(p, side.offset())).id() == block.id() {
                            liquid_edges |= side.bit();
                        }
                    }
                }
            } else if catalog.flags(neighbor).contains(BlockFlags::LIQUID) {
                quad_flags |= PackedQuad::FLAG_UNDERWATER;
            }

            let quad = QuadBuilder::new(origin, edge_u, edge_v)
                .normal(face)
                .texture(catalog.face_texture(block, face), rect)
                .occlusion(occlusion)
                .light(light)
                .flags(quad_flags)
                .liquid_edges(liquid_edges)
                .alpha(alpha)
                .discardable(discardable)
                .build();

            let target = if alpha {
                Target::Alpha
            } else if discardable || liquid || lowered {
                Target::Opaque
            } else {
                Target::Merge
            };
            self.emit(&quad, target)?;
        }
        Ok(())
    }

    /// Half blocks and stairs: one quad per exposed octant face.
    fn shaped(&mut self, p: [i32; 3], block: BlockState, shape: Shape) -> StrataResult<()> {
        let catalog = self.catalog;
        let alpha = catalog.flags(block).contains(BlockFlags::ALPHA);
        let target = if alpha { Target::Alpha } else { Target::Opaque };

        for bit in 0..8usize {
            let octant = [bit & 1, bit >> 2, (bit >> 1) & 1];
            if !shape.octant(octant[0], octant[1], octant[2]) {
                continue;
            }
            #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
            let o = octant.map(|c| c as i32);

            for face in Face::ALL {
                let next = add(o, face.offset());
                let inside = next.iter().all(|c| (0..2).contains(c));
                #[allow(clippy::cast_sign_loss)]
                let wrapped = next.map(|c| c.rem_euclid(2) as usize);
                let cell = if inside {
                    if shape.octant(wrapped[0], wrapped[1], wrapped[2]) {
                        continue;
                    }
                    p
                } else {
                    let front = add(p, face.offset());
                    let occluder = catalog.occluder(self.block(front));
                    if occluder.octant(wrapped[0], wrapped[1], wrapped[2]) {
                        continue;
                    }
                    front
                };

                let min = add(scale(p, UNITS_PER_BLOCK), scale(o, HALF));
                let max = add(min, [HALF; 3]);
                let (origin, edge_u, edge_v) = box_face(face, min, max);
                let (u_axis, v_axis) = face.plane_axes();
                let quad = QuadBuilder::new(origin, edge_u, edge_v)
                    .normal(face)
                    .texture(
                        catalog.face_texture(block, face),
                        [o[u_axis] * HALF, o[v_axis] * HALF, HALF, HALF],
                    )
                    .light([self.light(cell); 4])
                    .alpha(alpha)
                    .build();
                self.emit(&quad, target)?;
            }
        }
        Ok(())
    }

    /// Two diagonal dual-sided quads.
    fn cross(&mut self, p: [i32; 3], block: BlockState) -> StrataResult<()> {
        let catalog = self.catalog;
        let alpha = catalog.flags(block).contains(BlockFlags::ALPHA);
        let base = scale(p, UNITS_PER_BLOCK);
        let tile = catalog.face_texture(block, Face::South);
        let light = [self.light(p); 4];
        let up = [0, UNITS_PER_BLOCK, 0];

        let diagonals = [
            (base, [UNITS_PER_BLOCK, 0, UNITS_PER_BLOCK]),
            (add(base, [UNITS_PER_BLOCK, 0, 0]), [-UNITS_PER_BLOCK, 0, UNITS_PER_BLOCK]),
        ];
        for (origin, edge_u) in diagonals {
            let quad = QuadBuilder::new(origin, edge_u, up)
                .texture(tile, [0, 0, UNITS_PER_BLOCK, UNITS_PER_BLOCK])
                .light(light)
                .flags(PackedQuad::FLAG_DUAL_SIDE)
                .alpha(alpha)
                .build();
            self.emit(&quad, if alpha { Target::Alpha } else { Target::Opaque })?;
        }
        Ok(())
    }

    /// Faces of a custom model that its connections allow.
    fn custom(&mut self, p: [i32; 3], block: BlockState) -> StrataResult<()> {
        let catalog = self.catalog;
        let Some(model) = catalog.custom_model(block) else {
            return Ok(());
        };
        let group = catalog.connect_group(block);
        let alpha = catalog.flags(block).contains(BlockFlags::ALPHA);

        let mut connections = 0u8;
        for side in Face::HORIZONTAL {
            let neighbor = self.block(add(p, side.offset()));
            let joined = group.is_some() && catalog.connect_group(neighbor) == group;
            if joined || catalog.is_fully_solid(neighbor) {
                connections |= side.bit();
            }
        }

        let base = scale(p, UNITS_PER_BLOCK);
        for face in model.visible(connections) {
            let mut cell = p;
            if let Some(cull) = face.cull {
                let front = add(p, cull.offset());
                if catalog.occlusion(self.block(front)).contains(cull.opposite()) {
                    continue;
                }
                cell = front;
            }

            let mut builder = QuadBuilder::new(add(base, face.origin), face.edge_u, face.edge_v)
                .texture(catalog.face_texture(block, face.tile), face.tex)
                .light([self.light(cell); 4])
                .alpha(alpha);
            if let Some(normal) = face.normal {
                builder = builder.normal(normal);
            }
            let quad = builder.build();
            self.emit(&quad, if alpha { Target::Alpha } else { Target::Opaque })?;
        }
        Ok(())
    }

    fn run(&mut self) -> StrataResult<()> {
        for y in 0..EXTENT {
            for z in 0..EXTENT {
                for x in 0..EXTENT {
                    let p = [x, y, z];
                    let block = self.block(p);
                    if block.is_air() {
                        continue;
                    }
                    self.outcome.air_only = false;

                    match self.catalog.render_kind(block) {
                        RenderKind::Invisible => {}
                        RenderKind::Cube => {
                            let shape = self.catalog.shape(block);
                            if shape == Shape::FULL {
                                self.cube(p, block)?;
                            } else if shape != Shape::EMPTY {
                                self.shaped(p, block, shape)?;
                            }
                        }
                        RenderKind::Cross => self.cross(p, block)?,
                        RenderKind::Custom => self.custom(p, block)?,
                    }
                }
            }
        }

        if let Some(table) = self.table.as_deref_mut() {
            self.outcome.merged = merge_coplanar(table);
            for quad in table.survivors() {
                self.opaque.push(quad)?;
                self.outcome.quads += 1;
            }
        }
        self.outcome.alpha_coplanar = self.coplanar.flat;
        Ok(())
    }
}

/// Reusable mesher; one per worker thread.
pub struct VoxelMesher {
    table: QuadMergeTable,
    flood: CaveFlood,
    merge: bool,
}

impl VoxelMesher {
    /// Creates a mesher. With `merge` off every visible face is its own quad.
    #[must_use]
    pub fn new(merge: bool) -> Self {
        Self {
            table: QuadMergeTable::with_capacity(4096),
            flood: CaveFlood::new(),
            merge,
        }
    }

    /// True if greedy merging is on.
    #[inline]
    #[must_use]
    pub const fn merges(&self) -> bool {
        self.merge
    }

    /// Meshes the center of `halo` into the two sinks.
    ///
    /// The sinks are not flushed at the end; the caller publishes them.
    ///
    /// # Errors
    ///
    /// Propagates sink errors, most notably [`strata_core::StrataError::Cancelled`]
    /// when a staging sink's wait is interrupted.
    pub fn mesh(
        &mut self,
        halo: &HaloVolume,
        catalog: &dyn BlockCatalog,
        opaque: &mut dyn MeshSink,
        alpha: &mut dyn MeshSink,
    ) -> StrataResult<MeshOutcome> {
        let cave = self.flood.compute(halo, catalog);
        let table = if self.merge {
            self.table.reset();
            Some(&mut self.table)
        } else {
            None
        };

        let mut pass = Pass {
            halo,
            catalog,
            opaque,
            alpha,
            table,
            outcome: MeshOutcome {
                cave,
                ..MeshOutcome::default()
            },
            coplanar: Coplanar::new(),
        };
        pass.run()?;
        Ok(pass.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::chunk::SubChunk;
    use crate::voxel::registry::BlockRegistry;
    use crate::voxel::sink::{BufferSink, VecSink};
    use std::collections::HashSet;

    const STONE: BlockState = BlockState::new(1, 0);
    const WATER: BlockState = BlockState::new(9, 0);
    const LEAVES: BlockState = BlockState::new(18, 0);
    const GLASS: BlockState = BlockState::new(20, 0);
    const SLAB: BlockState = BlockState::new(44, 0);
    const FENCE: BlockState = BlockState::new(85, 0);
    const FLOWER: BlockState = BlockState::new(38, 0);

    fn registry() -> BlockRegistry {
        BlockRegistry::from_toml_str(
            r#"
            [[block]]
            id = 1
            name = "stone"
            textures = { all = [1, 0] }

            [[block]]
            id = 9
            name = "water"
            alpha = true
            liquid = true

            [[block]]
            id = 18
            name = "leaves"
            leaves = true

            [[block]]
            id = 20
            name = "glass"
            alpha = true
            cull_same = true

            [[block]]
            id = 38
            name = "flower"
            kind = "cross"

            [[block]]
            id = 44
            name = "slab"
            shape = "slab"

            [[block]]
            id = 85
            name = "fence"
            kind = "custom"
            model = "fence"
            connect_group = 1
            "#,
        )
        .unwrap()
    }

    fn mesh(chunk: &SubChunk, merge: bool) -> (MeshOutcome, VecSink, VecSink) {
        mesh_halo(&HaloVolume::isolated(chunk), merge)
    }

    fn mesh_halo(halo: &HaloVolume, merge: bool) -> (MeshOutcome, VecSink, VecSink) {
        let mut opaque = VecSink::new();
        let mut alpha = VecSink::new();
        let outcome = VoxelMesher::new(merge)
            .mesh(halo, &registry(), &mut opaque, &mut alpha)
            .unwrap();
        (outcome, opaque, alpha)
    }

    fn terrain(seed: u32) -> SubChunk {
        let mut chunk = SubChunk::new();
        let mut state = seed;
        for x in 0..16 {
            for z in 0..16 {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let height = 4 + (state % 8) as usize;
                for y in 0..height {
                    chunk.set_block(x, y, z, STONE);
                }
            }
        }
        chunk
    }

    /// Unit cells covered by axis-aligned quads, per normal.
    fn coverage<'q>(quads: impl Iterator<Item = &'q PackedQuad>) -> HashSet<(u8, [i32; 3])> {
        let mut cells = HashSet::new();
        for quad in quads {
            let face = quad.normal().unwrap();
            let (u_axis, v_axis) = face.plane_axes();
            let (w, h) = quad.repeat().unwrap_or((1, 1));
            for i in 0..i32::from(w) {
                for j in 0..i32::from(h) {
                    let mut cell = quad.origin();
                    cell[u_axis] += i * UNITS_PER_BLOCK;
                    cell[v_axis] += j * UNITS_PER_BLOCK;
                    assert!(cells.insert((face as u8, cell)), "overlapping quads");
                }
            }
        }
        cells
    }

    #[test]
    fn test_solid_chunk_faces() {
        let chunk = SubChunk::filled(STONE);

        let (outcome, opaque, _) = mesh(&chunk, false);
        assert_eq!(outcome.quads, 1536);
        assert_eq!(opaque.quads.len(), 1536);

        let (outcome, opaque, alpha) = mesh(&chunk, true);
        assert_eq!(outcome.quads, 6);
        assert_eq!(outcome.merged, 1530);
        assert!(alpha.is_empty());
        for quad in &opaque.quads {
            assert_eq!(quad.area_units(), 256 * 256);
            assert_eq!(quad.repeat(), Some((16, 16)));
        }
    }

    #[test]
    fn test_enclosed_solid_chunk_has_no_faces() {
        let mut halo = HaloVolume::new();
        for y in -1..=16 {
            for z in -1..=16 {
                for x in -1..=16 {
                    halo.set(x, y, z, STONE, Light::DARK);
                }
            }
        }
        let (outcome, opaque, alpha) = mesh_halo(&halo, true);
        assert!(outcome.is_empty());
        assert!(opaque.is_empty() && alpha.is_empty());
        assert!(outcome.cave.is_sealed());
        assert!(!outcome.air_only);
    }

    #[test]
    fn test_empty_chunk() {
        let (outcome, opaque, _) = mesh(&SubChunk::new(), true);
        assert!(outcome.air_only);
        assert!(opaque.is_empty());
        assert_eq!(outcome.cave, CaveGraph::OPEN);
    }

    #[test]
    fn test_merge_preserves_covered_area() {
        for seed in [1, 7, 12345, 0xdead_beef] {
            let chunk = terrain(seed);
            let (plain, unmerged, _) = mesh(&chunk, false);
            let (merged, opaque, _) = mesh(&chunk, true);

            assert_eq!(coverage(unmerged.quads.iter()), coverage(opaque.quads.iter()));
            assert_eq!(plain.quads, merged.quads + merged.merged);
            assert!(merged.quads < plain.quads);
        }
    }

    #[test]
    fn test_meshing_is_deterministic() {
        let chunk = terrain(99);
        let (_, first, _) = mesh(&chunk, true);
        let (_, second, _) = mesh(&chunk, true);
        assert_eq!(first.quads, second.quads);

        let mut mesher = VoxelMesher::new(true);
        let catalog = registry();
        let halo = HaloVolume::isolated(&chunk);
        let mut reused = VecSink::new();
        for _ in 0..2 {
            reused.clear();
            mesher.mesh(&halo, &catalog, &mut reused, &mut VecSink::new()).unwrap();
        }
        assert_eq!(first.quads, reused.quads);
    }

    #[test]
    fn test_corner_occlusion_next_to_block() {
        let mut chunk = SubChunk::new();
        for x in 0..16 {
            for z in 0..16 {
                chunk.set_block(x, 0, z, STONE);
            }
        }
        chunk.set_block(5, 1, 5, STONE);

        let (_, opaque, _) = mesh(&chunk, false);
        let floor_top = opaque
            .quads
            .iter()
            .find(|q| q.normal() == Some(Face::Top) && q.origin() == [64, 16, 80])
            .unwrap();
        assert_eq!(floor_top.occlusion(), [0, 1, 1, 0]);

        let diagonal = opaque
            .quads
            .iter()
            .find(|q| q.normal() == Some(Face::Top) && q.origin() == [64, 16, 64])
            .unwrap();
        assert_eq!(diagonal.occlusion(), [0, 0, 1, 0]);
    }

    #[test]
    fn test_smooth_light_takes_brightest_block_light() {
        let mut chunk = SubChunk::new();
        chunk.set_block(0, 0, 0, STONE);
        chunk.set_light(0, 1, 0, Light::new(15, 0));
        chunk.set_light(1, 1, 0, Light::new(15, 12));

        let (_, opaque, _) = mesh(&chunk, false);
        let top = opaque
            .quads
            .iter()
            .find(|q| q.normal() == Some(Face::Top))
            .unwrap();
        let light = top.light();
        assert_eq!(light[0].block(), 0);
        assert_eq!(light[1].block(), 12);
        assert_eq!(light[2].block(), 12);
        assert_eq!(light[3].block(), 0);
        assert!(light.iter().all(|l| l.sky() == 15));
    }

    #[test]
    fn test_leaves_facing_leaves_are_discardable() {
        let mut chunk = SubChunk::new();
        chunk.set_block(3, 3, 3, LEAVES);
        chunk.set_block(4, 3, 3, LEAVES);

        let (outcome, opaque, alpha) = mesh(&chunk, false);
        assert_eq!(outcome.discardable, 2);
        assert_eq!(outcome.quads, 10);
        assert!(opaque.discardable.iter().all(PackedQuad::is_discardable));
        assert!(alpha.is_empty());
    }

    #[test]
    fn test_water_surface() {
        let mut chunk = SubChunk::new();
        chunk.set_block(2, 0, 2, WATER);
        chunk.set_block(3, 0, 2, WATER);

        let (outcome, opaque, alpha) = mesh(&chunk, true);
        assert!(opaque.is_empty());
        assert_eq!(outcome.alpha_quads, 10);
        assert!(outcome.alpha_coplanar);

        let top = alpha
            .quads
            .iter()
            .find(|q| q.normal() == Some(Face::Top))
            .unwrap();
        assert_eq!(top.origin()[1], 14);
        assert!(top.is_alpha());
        assert!(top.has_flag(PackedQuad::FLAG_DUAL_SIDE));
        assert_ne!(top.liquid_edges(), 0);
    }

    #[test]
    fn test_scattered_alpha_is_not_coplanar() {
        let mut chunk = SubChunk::new();
        chunk.set_block(0, 0, 0, GLASS);
        chunk.set_block(5, 0, 5, GLASS);
        let (outcome, _, alpha) = mesh(&chunk, true);
        assert_eq!(alpha.len(), 12);
        assert!(!outcome.alpha_coplanar);
    }

    #[test]
    fn test_glass_culls_against_glass() {
        let mut chunk = SubChunk::new();
        chunk.set_block(0, 0, 0, GLASS);
        chunk.set_block(0, 1, 0, GLASS);
        chunk.set_block(1, 0, 0, STONE);

        let (outcome, opaque, _) = mesh(&chunk, true);
        // 2 glass faces vanish between the panes, 1 against the stone.
        assert_eq!(outcome.alpha_quads, 12 - 2 - 1);
        // Stone keeps its face towards the glass.
        assert_eq!(opaque.quads.len(), 6);
    }

    #[test]
    fn test_slab_octant_faces() {
        let mut chunk = SubChunk::new();
        chunk.set_block(4, 4, 4, SLAB);
        let (outcome, _, _) = mesh(&chunk, true);
        assert_eq!(outcome.quads, 16);

        // Stone below hides the slab bottom and is hidden by it in turn.
        chunk.set_block(4, 3, 4, STONE);
        let (outcome, opaque, _) = mesh(&chunk, false);
        assert_eq!(outcome.quads, 12 + 5);
        let half = opaque.quads.iter().filter(|q| q.area_units() == 64).count();
        assert_eq!(half, 12);
    }

    #[test]
    fn test_fences_connect() {
        let mut chunk = SubChunk::new();
        chunk.set_block(5, 5, 5, FENCE);
        let (alone, _, _) = mesh(&chunk, true);
        assert_eq!(alone.quads, 22);

        chunk.set_block(5, 5, 6, FENCE);
        let (pair, _, _) = mesh(&chunk, true);
        assert_eq!(pair.quads, 2 * 28);
    }

    #[test]
    fn test_cross_quads() {
        let mut chunk = SubChunk::new();
        chunk.set_block(7, 7, 7, FLOWER);
        let (outcome, opaque, _) = mesh(&chunk, true);
        assert_eq!(outcome.quads, 2);
        for quad in &opaque.quads {
            assert_eq!(quad.normal(), None);
            assert!(quad.has_flag(PackedQuad::FLAG_DUAL_SIDE));
        }
    }

    #[test]
    fn test_small_buffers_receive_whole_quads() {
        let chunk = terrain(3);
        let (outcome, reference, _) = mesh(&chunk, true);

        let mut opaque = BufferSink::with_buffer_words(3 * 7 + 5);
        let mut alpha = BufferSink::new();
        let again = VoxelMesher::new(true)
            .mesh(&HaloVolume::isolated(&chunk), &registry(), &mut opaque, &mut alpha)
            .unwrap();

        assert_eq!(again, outcome);
        assert!(opaque.buffers_used() > 1);
        let words: Vec<u32> = opaque.used_regions().flatten().copied().collect();
        let expected: Vec<u32> = reference.quads.iter().flat_map(|q| q.words).collect();
        assert_eq!(words, expected);
    }
}
