//! Face-to-face visibility through a sub-chunk.
//!
//! A flood fill over non-solid voxels records which boundary faces each
//! air pocket touches. Two faces are connected when one pocket touches both;
//! a renderer walking from the camera only needs to enter a neighbor through
//! a face connected to the one it came in by.

use std::collections::VecDeque;

use super::block::BlockCatalog;
use super::chunk::{SUB_CHUNK_SIZE, SUB_CHUNK_VOLUME};
use super::face::{Face, FaceSet};
use super::halo::HaloVolume;

/// Connectivity between the six faces of one sub-chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CaveGraph {
    /// One bit per unordered face pair, see [`pair_bit`](Self::pair_bit).
    pairs: u16,
    /// Faces touched by at least one pocket.
    open: FaceSet,
}

impl CaveGraph {
    /// Every face sees every other face (an empty sub-chunk).
    pub const OPEN: CaveGraph = CaveGraph {
        pairs: 0x7fff,
        open: FaceSet::ALL,
    };

    /// Bit of the unordered pair `{a, b}`; `a` and `b` must differ.
    #[inline]
    #[must_use]
    pub fn pair_bit(a: Face, b: Face) -> u16 {
        let (lo, hi) = if a < b { (a as u16, b as u16) } else { (b as u16, a as u16) };
        1 << (lo * (11 - lo) / 2 + (hi - lo - 1))
    }

    /// True if a pocket touches both faces. A face is connected to itself
    /// if any pocket touches it.
    #[inline]
    #[must_use]
    pub fn connects(&self, a: Face, b: Face) -> bool {
        if a == b {
            self.open.contains(a)
        } else {
            self.pairs & Self::pair_bit(a, b) != 0
        }
    }

    /// Faces touched by any pocket.
    #[inline]
    #[must_use]
    pub const fn open_faces(&self) -> FaceSet {
        self.open
    }

    /// Raw pair bits.
    #[inline]
    #[must_use]
    pub const fn pair_bits(&self) -> u16 {
        self.pairs
    }

    /// True if no face sees any other face.
    #[inline]
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.pairs == 0
    }

    /// Connects every pair of faces in `touched`.
    pub fn link(&mut self, touched: FaceSet) {
        self.open = self.open.union(touched);
        for a in touched.iter() {
            for b in touched.iter().filter(|b| *b > a) {
                self.pairs |= Self::pair_bit(a, b);
            }
        }
    }
}

/// Boundary faces a voxel lies on.
fn boundary(x: usize, y: usize, z: usize) -> FaceSet {
    const MAX: usize = SUB_CHUNK_SIZE - 1;
    let mut faces = FaceSet::EMPTY;
    if x == 0 {
        faces.insert(Face::West);
    }
    if x == MAX {
        faces.insert(Face::East);
    }
    if y == 0 {
        faces.insert(Face::Bottom);
    }
    if y == MAX {
        faces.insert(Face::Top);
    }
    if z == 0 {
        faces.insert(Face::North);
    }
    if z == MAX {
        faces.insert(Face::South);
    }
    faces
}

/// Reusable flood-fill buffers.
pub struct CaveFlood {
    visited: [u64; SUB_CHUNK_VOLUME / 64],
    queue: VecDeque<u16>,
}

impl Default for CaveFlood {
    fn default() -> Self {
        Self::new()
    }
}

impl CaveFlood {
    /// Allocates the queue for a full sub-chunk.
    #[must_use]
    pub fn new() -> Self {
        Self {
            visited: [0; SUB_CHUNK_VOLUME / 64],
            queue: VecDeque::with_capacity(SUB_CHUNK_VOLUME),
        }
    }

    #[inline]
    fn visit(&mut self, index: usize) -> bool {
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        let fresh = self.visited[word] & bit == 0;
        self.visited[word] |= bit;
        fresh
    }

    /// Floods the center of `halo`, treating fully solid blocks as walls.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn compute(&mut self, halo: &HaloVolume, catalog: &dyn BlockCatalog) -> CaveGraph {
        const N: usize = SUB_CHUNK_SIZE;
        let solid = |index: usize| {
            let (x, z, y) = (index % N, (index / N) % N, index / (N * N));
            catalog.is_fully_solid(halo.block(x as i32, y as i32, z as i32))
        };

        self.visited = [0; SUB_CHUNK_VOLUME / 64];
        let mut graph = CaveGraph::default();

        for start in 0..SUB_CHUNK_VOLUME {
            if !self.visit(start) || solid(start) {
                continue;
            }

            let mut touched = FaceSet::EMPTY;
            self.queue.clear();
            self.queue.push_back(start as u16);

            while let Some(index) = self.queue.pop_front() {
                let index = usize::from(index);
                let (x, z, y) = (index % N, (index / N) % N, index / (N * N));
                touched = touched.union(boundary(x, y, z));

                let neighbors = [
                    (x + 1 < N).then(|| index + 1),
                    (x > 0).then(|| index - 1),
                    (z + 1 < N).then(|| index + N),
                    (z > 0).then(|| index - N),
                    (y + 1 < N).then(|| index + N * N),
                    (y > 0).then(|| index - N * N),
                ];
                for next in neighbors.into_iter().flatten() {
                    if self.visit(next) && !solid(next) {
                        self.queue.push_back(next as u16);
                    }
                }
            }

            graph.link(touched);
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::chunk::{BlockState, SubChunk};
    use crate::voxel::registry::{BlockDef, BlockRegistry};

    fn registry() -> BlockRegistry {
        let mut registry = BlockRegistry::new();
        registry.register(BlockDef::solid(1, "stone", [1, 0])).unwrap();
        registry
    }

    /// Face sets of every pocket, found by a plain depth-first walk.
    fn pockets(chunk: &SubChunk, catalog: &dyn BlockCatalog) -> Vec<FaceSet> {
        const N: usize = SUB_CHUNK_SIZE;
        let open = |x: usize, y: usize, z: usize| !catalog.is_fully_solid(chunk.block(x, y, z));
        let mut seen = vec![false; SUB_CHUNK_VOLUME];
        let mut found = Vec::new();
        for y in 0..N {
            for z in 0..N {
                for x in 0..N {
                    if seen[x + z * N + y * N * N] || !open(x, y, z) {
                        continue;
                    }
                    let mut faces = FaceSet::EMPTY;
                    let mut stack = vec![(x, y, z)];
                    seen[x + z * N + y * N * N] = true;
                    while let Some((x, y, z)) = stack.pop() {
                        faces = faces.union(boundary(x, y, z));
                        let steps = [
                            (x + 1 < N).then(|| (x + 1, y, z)),
                            x.checked_sub(1).map(|x| (x, y, z)),
                            (y + 1 < N).then(|| (x, y + 1, z)),
                            y.checked_sub(1).map(|y| (x, y, z)),
                            (z + 1 < N).then(|| (x, y, z + 1)),
                            z.checked_sub(1).map(|z| (x, y, z)),
                        ];
                        for (nx, ny, nz) in steps.into_iter().flatten() {
                            let index = nx + nz * N + ny * N * N;
                            if !seen[index] && open(nx, ny, nz) {
                                seen[index] = true;
                                stack.push((nx, ny, nz));
                            }
                        }
                    }
                    found.push(faces);
                }
            }
        }
        found
    }

    fn assert_matches_walk(chunk: &SubChunk, graph: &CaveGraph) {
        let found = pockets(chunk, &registry());
        for a in Face::ALL {
            for b in Face::ALL {
                let reachable = found.iter().any(|p| p.contains(a) && p.contains(b));
                assert_eq!(graph.connects(a, b), reachable, "{a:?} -> {b:?}");
            }
        }
    }

    #[test]
    fn test_pair_bits_are_distinct() {
        let mut seen = 0u16;
        for a in Face::ALL {
            for b in Face::ALL.into_iter().filter(|b| *b > a) {
                let bit = CaveGraph::pair_bit(a, b);
                assert_eq!(bit, CaveGraph::pair_bit(b, a));
                assert_eq!(seen & bit, 0);
                seen |= bit;
            }
        }
        assert_eq!(seen, 0x7fff);
    }

    #[test]
    fn test_empty_chunk_is_fully_open() {
        let halo = HaloVolume::isolated(&SubChunk::new());
        let graph = CaveFlood::new().compute(&halo, &registry());
        assert_eq!(graph, CaveGraph::OPEN);
    }

    #[test]
    fn test_solid_chunk_is_sealed() {
        let halo = HaloVolume::isolated(&SubChunk::filled(BlockState::new(1, 0)));
        let graph = CaveFlood::new().compute(&halo, &registry());
        assert!(graph.is_sealed());
        assert!(graph.open_faces().is_empty());
    }

    #[test]
    fn test_wall_splits_chunk() {
        let mut chunk = SubChunk::new();
        for y in 0..16 {
            for z in 0..16 {
                chunk.set_block(8, y, z, BlockState::new(1, 0));
            }
        }
        let graph = CaveFlood::new().compute(&HaloVolume::isolated(&chunk), &registry());

        assert!(!graph.connects(Face::West, Face::East));
        assert!(graph.connects(Face::West, Face::Top));
        assert!(graph.connects(Face::East, Face::South));
        assert!(graph.connects(Face::North, Face::South));
        assert!(graph.connects(Face::East, Face::East));
    }

    #[test]
    fn test_tunnel_connects_only_its_ends() {
        let mut chunk = SubChunk::filled(BlockState::new(1, 0));
        for x in 0..16 {
            chunk.set_block(x, 5, 5, BlockState::AIR);
        }
        let graph = CaveFlood::new().compute(&HaloVolume::isolated(&chunk), &registry());

        assert!(graph.connects(Face::West, Face::East));
        assert_eq!(graph.pair_bits().count_ones(), 1);
        assert!(!graph.connects(Face::Top, Face::Top));
    }

    #[test]
    fn test_bent_passages_keep_every_opening() {
        let stone = BlockState::new(1, 0);
        let mut chunk = SubChunk::filled(stone);
        // L-shaped: in from the west, turns south.
        for x in 0..=8 {
            chunk.set_block(x, 3, 3, BlockState::AIR);
        }
        for z in 3..16 {
            chunk.set_block(8, 3, z, BlockState::AIR);
        }
        // Shaft from bottom to top.
        for y in 0..16 {
            chunk.set_block(12, y, 12, BlockState::AIR);
        }
        // Dead end off the north face.
        for z in 0..5 {
            chunk.set_block(4, 10, z, BlockState::AIR);
        }
        let graph = CaveFlood::new().compute(&HaloVolume::isolated(&chunk), &registry());

        assert!(graph.connects(Face::West, Face::South));
        assert!(graph.connects(Face::Bottom, Face::Top));
        assert!(graph.connects(Face::North, Face::North));
        assert!(!graph.connects(Face::West, Face::Top));
        assert!(!graph.connects(Face::North, Face::South));
        assert!(!graph.open_faces().contains(Face::East));
        assert_eq!(graph.pair_bits().count_ones(), 2);
        assert_matches_walk(&chunk, &graph);
    }

    #[test]
    fn test_scattered_rock_matches_walk() {
        let stone = BlockState::new(1, 0);
        let mut flood = CaveFlood::new();
        for seed in [3u32, 11, 29, 47] {
            let mut chunk = SubChunk::new();
            let mut state = seed.wrapping_mul(2_654_435_761);
            for y in 0..16 {
                for z in 0..16 {
                    for x in 0..16 {
                        state ^= state << 13;
                        state ^= state >> 17;
                        state ^= state << 5;
                        if state % 100 < 62 {
                            chunk.set_block(x, y, z, stone);
                        }
                    }
                }
            }
            let graph = flood.compute(&HaloVolume::isolated(&chunk), &registry());
            assert_matches_walk(&chunk, &graph);
        }
    }
}
