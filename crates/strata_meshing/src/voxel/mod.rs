//! Voxel data, block catalogs and the sub-chunk mesher.
//!
//! Everything in here is single-threaded and allocation-stable: a
//! [`VoxelMesher`] keeps its merge table and flood buffers between jobs.

mod block;
mod cave;
mod chunk;
mod face;
mod greedy_mesh;
mod halo;
mod merge;
mod mesher;
mod model;
mod quad;
mod registry;
mod sink;
mod world;

pub use block::{BlockCatalog, BlockFlags, RenderKind, Shape, TexTile};
pub use cave::{CaveFlood, CaveGraph};
pub use chunk::{BlockState, Light, SubChunk, SUB_CHUNK_SIZE, SUB_CHUNK_VOLUME};
pub use face::{Face, FaceSet};
pub use greedy_mesh::merge_coplanar;
pub use halo::{HaloShape, HaloVolume, HALO_SIZE, HALO_VOLUME};
pub use merge::{EntryHandle, QuadKey, QuadMergeTable};
pub use mesher::{MeshOutcome, VoxelMesher};
pub use model::{CustomModel, ModelFace};
pub use quad::{PackedQuad, QuadBuilder, QUAD_BYTES, QUAD_WORDS, UNITS_PER_BLOCK};
pub use registry::{BlockDef, BlockRegistry, KindDef, ModelDef, ShapeDef, TextureDef};
pub use sink::{BufferSink, MeshSink, RegionCursor, VecSink, MESH_BUFFER_WORDS};
pub use world::{MemoryWorld, WorldProvider};
