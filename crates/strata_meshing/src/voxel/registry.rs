//! TOML-loadable block registry.
//!
//! ```toml
//! [[block]]
//! id = 1
//! name = "stone"
//! textures = { all = [1, 0] }
//!
//! [[block]]
//! id = 9
//! name = "water"
//! textures = { all = [13, 12] }
//! alpha = true
//! liquid = true
//!
//! [[block]]
//! id = 20
//! name = "oak_stairs"
//! shape = "stairs"
//! textures = { all = [4, 0] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_core::{StrataError, StrataResult};

use super::block::{BlockCatalog, BlockFlags, RenderKind, Shape, TexTile};
use super::chunk::BlockState;
use super::face::Face;
use super::model::CustomModel;

/// Render kind as written in TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindDef {
    /// Six faces.
    #[default]
    Cube,
    /// Crossed quads.
    Cross,
    /// Built-in model, see [`ModelDef`].
    Custom,
    /// Not drawn.
    Invisible,
}

/// Geometry of a cube block as written in TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeDef {
    /// Whole block.
    #[default]
    Full,
    /// Lower half; metadata bit 3 flips it to the upper half.
    Slab,
    /// Stairs; metadata bits 0-1 pick the rising side (S, E, N, W), bit 2
    /// turns them upside down.
    Stairs,
}

/// Built-in custom models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelDef {
    /// [`CustomModel::fence`]
    Fence,
    /// [`CustomModel::wire`]
    Wire,
}

/// Texture tiles per face; missing faces fall back to `side`, then `all`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureDef {
    /// Fallback for every face.
    pub all: Option<[u8; 2]>,
    /// The four horizontal faces.
    pub side: Option<[u8; 2]>,
    /// Top face.
    pub top: Option<[u8; 2]>,
    /// Bottom face.
    pub bottom: Option<[u8; 2]>,
}

impl TextureDef {
    fn tile(&self, face: Face) -> TexTile {
        let specific = match face {
            Face::Top => self.top,
            Face::Bottom => self.bottom,
            _ => self.side,
        };
        let [u, v] = specific.or(self.all).unwrap_or_default();
        TexTile::new(u, v)
    }
}

/// One `[[block]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDef {
    /// Block id, 1-4095 (0 is air).
    pub id: u16,
    /// Human-readable name, unique per registry.
    pub name: String,
    /// Render kind.
    #[serde(default)]
    pub kind: KindDef,
    /// Cube geometry.
    #[serde(default)]
    pub shape: ShapeDef,
    /// Texture tiles.
    #[serde(default)]
    pub textures: TextureDef,
    /// Model for `kind = "custom"`.
    #[serde(default)]
    pub model: Option<ModelDef>,
    /// Blended pass.
    #[serde(default)]
    pub alpha: bool,
    /// Liquid surface rules.
    #[serde(default)]
    pub liquid: bool,
    /// Leaf rules.
    #[serde(default)]
    pub leaves: bool,
    /// Faces vanish against the same block.
    #[serde(default)]
    pub cull_same: bool,
    /// Connection group for custom models.
    #[serde(default)]
    pub connect_group: Option<u8>,
}

impl BlockDef {
    /// Opaque full cube with one texture everywhere.
    #[must_use]
    pub fn solid(id: u16, name: &str, tile: [u8; 2]) -> Self {
        Self {
            id,
            name: name.to_owned(),
            kind: KindDef::Cube,
            shape: ShapeDef::Full,
            textures: TextureDef {
                all: Some(tile),
                ..TextureDef::default()
            },
            model: None,
            alpha: false,
            liquid: false,
            leaves: false,
            cull_same: false,
            connect_group: None,
        }
    }

    fn flags(&self) -> BlockFlags {
        let mut flags = BlockFlags::NONE;
        if self.alpha {
            flags = flags.with(BlockFlags::ALPHA);
        }
        if self.liquid {
            flags = flags.with(BlockFlags::LIQUID);
        }
        if self.leaves {
            flags = flags.with(BlockFlags::LEAVES);
        }
        if self.cull_same {
            flags = flags.with(BlockFlags::CULL_SAME);
        }
        flags
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    block: Vec<BlockDef>,
}

struct Entry {
    def: BlockDef,
    kind: RenderKind,
    flags: BlockFlags,
    model: Option<CustomModel>,
}

/// [`BlockCatalog`] backed by a table indexed by block id.
pub struct BlockRegistry {
    entries: Vec<Option<Entry>>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("blocks", &self.len())
            .finish()
    }
}

impl BlockRegistry {
    /// Creates a registry where every id is air.
    #[must_use]
    pub fn new() -> Self {
        let mut entries = Vec::new();
        entries.resize_with(usize::from(BlockState::MAX_ID) + 1, || None);
        Self { entries }
    }

    /// Parses a registry from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidConfig`] for malformed TOML or any
    /// definition [`register`](Self::register) rejects.
    pub fn from_toml_str(text: &str) -> StrataResult<Self> {
        let file: RegistryFile = toml::from_str(text)
            .map_err(|e| StrataError::InvalidConfig(format!("block registry: {e}")))?;
        let mut registry = Self::new();
        for def in file.block {
            registry.register(def)?;
        }
        tracing::debug!("block registry loaded with {} blocks", registry.len());
        Ok(registry)
    }

    /// Reads and parses a registry file.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> StrataResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StrataError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Adds one block definition.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidConfig`] for id 0, ids above 4095,
    /// duplicate ids, or a custom block without a model.
    pub fn register(&mut self, def: BlockDef) -> StrataResult<()> {
        if def.id == 0 || def.id > BlockState::MAX_ID {
            return Err(StrataError::InvalidConfig(format!(
                "block '{}' has invalid id {}",
                def.name, def.id
            )));
        }
        let slot = usize::from(def.id);
        if let Some(existing) = &self.entries[slot] {
            return Err(StrataError::InvalidConfig(format!(
                "block id {} used by both '{}' and '{}'",
                def.id, existing.def.name, def.name
            )));
        }

        let (kind, model) = match def.kind {
            KindDef::Cube => (RenderKind::Cube, None),
            KindDef::Cross => (RenderKind::Cross, None),
            KindDef::Invisible => (RenderKind::Invisible, None),
            KindDef::Custom => {
                let model = match def.model {
                    Some(ModelDef::Fence) => CustomModel::fence(),
                    Some(ModelDef::Wire) => CustomModel::wire(),
                    None => {
                        return Err(StrataError::InvalidConfig(format!(
                            "custom block '{}' names no model",
                            def.name
                        )))
                    }
                };
                (RenderKind::Custom, Some(model))
            }
        };

        self.entries[slot] = Some(Entry {
            flags: def.flags(),
            def,
            kind,
            model,
        });
        Ok(())
    }

    /// Definition of a block id.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&BlockDef> {
        self.entry(id).map(|entry| &entry.def)
    }

    /// Looks up a block id by name.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.entries
            .iter()
            .position(|entry| entry.as_ref().is_some_and(|e| e.def.name == name))
            .map(|index| index as u16)
    }

    /// Number of registered blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// True if only air is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn entry(&self, id: u16) -> Option<&Entry> {
        self.entries.get(usize::from(id)).and_then(Option::as_ref)
    }
}

impl BlockCatalog for BlockRegistry {
    fn render_kind(&self, block: BlockState) -> RenderKind {
        self.entry(block.id()).map_or(RenderKind::Invisible, |e| e.kind)
    }

    fn face_texture(&self, block: BlockState, face: Face) -> TexTile {
        self.entry(block.id())
            .map_or_else(TexTile::default, |e| e.def.textures.tile(face))
    }

    fn custom_model(&self, block: BlockState) -> Option<&CustomModel> {
        self.entry(block.id()).and_then(|e| e.model.as_ref())
    }

    fn is_fully_solid(&self, block: BlockState) -> bool {
        self.entry(block.id()).is_some_and(|e| {
            e.kind == RenderKind::Cube && e.def.shape == ShapeDef::Full && !e.flags.is_translucent()
        })
    }

    fn shape(&self, block: BlockState) -> Shape {
        let Some(entry) = self.entry(block.id()) else {
            return Shape::EMPTY;
        };
        let meta = block.meta();
        match entry.def.shape {
            ShapeDef::Full => Shape::FULL,
            ShapeDef::Slab if meta & 8 != 0 => Shape::SLAB_TOP,
            ShapeDef::Slab => Shape::SLAB_BOTTOM,
            ShapeDef::Stairs => {
                let ascend = Face::HORIZONTAL[usize::from(meta & 3)];
                Shape::stairs(ascend, meta & 4 != 0)
            }
        }
    }

    fn flags(&self, block: BlockState) -> BlockFlags {
        self.entry(block.id()).map_or(BlockFlags::NONE, |e| e.flags)
    }

    fn connect_group(&self, block: BlockState) -> Option<u8> {
        self.entry(block.id()).and_then(|e| e.def.connect_group)
    }

    fn occluder(&self, block: BlockState) -> Shape {
        match self.entry(block.id()) {
            Some(e) if e.kind == RenderKind::Cube && !e.flags.is_translucent() => self.shape(block),
            _ => Shape::EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::face::FaceSet;

    const BLOCKS: &str = r#"
        [[block]]
        id = 1
        name = "stone"
        textures = { all = [1, 0] }

        [[block]]
        id = 2
        name = "grass"
        textures = { side = [3, 0], top = [0, 0], bottom = [2, 0] }

        [[block]]
        id = 9
        name = "water"
        alpha = true
        liquid = true

        [[block]]
        id = 20
        name = "stone_stairs"
        shape = "stairs"

        [[block]]
        id = 30
        name = "fence"
        kind = "custom"
        model = "fence"
        connect_group = 1
    "#;

    #[test]
    fn test_parse_and_query() {
        let registry = BlockRegistry::from_toml_str(BLOCKS).unwrap();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.id_of("grass"), Some(2));

        let grass = BlockState::new(2, 0);
        assert_eq!(registry.face_texture(grass, Face::Top), TexTile::new(0, 0));
        assert_eq!(registry.face_texture(grass, Face::East), TexTile::new(3, 0));
        assert_eq!(registry.face_texture(grass, Face::Bottom), TexTile::new(2, 0));
        assert!(registry.is_fully_solid(grass));
    }

    #[test]
    fn test_translucent_and_shaped_blocks_do_not_occlude_fully() {
        let registry = BlockRegistry::from_toml_str(BLOCKS).unwrap();
        let water = BlockState::new(9, 0);
        assert!(!registry.is_fully_solid(water));
        assert!(registry.occlusion(water).is_empty());
        assert!(registry.flags(water).contains(BlockFlags::LIQUID));

        let stairs = BlockState::new(20, 1);
        assert!(!registry.is_fully_solid(stairs));
        let covered = registry.occlusion(stairs);
        assert!(covered.contains(Face::East));
        assert!(covered.contains(Face::Bottom));
        assert_ne!(covered, FaceSet::ALL);
    }

    #[test]
    fn test_unknown_ids_are_air() {
        let registry = BlockRegistry::from_toml_str(BLOCKS).unwrap();
        let unknown = BlockState::new(77, 0);
        assert_eq!(registry.render_kind(unknown), RenderKind::Invisible);
        assert!(!registry.is_fully_solid(unknown));
        assert_eq!(registry.render_kind(BlockState::AIR), RenderKind::Invisible);
    }

    #[test]
    fn test_rejects_bad_definitions() {
        let mut registry = BlockRegistry::new();
        registry.register(BlockDef::solid(1, "stone", [1, 0])).unwrap();
        assert!(registry.register(BlockDef::solid(1, "dirt", [2, 0])).is_err());
        assert!(registry.register(BlockDef::solid(0, "void", [0, 0])).is_err());

        let mut custom = BlockDef::solid(5, "thing", [0, 0]);
        custom.kind = KindDef::Custom;
        assert!(registry.register(custom).is_err());
        assert!(BlockRegistry::from_toml_str("[[block]]\nid = \"x\"").is_err());
    }

    #[test]
    fn test_custom_model_lookup() {
        let registry = BlockRegistry::from_toml_str(BLOCKS).unwrap();
        let fence = BlockState::new(30, 0);
        assert_eq!(registry.render_kind(fence), RenderKind::Custom);
        assert_eq!(registry.connect_group(fence), Some(1));
        assert!(registry.custom_model(fence).is_some());
        assert!(registry.occlusion(fence).is_empty());
    }
}
