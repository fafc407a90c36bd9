//! Where sub-chunks come from.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use strata_core::{StrataResult, SubChunkId};

use super::chunk::{BlockState, Light, SubChunk};

/// Read access to world data, shared by all meshing workers.
///
/// Only resident sub-chunks are visible through [`sub_chunk`](Self::sub_chunk);
/// [`load`](Self::load) brings one into residency.
pub trait WorldProvider: Send + Sync {
    /// A resident sub-chunk.
    fn sub_chunk(&self, id: SubChunkId) -> Option<Arc<SubChunk>>;

    /// Brings `id` into residency. Loading an absent sub-chunk is not an
    /// error; it simply stays absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store fails.
    fn load(&self, _id: SubChunkId) -> StrataResult<()> {
        Ok(())
    }

    /// True if `id` is resident.
    fn is_resident(&self, id: SubChunkId) -> bool {
        self.sub_chunk(id).is_some()
    }

    /// Block at a local coordinate of a resident sub-chunk.
    fn block_at(&self, id: SubChunkId, x: usize, y: usize, z: usize) -> Option<BlockState> {
        self.sub_chunk(id).map(|chunk| chunk.block(x, y, z))
    }

    /// Light at a local coordinate of a resident sub-chunk.
    fn light_at(&self, id: SubChunkId, x: usize, y: usize, z: usize) -> Option<Light> {
        self.sub_chunk(id).map(|chunk| chunk.light(x, y, z))
    }
}

/// In-memory world with a resident set and a cold store.
///
/// Sub-chunks added with [`insert_cold`](Self::insert_cold) become visible
/// only after [`WorldProvider::load`]; every actual load is counted.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    resident: RwLock<HashMap<SubChunkId, Arc<SubChunk>>>,
    cold: RwLock<HashMap<SubChunkId, Arc<SubChunk>>>,
    loads: AtomicUsize,
    load_delay: Option<Duration>,
}

impl MemoryWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty world whose loads take `delay`.
    #[must_use]
    pub fn with_load_delay(delay: Duration) -> Self {
        Self {
            load_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Makes a sub-chunk resident, replacing any previous version.
    pub fn insert(&self, id: SubChunkId, chunk: SubChunk) {
        self.resident.write().insert(id, Arc::new(chunk));
    }

    /// Stores a sub-chunk that becomes resident on load.
    pub fn insert_cold(&self, id: SubChunkId, chunk: SubChunk) {
        self.cold.write().insert(id, Arc::new(chunk));
    }

    /// Drops a sub-chunk from residency.
    pub fn evict(&self, id: SubChunkId) -> Option<Arc<SubChunk>> {
        self.resident.write().remove(&id)
    }

    /// Edits a resident sub-chunk in place (copy-on-write).
    ///
    /// Returns `false` if `id` is not resident.
    pub fn modify(&self, id: SubChunkId, edit: impl FnOnce(&mut SubChunk)) -> bool {
        let mut resident = self.resident.write();
        match resident.get_mut(&id) {
            Some(chunk) => {
                edit(Arc::make_mut(chunk));
                true
            }
            None => false,
        }
    }

    /// Loads performed that moved a sub-chunk out of the cold store.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Number of resident sub-chunks.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.resident.read().len()
    }
}

impl WorldProvider for MemoryWorld {
    fn sub_chunk(&self, id: SubChunkId) -> Option<Arc<SubChunk>> {
        self.resident.read().get(&id).cloned()
    }

    fn load(&self, id: SubChunkId) -> StrataResult<()> {
        if self.resident.read().contains_key(&id) {
            return Ok(());
        }
        let Some(chunk) = self.cold.write().remove(&id) else {
            return Ok(());
        };
        if let Some(delay) = self.load_delay {
            std::thread::sleep(delay);
        }
        self.loads.fetch_add(1, Ordering::AcqRel);
        self.resident.write().insert(id, chunk);
        tracing::trace!("sub-chunk {} loaded", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_chunks_need_a_load() {
        let world = MemoryWorld::new();
        let id = SubChunkId::new(0, 1, 0);
        world.insert_cold(id, SubChunk::filled(BlockState::new(1, 0)));

        assert!(!world.is_resident(id));
        world.load(id).unwrap();
        world.load(id).unwrap();
        assert!(world.is_resident(id));
        assert_eq!(world.load_count(), 1);
        assert_eq!(world.block_at(id, 3, 3, 3), Some(BlockState::new(1, 0)));
    }

    #[test]
    fn test_modify_is_copy_on_write() {
        let world = MemoryWorld::new();
        let id = SubChunkId::default();
        world.insert(id, SubChunk::new());
        let before = world.sub_chunk(id).unwrap();

        assert!(world.modify(id, |chunk| chunk.set_block(0, 0, 0, BlockState::new(4, 0))));
        assert!(before.is_empty());
        assert_eq!(world.block_at(id, 0, 0, 0), Some(BlockState::new(4, 0)));
        assert!(!world.modify(SubChunkId::new(9, 9, 9), |_| {}));
    }
}
