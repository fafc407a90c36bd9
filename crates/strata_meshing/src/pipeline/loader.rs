//! Neighbor loading shared by all workers.
//!
//! Adjacent sub-chunks are meshed by different workers at the same time and
//! all of them need the same neighbors. The first worker to ask loads a
//! neighbor; the others wait a bounded time for it instead of loading it
//! again.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use strata_core::{StrataResult, SubChunkId};

use crate::voxel::WorldProvider;

/// What [`NeighborLoader::ensure`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Already resident, nothing to do.
    AlreadyResident,
    /// This caller loaded it.
    Loaded,
    /// Another worker loaded it while this one waited.
    LoadedByOther,
    /// Another worker is still loading it; the caller goes on without it.
    TimedOut,
}

/// Load dedup across workers.
pub struct NeighborLoader {
    loading: Mutex<HashSet<SubChunkId>>,
    done: Condvar,
    wait: Duration,
}

impl NeighborLoader {
    /// Creates a loader that waits at most `wait` for another worker's load.
    #[must_use]
    pub fn new(wait: Duration) -> Self {
        Self {
            loading: Mutex::new(HashSet::new()),
            done: Condvar::new(),
            wait,
        }
    }

    /// Sub-chunks being loaded right now.
    #[must_use]
    pub fn loading_count(&self) -> usize {
        self.loading.lock().len()
    }

    /// Makes `id` resident unless another worker is already on it.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`WorldProvider::load`].
    pub fn ensure(&self, world: &dyn WorldProvider, id: SubChunkId) -> StrataResult<LoadOutcome> {
        if world.is_resident(id) {
            return Ok(LoadOutcome::AlreadyResident);
        }

        let mut loading = self.loading.lock();
        if loading.contains(&id) {
            let deadline = Instant::now() + self.wait;
            while loading.contains(&id) {
                if self.done.wait_until(&mut loading, deadline).timed_out() && loading.contains(&id) {
                    tracing::warn!("gave up waiting {:?} for sub-chunk {} to load", self.wait, id);
                    return Ok(LoadOutcome::TimedOut);
                }
            }
            return Ok(LoadOutcome::LoadedByOther);
        }
        // A load may have finished between the residency check and the lock.
        if world.is_resident(id) {
            return Ok(LoadOutcome::AlreadyResident);
        }
        loading.insert(id);
        drop(loading);

        let result = world.load(id);

        self.loading.lock().remove(&id);
        self.done.notify_all();
        result.map(|()| LoadOutcome::Loaded)
    }

    /// Ensures `id` and all 26 sub-chunks around it, since the halo reads
    /// edge and corner voxels from diagonal neighbors too.
    ///
    /// # Errors
    ///
    /// Propagates the first load error.
    pub fn ensure_with_neighbors(&self, world: &dyn WorldProvider, id: SubChunkId) -> StrataResult<()> {
        self.ensure(world, id)?;
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    if (dx, dy, dz) != (0, 0, 0) {
                        self.ensure(world, id.offset(dx, dy, dz))?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for NeighborLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborLoader")
            .field("loading", &self.loading_count())
            .field("wait", &self.wait)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{BlockState, HaloVolume, MemoryWorld, SubChunk};
    use std::sync::Arc;

    fn stone() -> SubChunk {
        SubChunk::filled(BlockState::new(1, 0))
    }

    #[test]
    fn test_single_load() {
        let world = MemoryWorld::new();
        let id = SubChunkId::new(0, 0, 0);
        world.insert_cold(id, stone());
        let loader = NeighborLoader::new(Duration::from_millis(1));

        assert_eq!(loader.ensure(&world, id).unwrap(), LoadOutcome::Loaded);
        assert_eq!(loader.ensure(&world, id).unwrap(), LoadOutcome::AlreadyResident);
        assert_eq!(world.load_count(), 1);
        assert_eq!(loader.loading_count(), 0);
    }

    #[test]
    fn test_diagonal_neighbors_reach_the_halo() {
        let world = MemoryWorld::new();
        let center = SubChunkId::new(0, 0, 0);
        let edge = center.offset(1, 0, 1);
        let corner = center.offset(-1, -1, -1);
        world.insert_cold(center, SubChunk::new());
        world.insert_cold(edge, stone());
        world.insert_cold(corner, stone());
        let loader = NeighborLoader::new(Duration::from_millis(1));

        loader.ensure_with_neighbors(&world, center).unwrap();
        assert!(world.is_resident(edge));
        assert!(world.is_resident(corner));
        assert_eq!(world.load_count(), 3);

        let mut halo = HaloVolume::new();
        assert!(halo.gather(&world, center));
        assert_eq!(halo.block(16, 0, 16), BlockState::new(1, 0));
        assert_eq!(halo.block(16, 15, 16), BlockState::new(1, 0));
        assert_eq!(halo.block(-1, -1, -1), BlockState::new(1, 0));
        assert_eq!(halo.block(16, 0, 15), BlockState::AIR);
    }

    #[test]
    fn test_concurrent_callers_load_once() {
        let world = Arc::new(MemoryWorld::with_load_delay(Duration::from_millis(30)));
        let id = SubChunkId::new(2, 0, 2);
        world.insert_cold(id, stone());
        let loader = Arc::new(NeighborLoader::new(Duration::from_secs(5)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let world = Arc::clone(&world);
                let loader = Arc::clone(&loader);
                std::thread::spawn(move || loader.ensure(world.as_ref(), id).unwrap())
            })
            .collect();
        let outcomes: Vec<LoadOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(world.load_count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == LoadOutcome::Loaded).count(), 1);
        assert!(world.is_resident(id));
    }

    #[test]
    fn test_wait_budget_expires() {
        let world = Arc::new(MemoryWorld::with_load_delay(Duration::from_millis(200)));
        let id = SubChunkId::new(0, 3, 0);
        world.insert_cold(id, stone());
        let loader = Arc::new(NeighborLoader::new(Duration::from_millis(5)));

        let slow = {
            let world = Arc::clone(&world);
            let loader = Arc::clone(&loader);
            std::thread::spawn(move || loader.ensure(world.as_ref(), id).unwrap())
        };
        while loader.loading_count() == 0 {
            std::thread::yield_now();
        }

        assert_eq!(loader.ensure(world.as_ref(), id).unwrap(), LoadOutcome::TimedOut);
        assert_eq!(slow.join().unwrap(), LoadOutcome::Loaded);
        assert_eq!(world.load_count(), 1);
    }
}
