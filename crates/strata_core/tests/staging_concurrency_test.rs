//! # Staging Concurrency Test
//!
//! Many workers hammer a small arena: no slot may ever have two owners, and
//! a stop request must free every blocked worker.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use strata_core::{CancelToken, SlotHeader, SlotState, StagingArena, StrataError, SubChunkId};

/// Test: 8 workers, 4 slots, 500 rounds each, exclusive ownership throughout.
#[test]
fn test_slot_exclusivity_under_contention() {
    let arena: Arc<StagingArena<usize>> = Arc::new(StagingArena::new(4).unwrap());
    let live: Arc<Mutex<HashSet<u16>>> = Arc::new(Mutex::new(HashSet::new()));
    let cancel = CancelToken::new();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let arena = Arc::clone(&arena);
            let live = Arc::clone(&live);
            let cancel = cancel.clone();
            thread::spawn(move || {
                let owner = SubChunkId::new(worker, 0, 0);
                for round in 0..500 {
                    let mut slot = arena.acquire(owner, &cancel).unwrap();
                    assert!(
                        live.lock().insert(slot.index()),
                        "slot {} handed out twice",
                        slot.index()
                    );
                    slot.payload_mut()[0] = worker as u32;
                    slot.payload_mut()[1] = round;
                    assert_eq!(arena.slot_state(slot.index()), Some(SlotState::Writing(owner)));
                    assert_eq!(slot.payload()[0], worker as u32);

                    live.lock().remove(&slot.index());
                    arena.release(slot);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(arena.free_slots(), 4);
}

/// Test: ready meshes from many workers all drain with intact chains.
#[test]
fn test_ready_handoff_from_many_workers() {
    let arena: Arc<StagingArena<usize>> = Arc::new(StagingArena::new(16).unwrap());
    let cancel = CancelToken::new();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let arena = Arc::clone(&arena);
            let cancel = cancel.clone();
            thread::spawn(move || {
                for job in 0..50 {
                    let owner = SubChunkId::new(worker, job, 0);
                    let mut head = arena.acquire(owner, &cancel).unwrap();
                    let mut tail = arena.acquire(owner, &cancel).unwrap();
                    tail.payload_mut()[0] = job as u32;
                    tail.set_header(SlotHeader {
                        used_words: 1,
                        discard_words: 0,
                        next: None,
                    });
                    head.set_header(SlotHeader {
                        used_words: 0,
                        discard_words: 0,
                        next: Some(tail.index()),
                    });
                    arena.mark_ready(owner, vec![vec![head, tail]], job as usize).unwrap();
                }
            })
        })
        .collect();

    let mut drained = 0;
    while drained < 200 {
        for ready in arena.drain_ready() {
            let chain = arena.take_chain(ready.owner, ready.heads[0]).unwrap();
            assert_eq!(chain.len(), 2);
            assert_eq!(chain[1].used(), &[ready.meta as u32]);
            arena.release_all(chain);
            drained += 1;
        }
        thread::yield_now();
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(arena.free_slots(), 16);
}

/// Test: workers blocked on a full arena are released by a stop request.
#[test]
fn test_stop_releases_blocked_workers() {
    let arena: Arc<StagingArena<()>> = Arc::new(StagingArena::new(1).unwrap());
    let cancel = CancelToken::new();
    let held = arena.try_acquire(SubChunkId::default()).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|worker| {
            let arena = Arc::clone(&arena);
            let cancel = cancel.clone();
            thread::spawn(move || {
                arena
                    .acquire(SubChunkId::new(worker, 1, 0), &cancel)
                    .map(|slot| arena.release(slot))
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    cancel.cancel();
    arena.interrupt();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Err(StrataError::Cancelled));
    }

    arena.release(held);
    assert_eq!(arena.free_slots(), 1);
}
