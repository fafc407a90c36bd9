//! # Memory Management
//!
//! Two allocators, one per side of the worker/main-thread handoff.
//!
//! ## Design Philosophy
//!
//! All staging memory is allocated once at startup:
//! - Workers never allocate mesh storage, they borrow 4 KiB slots
//! - A full arena blocks workers instead of growing
//! - GPU banks grow on demand but ranges inside them are recycled

mod bank;
mod host;
mod staging;

pub use bank::{
    BankAllocator, BankRange, BankStats, FreeRange, GpuContext, UsedRange, BANK_GRANULARITY,
    FRAGMENT_THRESHOLD, RANGE_ROUNDING,
};
pub use host::HostGpuContext;
pub use staging::{
    ReadyMesh, SlotHeader, SlotState, StagingArena, StagingSlot, HEADER_WORDS, MAX_SLOTS,
    PAYLOAD_WORDS, SLOT_BYTES, SLOT_WORDS,
};
