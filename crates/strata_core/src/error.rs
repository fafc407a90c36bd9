//! # Error Types
//!
//! Everything that can go wrong between a meshing worker and a GPU bank.

use crate::id::SubChunkId;
use thiserror::Error;

/// Errors raised by the staging, bank and meshing layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrataError {
    /// The job or wait was cancelled by a stop request.
    #[error("operation cancelled")]
    Cancelled,

    /// A configuration value is out of range or could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Staging arena requested with an unsupported slot count.
    #[error("staging slot count {requested} out of range 1..={max}")]
    InvalidSlotCount {
        /// Requested slot count.
        requested: usize,
        /// Largest count the slot header can link.
        max: usize,
    },

    /// A staging chain header points outside the arena or at a slot with another owner.
    #[error("broken staging chain at slot {0}")]
    BrokenChain(u16),

    /// A bank allocation was requested for zero bytes.
    #[error("zero-sized bank allocation for {0}")]
    EmptyAllocation(SubChunkId),

    /// No bank could be created large enough for the request.
    #[error("bank allocation of {size} bytes failed")]
    BankExhausted {
        /// Requested size in bytes.
        size: u32,
    },

    /// Arena or bank bookkeeping no longer adds up.
    #[error("allocator invariant violated: {0}")]
    Invariant(String),

    /// The GPU resource context refused an operation.
    #[error("gpu context error: {0}")]
    Gpu(String),

    /// A mesh does not fit the 32-bit bank address space.
    #[error("mesh of {size} bytes exceeds limit of {max}")]
    MeshTooLarge {
        /// Mesh size in bytes.
        size: usize,
        /// Maximum supported size.
        max: usize,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// A worker thread panicked before it could be joined.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// Reading a configuration file failed.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Result type for STRATA operations.
pub type StrataResult<T> = Result<T, StrataError>;
