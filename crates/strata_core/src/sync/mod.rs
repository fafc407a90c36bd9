//! # Synchronization Primitives
//!
//! Workers suspend in exactly two places: waiting for a job and waiting for a
//! free staging slot. Both waits must be interruptible by a stop request.
//!
//! ```text
//!   main thread                     worker
//!   -----------                     ------
//!   cancel.cancel()  ───────────>   sees flag at next wake
//!   semaphore.interrupt() ──────>   woken from acquire(), returns Cancelled
//!   handle.join()    <───────────   releases its slots, exits
//! ```

mod cancel;
mod semaphore;

pub use cancel::CancelToken;
pub use semaphore::Semaphore;
