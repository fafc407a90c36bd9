//! Meshing statistics.

/// Counters since the engine was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Jobs accepted into the queue (or meshed inline).
    pub jobs_submitted: u64,
    /// Submissions dropped because the sub-chunk was already queued.
    pub jobs_deduplicated: u64,
    /// Meshes uploaded or freed by `poll_completed`.
    pub jobs_completed: u64,
    /// Jobs abandoned because of a stop request.
    pub jobs_cancelled: u64,
    /// Jobs that failed with an error other than cancellation.
    pub jobs_failed: u64,
    /// Completed meshes with no quads.
    pub empty_meshes: u64,
    /// Meshes that outgrew the free staging slots and finished on the heap.
    pub staging_overflows: u64,
    /// Quads copied into banks.
    pub quads_uploaded: u64,
    /// Unit quads saved by greedy merging.
    pub quads_merged: u64,
    /// Bytes copied into banks.
    pub bytes_uploaded: u64,
}

impl EngineStats {
    /// Jobs accepted but not yet completed, cancelled or failed.
    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.jobs_submitted
            .saturating_sub(self.jobs_completed + self.jobs_cancelled + self.jobs_failed)
    }

    /// Fraction of unit faces removed by merging (0.0 - 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn merge_ratio(&self) -> f64 {
        let total = self.quads_uploaded + self.quads_merged;
        if total == 0 {
            0.0
        } else {
            self.quads_merged as f64 / total as f64
        }
    }
}
