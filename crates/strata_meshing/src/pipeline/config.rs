//! Meshing engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_core::memory::{BANK_GRANULARITY, MAX_SLOTS};
use strata_core::{StrataError, StrataResult};

/// Largest worker pool the engine will spawn.
pub const MAX_WORKERS: usize = 64;

/// Staging slots per worker below which most meshes would finish on the
/// heap: one per sink plus one spare link each. A smaller arena never
/// blocks forever, it only stages less.
pub const SLOTS_PER_WORKER: usize = 4;

/// Configuration for [`MeshingEngine`](super::MeshingEngine).
///
/// Every field has a default, so a TOML file only lists what it changes:
///
/// ```toml
/// workers = 6
/// staging_slots = 512
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshingConfig {
    /// Worker threads; 0 meshes on the calling thread.
    pub workers: usize,
    /// Staging slots of 4 KiB shared by all workers.
    pub staging_slots: usize,
    /// Smallest GPU bank to create, in bytes.
    pub min_bank_size: u32,
    /// Greedy-merge coplanar faces.
    pub merge_quads: bool,
    /// How long a worker waits for a neighbor another worker is loading (µs).
    pub neighbor_wait_us: u64,
}

impl Default for MeshingConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            staging_slots: 256, // 1 MiB of staging memory
            min_bank_size: 1 << 20,
            merge_quads: true,
            neighbor_wait_us: 500,
        }
    }
}

impl MeshingConfig {
    /// Production config: a worker per spare core on a typical desktop and
    /// banks large enough to hold a full view distance in a few buffers.
    #[must_use]
    pub const fn production() -> Self {
        Self {
            workers: 4,
            staging_slots: 512,     // 2 MiB, a frame of worst-case output
            min_bank_size: 8 << 20, // 8 MiB banks
            merge_quads: true,
            neighbor_wait_us: 1000,
        }
    }

    /// Meshes on the calling thread, no workers.
    #[must_use]
    pub const fn single_threaded() -> Self {
        Self {
            workers: 0,
            staging_slots: 1,
            min_bank_size: 1 << 20,
            merge_quads: true,
            neighbor_wait_us: 0,
        }
    }

    /// Neighbor wait as a duration.
    #[inline]
    #[must_use]
    pub const fn neighbor_wait(&self) -> Duration {
        Duration::from_micros(self.neighbor_wait_us)
    }

    /// Checks the values against the engine's limits.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> StrataResult<()> {
        if self.workers > MAX_WORKERS {
            return Err(StrataError::InvalidConfig(format!(
                "workers = {} exceeds {}",
                self.workers, MAX_WORKERS
            )));
        }
        if self.staging_slots == 0 || self.staging_slots > MAX_SLOTS {
            return Err(StrataError::InvalidConfig(format!(
                "staging_slots = {} must be within 1..={}",
                self.staging_slots, MAX_SLOTS
            )));
        }
        if self.staging_slots < self.workers * SLOTS_PER_WORKER {
            return Err(StrataError::InvalidConfig(format!(
                "staging_slots = {} is below {} per worker for {} workers",
                self.staging_slots, SLOTS_PER_WORKER, self.workers
            )));
        }
        if self.min_bank_size < BANK_GRANULARITY {
            return Err(StrataError::InvalidConfig(format!(
                "min_bank_size = {} is below {} bytes",
                self.min_bank_size, BANK_GRANULARITY
            )));
        }
        Ok(())
    }

    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::InvalidConfig`] for malformed TOML or values
    /// [`validate`](Self::validate) rejects.
    pub fn from_toml_str(text: &str) -> StrataResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| StrataError::InvalidConfig(format!("meshing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        MeshingConfig::default().validate().unwrap();
        MeshingConfig::production().validate().unwrap();
        MeshingConfig::single_threaded().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MeshingConfig::from_toml_str("workers = 3\nmerge_quads = false").unwrap();
        assert_eq!(config.workers, 3);
        assert!(!config.merge_quads);
        assert_eq!(config.staging_slots, MeshingConfig::default().staging_slots);
    }

    #[test]
    fn test_rejects_starving_arena() {
        let config = MeshingConfig {
            workers: 8,
            staging_slots: 16,
            ..MeshingConfig::default()
        };
        assert!(matches!(config.validate(), Err(StrataError::InvalidConfig(_))));

        assert!(MeshingConfig::from_toml_str("staging_slots = 5000").is_err());
        assert!(MeshingConfig::from_toml_str("min_bank_size = 100").is_err());
        assert!(MeshingConfig::from_toml_str("workers = \"many\"").is_err());
    }
}
