//! Host-memory stand-in for a GPU device.

use super::bank::GpuContext;
use crate::error::{StrataError, StrataResult};

/// [`GpuContext`] whose banks are plain byte vectors.
///
/// Used by headless tools and tests; bank handles are indices.
#[derive(Debug, Default)]
pub struct HostGpuContext {
    banks: Vec<Vec<u8>>,
    /// Bank currently mapped, if any.
    mapped: Option<usize>,
    /// Bytes handed out through `map_range`.
    bytes_mapped: u64,
}

impl HostGpuContext {
    /// Creates a context with no banks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a bank.
    #[must_use]
    pub fn bank_bytes(&self, bank: usize) -> Option<&[u8]> {
        self.banks.get(bank).map(Vec::as_slice)
    }

    /// Number of banks created.
    #[must_use]
    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Total bytes mapped for writing since creation.
    #[must_use]
    pub fn bytes_mapped(&self) -> u64 {
        self.bytes_mapped
    }
}

impl GpuContext for HostGpuContext {
    type Bank = usize;

    fn create_bank(&mut self, capacity: u32) -> StrataResult<usize> {
        self.banks.push(vec![0u8; capacity as usize]);
        Ok(self.banks.len() - 1)
    }

    fn map_range(&mut self, bank: &usize, offset: u32, size: u32) -> StrataResult<&mut [u8]> {
        if let Some(open) = self.mapped {
            return Err(StrataError::Gpu(format!("bank {open} is still mapped")));
        }
        let storage = self
            .banks
            .get_mut(*bank)
            .ok_or_else(|| StrataError::Gpu(format!("unknown bank {bank}")))?;

        let start = offset as usize;
        let end = start + size as usize;
        if end > storage.len() {
            return Err(StrataError::Gpu(format!(
                "range {start}..{end} outside bank {bank} of {} bytes",
                storage.len()
            )));
        }

        self.mapped = Some(*bank);
        self.bytes_mapped += u64::from(size);
        Ok(&mut storage[start..end])
    }

    fn unmap(&mut self, _bank: &usize) {
        self.mapped = None;
    }
}
