//! Stub backend for exercising sizing without GPU hardware.
//!
//! Answers capability and occupancy queries with fixed numbers and records the
//! arguments it was queried with.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::device::{DeviceQuery, HardwareCapability};
use crate::error::{LaunchError, Result};
use crate::occupancy::{OccupancyHint, OccupancyQuery};

/// Placeholder kernel handle accepted by [`StubBackend`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubKernel;

/// Backend returning canned capability and occupancy answers.
#[derive(Debug)]
pub struct StubBackend {
    capability: HardwareCapability,
    hint: OccupancyHint,
    active_blocks_per_sm: u32,
    fail_device: bool,
    fail_occupancy: bool,
    potential_query_count: AtomicUsize,
    last_potential_query: Mutex<Option<(usize, u32)>>,
    last_active_query: Mutex<Option<(u32, usize)>>,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new(HardwareCapability::default())
    }
}

impl StubBackend {
    /// Creates a stub reporting `capability`, with an occupancy hint of one
    /// full-size block per multiprocessor.
    #[must_use]
    pub fn new(capability: HardwareCapability) -> Self {
        Self {
            capability,
            hint: OccupancyHint::new(capability.sm_count, capability.max_threads_per_block),
            active_blocks_per_sm: 2,
            fail_device: false,
            fail_occupancy: false,
            potential_query_count: AtomicUsize::new(0),
            last_potential_query: Mutex::new(None),
            last_active_query: Mutex::new(None),
        }
    }

    /// Builder method to set the occupancy hint.
    #[must_use]
    pub fn with_hint(mut self, hint: OccupancyHint) -> Self {
        self.hint = hint;
        self
    }

    /// Builder method to set the active blocks per multiprocessor.
    #[must_use]
    pub fn with_active_blocks(mut self, blocks: u32) -> Self {
        self.active_blocks_per_sm = blocks;
        self
    }

    /// Makes every capability query fail.
    #[must_use]
    pub fn failing_device(mut self) -> Self {
        self.fail_device = true;
        self
    }

    /// Makes every occupancy query fail.
    #[must_use]
    pub fn failing_occupancy(mut self) -> Self {
        self.fail_occupancy = true;
        self
    }

    /// `(dynamic_shared_memory_bytes, block_size_limit)` of the last block-size query.
    pub fn last_potential_query(&self) -> Option<(usize, u32)> {
        *self.last_potential_query.lock()
    }

    /// Number of block-size queries answered.
    pub fn potential_query_count(&self) -> usize {
        self.potential_query_count.load(Ordering::Relaxed)
    }

    /// `(block_size, dynamic_shared_memory_bytes)` of the last active-blocks query.
    pub fn last_active_blocks_query(&self) -> Option<(u32, usize)> {
        *self.last_active_query.lock()
    }
}

impl DeviceQuery for StubBackend {
    fn capability(&self) -> Result<HardwareCapability> {
        if self.fail_device {
            return Err(LaunchError::device_query("stub device unavailable"));
        }
        Ok(self.capability)
    }
}

impl OccupancyQuery for StubBackend {
    type Kernel = StubKernel;

    fn max_potential_block_size(
        &self,
        _kernel: &StubKernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<OccupancyHint> {
        self.potential_query_count.fetch_add(1, Ordering::Relaxed);
        *self.last_potential_query.lock() = Some((dynamic_shared_memory_bytes, block_size_limit));
        if self.fail_occupancy {
            return Err(LaunchError::occupancy_query("stub occupancy failure"));
        }
        Ok(self.hint)
    }

    fn max_active_blocks_per_multiprocessor(
        &self,
        _kernel: &StubKernel,
        block_size: u32,
        dynamic_shared_memory_bytes: usize,
    ) -> Result<u32> {
        *self.last_active_query.lock() = Some((block_size, dynamic_shared_memory_bytes));
        if self.fail_occupancy {
            return Err(LaunchError::occupancy_query("stub occupancy failure"));
        }
        Ok(self.active_blocks_per_sm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_records_queries() {
        let stub = StubBackend::default();
        assert_eq!(stub.potential_query_count(), 0);

        let hint = stub.max_potential_block_size(&StubKernel, 128, 64).unwrap();
        assert_eq!(hint, OccupancyHint::new(108, 1024));
        assert_eq!(stub.last_potential_query(), Some((128, 64)));

        stub.max_active_blocks_per_multiprocessor(&StubKernel, 256, 32)
            .unwrap();
        assert_eq!(stub.last_active_blocks_query(), Some((256, 32)));
    }

    #[test]
    fn test_stub_failures() {
        let stub = StubBackend::default().failing_device().failing_occupancy();
        assert!(stub.capability().is_err());
        assert!(stub.max_potential_block_size(&StubKernel, 0, 0).is_err());
        assert_eq!(stub.potential_query_count(), 1);
    }
}
