//! Occupancy estimation interface.
//!
//! Occupancy-aware sizing asks the driver which block size maximizes resident
//! threads for one specific compiled kernel. The estimation itself is a black box
//! owned by the backend; this module only defines the query surface and a
//! capability-only fallback for backends that cannot answer it natively.

use std::marker::PhantomData;

use crate::device::{DeviceQuery, HardwareCapability};
use crate::error::{LaunchError, Result};
use crate::math::ceil_div;

/// Block size and block count the occupancy query recommends for a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyHint {
    /// Minimum grid size that reaches full occupancy.
    pub block_count: u32,
    /// Block size that maximizes occupancy.
    pub threads_per_block: u32,
}

impl OccupancyHint {
    /// Creates a new hint.
    #[must_use]
    pub fn new(block_count: u32, threads_per_block: u32) -> Self {
        Self {
            block_count,
            threads_per_block,
        }
    }
}

/// Kernel-specific occupancy queries.
///
/// Mirrors `cuOccupancyMaxPotentialBlockSize` and
/// `cuOccupancyMaxActiveBlocksPerMultiprocessor`. Failures are returned as
/// [`LaunchError::OccupancyQuery`] and are fatal for the launch being sized.
pub trait OccupancyQuery: DeviceQuery {
    /// Backend handle identifying a compiled kernel.
    type Kernel: ?Sized;

    /// Returns the block size that maximizes occupancy for `kernel`, and the
    /// minimum number of blocks needed to fill the device at that size.
    ///
    /// `block_size_limit` of 0 means the caller imposes no ceiling.
    fn max_potential_block_size(
        &self,
        kernel: &Self::Kernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<OccupancyHint>;

    /// Returns how many blocks of `block_size` threads can be resident on one
    /// multiprocessor at once.
    fn max_active_blocks_per_multiprocessor(
        &self,
        kernel: &Self::Kernel,
        block_size: u32,
        dynamic_shared_memory_bytes: usize,
    ) -> Result<u32>;
}

impl<T: OccupancyQuery + ?Sized> OccupancyQuery for &T {
    type Kernel = T::Kernel;

    fn max_potential_block_size(
        &self,
        kernel: &Self::Kernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<OccupancyHint> {
        (**self).max_potential_block_size(kernel, dynamic_shared_memory_bytes, block_size_limit)
    }

    fn max_active_blocks_per_multiprocessor(
        &self,
        kernel: &Self::Kernel,
        block_size: u32,
        dynamic_shared_memory_bytes: usize,
    ) -> Result<u32> {
        (**self).max_active_blocks_per_multiprocessor(kernel, block_size, dynamic_shared_memory_bytes)
    }
}

/// Default block-size cap used by the capability-only estimate.
pub const HEURISTIC_MAX_THREADS_PER_BLOCK: u32 = 1024;

/// Occupancy estimate derived from device capability alone.
///
/// For backends whose driver has no occupancy API (HIP before
/// `hipOccupancyMaxPotentialBlockSize` existed, for example). Kernel register and
/// shared-memory pressure is ignored: every kernel gets the largest block the
/// device allows (capped at 1024 threads) and one block per multiprocessor until
/// the device's resident-thread budget is covered.
pub struct HeuristicOccupancy<D, K: ?Sized = ()> {
    device: D,
    max_threads_per_block: u32,
    _kernel: PhantomData<fn(&K)>,
}

impl<D: DeviceQuery, K: ?Sized> HeuristicOccupancy<D, K> {
    /// Wraps a device query.
    #[must_use]
    pub fn new(device: D) -> Self {
        Self {
            device,
            max_threads_per_block: HEURISTIC_MAX_THREADS_PER_BLOCK,
            _kernel: PhantomData,
        }
    }

    /// Builder method to change the block-size cap.
    #[must_use]
    pub fn with_max_threads_per_block(mut self, threads: u32) -> Self {
        self.max_threads_per_block = threads;
        self
    }

    /// Returns the wrapped device query.
    pub fn device(&self) -> &D {
        &self.device
    }

    fn estimate(&self, caps: &HardwareCapability, block_size_limit: u32) -> Result<OccupancyHint> {
        let mut threads_per_block = self.max_threads_per_block.min(caps.max_threads_per_block);
        if block_size_limit > 0 {
            threads_per_block = threads_per_block.min(block_size_limit);
        }
        if threads_per_block == 0 {
            return Err(LaunchError::occupancy_query(
                "device reports zero threads per block",
            ));
        }

        let block_count = ceil_div(caps.physical_thread_count(), threads_per_block).min(caps.sm_count);
        Ok(OccupancyHint::new(block_count, threads_per_block))
    }
}

impl<D: DeviceQuery, K: ?Sized> DeviceQuery for HeuristicOccupancy<D, K> {
    fn capability(&self) -> Result<HardwareCapability> {
        self.device.capability()
    }
}

impl<D: DeviceQuery, K: ?Sized> OccupancyQuery for HeuristicOccupancy<D, K> {
    type Kernel = K;

    fn max_potential_block_size(
        &self,
        _kernel: &K,
        _dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<OccupancyHint> {
        let caps = self.device.capability()?;
        let hint = self.estimate(&caps, block_size_limit)?;
        tracing::trace!(
            block_count = hint.block_count,
            threads_per_block = hint.threads_per_block,
            "Capability-only occupancy estimate"
        );
        Ok(hint)
    }

    fn max_active_blocks_per_multiprocessor(
        &self,
        _kernel: &K,
        block_size: u32,
        _dynamic_shared_memory_bytes: usize,
    ) -> Result<u32> {
        if block_size == 0 {
            return Err(LaunchError::InvalidBlockSize(block_size));
        }
        let caps = self.device.capability()?;
        Ok(caps.max_threads_per_sm / block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_device() -> HardwareCapability {
        HardwareCapability::default()
            .with_sm_count(4)
            .with_max_threads_per_sm(2048)
    }

    #[test]
    fn test_heuristic_occupancy_hint() {
        let occ: HeuristicOccupancy<_> = HeuristicOccupancy::new(small_device());
        let hint = occ.max_potential_block_size(&(), 0, 0).unwrap();
        // 8192 resident threads / 1024 = 8 blocks, capped at 4 SMs
        assert_eq!(hint, OccupancyHint::new(4, 1024));
    }

    #[test]
    fn test_heuristic_occupancy_respects_limit() {
        let occ: HeuristicOccupancy<_> = HeuristicOccupancy::new(small_device());
        let hint = occ.max_potential_block_size(&(), 0, 128).unwrap();
        assert_eq!(hint.threads_per_block, 128);
        assert_eq!(hint.block_count, 4);

        let occ: HeuristicOccupancy<_> =
            HeuristicOccupancy::new(small_device().with_max_threads_per_block(512));
        let hint = occ.max_potential_block_size(&(), 0, 0).unwrap();
        assert_eq!(hint.threads_per_block, 512);
    }

    #[test]
    fn test_heuristic_active_blocks() {
        let occ: HeuristicOccupancy<_> = HeuristicOccupancy::new(small_device());
        assert_eq!(occ.max_active_blocks_per_multiprocessor(&(), 256, 0).unwrap(), 8);
        assert_eq!(occ.max_active_blocks_per_multiprocessor(&(), 4096, 0).unwrap(), 0);
        assert!(matches!(
            occ.max_active_blocks_per_multiprocessor(&(), 0, 0),
            Err(LaunchError::InvalidBlockSize(0))
        ));
    }

    #[test]
    fn test_heuristic_rejects_zero_block_device() {
        let occ: HeuristicOccupancy<_> =
            HeuristicOccupancy::new(small_device().with_max_threads_per_block(0));
        let err = occ.max_potential_block_size(&(), 0, 0).unwrap_err();
        assert!(err.is_driver_failure());
    }
}
