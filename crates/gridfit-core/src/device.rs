//! Hardware capability snapshots and the device query interface.

use crate::dim::Dim3;
use crate::error::Result;

/// Largest grid extent CUDA allows along x (2^31 - 1).
pub const MAX_GRID_DIM_X: u32 = i32::MAX as u32;

/// Read-only snapshot of the launch limits of a device.
///
/// Sizing functions request a fresh snapshot from their [`DeviceQuery`] on every
/// call and never mutate or cache it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCapability {
    /// Number of streaming multiprocessors (compute units).
    pub sm_count: u32,
    /// Maximum resident threads per multiprocessor.
    pub max_threads_per_sm: u32,
    /// Maximum threads per block.
    pub max_threads_per_block: u32,
    /// Maximum threads per block along each axis.
    pub max_threads_dim: Dim3,
    /// Maximum number of blocks along each grid axis.
    pub max_grid_size: Dim3,
}

impl Default for HardwareCapability {
    fn default() -> Self {
        // Ampere-class (A100) limits
        Self::ampere()
    }
}

impl HardwareCapability {
    /// Creates a capability snapshot for Volta GPUs (V100).
    #[must_use]
    pub fn volta() -> Self {
        Self {
            sm_count: 80,
            max_threads_per_sm: 2048,
            ..Self::cuda_common()
        }
    }

    /// Creates a capability snapshot for Ampere GPUs (A100).
    #[must_use]
    pub fn ampere() -> Self {
        Self {
            sm_count: 108,
            max_threads_per_sm: 2048,
            ..Self::cuda_common()
        }
    }

    /// Creates a capability snapshot for Ada Lovelace GPUs (RTX 4090).
    #[must_use]
    pub fn ada() -> Self {
        Self {
            sm_count: 128,
            max_threads_per_sm: 1536,
            ..Self::cuda_common()
        }
    }

    /// Creates a capability snapshot for Hopper GPUs (H100 SXM).
    #[must_use]
    pub fn hopper() -> Self {
        Self {
            sm_count: 132,
            max_threads_per_sm: 2048,
            ..Self::cuda_common()
        }
    }

    /// Block and grid limits shared by every CUDA device since compute capability 3.0.
    fn cuda_common() -> Self {
        Self {
            sm_count: 1,
            max_threads_per_sm: 2048,
            max_threads_per_block: 1024,
            max_threads_dim: Dim3::new(1024, 1024, 64),
            max_grid_size: Dim3::new(MAX_GRID_DIM_X, 65535, 65535),
        }
    }

    /// Builder method to set the multiprocessor count.
    #[must_use]
    pub fn with_sm_count(mut self, sm_count: u32) -> Self {
        self.sm_count = sm_count;
        self
    }

    /// Builder method to set the maximum resident threads per multiprocessor.
    #[must_use]
    pub fn with_max_threads_per_sm(mut self, threads: u32) -> Self {
        self.max_threads_per_sm = threads;
        self
    }

    /// Builder method to set the maximum threads per block.
    #[must_use]
    pub fn with_max_threads_per_block(mut self, threads: u32) -> Self {
        self.max_threads_per_block = threads;
        self
    }

    /// Builder method to set the per-axis thread limits.
    #[must_use]
    pub fn with_max_threads_dim(mut self, dim: Dim3) -> Self {
        self.max_threads_dim = dim;
        self
    }

    /// Builder method to set the per-axis grid limits.
    #[must_use]
    pub fn with_max_grid_size(mut self, dim: Dim3) -> Self {
        self.max_grid_size = dim;
        self
    }

    /// Threads that can be resident on the whole device at once.
    ///
    /// Saturates at `u32::MAX` on absurd readings.
    #[must_use]
    pub fn physical_thread_count(&self) -> u32 {
        self.sm_count.saturating_mul(self.max_threads_per_sm)
    }
}

/// Capability lookup for "the current device".
///
/// Which device that is stays ambient: it is whatever device the implementor
/// wraps. Implementations must be safe to query from several threads at once.
pub trait DeviceQuery: Send + Sync {
    /// Returns a fresh capability snapshot.
    fn capability(&self) -> Result<HardwareCapability>;
}

/// A snapshot answers queries with itself.
impl DeviceQuery for HardwareCapability {
    fn capability(&self) -> Result<HardwareCapability> {
        Ok(*self)
    }
}

impl<T: DeviceQuery + ?Sized> DeviceQuery for &T {
    fn capability(&self) -> Result<HardwareCapability> {
        (**self).capability()
    }
}

impl<T: DeviceQuery + ?Sized> DeviceQuery for std::sync::Arc<T> {
    fn capability(&self) -> Result<HardwareCapability> {
        (**self).capability()
    }
}
