//! Launch configuration sizing.
//!
//! Given a work extent and a device, decides how many threads go in a block and
//! how many blocks go in the grid. Two families of sizing live here:
//!
//! - **Heuristic** ([`LaunchSizer::config_1d`], [`LaunchSizer::config_2d`]) uses
//!   only the device's static limits. Suited to simple, memory-bound kernels.
//! - **Occupancy-aware** ([`LaunchSizer::config_1d_for_kernel`],
//!   [`LaunchSizer::config_1d_fixed_block_size`], [`LaunchSizer::config_2d_for_kernel`],
//!   [`LaunchSizer::config_3d_for_kernel`]) asks the backend which block size
//!   maximizes occupancy for one specific kernel.
//!
//! None of the configurations promise one thread per work item. Kernels must walk
//! their work with a grid-stride loop over `virtual_thread_count` (see
//! [`crate::stride`]); the 1D heuristic caps the grid at one block per
//! multiprocessor and the 2D heuristic can under-cover the y axis on purpose.
//!
//! # Example
//!
//! ```
//! use gridfit_core::{HardwareCapability, LaunchSizer};
//!
//! let device = HardwareCapability::ampere();
//! let sizer = LaunchSizer::new(&device);
//!
//! let cfg = sizer.config_1d(10_240)?;
//! assert_eq!(cfg.threads_per_block, 1024);
//! assert_eq!(cfg.block_count, 10);
//! # Ok::<(), gridfit_core::LaunchError>(())
//! ```

use crate::device::{DeviceQuery, HardwareCapability};
use crate::dim::{Axis, Dim3};
use crate::error::{LaunchError, Result};
use crate::math::{ceil_div, ceil_div_u64, min3, saturate_u32};
use crate::occupancy::OccupancyQuery;
use crate::policy::SizingPolicy;
use crate::stride::GridStride;

/// Launch configuration for a 1D kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Logical number of threads that work on the elements. With one element per
    /// logical thread this is the work element count.
    pub virtual_thread_count: u32,
    /// Threads per block.
    pub threads_per_block: u32,
    /// Blocks in the grid.
    pub block_count: u32,
}

impl LaunchConfig {
    /// Total physical threads launched.
    #[must_use]
    pub fn total_threads(&self) -> u64 {
        self.threads_per_block as u64 * self.block_count as u64
    }

    /// Grid dimensions in driver form.
    #[must_use]
    pub fn grid_dim(&self) -> (u32, u32, u32) {
        (self.block_count, 1, 1)
    }

    /// Block dimensions in driver form.
    #[must_use]
    pub fn block_dim(&self) -> (u32, u32, u32) {
        (self.threads_per_block, 1, 1)
    }

    /// Work items visited by `thread` of `block` in a grid-stride loop.
    #[must_use]
    pub fn thread_indices(&self, block: u32, thread: u32) -> GridStride {
        GridStride::for_thread(
            block,
            thread,
            self.threads_per_block,
            self.block_count,
            self.virtual_thread_count,
        )
    }
}

/// Launch configuration for a 2D or 3D kernel.
///
/// The default value (all zeros) is the "nothing to launch" sentinel returned for
/// degenerate extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridLaunchConfig {
    /// Logical threads per axis; the requested work extent.
    pub virtual_thread_count: Dim3,
    /// Threads per block per axis.
    pub threads_per_block: Dim3,
    /// Blocks per grid axis.
    pub block_count: Dim3,
}

/// 2D launch configuration; z is always 1 (or 0 for the empty sentinel).
pub type LaunchConfig2d = GridLaunchConfig;

/// 3D launch configuration.
pub type LaunchConfig3d = GridLaunchConfig;

impl GridLaunchConfig {
    /// The all-zero "nothing to launch" configuration.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true for the "nothing to launch" sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.virtual_thread_count.is_zero()
            && self.threads_per_block.is_zero()
            && self.block_count.is_zero()
    }

    /// Total blocks in the grid.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.block_count.volume()
    }

    /// Threads in one block.
    #[must_use]
    pub fn threads_per_block_volume(&self) -> u64 {
        self.threads_per_block.volume()
    }

    /// Total physical threads launched.
    #[must_use]
    pub fn total_threads(&self) -> u64 {
        self.total_blocks()
            .saturating_mul(self.threads_per_block_volume())
    }

    /// Work indices along `axis` visited by thread `thread` of block `block` in a
    /// per-axis grid-stride loop.
    #[must_use]
    pub fn axis_indices(&self, axis: Axis, block: u32, thread: u32) -> GridStride {
        GridStride::for_thread(
            block,
            thread,
            self.threads_per_block.get(axis),
            self.block_count.get(axis),
            self.virtual_thread_count.get(axis),
        )
    }
}

/// Converts a 1D work count, rejecting non-positive values.
fn work_count(count: i64) -> Result<u32> {
    if count <= 0 {
        return Err(LaunchError::InvalidWorkCount(count));
    }
    u32::try_from(count).map_err(|_| LaunchError::InvalidWorkCount(count))
}

/// Converts a multi-dimensional extent; `Ok(None)` marks a degenerate axis.
fn axis_extent(extent: i64) -> Result<Option<u32>> {
    if extent <= 0 {
        return Ok(None);
    }
    u32::try_from(extent)
        .map(Some)
        .map_err(|_| LaunchError::InvalidWorkCount(extent))
}

/// Raises zero components of a driver-reported limit to 1.
fn sanitize_limit(limit: Dim3, what: &str) -> Dim3 {
    if limit.x == 0 || limit.y == 0 || limit.z == 0 {
        tracing::warn!(%limit, what, "Device reported a zero launch limit, clamping to 1");
    }
    Dim3::new(limit.x.max(1), limit.y.max(1), limit.z.max(1))
}

/// Computes launch configurations against one backend.
///
/// The sizer holds no state besides the backend reference and the policy; every
/// call re-queries the device, so results always reflect the kernel and shared
/// memory footprint of that call.
#[derive(Debug, Clone, Copy)]
pub struct LaunchSizer<'a, B: ?Sized> {
    backend: &'a B,
    policy: SizingPolicy,
}

impl<'a, B: ?Sized> LaunchSizer<'a, B> {
    /// Creates a sizer with the default policy.
    #[must_use]
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            policy: SizingPolicy::default(),
        }
    }

    /// Builder method to set the sizing policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SizingPolicy) -> Self {
        self.policy = policy.sanitized();
        self
    }

    /// Returns the sizing policy.
    #[must_use]
    pub fn policy(&self) -> &SizingPolicy {
        &self.policy
    }

    /// Returns the backend.
    #[must_use]
    pub fn backend(&self) -> &'a B {
        self.backend
    }
}

impl<'a, B: DeviceQuery + ?Sized> LaunchSizer<'a, B> {
    /// Returns the capability snapshot the next sizing call would see.
    pub fn capability(&self) -> Result<HardwareCapability> {
        self.backend.capability()
    }

    /// Heuristic 1D configuration for a simple, largely memory-bound kernel.
    ///
    /// The block is as large as the device allows (capped by the policy, 1024 by
    /// default). The grid covers at most the threads the device can hold resident
    /// and never exceeds one block per multiprocessor; each multiprocessor is
    /// expected to keep its block busy via the grid-stride loop.
    ///
    /// Returns [`LaunchError::InvalidWorkCount`] if `work_element_count` is not positive.
    pub fn config_1d(&self, work_element_count: i64) -> Result<LaunchConfig> {
        let count = work_count(work_element_count)?;
        let caps = self.backend.capability()?;

        let threads_per_block = self
            .policy
            .max_threads_per_block_1d
            .min(caps.max_threads_per_block);
        if threads_per_block == 0 {
            return Err(LaunchError::device_query(
                "device reports zero threads per block",
            ));
        }

        let physical_thread_count = count.min(caps.physical_thread_count());
        let block_count = ceil_div(physical_thread_count, threads_per_block).min(caps.sm_count);

        tracing::debug!(
            work = count,
            physical_thread_count,
            threads_per_block,
            block_count,
            "Sized 1D launch"
        );

        Ok(LaunchConfig {
            virtual_thread_count: count,
            threads_per_block,
            block_count,
        })
    }

    /// Heuristic 2D configuration.
    ///
    /// Blocks target the policy's 2D size (256 threads by default, never more
    /// than the device's block and x-dimension limits), filling x first. The grid never holds more blocks than the device can keep resident
    /// at that block size.
    ///
    /// The y axis is deliberately *not* guaranteed to be covered: `block_rows`
    /// rounds down and `grid_y` is capped by the resident-block budget, so
    /// `block_count.y * threads_per_block.y` can be smaller than `ydim`. Kernels
    /// launched with this configuration must grid-stride over y (and x).
    ///
    /// Returns the all-zero configuration if either extent is not positive.
    pub fn config_2d(&self, xdim: i64, ydim: i64) -> Result<LaunchConfig2d> {
        let (Some(x), Some(y)) = (axis_extent(xdim)?, axis_extent(ydim)?) else {
            tracing::trace!(xdim, ydim, "Degenerate 2D extent, nothing to launch");
            return Ok(GridLaunchConfig::empty());
        };
        let caps = self.backend.capability()?;
        let target = self
            .policy
            .threads_per_block_2d
            .min(caps.max_threads_per_block)
            .min(caps.max_threads_dim.x)
            .max(1);

        let block_cols = x.min(target);
        // Rounding down is fine, the kernel loops over the remainder
        let block_rows = (target / block_cols).min(caps.max_threads_dim.y).max(1);

        let max_blocks = (caps.physical_thread_count() / target).max(1);
        let grid_x = ceil_div(x, block_cols).min(max_blocks);
        let grid_y = (max_blocks / grid_x).min((y / block_rows).max(1));

        let config = GridLaunchConfig {
            virtual_thread_count: Dim3::new(x, y, 1),
            threads_per_block: Dim3::new(block_cols, block_rows, 1),
            block_count: Dim3::new(grid_x, grid_y, 1),
        };

        tracing::debug!(
            work = %config.virtual_thread_count,
            threads_per_block = %config.threads_per_block,
            block_count = %config.block_count,
            max_blocks,
            "Sized 2D launch"
        );

        Ok(config)
    }
}

impl<'a, B: OccupancyQuery + ?Sized> LaunchSizer<'a, B> {
    /// Occupancy-aware 1D configuration for `kernel`.
    ///
    /// Takes the block size the backend reports as occupancy-optimal for the given
    /// dynamic shared memory and block-size ceiling (0 for none), then trims the
    /// grid so it never holds more blocks than the work needs.
    ///
    /// Returns [`LaunchError::InvalidWorkCount`] if `work_element_count` is not
    /// positive, or the backend's error if the occupancy query fails.
    pub fn config_1d_for_kernel(
        &self,
        work_element_count: i64,
        kernel: &B::Kernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<LaunchConfig> {
        let count = work_count(work_element_count)?;
        let hint = self.backend.max_potential_block_size(
            kernel,
            dynamic_shared_memory_bytes,
            block_size_limit,
        )?;
        if hint.threads_per_block == 0 {
            return Err(LaunchError::occupancy_query(
                "occupancy query returned a zero block size",
            ));
        }

        let block_count = hint
            .block_count
            .min(ceil_div(count, hint.threads_per_block));

        tracing::debug!(
            work = count,
            suggested_blocks = hint.block_count,
            threads_per_block = hint.threads_per_block,
            block_count,
            dynamic_shared_memory_bytes,
            "Sized occupancy-aware 1D launch"
        );

        Ok(LaunchConfig {
            virtual_thread_count: count,
            threads_per_block: hint.threads_per_block,
            block_count,
        })
    }

    /// Occupancy-aware 1D configuration with a caller-chosen block size.
    ///
    /// Fills the device with as many `fixed_block_size` blocks as can be resident
    /// at once, but never more than needed to cover the work.
    ///
    /// Returns [`LaunchError::InvalidBlockSize`] if the block size is 0 or above the
    /// device's threads-per-block limit, and an occupancy error if not even one
    /// such block can be resident.
    pub fn config_1d_fixed_block_size(
        &self,
        work_element_count: i64,
        kernel: &B::Kernel,
        dynamic_shared_memory_bytes: usize,
        fixed_block_size: u32,
    ) -> Result<LaunchConfig> {
        let count = work_count(work_element_count)?;
        let caps = self.backend.capability()?;
        if fixed_block_size == 0 || fixed_block_size > caps.max_threads_per_block {
            return Err(LaunchError::InvalidBlockSize(fixed_block_size));
        }

        let blocks_per_sm = self.backend.max_active_blocks_per_multiprocessor(
            kernel,
            fixed_block_size,
            dynamic_shared_memory_bytes,
        )?;
        if blocks_per_sm == 0 {
            return Err(LaunchError::occupancy_query(format!(
                "no block of {} threads fits on a multiprocessor",
                fixed_block_size
            )));
        }

        let block_count = blocks_per_sm
            .saturating_mul(caps.sm_count)
            .min(ceil_div(count, fixed_block_size));

        tracing::debug!(
            work = count,
            blocks_per_sm,
            threads_per_block = fixed_block_size,
            block_count,
            "Sized fixed-block 1D launch"
        );

        Ok(LaunchConfig {
            virtual_thread_count: count,
            threads_per_block: fixed_block_size,
            block_count,
        })
    }

    /// Occupancy-aware 2D configuration: [`config_3d_for_kernel`](Self::config_3d_for_kernel)
    /// with a depth of 1.
    pub fn config_2d_for_kernel(
        &self,
        xdim: i64,
        ydim: i64,
        kernel: &B::Kernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<LaunchConfig2d> {
        self.config_3d_for_kernel(
            xdim,
            ydim,
            1,
            kernel,
            dynamic_shared_memory_bytes,
            block_size_limit,
        )
    }

    /// Occupancy-aware 3D configuration.
    ///
    /// The scalar block size and block count from the occupancy query are spread
    /// greedily over the axes in x, y, z order: x takes as much of the thread and
    /// block budget as it can use, y gets what is left, then z. Every axis also
    /// respects the device's per-dimension thread and grid limits and never gets
    /// more blocks than its extent needs.
    ///
    /// Returns the all-zero configuration if any extent is not positive.
    pub fn config_3d_for_kernel(
        &self,
        xdim: i64,
        ydim: i64,
        zdim: i64,
        kernel: &B::Kernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<LaunchConfig3d> {
        let (Some(x), Some(y), Some(z)) =
            (axis_extent(xdim)?, axis_extent(ydim)?, axis_extent(zdim)?)
        else {
            tracing::trace!(xdim, ydim, zdim, "Degenerate 3D extent, nothing to launch");
            return Ok(GridLaunchConfig::empty());
        };

        let caps = self.backend.capability()?;
        let thread_limit = sanitize_limit(caps.max_threads_dim, "max_threads_dim");
        let grid_limit = sanitize_limit(caps.max_grid_size, "max_grid_size");

        let hint = self.backend.max_potential_block_size(
            kernel,
            dynamic_shared_memory_bytes,
            block_size_limit,
        )?;
        if hint.threads_per_block == 0 {
            return Err(LaunchError::occupancy_query(
                "occupancy query returned a zero block size",
            ));
        }
        let threads_per_block = hint.threads_per_block;
        let block_count = hint.block_count.max(1);

        let threads_x = min3(x, threads_per_block, thread_limit.x);
        let threads_y = min3(
            y,
            (threads_per_block / threads_x).max(1),
            thread_limit.y,
        );
        let threads_z = min3(
            z,
            (threads_per_block / (threads_x * threads_y)).max(1),
            thread_limit.z,
        );

        let blocks_x = min3(block_count, ceil_div(x, threads_x), grid_limit.x);
        let blocks_y = min3(
            ceil_div(block_count, blocks_x),
            ceil_div(y, threads_y),
            grid_limit.y,
        );
        let blocks_xy = blocks_x as u64 * blocks_y as u64;
        let blocks_z = min3(
            saturate_u32(ceil_div_u64(block_count as u64, blocks_xy)),
            ceil_div(z, threads_z),
            grid_limit.z,
        );

        let config = GridLaunchConfig {
            virtual_thread_count: Dim3::new(x, y, z),
            threads_per_block: Dim3::new(threads_x, threads_y, threads_z),
            block_count: Dim3::new(blocks_x, blocks_y, blocks_z),
        };

        tracing::debug!(
            work = %config.virtual_thread_count,
            suggested_blocks = hint.block_count,
            suggested_threads = threads_per_block,
            threads_per_block = %config.threads_per_block,
            block_count = %config.block_count,
            "Sized occupancy-aware 3D launch"
        );

        Ok(config)
    }
}

/// Heuristic 1D configuration with the default policy.
pub fn launch_config_1d<D: DeviceQuery + ?Sized>(
    work_element_count: i64,
    device: &D,
) -> Result<LaunchConfig> {
    LaunchSizer::new(device).config_1d(work_element_count)
}

/// Heuristic 2D configuration with the default policy.
pub fn launch_config_2d<D: DeviceQuery + ?Sized>(
    xdim: i64,
    ydim: i64,
    device: &D,
) -> Result<LaunchConfig2d> {
    LaunchSizer::new(device).config_2d(xdim, ydim)
}

/// Occupancy-aware 1D configuration.
pub fn launch_config_1d_for_kernel<B: OccupancyQuery + ?Sized>(
    work_element_count: i64,
    backend: &B,
    kernel: &B::Kernel,
    dynamic_shared_memory_bytes: usize,
    block_size_limit: u32,
) -> Result<LaunchConfig> {
    LaunchSizer::new(backend).config_1d_for_kernel(
        work_element_count,
        kernel,
        dynamic_shared_memory_bytes,
        block_size_limit,
    )
}

/// Occupancy-aware 1D configuration with a fixed block size.
pub fn launch_config_1d_fixed_block_size<B: OccupancyQuery + ?Sized>(
    work_element_count: i64,
    backend: &B,
    kernel: &B::Kernel,
    dynamic_shared_memory_bytes: usize,
    fixed_block_size: u32,
) -> Result<LaunchConfig> {
    LaunchSizer::new(backend).config_1d_fixed_block_size(
        work_element_count,
        kernel,
        dynamic_shared_memory_bytes,
        fixed_block_size,
    )
}

/// Occupancy-aware 2D configuration.
pub fn launch_config_2d_for_kernel<B: OccupancyQuery + ?Sized>(
    xdim: i64,
    ydim: i64,
    backend: &B,
    kernel: &B::Kernel,
    dynamic_shared_memory_bytes: usize,
    block_size_limit: u32,
) -> Result<LaunchConfig2d> {
    LaunchSizer::new(backend).config_2d_for_kernel(
        xdim,
        ydim,
        kernel,
        dynamic_shared_memory_bytes,
        block_size_limit,
    )
}

/// Occupancy-aware 3D configuration.
pub fn launch_config_3d_for_kernel<B: OccupancyQuery + ?Sized>(
    xdim: i64,
    ydim: i64,
    zdim: i64,
    backend: &B,
    kernel: &B::Kernel,
    dynamic_shared_memory_bytes: usize,
    block_size_limit: u32,
) -> Result<LaunchConfig3d> {
    LaunchSizer::new(backend).config_3d_for_kernel(
        xdim,
        ydim,
        zdim,
        kernel,
        dynamic_shared_memory_bytes,
        block_size_limit,
    )
}
