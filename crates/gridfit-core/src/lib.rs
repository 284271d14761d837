//! # gridfit core
//!
//! Backend-agnostic launch-configuration sizing for GPU kernels.
//!
//! Given how many independent work items a kernel has (in 1, 2 or 3 dimensions)
//! and what the target device can hold, this crate decides the block shape and
//! grid shape to launch with. Devices are reached through two small traits so the
//! same sizing code serves every backend and runs in tests without hardware:
//!
//! - [`DeviceQuery`] - static launch limits of "the current device"
//! - [`OccupancyQuery`] - per-kernel occupancy estimates from the driver
//!
//! ## Sizing entry points
//!
//! | Work | Heuristic | Occupancy-aware |
//! |------|-----------|-----------------|
//! | 1D | [`LaunchSizer::config_1d`] | [`LaunchSizer::config_1d_for_kernel`], [`LaunchSizer::config_1d_fixed_block_size`] |
//! | 2D | [`LaunchSizer::config_2d`] | [`LaunchSizer::config_2d_for_kernel`] |
//! | 3D | - | [`LaunchSizer::config_3d_for_kernel`] |
//!
//! Every configuration assumes the kernel walks its work with a grid-stride loop
//! (see [`stride`]); none of them promise one thread per work item.
//!
//! ## Example
//!
//! ```
//! use gridfit_core::prelude::*;
//!
//! let device = HardwareCapability::ampere().with_sm_count(10);
//! let cfg = launch_config_2d(10_240, 10_240, &device)?;
//! assert_eq!(cfg.threads_per_block, Dim3::new(256, 1, 1));
//! assert_eq!(cfg.block_count, Dim3::new(40, 2, 1));
//! # Ok::<(), LaunchError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compute_task;
pub mod device;
pub mod dim;
pub mod error;
pub mod launch;
pub mod math;
pub mod occupancy;
pub mod policy;
pub mod stride;
pub mod testing;

pub use device::{DeviceQuery, HardwareCapability};
pub use dim::{Axis, Dim3};
pub use error::{LaunchError, Result};
pub use launch::{
    launch_config_1d, launch_config_1d_fixed_block_size, launch_config_1d_for_kernel,
    launch_config_2d, launch_config_2d_for_kernel, launch_config_3d_for_kernel, GridLaunchConfig,
    LaunchConfig, LaunchConfig2d, LaunchConfig3d, LaunchSizer,
};
pub use math::ceil_div;
pub use occupancy::{HeuristicOccupancy, OccupancyHint, OccupancyQuery};
pub use policy::{SizingPolicy, SizingPolicyBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::compute_task::{
        Bhwc, CalculationsPrecision, CommandEncoder, ComputeDevice, ComputeTask, DispatchParams,
        NodeDescriptor, ValueId,
    };
    pub use crate::device::{DeviceQuery, HardwareCapability};
    pub use crate::dim::{Axis, Dim3};
    pub use crate::error::{LaunchError, Result, TensorSide};
    pub use crate::launch::*;
    pub use crate::math::ceil_div;
    pub use crate::occupancy::{HeuristicOccupancy, OccupancyHint, OccupancyQuery};
    pub use crate::policy::{SizingPolicy, SizingPolicyBuilder};
    pub use crate::stride::GridStride;
}
