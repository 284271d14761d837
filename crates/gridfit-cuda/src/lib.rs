//! CUDA backend for gridfit
//!
//! Answers gridfit's device and occupancy queries from the NVIDIA driver using
//! cudarc. With the `cuda` feature disabled the crate still builds and exposes a
//! [`CudaDevice`] that reports the backend as unavailable.
//!
//! # Example
//!
//! ```ignore
//! use gridfit_core::LaunchSizer;
//! use gridfit_cuda::{CudaDevice, CudaKernel};
//!
//! let device = CudaDevice::new(0)?;
//! let kernel = CudaKernel::from_cuda_source(&device, SOURCE, "scale")?;
//!
//! let cfg = LaunchSizer::new(&device).config_1d_for_kernel(1 << 20, &kernel, 0, 0)?;
//! // launch with grid (cfg.block_count, 1, 1), block (cfg.threads_per_block, 1, 1)
//! ```

#![warn(missing_docs)]

#[cfg(feature = "cuda")]
mod device;
#[cfg(feature = "cuda")]
mod kernel;

#[cfg(feature = "cuda")]
pub use device::{enumerate_devices, CudaDevice, CudaDeviceInfo};
#[cfg(feature = "cuda")]
pub use kernel::{compile_ptx, CudaKernel};

// Placeholder implementations when CUDA is not available
#[cfg(not(feature = "cuda"))]
mod stub {
    use gridfit_core::device::{DeviceQuery, HardwareCapability};
    use gridfit_core::error::{LaunchError, Result};

    /// Stub CUDA device when the CUDA feature is disabled.
    pub struct CudaDevice;

    impl CudaDevice {
        /// Create fails when CUDA is not available.
        pub fn new(_ordinal: usize) -> Result<Self> {
            Err(LaunchError::BackendUnavailable(
                "CUDA feature not enabled".to_string(),
            ))
        }
    }

    impl DeviceQuery for CudaDevice {
        fn capability(&self) -> Result<HardwareCapability> {
            Err(LaunchError::BackendUnavailable("CUDA".to_string()))
        }
    }

    /// Stub compile_ptx when CUDA is not available.
    pub fn compile_ptx(_cuda_source: &str) -> Result<String> {
        Err(LaunchError::BackendUnavailable(
            "CUDA feature not enabled".to_string(),
        ))
    }
}

#[cfg(not(feature = "cuda"))]
pub use stub::{compile_ptx, CudaDevice};

/// Check if CUDA is available at runtime.
///
/// This function returns false if:
/// - CUDA feature is not enabled
/// - CUDA libraries are not installed on the system
/// - No CUDA devices are present
pub fn is_cuda_available() -> bool {
    cuda_device_count() > 0
}

/// Get CUDA device count.
///
/// Returns 0 if CUDA is not available or libraries are not installed.
pub fn cuda_device_count() -> usize {
    #[cfg(feature = "cuda")]
    {
        // cudarc panics if CUDA libraries are not found, so we catch that
        std::panic::catch_unwind(|| {
            cudarc::driver::CudaContext::device_count().unwrap_or(0) as usize
        })
        .unwrap_or(0)
    }
    #[cfg(not(feature = "cuda"))]
    {
        0
    }
}

/// CUDA C source of a grid-stride `scale` kernel, `out[i] = in[i] * factor` for `i < n`.
///
/// Small enough to compile quickly; used to get a real `CUfunction` to query.
pub const SCALE_KERNEL_SOURCE: &str = r#"
extern "C" __global__ void scale(const float* in, float* out, float factor, int n) {
    for (int i = blockIdx.x * blockDim.x + threadIdx.x; i < n; i += blockDim.x * gridDim.x) {
        out[i] = in[i] * factor;
    }
}
"#;
