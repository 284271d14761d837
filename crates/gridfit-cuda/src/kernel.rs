//! Kernels loaded through the CUDA driver API, and their occupancy queries.
//!
//! Occupancy has to be asked of a raw `CUfunction`. cudarc's `CudaFunction` only
//! exposes `cuOccupancyMaxPotentialBlockSize` with a per-block-size shared
//! memory callback, which makes a constant dynamic shared memory footprint
//! awkward to pass, so kernels are loaded with `cuModuleLoadData` directly and
//! the occupancy calls go to the driver with no callback.

use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr;

use cudarc::driver::sys as cuda_sys;

use gridfit_core::error::{LaunchError, Result};
use gridfit_core::occupancy::{OccupancyHint, OccupancyQuery};

use crate::device::CudaDevice;

/// A PTX module loaded directly via the CUDA driver API.
struct PtxModule {
    /// Raw CUDA module handle.
    module: cuda_sys::CUmodule,
}

impl PtxModule {
    fn load(device: &CudaDevice, ptx: &str) -> Result<Self> {
        device.bind()?;

        // PTX must be null-terminated for the driver
        let ptx_cstring = CString::new(ptx.strip_suffix('\0').unwrap_or(ptx)).map_err(|e| {
            LaunchError::compilation(format!("Invalid PTX (contains null byte): {}", e))
        })?;

        let mut module: cuda_sys::CUmodule = ptr::null_mut();
        // SAFETY: `module` is a valid out pointer and the PTX string outlives the call.
        let result =
            unsafe { cuda_sys::cuModuleLoadData(&mut module, ptx_cstring.as_ptr() as *const _) };
        if result != cuda_sys::CUresult::CUDA_SUCCESS {
            return Err(LaunchError::compilation(format!(
                "cuModuleLoadData failed: {:?}",
                result
            )));
        }

        Ok(Self { module })
    }

    fn function(&self, name: &str) -> Result<cuda_sys::CUfunction> {
        let name_cstring = CString::new(name).map_err(|e| {
            LaunchError::compilation(format!("Invalid function name: {}", e))
        })?;

        let mut func: cuda_sys::CUfunction = ptr::null_mut();
        // SAFETY: the module handle is live for as long as `self`.
        let result =
            unsafe { cuda_sys::cuModuleGetFunction(&mut func, self.module, name_cstring.as_ptr()) };
        if result != cuda_sys::CUresult::CUDA_SUCCESS {
            return Err(LaunchError::compilation(format!(
                "cuModuleGetFunction failed for '{}': {:?}",
                name, result
            )));
        }

        Ok(func)
    }
}

impl Drop for PtxModule {
    fn drop(&mut self) {
        // SAFETY: the handle came from cuModuleLoadData and is unloaded once.
        unsafe {
            let _ = cuda_sys::cuModuleUnload(self.module);
        }
    }
}

/// A compiled kernel function whose occupancy can be queried.
pub struct CudaKernel {
    /// Keeps the module (and thus `func`) alive.
    _module: PtxModule,
    /// Raw CUfunction handle.
    func: cuda_sys::CUfunction,
    /// Function name (for logs).
    name: String,
}

impl CudaKernel {
    /// Loads `func_name` from PTX source.
    pub fn from_ptx(device: &CudaDevice, ptx: &str, func_name: &str) -> Result<Self> {
        let module = PtxModule::load(device, ptx)?;
        let func = module.function(func_name)?;
        tracing::debug!(kernel = func_name, "Loaded CUDA kernel");
        Ok(Self {
            _module: module,
            func,
            name: func_name.to_string(),
        })
    }

    /// Compiles CUDA C source with NVRTC and loads `func_name` from it.
    pub fn from_cuda_source(device: &CudaDevice, source: &str, func_name: &str) -> Result<Self> {
        let ptx = compile_ptx(source)?;
        Self::from_ptx(device, &ptx, func_name)
    }

    /// Get the function name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Compile CUDA C source code to PTX using NVRTC.
pub fn compile_ptx(cuda_source: &str) -> Result<String> {
    let ptx = cudarc::nvrtc::compile_ptx(cuda_source)
        .map_err(|e| LaunchError::compilation(format!("NVRTC compilation failed: {}", e)))?;
    Ok(ptx.to_src().to_string())
}

fn clamp_to_c_int(v: u32) -> c_int {
    c_int::try_from(v).unwrap_or(c_int::MAX)
}

impl OccupancyQuery for CudaDevice {
    type Kernel = CudaKernel;

    fn max_potential_block_size(
        &self,
        kernel: &CudaKernel,
        dynamic_shared_memory_bytes: usize,
        block_size_limit: u32,
    ) -> Result<OccupancyHint> {
        self.bind()?;

        let mut min_grid_size: c_int = 0;
        let mut block_size: c_int = 0;
        // SAFETY: out pointers are valid; `kernel.func` is kept alive by its module.
        let result = unsafe {
            cuda_sys::cuOccupancyMaxPotentialBlockSize(
                &mut min_grid_size,
                &mut block_size,
                kernel.func,
                None,
                dynamic_shared_memory_bytes,
                clamp_to_c_int(block_size_limit),
            )
        };
        if result != cuda_sys::CUresult::CUDA_SUCCESS {
            return Err(LaunchError::occupancy_query(format!(
                "cuOccupancyMaxPotentialBlockSize failed for '{}': {:?}",
                kernel.name, result
            )));
        }

        let hint = OccupancyHint::new(min_grid_size.max(0) as u32, block_size.max(0) as u32);
        tracing::trace!(
            kernel = %kernel.name,
            dynamic_shared_memory_bytes,
            block_size_limit,
            block_count = hint.block_count,
            threads_per_block = hint.threads_per_block,
            "CUDA occupancy estimate"
        );
        Ok(hint)
    }

    fn max_active_blocks_per_multiprocessor(
        &self,
        kernel: &CudaKernel,
        block_size: u32,
        dynamic_shared_memory_bytes: usize,
    ) -> Result<u32> {
        self.bind()?;

        let mut num_blocks: c_int = 0;
        // SAFETY: out pointer is valid; `kernel.func` is kept alive by its module.
        let result = unsafe {
            cuda_sys::cuOccupancyMaxActiveBlocksPerMultiprocessor(
                &mut num_blocks,
                kernel.func,
                clamp_to_c_int(block_size),
                dynamic_shared_memory_bytes,
            )
        };
        if result != cuda_sys::CUresult::CUDA_SUCCESS {
            return Err(LaunchError::occupancy_query(format!(
                "cuOccupancyMaxActiveBlocksPerMultiprocessor failed for '{}': {:?}",
                kernel.name, result
            )));
        }

        Ok(num_blocks.max(0) as u32)
    }
}
