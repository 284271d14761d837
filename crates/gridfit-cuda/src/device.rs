//! CUDA device capability queries.

use std::sync::Arc;

use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::CudaContext;

use gridfit_core::device::{DeviceQuery, HardwareCapability};
use gridfit_core::dim::Dim3;
use gridfit_core::error::{LaunchError, Result};

/// Wrapper around a cudarc context that answers launch-limit queries.
///
/// Limits are read from the driver on every [`DeviceQuery::capability`] call and
/// never cached.
pub struct CudaDevice {
    /// The underlying cudarc context.
    inner: Arc<CudaContext>,
    /// Device ordinal.
    ordinal: usize,
    /// Device name.
    name: String,
}

impl CudaDevice {
    /// Opens device `ordinal`.
    pub fn new(ordinal: usize) -> Result<Self> {
        let inner = CudaContext::new(ordinal).map_err(|e| {
            LaunchError::BackendUnavailable(format!(
                "Failed to create CUDA device {}: {}",
                ordinal, e
            ))
        })?;

        let name = inner
            .name()
            .map_err(|e| LaunchError::device_query(format!("Failed to get device name: {}", e)))?;

        tracing::info!(ordinal, name = %name, "Opened CUDA device");

        Ok(Self {
            inner,
            ordinal,
            name,
        })
    }

    /// Get device ordinal.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Get device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the underlying cudarc context.
    pub fn inner(&self) -> &Arc<CudaContext> {
        &self.inner
    }

    /// Makes this device's context current on the calling thread.
    pub(crate) fn bind(&self) -> Result<()> {
        self.inner
            .bind_to_thread()
            .map_err(|e| LaunchError::device_query(format!("Failed to bind context: {}", e)))
    }

    fn attribute(&self, attr: CUdevice_attribute) -> Result<u32> {
        let value = self
            .inner
            .attribute(attr)
            .map_err(|e| LaunchError::device_query(format!("Failed to query {:?}: {}", attr, e)))?;
        u32::try_from(value)
            .map_err(|_| LaunchError::device_query(format!("{:?} is negative: {}", attr, value)))
    }

    fn attribute_dim3(
        &self,
        x: CUdevice_attribute,
        y: CUdevice_attribute,
        z: CUdevice_attribute,
    ) -> Result<Dim3> {
        Ok(Dim3::new(
            self.attribute(x)?,
            self.attribute(y)?,
            self.attribute(z)?,
        ))
    }
}

impl DeviceQuery for CudaDevice {
    fn capability(&self) -> Result<HardwareCapability> {
        use CUdevice_attribute::*;

        let caps = HardwareCapability {
            sm_count: self.attribute(CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT)?,
            max_threads_per_sm: self.attribute(CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_MULTIPROCESSOR)?,
            max_threads_per_block: self.attribute(CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?,
            max_threads_dim: self.attribute_dim3(
                CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_X,
                CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Y,
                CU_DEVICE_ATTRIBUTE_MAX_BLOCK_DIM_Z,
            )?,
            max_grid_size: self.attribute_dim3(
                CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X,
                CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Y,
                CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Z,
            )?,
        };

        tracing::trace!(
            ordinal = self.ordinal,
            sm_count = caps.sm_count,
            max_threads_per_sm = caps.max_threads_per_sm,
            max_threads_per_block = caps.max_threads_per_block,
            max_threads_dim = %caps.max_threads_dim,
            max_grid_size = %caps.max_grid_size,
            "Queried CUDA launch limits"
        );

        Ok(caps)
    }
}

/// Device info for runtime queries.
#[derive(Debug, Clone)]
pub struct CudaDeviceInfo {
    /// Device ordinal.
    pub ordinal: usize,
    /// Device name.
    pub name: String,
    /// Launch limits at enumeration time.
    pub capability: HardwareCapability,
}

/// Enumerate all CUDA devices with their launch limits.
pub fn enumerate_devices() -> Result<Vec<CudaDeviceInfo>> {
    let count = CudaContext::device_count().map_err(|e| {
        LaunchError::BackendUnavailable(format!("Failed to count CUDA devices: {}", e))
    })? as usize;

    let mut devices = Vec::with_capacity(count);
    for i in 0..count {
        match CudaDevice::new(i).and_then(|d| Ok((d.capability()?, d))) {
            Ok((capability, device)) => devices.push(CudaDeviceInfo {
                ordinal: i,
                name: device.name,
                capability,
            }),
            Err(e) => {
                tracing::warn!("Failed to enumerate device {}: {}", i, e);
            }
        }
    }

    Ok(devices)
}
