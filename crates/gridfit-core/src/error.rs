//! Error types for launch-configuration sizing.

use thiserror::Error;

/// Result type for gridfit operations.
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Which side of a compute task a tensor binding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorSide {
    /// Source (input) tensor.
    Source,
    /// Destination (output) tensor.
    Destination,
}

impl std::fmt::Display for TensorSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorSide::Source => write!(f, "source"),
            TensorSide::Destination => write!(f, "destination"),
        }
    }
}

/// Errors that can occur while sizing or dispatching a kernel launch.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// A 1D launch was requested for a non-positive number of work items.
    ///
    /// This is caller misuse: check the work count before sizing.
    #[error("Work element count must be positive, got {0}")]
    InvalidWorkCount(i64),

    /// A fixed block size of zero threads was requested.
    #[error("Block size must be positive, got {0}")]
    InvalidBlockSize(u32),

    /// The device capability query failed.
    #[error("Device query failed: {0}")]
    DeviceQuery(String),

    /// The occupancy estimation query failed.
    #[error("Occupancy query failed: {0}")]
    OccupancyQuery(String),

    /// The requested backend is not available.
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    /// A compute program failed to build.
    #[error("Program compilation failed: {0}")]
    Compilation(String),

    /// A tensor was bound at an index the task does not have.
    #[error("Tensor index {index} out of range ({len} bindings)")]
    TensorIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of bindings available.
        len: usize,
    },

    /// A tensor binding required for encoding was never set.
    #[error("Missing {side} tensor at index {index}")]
    MissingTensor {
        /// Source or destination.
        side: TensorSide,
        /// Binding index.
        index: usize,
    },

    /// The number of tensor shapes does not match the task's bindings.
    #[error("Expected {expected} {side} shapes, got {actual}")]
    ShapeCountMismatch {
        /// Source or destination.
        side: TensorSide,
        /// Number of bindings the task has.
        expected: usize,
        /// Number of shapes supplied.
        actual: usize,
    },
}

impl LaunchError {
    /// Create a device query error.
    pub fn device_query(msg: impl Into<String>) -> Self {
        Self::DeviceQuery(msg.into())
    }

    /// Create an occupancy query error.
    pub fn occupancy_query(msg: impl Into<String>) -> Self {
        Self::OccupancyQuery(msg.into())
    }

    /// Create a compilation error.
    pub fn compilation(msg: impl Into<String>) -> Self {
        Self::Compilation(msg.into())
    }

    /// Returns true if the error came from the device or driver rather than the caller.
    pub fn is_driver_failure(&self) -> bool {
        matches!(
            self,
            Self::DeviceQuery(_) | Self::OccupancyQuery(_) | Self::BackendUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LaunchError::InvalidWorkCount(-3);
        assert_eq!(err.to_string(), "Work element count must be positive, got -3");

        let err = LaunchError::MissingTensor {
            side: TensorSide::Destination,
            index: 1,
        };
        assert_eq!(err.to_string(), "Missing destination tensor at index 1");
    }

    #[test]
    fn test_driver_failure_classification() {
        assert!(LaunchError::occupancy_query("CUDA_ERROR_INVALID_VALUE").is_driver_failure());
        assert!(LaunchError::device_query("no context").is_driver_failure());
        assert!(!LaunchError::InvalidWorkCount(0).is_driver_failure());
        assert!(!LaunchError::compilation("syntax error").is_driver_failure());
    }
}
