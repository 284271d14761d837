//! Sizing policy configuration.

/// Block-size cap of the 1D heuristic.
pub const DEFAULT_MAX_THREADS_PER_BLOCK_1D: u32 = 1024;

/// Target block size of the 2D heuristic.
pub const DEFAULT_THREADS_PER_BLOCK_2D: u32 = 256;

/// Tunables of the heuristic (capability-only) sizing paths.
///
/// Occupancy-aware paths take their block size from the driver and ignore these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingPolicy {
    /// Upper bound on threads per block for 1D heuristic sizing.
    pub max_threads_per_block_1d: u32,
    /// Threads per block targeted by 2D heuristic sizing.
    pub threads_per_block_2d: u32,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            max_threads_per_block_1d: DEFAULT_MAX_THREADS_PER_BLOCK_1D,
            threads_per_block_2d: DEFAULT_THREADS_PER_BLOCK_2D,
        }
    }
}

impl SizingPolicy {
    /// Creates a policy favouring smaller blocks (more blocks per multiprocessor).
    ///
    /// Useful for kernels with heavy register pressure that cannot reach full
    /// occupancy at 1024 threads per block.
    #[must_use]
    pub fn small_blocks() -> Self {
        Self {
            max_threads_per_block_1d: 256,
            threads_per_block_2d: 128,
        }
    }

    /// Clamps zero values back to one so divisions in the sizing paths are defined.
    #[must_use]
    pub(crate) fn sanitized(self) -> Self {
        Self {
            max_threads_per_block_1d: self.max_threads_per_block_1d.max(1),
            threads_per_block_2d: self.threads_per_block_2d.max(1),
        }
    }
}

/// Builder for SizingPolicy.
#[derive(Debug, Default)]
pub struct SizingPolicyBuilder {
    policy: SizingPolicy,
}

impl SizingPolicyBuilder {
    /// Creates a new builder with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the 1D block-size cap.
    #[must_use]
    pub fn with_max_threads_per_block_1d(mut self, threads: u32) -> Self {
        self.policy.max_threads_per_block_1d = threads;
        self
    }

    /// Sets the 2D block-size target.
    #[must_use]
    pub fn with_threads_per_block_2d(mut self, threads: u32) -> Self {
        self.policy.threads_per_block_2d = threads;
        self
    }

    /// Builds the policy.
    #[must_use]
    pub fn build(self) -> SizingPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_policy_defaults() {
        let policy = SizingPolicy::default();
        assert_eq!(policy.max_threads_per_block_1d, 1024);
        assert_eq!(policy.threads_per_block_2d, 256);
    }

    #[test]
    fn test_sizing_policy_builder() {
        let policy = SizingPolicyBuilder::new()
            .with_max_threads_per_block_1d(512)
            .with_threads_per_block_2d(64)
            .build();

        assert_eq!(policy.max_threads_per_block_1d, 512);
        assert_eq!(policy.threads_per_block_2d, 64);
    }

    #[test]
    fn test_sizing_policy_sanitized() {
        let policy = SizingPolicyBuilder::new()
            .with_max_threads_per_block_1d(0)
            .with_threads_per_block_2d(0)
            .build()
            .sanitized();

        assert_eq!(policy.max_threads_per_block_1d, 1);
        assert_eq!(policy.threads_per_block_2d, 1);
        assert_eq!(SizingPolicy::small_blocks().sanitized(), SizingPolicy::small_blocks());
    }
}
