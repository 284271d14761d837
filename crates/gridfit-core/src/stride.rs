//! Grid-stride iteration.
//!
//! Kernels sized by this crate are expected to loop over their work with a
//! grid-stride loop:
//!
//! ```text
//! for (i = blockIdx.x * blockDim.x + threadIdx.x; i < n; i += blockDim.x * gridDim.x)
//! ```
//!
//! [`GridStride`] yields the indices such a loop visits for one thread, which is
//! how host code (and tests) can check that a configuration covers its work.

/// Iterator over the work items one thread visits in a grid-stride loop.
#[derive(Debug, Clone)]
pub struct GridStride {
    next: u64,
    stride: u64,
    end: u64,
}

impl GridStride {
    /// Creates a loop starting at `start`, stepping by `stride`, stopping before `end`.
    ///
    /// A zero stride yields at most `start` once.
    #[must_use]
    pub fn new(start: u64, stride: u64, end: u64) -> Self {
        Self {
            next: start,
            stride,
            end,
        }
    }

    /// Creates the loop for `thread` of `block` given the launch shape along one axis.
    #[must_use]
    pub fn for_thread(
        block: u32,
        thread: u32,
        threads_per_block: u32,
        block_count: u32,
        extent: u32,
    ) -> Self {
        let tpb = threads_per_block as u64;
        Self::new(
            block as u64 * tpb + thread as u64,
            tpb * block_count as u64,
            extent as u64,
        )
    }
}

impl Iterator for GridStride {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.end {
            return None;
        }
        let current = self.next;
        self.next = if self.stride == 0 {
            self.end
        } else {
            current.saturating_add(self.stride)
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.next >= self.end {
            return (0, Some(0));
        }
        let remaining = match self.stride {
            0 => 1,
            s => (self.end - self.next).div_ceil(s),
        };
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}
