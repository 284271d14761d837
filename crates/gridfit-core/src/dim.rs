//! Three-component extents for threads, blocks and work items.

/// A three-component extent (x, y, z).
///
/// Used for per-axis thread counts, block counts, virtual thread counts and
/// per-dimension hardware limits. The default value is all-zero, which is the
/// "nothing to launch" sentinel for 2D and 3D configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dim3 {
    /// Extent along x.
    pub x: u32,
    /// Extent along y.
    pub y: u32,
    /// Extent along z.
    pub z: u32,
}

impl Dim3 {
    /// The all-zero extent.
    pub const ZERO: Dim3 = Dim3 { x: 0, y: 0, z: 0 };

    /// Creates a new extent.
    #[must_use]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Creates the same extent on every axis.
    #[must_use]
    pub const fn splat(v: u32) -> Self {
        Self { x: v, y: v, z: v }
    }

    /// Product of all three components, widened to `u64` and saturating.
    #[must_use]
    pub fn volume(&self) -> u64 {
        (self.x as u64 * self.y as u64).saturating_mul(self.z as u64)
    }

    /// Returns true if every component is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Returns the component for the given axis.
    #[must_use]
    pub fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Returns the extent as an `(x, y, z)` tuple, the form driver launch APIs take.
    #[must_use]
    pub fn as_tuple(&self) -> (u32, u32, u32) {
        (self.x, self.y, self.z)
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self { x, y, z }
    }
}

impl From<Dim3> for (u32, u32, u32) {
    fn from(d: Dim3) -> Self {
        d.as_tuple()
    }
}

impl std::fmt::Display for Dim3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// One of the three launch axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The x axis (fastest varying).
    X,
    /// The y axis.
    Y,
    /// The z axis.
    Z,
}
