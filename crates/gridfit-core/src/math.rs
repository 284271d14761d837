//! Integer helpers shared by the sizing algorithms.

/// Ceiling division: the number of `b`-sized chunks needed to cover `a`.
///
/// Equivalent to `(a + b - 1) / b` but cannot overflow for large `a`.
///
/// # Panics
///
/// Panics if `b` is zero.
#[inline]
#[must_use]
pub fn ceil_div(a: u32, b: u32) -> u32 {
    a.div_ceil(b)
}

/// [`ceil_div`] over `u64`, for products of block counts.
#[inline]
#[must_use]
pub fn ceil_div_u64(a: u64, b: u64) -> u64 {
    a.div_ceil(b)
}

/// Minimum of three values.
#[inline]
pub(crate) fn min3(a: u32, b: u32, c: u32) -> u32 {
    a.min(b).min(c)
}

/// Narrows a `u64` back to `u32`, saturating.
#[inline]
pub(crate) fn saturate_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}
