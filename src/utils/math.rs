//! Alignment arithmetic.

/// The platform's maximum scalar alignment.
///
/// Region sizes and heap placements are rounded to this so that cells and floats can be stored
/// anywhere in a region without straddling an alignment boundary.
pub const MAX_ALIGN: usize = max(
    std::mem::align_of::<f64>(),
    max(std::mem::align_of::<usize>(), std::mem::align_of::<u64>()),
);

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two.
///
/// Returns `None` if the rounded value does not fit in a `usize`.
///
/// # Examples
///
/// ```rust
/// use forthboot::utils::align_up;
///
/// assert_eq!(align_up(13, 8), Some(16));
/// assert_eq!(align_up(16, 8), Some(16));
/// assert_eq!(align_up(usize::MAX, 8), None);
/// ```
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    value
        .checked_add(alignment - 1)
        .map(|bumped| bumped & !(alignment - 1))
}

/// Rounds `value` up to [`MAX_ALIGN`], saturating at the largest aligned value.
#[must_use]
pub fn max_aligned(value: usize) -> usize {
    align_up(value, MAX_ALIGN).unwrap_or(usize::MAX & !(MAX_ALIGN - 1))
}

/// Returns the base-2 logarithm of a power-of-two `value`, or `None` otherwise.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // trailing_zeros <= 63
pub fn log2_exact(value: usize) -> Option<u8> {
    if value.is_power_of_two() {
        Some(value.trailing_zeros() as u8)
    } else {
        None
    }
}
