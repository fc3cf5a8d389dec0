//! Utilities for aligning sizes and offsets

use std::ops::{Add, Div, Rem, Sub};

/// Align a size to a required alignment. Does not align the base address.
pub fn align<T: Add<T, Output = T> + Sub<T, Output = T> + Rem<T, Output = T> + PartialEq + Default + Copy>(
    value: T,
    alignment: T,
) -> T {
    let unaligned_size = value % alignment;
    if unaligned_size == T::default() {
        return value;
    }
    let padding = alignment - unaligned_size;
    value + padding
}

/// Returns true if `value` is a multiple of `alignment`.
pub fn is_aligned<T: Rem<T, Output = T> + PartialEq + Default + Copy>(value: T, alignment: T) -> bool {
    value % alignment == T::default()
}

/// Divide, rounding up. Used to compute how many work groups cover a number of threads.
/// Never overflows, `div_ceil(u32::MAX, 2)` is `2^31`.
pub fn div_ceil<T: Add<T, Output = T> + Rem<T, Output = T> + Div<T, Output = T> + PartialEq + Default + Copy + From<u8>>(
    value: T,
    divisor: T,
) -> T {
    let quotient = value / divisor;
    if value % divisor == T::default() {
        quotient
    } else {
        quotient + T::from(1)
    }
}
