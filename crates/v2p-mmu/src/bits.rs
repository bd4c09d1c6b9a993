//! Bit-range helpers shared by the page walkers.
//!
//! Page-table entries are never decoded into named-field structs: each paging level reads a
//! different set of bit ranges out of the same raw value, so every extraction goes through
//! [`mask`].

/// Returns a 64-bit mask with bits `high..=low` set and every other bit clear.
///
/// `low = 0` and `high = 63` are special-cased so neither end ever shifts by 64.
///
/// # Panics
///
/// In debug builds, if `low > high` or `high > 63`.
#[inline]
pub const fn mask(high: u8, low: u8) -> u64 {
    debug_assert!(low <= high && high <= 63);

    let upper = if high == 63 {
        u64::MAX
    } else {
        (1u64 << (high + 1)) - 1
    };
    let lower = if low == 0 {
        u64::MAX
    } else {
        !((1u64 << low) - 1)
    };
    upper & lower
}

/// Extracts bits `high..=low` of `value`, left in place (not shifted down).
#[inline]
pub const fn field(value: u64, high: u8, low: u8) -> u64 {
    value & mask(high, low)
}

/// Tests a single bit.
#[inline]
pub const fn bit(value: u64, n: u8) -> bool {
    value & (1u64 << n) != 0
}
