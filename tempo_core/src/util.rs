//! Time and integer helpers shared by the engine modules.

use std::time::Duration;

/// Number of microseconds in one millisecond.
pub const MICROS_PER_MILLI: u64 = 1_000;

/// Convert a positive millisecond delay to a timer duration with
/// microsecond resolution. Non-positive delays map to zero.
#[inline]
pub fn delay_from_ms(ms: i64) -> Duration {
    let ms = u64::try_from(ms).unwrap_or(0);
    Duration::from_micros(ms.saturating_mul(MICROS_PER_MILLI))
}

/// Clamp a millisecond value into the `i16` range used on the wire.
#[inline]
pub fn saturate_i16(v: i64) -> i16 {
    if v > i64::from(i16::MAX) {
        i16::MAX
    } else if v < i64::from(i16::MIN) {
        i16::MIN
    } else {
        v as i16
    }
}

/// Wire timestamps are unsigned; local time is signed. Values beyond
/// `i64::MAX` saturate.
#[inline]
pub fn wire_to_ms(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
