//! Raw value scaling
//!
//! Every axis and button sample travels and is stored as a [`RawValue`] in the
//! canonical range `[MIN_RAW, MAX_RAW]`. Hats are kept as tri-state values and
//! only expanded into that range when read.
//!
//! # Rounding
//!
//! [`map_range`] computes in 128-bit integers and rounds to the nearest
//! integer, ties away from zero. The result is clamped to the `i32` range.

/// Canonical integer unit for axis/button samples.
pub type RawValue = i32;

/// Lower bound of the canonical raw range.
pub const MIN_RAW: RawValue = -32767;

/// Upper bound of the canonical raw range.
pub const MAX_RAW: RawValue = 32767;

/// Linearly rescales `value` from `[src_low, src_high]` to `[dst_low, dst_high]`.
///
/// `src_low` maps to `dst_low` and `src_high` to `dst_high` exactly. Values
/// outside the source interval are extrapolated. A degenerate source interval
/// maps everything to `dst_low`.
///
/// ```rust
/// use gamepad_bridge::scaling::{map_range, MAX_RAW, MIN_RAW};
///
/// assert_eq!(map_range(-1, -1, 1, MIN_RAW, MAX_RAW), MIN_RAW);
/// assert_eq!(map_range(0, -1, 1, MIN_RAW, MAX_RAW), 0);
/// assert_eq!(map_range(1, -1, 1, MIN_RAW, MAX_RAW), MAX_RAW);
/// ```
pub fn map_range(
    value: RawValue,
    src_low: RawValue,
    src_high: RawValue,
    dst_low: RawValue,
    dst_high: RawValue,
) -> RawValue {
    let src_span = i128::from(src_high) - i128::from(src_low);
    if src_span == 0 {
        return dst_low;
    }
    let dst_span = i128::from(dst_high) - i128::from(dst_low);
    let offset = (i128::from(value) - i128::from(src_low)) * dst_span;

    let scaled = i128::from(dst_low) + div_round_half_away(offset, src_span);
    scaled.clamp(i128::from(i32::MIN), i128::from(i32::MAX)) as RawValue
}

/// Expands a tri-state hat value (`-1`, `0`, `1`) into the canonical range.
pub fn expand_hat(value: RawValue) -> RawValue {
    map_range(value, -1, 1, MIN_RAW, MAX_RAW)
}

/// Scales a unit float in `[-1.0, 1.0]` into the canonical range.
///
/// Input outside the unit interval is clamped, NaN reads as zero.
pub fn from_unit(value: f32) -> RawValue {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * MAX_RAW as f32).round() as RawValue
}

// Integer division rounding to nearest, ties away from zero.
fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let (numerator, denominator) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if 2 * remainder.abs() >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_map_exactly() {
        assert_eq!(map_range(0, 0, 10, 100, 200), 100);
        assert_eq!(map_range(10, 0, 10, 100, 200), 200);
        assert_eq!(map_range(-32768, -32768, 32767, 0, 1000), 0);
        assert_eq!(map_range(32767, -32768, 32767, 0, 1000), 1000);
    }

    #[test]
    fn hat_expansion_hits_min_mid_max() {
        assert_eq!(expand_hat(-1), MIN_RAW);
        assert_eq!(expand_hat(0), 0);
        assert_eq!(expand_hat(1), MAX_RAW);
    }

    #[test]
    fn ties_round_away_from_zero() {
        // 1 * 5 / 2 = 2.5
        assert_eq!(map_range(1, 0, 2, 0, 5), 3);
        // -2.5
        assert_eq!(map_range(1, 0, 2, 0, -5), -3);
        // 1 * 4 / 3 = 1.33
        assert_eq!(map_range(1, 0, 3, 0, 4), 1);
        // 2 * 4 / 3 = 2.67
        assert_eq!(map_range(2, 0, 3, 0, 4), 3);
    }

    #[test]
    fn monotonic_over_source_interval() {
        let mut previous = map_range(-100, -100, 100, MIN_RAW, MAX_RAW);
        for value in -99..=100 {
            let current = map_range(value, -100, 100, MIN_RAW, MAX_RAW);
            assert!(current >= previous, "{value}: {current} < {previous}");
            previous = current;
        }
    }

    #[test]
    fn degenerate_source_maps_to_dst_low() {
        assert_eq!(map_range(5, 3, 3, -10, 10), -10);
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        assert_eq!(map_range(i32::MAX, 0, 1, 0, i32::MAX), i32::MAX);
        assert_eq!(map_range(i32::MIN, 0, 1, 0, i32::MAX), i32::MIN);
    }

    #[test]
    fn unit_floats_scale_and_clamp() {
        assert_eq!(from_unit(0.0), 0);
        assert_eq!(from_unit(1.0), MAX_RAW);
        assert_eq!(from_unit(-1.0), MIN_RAW);
        assert_eq!(from_unit(3.5), MAX_RAW);
        assert_eq!(from_unit(f32::NAN), 0);
        assert_eq!(from_unit(0.5), 16384);
    }
}
