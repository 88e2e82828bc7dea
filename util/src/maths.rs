//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float,
{
    target_range.0
        + ((value - source_range.0) * (target_range.1 - target_range.0)
            / (source_range.1 - source_range.0))
}

/// Limit a value to the range `[min, max]`.
///
/// NaN values are passed through unchanged.
pub fn clamp<T>(value: T, min: T, max: T) -> T
where
    T: Float,
{
    let mut ret = value;

    if ret > max {
        ret = max
    }
    if ret < min {
        ret = min
    }

    ret
}

/// Limit a value to the symmetric range `[-limit, limit]`.
pub fn clamp_abs<T>(value: T, limit: T) -> T
where
    T: Float,
{
    clamp(value, -limit, limit)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 10f64), (0f64, 1f64), 5f64), 0.5);
        assert_eq!(lin_map((-30f64, 30f64), (1f64, 2f64), 0f64), 1.5);
        assert_eq!(lin_map((-30f64, 30f64), (1f64, 2f64), 30f64), 2.0);
        assert_eq!(lin_map((0f64, 1f64), (1f64, -1f64), 1f64), -1.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5f64, 0f64, 1f64), 1.0);
        assert_eq!(clamp(-5f64, 0f64, 1f64), 0.0);
        assert_eq!(clamp(0.25f64, 0f64, 1f64), 0.25);
        assert_eq!(clamp_abs(-45f64, 30f64), -30.0);
        assert_eq!(clamp_abs(12f64, 30f64), 12.0);
        assert!(clamp(f64::NAN, 0f64, 1f64).is_nan());
    }
}
