//! Numeric helpers shared by derivations.

/// Rounds half away from zero at `digits` decimal places.
///
/// Binary floating point stores values such as `2.25` exactly but `1.005`
/// slightly below the midpoint, so a small epsilon is added before
/// truncation to keep decimal midpoints rounding up.
///
/// ```
/// use adam_model::round_half_up;
///
/// assert_eq!(round_half_up(2.25, 1), 2.3);
/// assert_eq!(round_half_up(-2.25, 1), -2.3);
/// assert_eq!(round_half_up(2.24, 1), 2.2);
/// ```
pub fn round_half_up(value: f64, digits: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(digits);
    let scaled = value.abs() * factor + 0.5 + f64::EPSILON.sqrt();
    value.signum() * scaled.trunc() / factor
}

/// Whole days from `start` to `end`, counting both ends.
pub fn inclusive_days(start: chrono::NaiveDate, end: chrono::NaiveDate) -> i64 {
    (end - start).num_days() + 1
}
