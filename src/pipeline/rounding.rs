//! Decimal rounding applied to every emitted float.

use crate::types::Coordinate;

/// Smallest magnitude at which every f64 is an integer.
const INTEGRAL_LIMIT: f64 = 4_503_599_627_370_496.0;

/// Rounds values half away from zero to a fixed number of decimal places.
///
/// Values at or above 2^52 / 10^precision have no fractional digits left at that
/// precision and pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rounder {
    precision: u32,
    scale: f64,
}

impl Rounder {
    /// `precision` is the number of decimal places kept.
    #[must_use]
    pub fn new(precision: u32) -> Self {
        Self {
            precision,
            scale: 10f64.powi(precision as i32),
        }
    }

    #[must_use]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    #[must_use]
    pub fn round(&self, value: f64) -> f64 {
        // Scaling would overflow, or lose the value to the nearest power of two
        if !value.is_finite() || value.abs() >= INTEGRAL_LIMIT / self.scale {
            return value;
        }
        let rounded = (value * self.scale).round() / self.scale;
        // Collapse -0.0 so output never prints "-0.0"
        if rounded == 0.0 { 0.0 } else { rounded }
    }

    #[must_use]
    pub fn round_coordinate(&self, point: Coordinate) -> Coordinate {
        [self.round(point[0]), self.round(point[1])]
    }

    #[must_use]
    pub fn round_slice(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.round(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_precision() {
        let rounder = Rounder::new(5);
        assert_eq!(rounder.round(41.0_f64.sqrt()), 6.40312);
        assert_eq!(rounder.round(1.0), 1.0);
        assert_eq!(rounder.round(0.123456789), 0.12346);
        assert_eq!(rounder.round(-0.123454), -0.12345);
    }

    #[test]
    fn test_zero_precision_and_negative_zero() {
        let rounder = Rounder::new(0);
        assert_eq!(rounder.round(2.5), 3.0);
        assert_eq!(rounder.round(-2.4), -2.0);

        let rounded = Rounder::new(3).round(-0.0000001);
        assert_eq!(rounded, 0.0);
        assert!(rounded.is_sign_positive());
    }

    #[test]
    fn test_rounding_is_idempotent() {
        let rounder = Rounder::new(4);
        for value in [0.1, 1.23456, -98.76543, 1e-9, 12345.678901] {
            let once = rounder.round(value);
            assert_eq!(rounder.round(once), once);
        }
    }

    #[test]
    fn test_round_coordinate_and_slice() {
        let rounder = Rounder::new(2);
        assert_eq!(rounder.round_coordinate([1.005_1, -3.14159]), [1.01, -3.14]);
        assert_eq!(rounder.round_slice(&[0.333, 0.666]), vec![0.33, 0.67]);
    }

    #[test]
    fn test_huge_values_pass_through() {
        for precision in [0, 5, 15] {
            let rounder = Rounder::new(precision);
            for value in [1e300, -1e300, f64::MAX, f64::MIN, 1e20] {
                assert_eq!(rounder.round(value), value, "precision {precision}");
            }
        }
        // Just below the limit rounding still applies
        assert_eq!(Rounder::new(15).round(1.234_567_890_123_456_7), 1.234567890123457);
        assert_eq!(Rounder::new(2).round(12_345_678_901.234_5), 12_345_678_901.23);
    }
}
