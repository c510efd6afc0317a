//! Per-axis machine limits and their projection onto move directions.

use crate::{Distance, AXES};

/// Per-axis motion limits of the machine.
///
/// Each field holds one value per axis. The scalar limit that applies to a
/// move in some direction is the weighted mean of the per-axis values, the
/// weights being the direction's absolute components: a move along a single
/// axis gets exactly that axis' limit, a diagonal move blends them so that
/// no axis is driven past its own bound.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Limits {
    /// Maximal acceleration per axis, mm/s^2.
    pub max_acceleration_mm_s2: Distance,
    /// Maximal velocity per axis, mm/s.
    pub max_velocity_mm_s: Distance,
    /// Maximal velocity per axis that may be reached instantaneously, without
    /// an acceleration ramp, mm/s.
    pub max_no_accel_velocity_mm_s: Distance,
}

/// Weighted mean of `limits_for_axes` with the direction's absolute
/// components as weights.
pub fn proportional_limit(limits_for_axes: &Distance, direction: &Distance) -> f64 {
    let mut blended = 0.0;
    let mut weight_sum = 0.0;
    for i in 0..AXES {
        blended += limits_for_axes[i] * direction[i].abs();
        weight_sum += direction[i].abs();
    }
    blended / weight_sum
}

impl Limits {
    pub fn new(
        max_acceleration_mm_s2: Distance,
        max_velocity_mm_s: Distance,
        max_no_accel_velocity_mm_s: Distance,
    ) -> Self {
        Limits {
            max_acceleration_mm_s2,
            max_velocity_mm_s,
            max_no_accel_velocity_mm_s,
        }
    }

    /// Maximal linear acceleration along `direction`.
    pub fn acceleration_along(&self, direction: &Distance) -> f64 {
        proportional_limit(&self.max_acceleration_mm_s2, direction)
    }

    /// Maximal linear velocity along `direction`.
    pub fn velocity_along(&self, direction: &Distance) -> f64 {
        proportional_limit(&self.max_velocity_mm_s, direction)
    }

    /// Maximal instantaneous velocity along `direction`.
    pub fn no_accel_velocity_along(&self, direction: &Distance) -> f64 {
        proportional_limit(&self.max_no_accel_velocity_mm_s, direction)
    }

    /// Plain average of the per-axis no-accel velocities, used when a program
    /// gives no direction to project onto.
    pub fn mean_no_accel_velocity(&self) -> f64 {
        self.max_no_accel_velocity_mm_s.iter().sum::<f64>() / AXES as f64
    }

    /// Smallest per-axis no-accel velocity.
    pub fn min_no_accel_velocity(&self) -> f64 {
        self.max_no_accel_velocity_mm_s
            .iter()
            .fold(f64::INFINITY, |a, &b| a.min(b))
    }

    /// Largest per-axis velocity; the feedrate assigned to rapid moves.
    pub fn max_axis_velocity(&self) -> f64 {
        self.max_velocity_mm_s
            .iter()
            .fold(f64::NEG_INFINITY, |a, &b| a.max(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits::new(
            Distance([100.0, 200.0, 300.0, 400.0]),
            Distance([220.0, 220.0, 110.0, 110.0]),
            Distance([2.0, 3.0, 4.0, 5.0]),
        )
    }

    #[test]
    fn single_axis_direction_picks_that_axis() {
        let l = limits();
        assert_eq!(l.acceleration_along(&Distance([1.0, 0.0, 0.0, 0.0])), 100.0);
        assert_eq!(l.acceleration_along(&Distance([0.0, -1.0, 0.0, 0.0])), 200.0);
        assert_eq!(l.no_accel_velocity_along(&Distance([0.0, 0.0, 1.0, 0.0])), 4.0);
    }

    #[test]
    fn diagonal_direction_blends_axes() {
        let l = limits();
        let d = Distance([1.0, 1.0, 0.0, 0.0]);
        assert!((l.acceleration_along(&d) - 150.0).abs() < 1e-12);
        // scale invariance: only the direction matters
        assert!((l.acceleration_along(&(d * 7.5)) - 150.0).abs() < 1e-12);
    }

    #[test]
    fn aggregates() {
        let l = limits();
        assert_eq!(l.mean_no_accel_velocity(), 3.5);
        assert_eq!(l.min_no_accel_velocity(), 2.0);
        assert_eq!(l.max_axis_velocity(), 220.0);
    }
}
