//! Uniform-acceleration motion physics.
//!
//! Basic units are millimeters and seconds. Acceleration is always applied
//! along the current velocity direction, so the scalar `a` fully describes
//! speeding up (`a > 0`) or braking (`a < 0`) on a straight segment.

use crate::{Distance, Error};

/// A position on the path together with the scalar velocity at that point.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct PathNode {
    pub pos: Distance,
    pub vel: f64,
}

/// Search bound for the acceleration solver, in mm/s^2.
const ACCEL_BOUND: f64 = 10_000_000.0;
/// Bisection iterations; enough to exhaust f64 precision over the bound.
const ACCEL_ITERATIONS: usize = 82;

/// Scalar acceleration that moves from node `a` to node `b`, i.e. covers the
/// distance between them while changing speed from `a.vel` to `b.vel`.
///
/// Solved by bisection over `[-1e7, 1e7]` mm/s^2. Equal velocities need no
/// acceleration; a velocity change over zero distance has no solution.
pub fn acceleration_between(a: &PathNode, b: &PathNode) -> Result<f64, Error> {
    let s = (b.pos - a.pos).length();
    let dv = b.vel - a.vel;
    if dv == 0.0 {
        return Ok(0.0);
    }
    if s == 0.0 {
        return Err(Error::Program(
            "cannot accelerate over a zero length segment".into(),
        ));
    }

    let mut a_min = -ACCEL_BOUND;
    let mut a_max = ACCEL_BOUND;
    for _ in 0..ACCEL_ITERATIONS {
        let acc = (a_max + a_min) / 2.0;
        if acc != 0.0 {
            let t = (dv / acc).abs();
            let s1 = a.vel * t + acc * t * t / 2.0;
            let sign = if dv >= 0.0 { 1.0 } else { -1.0 };
            if sign * s1 > sign * s {
                a_min = acc;
            } else if sign * s1 < sign * s {
                a_max = acc;
            } else {
                return Ok(acc);
            }
        } else if dv > 0.0 {
            a_min = acc;
        } else {
            a_max = acc;
        }
    }
    Ok((a_max + a_min) / 2.0)
}

/// The point at which movement from `a` towards `b` reaches `b`'s velocity
/// when accelerating with `acceleration`.
///
/// If the target velocity cannot be reached within the segment, the returned
/// node sits at `b.pos` with the velocity actually attainable there.
pub fn transition_point(a: &PathNode, b: &PathNode, acceleration: f64) -> Result<PathNode, Error> {
    if acceleration == 0.0 {
        return Ok(*a);
    }
    if a.pos == b.pos {
        if a.vel != b.vel {
            return Err(Error::Program(
                "cannot change velocity between identical points".into(),
            ));
        }
        return Ok(*a);
    }
    let road = b.pos - a.pos;
    let s_target = road.length();
    let vf2 = a.vel * a.vel + 2.0 * acceleration * s_target;
    let mut ret = *b;
    if vf2 > 0.0 {
        ret.vel = vf2.sqrt();
    }
    if (ret.vel > b.vel && acceleration > 0.0) || (vf2 < 0.0 && acceleration < 0.0) {
        // The target velocity is reached before the end of the segment.
        let t = (b.vel - a.vel) / acceleration;
        let s = a.vel * t + acceleration * t * t / 2.0;
        ret.vel = b.vel;
        ret.pos = a.pos + road / s_target * s;
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(v: f64) -> Distance {
        Distance([v, 0.0, 0.0, 0.0])
    }

    #[test]
    fn acceleration_between_matches_closed_form() {
        // v1^2 = v0^2 + 2 a s  =>  a = (100 - 0) / (2 * 5) = 10
        let a = PathNode { pos: x(0.0), vel: 0.0 };
        let b = PathNode { pos: x(5.0), vel: 10.0 };
        let acc = acceleration_between(&a, &b).unwrap();
        assert!((acc - 10.0).abs() < 1e-6, "acc = {}", acc);
    }

    #[test]
    fn deceleration_is_negative() {
        let a = PathNode { pos: x(0.0), vel: 10.0 };
        let b = PathNode { pos: x(5.0), vel: 0.0 };
        let acc = acceleration_between(&a, &b).unwrap();
        assert!((acc + 10.0).abs() < 1e-6, "acc = {}", acc);
    }

    #[test]
    fn equal_velocities_need_no_acceleration() {
        let a = PathNode { pos: x(0.0), vel: 3.0 };
        let b = PathNode { pos: x(5.0), vel: 3.0 };
        assert_eq!(acceleration_between(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn zero_distance_velocity_change_is_rejected() {
        let a = PathNode { pos: x(0.0), vel: 0.0 };
        let b = PathNode { pos: x(0.0), vel: 10.0 };
        assert!(acceleration_between(&a, &b).is_err());
    }

    #[test]
    fn transition_point_inside_segment() {
        // From 2 mm/s to 50 mm/s at 100 mm/s^2: t = 0.48 s, s = 12.48 mm.
        let a = PathNode { pos: x(0.0), vel: 2.0 };
        let b = PathNode { pos: x(100.0), vel: 50.0 };
        let tp = transition_point(&a, &b, 100.0).unwrap();
        assert!((tp.vel - 50.0).abs() < 1e-9);
        assert!((tp.pos[0] - 12.48).abs() < 1e-9, "pos = {}", tp.pos);
    }

    #[test]
    fn transition_point_clipped_to_segment_end() {
        // Too short to reach the target velocity: peak at the endpoint.
        let a = PathNode { pos: x(0.0), vel: 2.0 };
        let b = PathNode { pos: x(1.0), vel: 50.0 };
        let tp = transition_point(&a, &b, 100.0).unwrap();
        assert_eq!(tp.pos, x(1.0));
        assert!((tp.vel - (4.0f64 + 200.0).sqrt()).abs() < 1e-9);
    }
}
