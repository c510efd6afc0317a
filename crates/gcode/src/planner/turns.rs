//! The junction (turn) limiter.
//!
//! Assigns every interior waypoint a feedrate that the machine can corner
//! at, based on the turn angle and the per-axis limits. Existing feedrates
//! are only ever lowered.

use std::collections::VecDeque;
use std::f64::consts::PI;

use motion::Limits;

use crate::planner::linear_interpolation;
use crate::program::{remove_duplicates, render_gcode};
use crate::{Block, Error, Program};

/// Applies turn-based feedrate limits to a run of full-state move blocks.
///
/// Gentle turns (up to 90 degrees) scale the no-accel velocity between 25%
/// and 100%; wider turns interpolate from the no-accel velocity up to the
/// full velocity limit on a quadratically stretched angle. The first and
/// last waypoint are clamped to the no-accel velocity of their move
/// direction.
pub fn apply_turn_limits(program: &[Block], limits: &Limits) -> Result<Program, Error> {
    let mut states = remove_duplicates(program, &Block::new());
    // expand every G block into the running full state
    let mut current = Block::new();
    for e in states.iter_mut() {
        if e.contains('G') {
            current = current.merge(e);
            *e = current.clone();
        }
    }

    if states.is_empty() {
        return Ok(states);
    }
    if states.len() == 1 {
        let f = states[0].get('F').unwrap_or(0.0);
        if f > 0.0 {
            states[0].set('F', limits.mean_no_accel_velocity().min(f));
        }
        return Ok(states);
    }

    {
        let first_diff = states[0].vector_to(&states[1]);
        let orig_f = states[0].get('F').unwrap_or(0.0);
        if first_diff.length() > 0.0 {
            let clamp = limits.no_accel_velocity_along(&(first_diff / first_diff.length()));
            states[0].set('F', clamp.min(orig_f));
        }
        let f0 = states[0].get('F').unwrap_or(0.0);
        if f0.is_nan() {
            return Err(Error::Program("the first feedrate is not a number".into()));
        }
        if states.len() == 2 {
            states[1].set('F', f0);
            return Ok(states);
        }
    }

    let mut tristate: VecDeque<Block> = VecDeque::new();
    tristate.push_back(states[0].clone());
    let merged = tristate.back().expect("seeded").merge(&states[1]);
    tristate.push_back(merged);
    for i in 1..states.len() - 1 {
        states[i] = tristate.back().expect("seeded").clone();
        let merged = tristate.back().expect("seeded").merge(&states[i + 1]);
        tristate.push_back(merged);

        let a = tristate[0].to_distance();
        let b = tristate[1].to_distance();
        let c = tristate[2].to_distance();
        let angle = b.angle_at(&a, &c);
        let f_in = states[i].get('F').unwrap_or(0.0);
        if f_in == 0.0 {
            return Err(Error::Program(format!(
                "feedrate cannot be 0:\n{}",
                render_gcode(&vec![states.clone()])
            )));
        }

        let result_f = if angle <= PI / 2.0 {
            let y = linear_interpolation(angle, 0.0, 0.25, PI / 2.0, 1.0);
            let ab = b - a;
            let bc = c - b;
            let floor = limits
                .no_accel_velocity_along(&(ab / ab.length()))
                .min(limits.no_accel_velocity_along(&(bc / bc.length())));
            (y * floor).min(f_in)
        } else {
            let b_a = (b - a).length().max(0.0000001);
            let c_b = (c - b).length().max(0.0000001);
            let mut stretched = (angle - PI / 2.0) / (PI / 2.0);
            stretched *= stretched;
            let stretched = stretched * (PI / 2.0) + PI / 2.0;
            let y = linear_interpolation(
                stretched,
                PI / 2.0,
                limits
                    .no_accel_velocity_along(&((b - a) / b_a))
                    .min(limits.no_accel_velocity_along(&((c - b) / c_b))),
                PI,
                limits
                    .velocity_along(&((b - a) / b_a))
                    .min(limits.velocity_along(&((c - b) / c_b))),
            );
            let y = if y.is_nan() { f_in } else { y };
            y.min(f_in)
        };
        if result_f.is_nan() {
            return Err(Error::Program(
                "a turn-limited feedrate is not a number".into(),
            ));
        }
        states[i].set('F', result_f);
        tristate.pop_front();
    }

    {
        let n = states.len();
        let last_diff = states[n - 2].vector_to(&states[n - 1]);
        let clamp = limits.no_accel_velocity_along(&(last_diff / last_diff.length()));
        let f = states[n - 1].get('F').unwrap_or(0.0);
        let mut ff = clamp.min(f);
        if clamp.is_nan() {
            ff = f;
        }
        if f.is_nan() {
            ff = clamp;
        }
        if ff.is_nan() {
            return Err(Error::Program("the final feedrate is not a number".into()));
        }
        states[n - 1].set('F', ff);
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion::Distance;

    fn limits() -> Limits {
        Limits::new(
            Distance([100.0; 4]),
            Distance([220.0, 220.0, 110.0, 110.0]),
            Distance([2.0, 3.0, 4.0, 5.0]),
        )
    }

    fn b<const N: usize>(pairs: [(char, f64); N]) -> Block {
        Block::from(pairs)
    }

    #[test]
    fn right_angle_corner_gets_the_lesser_no_accel_velocity() {
        // 0,0 -> 10,0 -> 10,10: the corner blends X (2 mm/s) and Y (3 mm/s)
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 100.0)]),
            b([('G', 1.0), ('X', 10.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 100.0)]),
            b([('G', 1.0), ('X', 10.0), ('Y', 10.0), ('Z', 0.0), ('A', 0.0), ('F', 100.0)]),
        ];
        let out = apply_turn_limits(&program, &limits()).unwrap();
        assert_eq!(out[1].get('F'), Some(2.0));
    }

    #[test]
    fn straight_line_keeps_the_commanded_feedrate_inside() {
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 50.0)]),
            b([('G', 1.0), ('X', 10.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 50.0)]),
            b([('G', 1.0), ('X', 20.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 50.0)]),
        ];
        let out = apply_turn_limits(&program, &limits()).unwrap();
        // interior vertex on a straight line is limited by max velocity, not
        // the turn floor
        assert_eq!(out[1].get('F'), Some(50.0));
        // endpoints are clamped to the no-accel velocity of their segment
        assert_eq!(out[0].get('F'), Some(2.0));
        assert_eq!(out[2].get('F'), Some(2.0));
    }

    #[test]
    fn never_raises_a_feedrate() {
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 1.0)]),
            b([('G', 1.0), ('X', 10.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 1.0)]),
            b([('G', 1.0), ('X', 20.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 1.0)]),
        ];
        let out = apply_turn_limits(&program, &limits()).unwrap();
        for (before, after) in program.iter().zip(out.iter()) {
            assert!(after.get('F').unwrap() <= before.get('F').unwrap() + 1e-12);
        }
    }

    #[test]
    fn zero_feedrate_is_a_program_error() {
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 50.0)]),
            b([('G', 1.0), ('X', 10.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 0.0)]),
            b([('G', 1.0), ('X', 20.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 50.0)]),
        ];
        assert!(apply_turn_limits(&program, &limits()).is_err());
    }

    #[test]
    fn single_block_is_clamped_to_the_mean_no_accel_velocity() {
        let program = vec![b([('G', 1.0), ('X', 5.0), ('F', 100.0)])];
        let out = apply_turn_limits(&program, &limits()).unwrap();
        assert_eq!(out[0].get('F'), Some(3.5));
    }
}
