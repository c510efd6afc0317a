//! The acceleration limiter.
//!
//! Repeatedly scans consecutive waypoint pairs and knocks 20% off the
//! faster endpoint's feedrate whenever the acceleration required between
//! them exceeds the direction-projected axis limit. Terminates because each
//! fix strictly shrinks a bounded positive feedrate.

use motion::physics::{acceleration_between, PathNode};
use motion::Limits;

use crate::{Block, Error, Program};

pub fn limit_accelerations(program: &[Block], limits: &Limits) -> Result<Program, Error> {
    if program.is_empty() {
        return Ok(Vec::new());
    }
    let mut result = program.to_vec();

    // every block needs an explicit feedrate before the scan
    let mut prev_f = result[0].get('F').ok_or_else(|| {
        Error::Program("the first block of a run must carry a feedrate".into())
    })?;
    for e in result.iter_mut() {
        match e.get('F') {
            Some(f) => prev_f = f,
            None => e.set('F', prev_f),
        }
    }

    let mut fixing = true;
    while fixing {
        fixing = false;
        for i in 1..result.len() {
            let a = result[i - 1].to_distance();
            let b = result[i].to_distance();
            let ab = b - a;
            let s = ab.length();
            if s == 0.0 || result[i - 1].get('F') == result[i].get('F') {
                continue;
            }
            let dir = ab / s;
            let mut max_a = limits.acceleration_along(&dir);
            // the no-accel floor keeps the search from collapsing feedrates
            // to zero on very short segments
            let mut min_v = limits.no_accel_velocity_along(&dir) / 2.0;
            min_v = min_v.min(result[i].get('F').unwrap_or(0.0));
            max_a = max_a.max(min_v);

            let pn_a = PathNode {
                pos: a,
                vel: result[i - 1].get('F').unwrap_or(0.0),
            };
            let pn_b = PathNode {
                pos: b,
                vel: result[i].get('F').unwrap_or(0.0),
            };
            let a_ab = acceleration_between(&pn_a, &pn_b)?;
            if a_ab.abs() > max_a.abs() {
                if pn_a.vel > pn_b.vel {
                    result[i - 1].set('F', pn_a.vel * 0.8);
                    fixing = true;
                } else if pn_a.vel < pn_b.vel {
                    result[i].set('F', pn_b.vel * 0.8);
                    fixing = true;
                }
            }
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion::Distance;

    fn limits() -> Limits {
        Limits::new(
            Distance([100.0; 4]),
            Distance([220.0; 4]),
            Distance([2.0; 4]),
        )
    }

    fn b<const N: usize>(pairs: [(char, f64); N]) -> Block {
        Block::from(pairs)
    }

    #[test]
    fn compliant_pairs_stay_untouched() {
        // 0 -> 10 mm while going 10 -> 20 mm/s needs 15 mm/s^2, within 100
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('F', 10.0)]),
            b([('G', 1.0), ('X', 10.0), ('F', 20.0)]),
        ];
        let out = limit_accelerations(&program, &limits()).unwrap();
        assert_eq!(out[0].get('F'), Some(10.0));
        assert_eq!(out[1].get('F'), Some(20.0));
    }

    #[test]
    fn violating_pair_is_reduced_until_it_fits() {
        // 1 mm while going 2 -> 200 mm/s needs ~20 km/s^2
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('F', 2.0)]),
            b([('G', 1.0), ('X', 1.0), ('F', 200.0)]),
        ];
        let out = limit_accelerations(&program, &limits()).unwrap();
        let v0 = out[0].get('F').unwrap();
        let v1 = out[1].get('F').unwrap();
        let required = (v1 * v1 - v0 * v0).abs() / (2.0 * 1.0);
        assert!(required <= 100.0 + 1e-6, "still violating: {}", required);
        assert!(v1 < 200.0, "the faster endpoint must have been reduced");
        assert_eq!(v0, 2.0, "the slower endpoint stays");
    }

    #[test]
    fn missing_feedrates_inherit_from_the_left() {
        let program = vec![
            b([('G', 1.0), ('X', 0.0), ('F', 10.0)]),
            b([('G', 1.0), ('X', 5.0)]),
        ];
        let out = limit_accelerations(&program, &limits()).unwrap();
        assert_eq!(out[1].get('F'), Some(10.0));
    }

    #[test]
    fn first_block_without_feedrate_is_rejected() {
        let program = vec![b([('G', 1.0), ('X', 0.0)])];
        assert!(limit_accelerations(&program, &limits()).is_err());
    }
}
