//! Run-level planning: linear-move limiting, rapid expansion and
//! transition-node insertion.

use motion::physics::{acceleration_between, transition_point, PathNode};
use motion::Limits;

use crate::planner::{apply_turn_limits, limit_accelerations};
use crate::{Block, Error, PartitionedProgram, Program};

fn base_state() -> Block {
    Block::from([('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0), ('F', 0.1)])
}

/// Applies turn and acceleration limits to a run of G0/G1 blocks starting
/// from `current_state`. The returned run is full-state blocks with
/// feedrates the machine can actually drive.
pub fn limit_linear_moves(
    run: &[Block],
    limits: &Limits,
    current_state: &Block,
) -> Result<Program, Error> {
    if run.is_empty() {
        return Err(Error::Program(
            "there must be at least one G0 or G1 block in the run".into(),
        ));
    }
    let mut result = Vec::with_capacity(run.len() + 1);
    let mut current = base_state().merge(current_state);
    result.push(current.clone());
    for input in run {
        // bare continuation blocks inherit their family from the state
        let next = current.merge(input);
        if !matches!(next.g(), Some(0) | Some(1)) {
            return Err(Error::Program(
                "only G0 and G1 blocks may appear in a linear run".into(),
            ));
        }
        let s = current.vector_to(&next).length();
        if s == 0.0 {
            // a pure feedrate change folds into the previous waypoint
            if let Some(f) = next.get('F') {
                result.last_mut().expect("seeded").set('F', f);
            }
        } else {
            result.push(next.clone());
        }
        current = next;
    }
    let with_limits = apply_turn_limits(&result, limits)?;
    if with_limits.len() != result.len() {
        return Err(Error::Program(
            "turn limiting must preserve the number of waypoints".into(),
        ));
    }
    let mut limited = limit_accelerations(&with_limits, limits)?;
    limited.remove(0);
    Ok(limited)
}

/// Rewrites a run of G0 rapids into G1 sequences that accelerate from the
/// no-accel floor, cruise, and decelerate back to the floor.
///
/// Moves long enough to reach the projected velocity limit expand into
/// three blocks (end of acceleration, start of deceleration, endpoint);
/// shorter moves peak at the midpoint and expand into two. Zero-length
/// rapids pass through unchanged.
pub fn expand_rapids(
    run: &[Block],
    limits: &Limits,
    current_state: &Block,
) -> Result<Program, Error> {
    if run.is_empty() {
        return Err(Error::Program(
            "there must be at least one G0 block in the run".into(),
        ));
    }
    let mut result = Vec::new();
    let mut current = base_state().merge(current_state);
    for input in run {
        if input.g() != Some(0) {
            return Err(Error::Program(
                "only G0 blocks may appear in a rapid run".into(),
            ));
        }
        let next = current.merge(input);
        let a_pos = current.to_distance();
        let b_pos = next.to_distance();
        let ab = b_pos - a_pos;
        let s = ab.length();
        if s == 0.0 {
            result.push(next.clone());
        } else {
            let dir = ab / s;
            let accel = limits.acceleration_along(&dir);
            let max_v = limits.velocity_along(&dir);
            let min_v = limits.no_accel_velocity_along(&dir);
            let pn_a = PathNode { pos: a_pos, vel: min_v };
            let mut pn_med = PathNode {
                pos: (a_pos + b_pos) * 0.5,
                vel: max_v,
            };
            let pn_b = PathNode { pos: b_pos, vel: min_v };
            let a_real = acceleration_between(&pn_a, &pn_med)?;
            if a_real >= accel {
                // too short to reach max_v: the peak sits at the midpoint
                pn_med = transition_point(&pn_a, &pn_med, accel)?;
                let mut mid = current.merge(&Block::from_distance(&pn_med.pos));
                mid.set('F', pn_med.vel);
                mid.set('G', 1.0);
                result.push(mid);
                let mut end = next.clone();
                end.set('G', 1.0);
                end.set('F', min_v);
                result.push(end);
            } else {
                pn_med = transition_point(&pn_a, &pn_med, accel)?;
                let mut accel_end = current.merge(&Block::from_distance(&pn_med.pos));
                accel_end.set('F', pn_med.vel);
                accel_end.set('G', 1.0);
                result.push(accel_end);

                pn_med = transition_point(&pn_b, &pn_med, accel)?;
                let mut decel_start = current.merge(&Block::from_distance(&pn_med.pos));
                decel_start.set('F', pn_med.vel);
                decel_start.set('G', 1.0);
                result.push(decel_start);

                let mut end = next.clone();
                end.set('G', 1.0);
                end.set('F', min_v);
                result.push(end);
            }
        }
        current = next;
    }
    Ok(result)
}

/// Inserts the accelerate/cruise transition points into every G0/G1 move
/// longer than a hundredth of a millimeter, so later passes see where the
/// velocity profile changes. G92 blocks update the tracked state in place;
/// everything else passes through.
pub fn insert_transition_nodes(
    parts: &PartitionedProgram,
    initial: &Block,
    limits: &Limits,
) -> Result<PartitionedProgram, Error> {
    let mut out = Vec::with_capacity(parts.len());
    let mut current = base_state().merge(initial);
    for sub in parts {
        if sub.is_empty() {
            continue;
        }
        if !sub[0].contains('G') {
            out.push(sub.clone());
            continue;
        }
        let mut nsub = Vec::with_capacity(sub.len() * 2);
        for block in sub {
            let next = current.merge(block);
            let g = next
                .g()
                .ok_or_else(|| Error::Program("block in a G run lacks a G word".into()))?;
            match g {
                0 | 1 => {
                    let move_vec = current.vector_to(&next);
                    if move_vec.length() < 0.01 {
                        nsub.push(block.clone());
                    } else {
                        let max_accel = limits.acceleration_along(&move_vec);
                        let floor_v = limits.no_accel_velocity_along(&move_vec);
                        let a = PathNode {
                            pos: current.to_distance(),
                            vel: floor_v,
                        };
                        let b = PathNode {
                            pos: next.to_distance(),
                            vel: next.get('F').unwrap_or(0.0),
                        };
                        let tp = transition_point(&a, &b, max_accel)?;
                        let half = move_vec * 0.5;
                        let f = next
                            .get('F')
                            .unwrap_or(0.0)
                            .max(current.get('F').unwrap_or(0.0));
                        if (tp.pos - a.pos).length() < half.length() {
                            let nm = (half / half.length()) * (tp.pos - a.pos).length();
                            let mut mid_a = current.merge(&Block::from_distance(&(a.pos + nm)));
                            let mut mid_b = current.merge(&Block::from_distance(&(b.pos - nm)));
                            for m in [&mut mid_a, &mut mid_b] {
                                m.set('F', f);
                                m.set('G', g as f64);
                            }
                            nsub.push(mid_a);
                            nsub.push(mid_b);
                            nsub.push(next.clone());
                        } else {
                            let mut mid =
                                current.merge(&Block::from_distance(&(a.pos + half)));
                            mid.set('F', f);
                            mid.set('G', g as f64);
                            nsub.push(mid);
                            nsub.push(next.clone());
                        }
                    }
                    current = next;
                }
                92 => {
                    current = current.merge(block);
                    nsub.push(current.clone());
                }
                _ => nsub.push(block.clone()),
            }
        }
        out.push(nsub);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion::Distance;

    fn b<const N: usize>(pairs: [(char, f64); N]) -> Block {
        Block::from(pairs)
    }

    fn limits_x() -> Limits {
        Limits::new(
            Distance([100.0; 4]),
            Distance([50.0; 4]),
            Distance([2.0; 4]),
        )
    }

    #[test]
    fn long_rapid_expands_into_an_accel_cruise_decel_triplet() {
        let run = vec![b([('G', 0.0), ('X', 200.0)])];
        let out = expand_rapids(&run, &limits_x(), &b([('X', 0.0), ('Y', 0.0), ('Z', 0.0), ('A', 0.0)])).unwrap();
        assert_eq!(out.len(), 3);
        // accelerating 2 -> 50 mm/s at 100 mm/s^2 takes 12.48 mm
        assert!((out[0].get('X').unwrap() - 12.48).abs() < 1e-9);
        assert_eq!(out[0].get('F'), Some(50.0));
        assert!((out[1].get('X').unwrap() - 187.52).abs() < 1e-9);
        assert_eq!(out[1].get('F'), Some(50.0));
        assert_eq!(out[2].get('X'), Some(200.0));
        assert_eq!(out[2].get('F'), Some(2.0));
        for block in &out {
            assert_eq!(block.g(), Some(1));
        }
    }

    #[test]
    fn expanded_rapid_keeps_the_axis_accelerations_exact() {
        let run = vec![b([('G', 0.0), ('X', 200.0)])];
        let out = expand_rapids(&run, &limits_x(), &b([('X', 0.0)])).unwrap();
        let start = PathNode { pos: Distance::default(), vel: 2.0 };
        let n0 = PathNode { pos: out[0].to_distance(), vel: out[0].get('F').unwrap() };
        let n1 = PathNode { pos: out[1].to_distance(), vel: out[1].get('F').unwrap() };
        let n2 = PathNode { pos: out[2].to_distance(), vel: out[2].get('F').unwrap() };
        assert!((acceleration_between(&start, &n0).unwrap() - 100.0).abs() < 1e-6);
        assert!(acceleration_between(&n0, &n1).unwrap().abs() < 1e-6);
        assert!((acceleration_between(&n1, &n2).unwrap() + 100.0).abs() < 1e-6);
    }

    #[test]
    fn short_rapid_peaks_at_the_midpoint() {
        let run = vec![b([('G', 0.0), ('X', 1.0)])];
        let out = expand_rapids(&run, &limits_x(), &b([('X', 0.0)])).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].get('X'), Some(0.5));
        // v^2 = 2^2 + 2 * 100 * 0.5
        let expected = (4.0f64 + 100.0).sqrt();
        assert!((out[0].get('F').unwrap() - expected).abs() < 1e-9);
        assert_eq!(out[1].get('F'), Some(2.0));
    }

    #[test]
    fn zero_length_rapid_passes_through() {
        let run = vec![b([('G', 0.0), ('X', 0.0)])];
        let out = expand_rapids(&run, &limits_x(), &b([('X', 0.0)])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].g(), Some(0));
    }

    #[test]
    fn rapid_run_rejects_other_codes() {
        let run = vec![b([('G', 1.0), ('X', 5.0), ('F', 10.0)])];
        assert!(expand_rapids(&run, &limits_x(), &Block::new()).is_err());
    }

    #[test]
    fn linear_run_rejects_other_codes() {
        let run = vec![b([('G', 4.0), ('P', 10.0)])];
        assert!(limit_linear_moves(&run, &limits_x(), &Block::new()).is_err());
    }

    #[test]
    fn linear_run_output_has_limited_feedrates_everywhere() {
        let run = vec![
            b([('G', 1.0), ('X', 10.0), ('F', 100.0)]),
            b([('G', 1.0), ('X', 10.0), ('Y', 10.0), ('F', 100.0)]),
        ];
        let out = limit_linear_moves(&run, &limits_x(), &b([('X', 0.0)])).unwrap();
        assert_eq!(out.len(), 2);
        for block in &out {
            let f = block.get('F').unwrap();
            assert!(f > 0.0 && f <= 100.0);
        }
        // the right-angle corner is held at the no-accel floor
        assert_eq!(out[0].get('F'), Some(2.0));
    }

    #[test]
    fn transition_nodes_are_inserted_for_long_moves() {
        let parts = vec![vec![b([('G', 1.0), ('X', 100.0), ('F', 30.0)])]];
        let out = insert_transition_nodes(&parts, &b([('F', 2.0)]), &limits_x()).unwrap();
        assert_eq!(out.len(), 1);
        // reaching 30 mm/s from the 2 mm/s floor happens well before the
        // midpoint, so the move gains two interior nodes
        assert_eq!(out[0].len(), 3);
        let x0 = out[0][0].get('X').unwrap();
        let x1 = out[0][1].get('X').unwrap();
        assert!(x0 > 0.0 && x0 < 50.0);
        assert!((100.0 - x1 - x0).abs() < 1e-9, "mirror point expected");
        assert_eq!(out[0][2].get('X'), Some(100.0));
    }

    #[test]
    fn short_moves_pass_transition_insertion_unchanged() {
        let parts = vec![vec![b([('G', 1.0), ('X', 0.005), ('F', 30.0)])]];
        let out = insert_transition_nodes(&parts, &Block::new(), &limits_x()).unwrap();
        assert_eq!(out[0], vec![b([('G', 1.0), ('X', 0.005), ('F', 30.0)])]);
    }
}
