//! Program-level path simplification.
//!
//! Runs Douglas-Peucker over the positions a program visits, with guards
//! that keep every waypoint whose removal would change machine behavior:
//! feedrate changes, the neighborhood of non-move blocks (dwells, M-codes)
//! and the endpoints of each G run.

use motion::path::douglas_peucker_marks;
use motion::Waypoint;
use tracing::warn;

use crate::program::{last_state_after, partition};
use crate::{Block, Error, Program};

/// Simplifies the whole program group by group, threading the machine
/// state across groups. Non-move blocks always survive in place.
pub fn simplify_path(program: &[Block], epsilon: f64, initial: &Block) -> Result<Program, Error> {
    let mut out = Vec::with_capacity(program.len());
    let mut state = initial.clone();
    for group in partition(program, &Block::from([('F', 1.0)]))? {
        let simplified = simplify_group(&group, epsilon, &state);
        state = last_state_after(&group, &state);
        out.extend(simplified);
    }
    Ok(out)
}

fn simplify_group(group: &[Block], epsilon: f64, initial: &Block) -> Program {
    // the polyline the group traces, starting from the incoming state
    let mut machine_state = Block::from([
        ('X', 0.0),
        ('Y', 0.0),
        ('Z', 0.0),
        ('A', 0.0),
        ('F', 0.1),
    ])
    .merge(initial);
    let mut path: Vec<Waypoint> = Vec::with_capacity(group.len() + 1);
    path.push(machine_state.to_waypoint());
    for block in group {
        if block.is_move() {
            machine_state = machine_state.merge(block);
            path.push(machine_state.to_waypoint());
        }
    }

    let mut drop = douglas_peucker_marks(epsilon, &path);
    // path[0] is the carried-in position; path[1] is the group's first own
    // vertex and must survive, as must the last (already pinned by the
    // marking pass).
    if path.len() > 1 {
        drop[1] = false;
    }
    for i in 0..path.len() {
        if i > 0 {
            if path[i].velocity() != path[i - 1].velocity() {
                drop[i] = false;
            }
            if i > 1 && !group[i - 2].is_move() {
                drop[i] = false;
            }
        }
        if i + 1 < path.len() {
            if path[i].velocity() != path[i + 1].velocity() {
                drop[i] = false;
            }
            if i + 2 < path.len() && !group[i].is_move() {
                drop[i] = false;
            }
        }
    }

    // rebuild the group, keeping non-move blocks in their original slots
    fn flush_non_moves(group: &[Block], idx: &mut usize, out: &mut Program) {
        while *idx < group.len() && !group[*idx].is_move() {
            out.push(group[*idx].clone());
            *idx += 1;
        }
    }

    let mut out = Vec::with_capacity(group.len());
    let mut idx = 0;
    for (i, dropped) in drop.iter().enumerate().skip(1) {
        flush_non_moves(group, &mut idx, &mut out);
        if !*dropped {
            if idx < group.len() {
                out.push(group[idx].clone());
            } else {
                warn!("path point {} has no block to keep", i);
            }
        }
        idx += 1;
    }
    flush_non_moves(group, &mut idx, &mut out);
    out
}
