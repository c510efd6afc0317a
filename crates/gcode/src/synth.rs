//! Step synthesis: turning planned runs into tick-aligned step-command
//! streams.
//!
//! Three strategies share the chase-steps kernel and the run-length merge
//! tail:
//!
//! * [`Generator::Segments`] walks each block-to-block segment at either
//!   constant speed or constant acceleration and lands exactly on the
//!   kinematic endpoint.
//! * [`Generator::Spline`] smooths the whole run with per-vertex Bezier
//!   splines before pacing; it falls back to `Segments` when the run
//!   contains G4 or G92, which have no spline geometry.
//! * [`Generator::Polyline`] treats the run as a velocity-annotated
//!   polyline and advances along it by one tick's travel at a time.
//!
//! All strategies report the evolving machine state through `on_state`,
//! once per consumed block and once for the final state.

use motion::command::{append_merged, chase_steps, collapse_runs};
use motion::path::{simplify_polyline, spline_walk, walk_polyline};
use motion::physics::{acceleration_between, PathNode};
use motion::{MotorLayout, StepCommand, Waypoint};

use crate::{Block, Error};

/// Selects the step synthesis strategy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Generator {
    #[default]
    Segments,
    Spline,
    Polyline,
}

/// Streams longer than this indicate runaway pacing, not a long program.
const MAX_STREAM_COMMANDS: usize = 64 * 1024 * 1024;

/// Arc length (mm) of the Bezier handles in spline mode.
const SPLINE_ARC_LENGTH: f64 = 0.5;

/// Synthesizes the step-command stream for a planned run using the chosen
/// strategy. `dt` is the tick duration in seconds.
pub fn generate(
    generator: Generator,
    run: &[Block],
    layout: &MotorLayout,
    dt: f64,
    initial_state: &Block,
    on_state: &mut dyn FnMut(&Block),
) -> Result<Vec<StepCommand>, Error> {
    match generator {
        Generator::Segments => segments_to_steps(run, layout, dt, initial_state, on_state),
        Generator::Spline => spline_to_steps(run, layout, dt, initial_state, on_state),
        Generator::Polyline => polyline_to_steps(run, layout, dt, initial_state, on_state),
    }
}

/// Strategy A: per-segment constant-speed / constant-acceleration walking.
pub fn segments_to_steps(
    run: &[Block],
    layout: &MotorLayout,
    dt: f64,
    initial_state: &Block,
    on_state: &mut dyn FnMut(&Block),
) -> Result<Vec<StepCommand>, Error> {
    let mut state = initial_state.clone();
    let mut result: Vec<StepCommand> = Vec::new();
    for block in run {
        on_state(&state);
        let mut next = state.merge(block);
        match next.g() {
            Some(92) => {
                // the position changes, no steps are emitted
            }
            Some(4) => {
                let t = block
                    .get('X')
                    .or_else(|| block.get('P').map(|ms| ms / 1000.0))
                    .unwrap_or(0.0);
                result.push(StepCommand::dwell((t / dt).ceil() as u32));
                next = state.clone();
            }
            Some(0) | Some(1) => {
                result.extend(linear_segment_steps(&state, &next, dt, layout)?);
            }
            Some(other) => {
                return Err(Error::Program(format!(
                    "G{} cannot be synthesized into steps",
                    other
                )));
            }
            None => {
                return Err(Error::Program(
                    "a block without a G word reached step synthesis".into(),
                ));
            }
        }
        state = next;
    }
    on_state(&state);
    Ok(collapse_runs(&result))
}

/// Steps for one block-to-block segment. The endpoint is always reached
/// exactly: any residual after the timed walk is chased in.
fn linear_segment_steps(
    state: &Block,
    next: &Block,
    dt: f64,
    layout: &MotorLayout,
) -> Result<Vec<StepCommand>, Error> {
    let pos_from = state.to_distance();
    let pos_to = next.to_distance();
    let l = (pos_to - pos_from).length();
    if l <= 0.0 {
        return Ok(Vec::new());
    }
    let v0 = state
        .get('F')
        .ok_or_else(|| Error::Program("segment start has no feedrate".into()))?;
    let v1 = next
        .get('F')
        .ok_or_else(|| Error::Program("segment end has no feedrate".into()))?;

    let mut fragment: Vec<StepCommand> = Vec::new();
    let direction = (pos_to - pos_from) / l;
    let final_steps;
    if v0 == v1 {
        if v1 == 0.0 {
            return Err(Error::Program(
                "the feedrate must not be 0 over a nonzero distance".into(),
            ));
        }
        let mut pos_steps = layout.to_steps(&pos_from);
        let mut i: u64 = 1;
        let mut s = v1 * dt;
        while s <= l {
            let np = pos_from + direction * s;
            let np_steps = layout.to_steps(&np);
            let mut todo = Vec::new();
            chase_steps(&mut todo, &pos_steps, &np_steps);
            append_merged(&mut fragment, &todo);
            pos_steps = np_steps;
            i += 1;
            s = v1 * (dt * i as f64);
        }
        final_steps = pos_steps;
    } else {
        let a = acceleration_between(
            &PathNode { pos: pos_from, vel: v0 },
            &PathNode { pos: pos_to, vel: v1 },
        )?;
        let mut p_steps = layout.to_steps(&pos_from);
        let mut i: u64 = 1;
        let mut t = dt;
        while v0 * t + 0.5 * a * t * t < l {
            let travelled = v0 * t + 0.5 * a * t * t;
            let pos = layout.to_steps(&(pos_from + direction * travelled));
            let mut todo = Vec::new();
            chase_steps(&mut todo, &p_steps, &pos);
            append_merged(&mut fragment, &todo);
            p_steps = pos;
            i += 1;
            t = dt * i as f64;
        }
        final_steps = p_steps;
    }

    let target = layout.to_steps(&pos_to);
    if final_steps != target {
        let mut todo = Vec::new();
        chase_steps(&mut todo, &final_steps, &target);
        append_merged(&mut fragment, &todo);
    }
    Ok(collapse_runs(&fragment))
}

/// Collects the run's waypoints, reporting state transitions on the way.
/// Dwells and origin shifts have no waypoint geometry and are rejected.
fn collect_waypoints(
    run: &[Block],
    initial_state: &Block,
    on_state: &mut dyn FnMut(&Block),
) -> Result<Vec<Waypoint>, Error> {
    let mut state = initial_state.clone();
    let mut points = vec![state.to_waypoint()];
    for block in run {
        on_state(&state);
        let next = state.merge(block);
        match next.g() {
            Some(0) | Some(1) => points.push(next.to_waypoint()),
            Some(g) => {
                return Err(Error::Program(format!(
                    "G{} has no path geometry for smoothing",
                    g
                )));
            }
            None => {
                return Err(Error::Program(
                    "a block without a G word reached step synthesis".into(),
                ));
            }
        }
        state = next;
    }
    on_state(&state);
    Ok(points)
}

/// Merges consecutive waypoints with identical coordinates, keeping the
/// later one (and with it the newer velocity). Handle construction for the
/// splines must never see a zero-length span.
fn merge_duplicate_points(points: Vec<Waypoint>) -> Vec<Waypoint> {
    let mut out: Vec<Waypoint> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if last.spatial() == p.spatial() => *last = p,
            _ => out.push(p),
        }
    }
    out
}

/// Strategy B: Bezier-spline smoothing. Runs containing G4 or G92 fall
/// back to strategy A.
pub fn spline_to_steps(
    run: &[Block],
    layout: &MotorLayout,
    dt: f64,
    initial_state: &Block,
    on_state: &mut dyn FnMut(&Block),
) -> Result<Vec<StepCommand>, Error> {
    if run.iter().any(|b| matches!(b.g(), Some(4) | Some(92))) {
        return segments_to_steps(run, layout, dt, initial_state, on_state);
    }

    let points = collect_waypoints(run, initial_state, on_state)?;
    let points = simplify_polyline(&points, (SPLINE_ARC_LENGTH * 0.5).max(0.01));
    let mut points = merge_duplicate_points(points);
    for p in &mut points {
        p.set_velocity(p.velocity().max(0.01));
    }

    let mut result: Vec<StepCommand> = Vec::new();
    let first = points[0];
    let mut pos_from_steps = layout.to_steps(&first.spatial());
    let mut overflow = false;
    spline_walk(&points, dt, SPLINE_ARC_LENGTH, &mut |position| {
        if *position != first {
            let to = layout.to_steps(&position.spatial());
            let mut todo = Vec::new();
            chase_steps(&mut todo, &pos_from_steps, &to);
            append_merged(&mut result, &todo);
            if result.len() > MAX_STREAM_COMMANDS {
                overflow = true;
            }
            pos_from_steps = to;
        }
    })?;
    if overflow {
        return Err(Error::Program(
            "spline synthesis produced an unreasonably long stream".into(),
        ));
    }
    Ok(collapse_runs(&result))
}

/// Strategy C: linear interpolation along the velocity-annotated polyline.
pub fn polyline_to_steps(
    run: &[Block],
    layout: &MotorLayout,
    dt: f64,
    initial_state: &Block,
    on_state: &mut dyn FnMut(&Block),
) -> Result<Vec<StepCommand>, Error> {
    let points = collect_waypoints(run, initial_state, on_state)?;
    let mut points = merge_duplicate_points(points);
    for p in &mut points {
        p.set_velocity(p.velocity().max(0.01));
    }

    let mut result: Vec<StepCommand> = Vec::new();
    let mut pos_from_steps = layout.to_steps(&points[0].spatial());
    let mut overflow = false;
    walk_polyline(&points, dt, 0.025, &mut |position| {
        let to = layout.to_steps(&position.spatial());
        let mut todo = Vec::new();
        chase_steps(&mut todo, &pos_from_steps, &to);
        append_merged(&mut result, &todo);
        if result.len() > MAX_STREAM_COMMANDS {
            overflow = true;
        }
        pos_from_steps = to;
    });
    if overflow {
        return Err(Error::Program(
            "polyline synthesis produced an unreasonably long stream".into(),
        ));
    }
    Ok(result)
}
