//! Path utilities: Douglas-Peucker simplification, Bezier splines and
//! velocity-paced walking along polylines.
//!
//! All functions operate on velocity-augmented [`Waypoint`]s. Geometric
//! decisions (deviation, arc length, pacing distance) use only the spatial
//! part; the velocity rides along and is interpolated where noted.

use tracing::trace;

use crate::vector::point_segment_distance;
use crate::{Error, Waypoint};

/// Hard cap on internally generated point lists; past this the input is
/// considered degenerate rather than merely long.
const MAX_GENERATED_POINTS: usize = 1024 * 1024 * 128;

/// Marks the waypoints removable by Douglas-Peucker with tolerance
/// `epsilon`. `true` means the point may be dropped; endpoints never are.
pub fn douglas_peucker_marks(epsilon: f64, path: &[Waypoint]) -> Vec<bool> {
    let mut marks = vec![false; path.len()];
    if path.len() >= 2 {
        dp_inner(epsilon, 0, path.len() - 1, path, &mut marks);
    }
    marks
}

fn dp_inner(epsilon: f64, start: usize, end: usize, path: &[Waypoint], marks: &mut Vec<bool>) {
    let mut dmax = 0.0;
    let mut index = 0;
    for i in start + 1..end {
        if !marks[i] {
            let d = point_segment_distance(
                &path[i].spatial(),
                &path[start].spatial(),
                &path[end].spatial(),
            );
            if d > dmax {
                index = i;
                dmax = d;
            }
        }
    }
    if dmax > epsilon {
        dp_inner(epsilon, start, index, path, marks);
        dp_inner(epsilon, index, end, path, marks);
    } else if start != end {
        for m in marks.iter_mut().take(end).skip(start + 1) {
            *m = true;
        }
    }
}

/// Douglas-Peucker simplification returning the surviving waypoints.
pub fn simplify_polyline(path: &[Waypoint], epsilon: f64) -> Vec<Waypoint> {
    let marks = douglas_peucker_marks(epsilon, path);
    path.iter()
        .zip(marks.iter())
        .filter(|(_, &drop)| !drop)
        .map(|(p, _)| *p)
        .collect()
}

/// Evaluates the Bezier curve through the given control points at parameter
/// `t` using De Casteljau's algorithm. All five components interpolate.
pub fn bezier(points: &[Waypoint], t: f64) -> Waypoint {
    if points.len() == 1 {
        return points[0];
    }
    let mut work = points.to_vec();
    for round in (1..work.len()).rev() {
        for i in 0..round {
            work[i] = work[i] * (1.0 - t) + work[i + 1] * t;
        }
    }
    work[0]
}

/// Builds the two extra control points around vertex `b` with neighbors
/// `a0` and `c0`, pulling the curve tangent through `b` while keeping the
/// handles within `arc_len` of the vertex.
fn control_points(a0: &Waypoint, b: &Waypoint, c0: &Waypoint, arc_len: f64) -> (Waypoint, Waypoint) {
    let ba0 = *b - *a0;
    let ba0l = ba0.length();
    let bc0 = *b - *c0;
    let bc0l = bc0.length();

    let a = *b - if ba0l != 0.0 { ba0 / ba0l } else { ba0 * 0.0 };
    let c = *b - if bc0l != 0.0 { bc0 / bc0l } else { bc0 * 0.0 };

    if b == a0 {
        let vvv = *c0 - *b;
        let vvvl = vvv.length();
        let e = if vvvl > 0.0 {
            *b + vvv * (arc_len.abs().min(bc0l.abs()) / vvvl)
        } else {
            *b
        };
        (*a0, e)
    } else if b == c0 {
        let vvv = *b - *a0;
        let vvvl = vvv.length();
        let e = if vvvl > 0.0 {
            *b + vvv * (arc_len.abs().min(ba0l.abs()) / vvvl)
        } else {
            *b
        };
        (e, *b)
    } else {
        let projv = *b - b.project_onto_line(&a, &c);
        let d = a + projv;
        let e = c + projv;
        let vvv = d - e;
        let vvvl = vvv.length();
        if vvvl == 0.0 {
            // the arms double back on each other; no usable tangent
            return (*b, *b);
        }
        (
            *b + vvv * (arc_len.abs().min(ba0l.abs()) / vvvl),
            *b - vvv * (arc_len.abs().min(bc0l.abs()) / vvvl),
        )
    }
}

/// Walks a smoothed version of `path` built from per-vertex Bezier splines,
/// emitting one point per tick of `dt` seconds, paced by the interpolated
/// velocity component.
pub fn spline_walk(
    path: &[Waypoint],
    dt: f64,
    arc_len: f64,
    on_point: &mut dyn FnMut(&Waypoint),
) -> Result<(), Error> {
    if path.is_empty() {
        return Ok(());
    }

    let mut splines: Vec<Vec<Waypoint>> = Vec::new();
    if path.len() <= 3 {
        splines.push(path.to_vec());
    } else {
        for i in 1..path.len() {
            let mut spline = Vec::with_capacity(4);
            {
                let j = i - 1;
                let mut a = path[if j > 0 { j - 1 } else { j }];
                let mut b = path[j];
                let mut c = path[if j + 1 < path.len() { j + 1 } else { j }];
                a.set_velocity(0.0);
                b.set_velocity(0.0);
                c.set_velocity(0.0);
                let (_, mut e) = control_points(&a, &b, &c, arc_len);
                e.set_velocity(path[j].velocity());
                spline.push(path[j]);
                spline.push(e);
            }
            {
                let mut a = path[i - 1];
                let mut b = path[i];
                let mut c = path[if i + 1 < path.len() { i + 1 } else { i }];
                a.set_velocity(0.0);
                b.set_velocity(0.0);
                c.set_velocity(0.0);
                let (mut d, _) = control_points(&a, &b, &c, arc_len);
                d.set_velocity(path[i].velocity());
                spline.push(d);
                spline.push(path[i]);
            }
            splines.push(spline);
        }
    }

    // Sample every spline at a parameter step proportional to its arc
    // length; the parameter carries over between splines so sampling stays
    // phase continuous.
    let mut t = 0.0;
    let mut curve: Vec<Waypoint> = Vec::new();
    for spline in &mut splines {
        spline.truncate(4);
        let mut l = 0.000001;
        for k in 1..spline.len() {
            l += (spline[k - 1] - spline[k]).length();
        }
        let dt_p = (dt / l).max(0.0001);
        while t <= 1.0 {
            curve.push(bezier(spline, t));
            if curve.len() > MAX_GENERATED_POINTS {
                return Err(Error::Program(format!(
                    "spline sampling exploded past {} points",
                    MAX_GENERATED_POINTS
                )));
            }
            t += dt_p;
        }
        t -= 1.0;
    }

    // Resample the dense curve at per-tick travel distance.
    if curve.is_empty() {
        return Ok(());
    }
    let mut curr_dist = 0.0;
    let mut pos = curve[0];
    let mut i = 0;
    while i < curve.len() {
        if curve[i].velocity() < 0.025 {
            trace!("spline velocity clamped at sample {}", i);
            curve[i].set_velocity(0.01);
        }
        let target = curve[i].velocity() * dt;
        let mut nd = curve[i] - pos;
        nd.set_velocity(0.0);
        let ndist = nd.length();
        if ndist > 0.0 && curr_dist + ndist >= target {
            let mv = (nd / ndist) * (target - curr_dist);
            pos = pos + mv;
            on_point(&pos);
            curr_dist = 0.0;
        } else {
            curr_dist += ndist;
            pos = curve[i];
            i += 1;
        }
    }
    Ok(())
}

/// Advances along the polyline at `velocity * dt` per emitted point. The
/// velocity at an emitted point is the length-weighted interpolation of the
/// two bracketing waypoints' velocities.
pub fn walk_polyline(
    path: &[Waypoint],
    dt: f64,
    min_velocity: f64,
    on_point: &mut dyn FnMut(&Waypoint),
) {
    if path.is_empty() {
        return;
    }
    let mut pos = path[0];
    let mut curr_dist = 0.0;
    let mut current_velocity = pos.velocity();
    let mut i = 0;
    while i < path.len() {
        if current_velocity < min_velocity {
            trace!("polyline velocity clamped at waypoint {}", i);
            current_velocity = min_velocity;
        }
        let target = current_velocity * dt;
        let mut nd = path[i] - pos;
        nd.set_velocity(0.0);
        let ndist = nd.length();
        if ndist > 0.0 && curr_dist + ndist >= target {
            let mv = (nd / ndist) * (target - curr_dist);
            pos = pos + mv;

            let seg_len = (path[i] - path[i - 1]).length();
            let to_prev = (pos - path[i - 1]).length();
            let to_next = (path[i] - pos).length();
            let v = if seg_len > 0.0 {
                (to_prev * path[i].velocity() + to_next * path[i - 1].velocity()) / seg_len
            } else {
                path[i].velocity()
            };
            pos.set_velocity(v);
            current_velocity = v;
            on_point(&pos);
            curr_dist = 0.0;
        } else {
            curr_dist += ndist;
            pos = path[i];
            current_velocity = pos.velocity();
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(x: f64, y: f64, v: f64) -> Waypoint {
        Waypoint([x, y, 0.0, 0.0, v])
    }

    #[test]
    fn collinear_interior_points_are_marked() {
        let path = vec![wp(0.0, 0.0, 1.0), wp(5.0, 0.0, 1.0), wp(10.0, 0.0, 1.0)];
        let marks = douglas_peucker_marks(0.1, &path);
        assert_eq!(marks, vec![false, true, false]);
    }

    #[test]
    fn deviating_point_survives() {
        let path = vec![
            wp(0.0, 0.0, 1.0),
            wp(5.0, 3.0, 1.0),
            wp(10.0, 0.0, 1.0),
        ];
        let marks = douglas_peucker_marks(0.1, &path);
        assert_eq!(marks, vec![false, false, false]);
        assert_eq!(simplify_polyline(&path, 0.1).len(), 3);
    }

    #[test]
    fn epsilon_controls_removal() {
        let path = vec![
            wp(0.0, 0.0, 1.0),
            wp(5.0, 0.05, 1.0),
            wp(10.0, 0.0, 1.0),
        ];
        assert_eq!(simplify_polyline(&path, 0.1).len(), 2);
        assert_eq!(simplify_polyline(&path, 0.01).len(), 3);
    }

    #[test]
    fn bezier_hits_its_endpoints() {
        let pts = vec![wp(0.0, 0.0, 1.0), wp(1.0, 2.0, 2.0), wp(4.0, 0.0, 3.0)];
        assert_eq!(bezier(&pts, 0.0), pts[0]);
        let end = bezier(&pts, 1.0);
        for k in 0..5 {
            assert!((end[k] - pts[2][k]).abs() < 1e-12);
        }
    }

    #[test]
    fn bezier_interpolates_velocity() {
        let pts = vec![wp(0.0, 0.0, 0.0), wp(10.0, 0.0, 10.0)];
        let mid = bezier(&pts, 0.5);
        assert!((mid.velocity() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn polyline_walk_paces_by_velocity() {
        // 10 mm at 10 mm/s with dt = 0.1 s -> roughly one point per mm
        let path = vec![wp(0.0, 0.0, 10.0), wp(10.0, 0.0, 10.0)];
        let mut points = Vec::new();
        walk_polyline(&path, 0.1, 0.025, &mut |p| points.push(*p));
        assert!(!points.is_empty());
        let mut prev = path[0];
        for p in &points {
            let d = (*p - prev).length();
            assert!(d <= 1.0 + 1e-9, "step of {} mm", d);
            prev = *p;
        }
        let last = points.last().unwrap();
        assert!((last[0] - 10.0).abs() <= 1.0 + 1e-9);
    }

    #[test]
    fn polyline_walk_interpolates_velocity_between_vertices() {
        let path = vec![wp(0.0, 0.0, 10.0), wp(10.0, 0.0, 20.0)];
        let mut velocities = Vec::new();
        walk_polyline(&path, 0.05, 0.025, &mut |p| velocities.push(p.velocity()));
        // velocity grows monotonically towards the faster endpoint
        for w in velocities.windows(2) {
            assert!(w[1] >= w[0] - 1e-9);
        }
        assert!(*velocities.last().unwrap() <= 20.0 + 1e-9);
    }

    #[test]
    fn spline_walk_visits_the_far_corner_region() {
        let path = vec![
            wp(0.0, 0.0, 5.0),
            wp(10.0, 0.0, 5.0),
            wp(10.0, 10.0, 5.0),
            wp(20.0, 10.0, 5.0),
        ];
        let mut max_x: f64 = 0.0;
        let mut count = 0;
        spline_walk(&path, 0.01, 0.5, &mut |p| {
            max_x = max_x.max(p[0]);
            count += 1;
        })
        .unwrap();
        assert!(count > 10);
        assert!(max_x > 15.0, "smoothed path should approach x = 20, got {}", max_x);
    }
}
