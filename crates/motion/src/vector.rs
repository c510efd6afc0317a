//! Fixed-size vectors used throughout the planning pipeline.
//!
//! [`Distance`] is a plain 4D vector of millimeters (X, Y, Z, A).
//! [`Waypoint`] augments it with a trailing velocity component; the velocity
//! takes part in componentwise arithmetic (splines interpolate it like any
//! other coordinate) but never contributes to geometric length.

use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Div, Index, IndexMut, Mul, Sub};

use crate::AXES;

/// A 4-dimensional distance vector in millimeters.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Distance(pub [f64; AXES]);

/// A 4D position with a trailing velocity component (mm, mm, mm, mm, mm/s).
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Waypoint(pub [f64; AXES + 1]);

macro_rules! impl_vector_ops {
    ($name:ident, $n:expr) => {
        impl $name {
            /// Creates a vector with every component set to `v`.
            pub fn splat(v: f64) -> Self {
                Self([v; $n])
            }

            pub fn dot(&self, other: &Self) -> f64 {
                let mut acc = 0.0;
                for i in 0..$n {
                    acc += self.0[i] * other.0[i];
                }
                acc
            }

            pub fn iter(&self) -> impl Iterator<Item = &f64> {
                self.0.iter()
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, rhs: Self) -> Self {
                let mut out = self;
                for i in 0..$n {
                    out.0[i] += rhs.0[i];
                }
                out
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self {
                let mut out = self;
                for i in 0..$n {
                    out.0[i] -= rhs.0[i];
                }
                out
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self {
                let mut out = self;
                for i in 0..$n {
                    out.0[i] *= rhs;
                }
                out
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, rhs: f64) -> Self {
                let mut out = self;
                for i in 0..$n {
                    out.0[i] /= rhs;
                }
                out
            }
        }

        impl Index<usize> for $name {
            type Output = f64;
            fn index(&self, i: usize) -> &f64 {
                &self.0[i]
            }
        }

        impl IndexMut<usize> for $name {
            fn index_mut(&mut self, i: usize) -> &mut f64 {
                &mut self.0[i]
            }
        }

        impl From<[f64; $n]> for $name {
            fn from(v: [f64; $n]) -> Self {
                Self(v)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "[")?;
                for (i, e) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
        }
    };
}

impl_vector_ops!(Distance, AXES);
impl_vector_ops!(Waypoint, AXES + 1);

impl Distance {
    pub fn length2(&self) -> f64 {
        self.dot(self)
    }

    pub fn length(&self) -> f64 {
        self.length2().sqrt()
    }

    /// Angle at this vertex, formed by the segments towards `a` and `b`.
    ///
    /// Degenerate configurations (either arm has zero length, or the arms are
    /// orthogonal) report a right angle.
    pub fn angle_at(&self, a: &Distance, b: &Distance) -> f64 {
        let u = *a - *self;
        let v = *b - *self;
        let dotprod = u.dot(&v);
        if dotprod == 0.0 {
            return PI / 2.0;
        }
        (dotprod / (u.length2().sqrt() * v.length2().sqrt())).acos()
    }

    /// Projects this point onto the line through `a` and `b`.
    pub fn project_onto_line(&self, a: &Distance, b: &Distance) -> Distance {
        let ap = *self - *a;
        let ab = *b - *a;
        *a + ab * (ap.dot(&ab) / ab.dot(&ab))
    }
}

impl Waypoint {
    /// The spatial part of the waypoint, with the velocity dropped.
    pub fn spatial(&self) -> Distance {
        Distance([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn velocity(&self) -> f64 {
        self.0[AXES]
    }

    pub fn set_velocity(&mut self, v: f64) {
        self.0[AXES] = v;
    }

    /// Geometric length of the spatial part; the velocity never counts.
    pub fn length(&self) -> f64 {
        self.spatial().length()
    }

    pub fn from_parts(position: Distance, velocity: f64) -> Self {
        Waypoint([
            position.0[0],
            position.0[1],
            position.0[2],
            position.0[3],
            velocity,
        ])
    }

    /// Projects the spatial part onto the line through `a` and `b`, keeping
    /// this waypoint's velocity.
    pub fn project_onto_line(&self, a: &Waypoint, b: &Waypoint) -> Waypoint {
        let p = self
            .spatial()
            .project_onto_line(&a.spatial(), &b.spatial());
        Waypoint::from_parts(p, self.velocity())
    }
}

impl From<Waypoint> for Distance {
    fn from(w: Waypoint) -> Self {
        w.spatial()
    }
}

impl From<Distance> for Waypoint {
    fn from(d: Distance) -> Self {
        Waypoint::from_parts(d, 0.0)
    }
}

/// Distance from point `p` to the segment's carrier line through `b` and `c`.
///
/// When the segment is degenerate this falls back to the distance to `b`.
pub fn point_segment_distance(p: &Distance, b: &Distance, c: &Distance) -> f64 {
    let l = (*c - *b).length();
    if l <= 0.0 {
        return (*p - *b).length();
    }
    let d = (*c - *b) / l;
    let v = *p - *b;
    let t = v.dot(&d);
    let on_line = *b + d * t;
    (on_line - *p).length()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn componentwise_arithmetic() {
        let a = Distance([1.0, 2.0, 3.0, 4.0]);
        let b = Distance([0.5, 0.5, 0.5, 0.5]);
        assert_eq!(a + b, Distance([1.5, 2.5, 3.5, 4.5]));
        assert_eq!(a - b, Distance([0.5, 1.5, 2.5, 3.5]));
        assert_eq!(a * 2.0, Distance([2.0, 4.0, 6.0, 8.0]));
        assert_eq!(a / 2.0, Distance([0.5, 1.0, 1.5, 2.0]));
    }

    #[test]
    fn length_of_unit_axes() {
        assert_eq!(Distance([3.0, 4.0, 0.0, 0.0]).length(), 5.0);
        assert_eq!(Distance::default().length(), 0.0);
    }

    #[test]
    fn right_angle_between_orthogonal_arms() {
        let vertex = Distance([10.0, 0.0, 0.0, 0.0]);
        let a = Distance([0.0, 0.0, 0.0, 0.0]);
        let b = Distance([10.0, 10.0, 0.0, 0.0]);
        let angle = vertex.angle_at(&a, &b);
        assert!((angle - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn straight_line_is_a_flat_angle() {
        let vertex = Distance([5.0, 0.0, 0.0, 0.0]);
        let a = Distance([0.0, 0.0, 0.0, 0.0]);
        let b = Distance([10.0, 0.0, 0.0, 0.0]);
        assert!((vertex.angle_at(&a, &b) - PI).abs() < 1e-9);
    }

    #[test]
    fn projection_lands_on_the_line() {
        let p = Distance([5.0, 5.0, 0.0, 0.0]);
        let a = Distance([0.0, 0.0, 0.0, 0.0]);
        let b = Distance([10.0, 0.0, 0.0, 0.0]);
        assert_eq!(p.project_onto_line(&a, &b), Distance([5.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn waypoint_length_ignores_velocity() {
        let w = Waypoint([3.0, 4.0, 0.0, 0.0, 99.0]);
        assert_eq!(w.length(), 5.0);
    }

    #[test]
    fn point_segment_distance_perpendicular() {
        let b = Distance([0.0, 0.0, 0.0, 0.0]);
        let c = Distance([10.0, 0.0, 0.0, 0.0]);
        let p = Distance([5.0, 2.0, 0.0, 0.0]);
        assert!((point_segment_distance(&p, &b, &c) - 2.0).abs() < 1e-12);
        // degenerate segment falls back to point distance
        assert!((point_segment_distance(&p, &b, &b) - p.length()).abs() < 1e-12);
    }
}
