//! Motor layouts: the bidirectional map between Cartesian millimeters and
//! per-motor step counts.

use crate::{Distance, Error, Steps, AXES};

/// The mechanical arrangement of the motors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayoutKind {
    /// Each motor drives one axis directly.
    Cartesian,
    /// Two motors drive coupled belts; their sum moves X, their difference
    /// moves Y. Z and A stay direct.
    CoreXY,
}

/// Converts positions between Cartesian space and motor steps for the
/// configured layout.
///
/// `steps_per_mm` and `scale` are signed and must be nonzero on every axis;
/// negative values flip the motor direction. The forward map rounds to the
/// nearest step, so a forward-then-inverse round trip is accurate to half a
/// step per axis.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorLayout {
    kind: LayoutKind,
    steps_per_mm: [f64; AXES],
    scale: [f64; AXES],
}

impl MotorLayout {
    pub fn new(kind: LayoutKind, steps_per_mm: [f64; AXES], scale: [f64; AXES]) -> Result<Self, Error> {
        for i in 0..AXES {
            if steps_per_mm[i] == 0.0 {
                return Err(Error::Config(format!(
                    "steps_per_mm must be nonzero on every axis, axis {} is 0",
                    i
                )));
            }
            if scale[i] == 0.0 {
                return Err(Error::Config(format!(
                    "scale must be nonzero on every axis, axis {} is 0",
                    i
                )));
            }
        }
        Ok(MotorLayout {
            kind,
            steps_per_mm,
            scale,
        })
    }

    pub fn kind(&self) -> LayoutKind {
        self.kind
    }

    /// Maps a Cartesian position to motor steps.
    pub fn to_steps(&self, d: &Distance) -> Steps {
        let m = &self.steps_per_mm;
        let s = &self.scale;
        match self.kind {
            LayoutKind::Cartesian => {
                let mut out = Steps::default();
                for i in 0..AXES {
                    out[i] = (d[i] * m[i] * s[i]).round() as i32;
                }
                out
            }
            LayoutKind::CoreXY => Steps([
                ((d[0] * s[0] + d[1] * s[1]) * m[0]).round() as i32,
                ((d[0] * s[0] - d[1] * s[1]) * m[1]).round() as i32,
                (d[2] * m[2] * s[2]).round() as i32,
                (d[3] * m[3] * s[3]).round() as i32,
            ]),
        }
    }

    /// Maps motor steps back to a Cartesian position.
    pub fn to_cartesian(&self, steps: &Steps) -> Distance {
        let m = &self.steps_per_mm;
        let s = &self.scale;
        match self.kind {
            LayoutKind::Cartesian => {
                let mut out = Distance::default();
                for i in 0..AXES {
                    out[i] = steps[i] as f64 / (m[i] * s[i]);
                }
                out
            }
            LayoutKind::CoreXY => Distance([
                0.5 * (steps[0] as f64 / m[0] + steps[1] as f64 / m[1]) / s[0],
                0.5 * (steps[0] as f64 / m[0] - steps[1] as f64 / m[1]) / s[1],
                steps[2] as f64 / (m[2] * s[2]),
                steps[3] as f64 / (m[3] * s[3]),
            ]),
        }
    }
}
