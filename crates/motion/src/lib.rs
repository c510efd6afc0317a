//! # Motion Control Crate
//!
//! Deterministic motion primitives for a 4-axis CNC/plotter controller.
//!
//! Provides the building blocks the planning pipeline and the stepping
//! engine are made of:
//! - 4D distance vectors and 5D velocity-augmented waypoints
//! - Uniform-acceleration physics (position/velocity evolution, the
//!   bisection acceleration solver, transition points)
//! - Per-axis machine limits projected onto arbitrary move directions
//! - Motor layouts (Cartesian, CoreXY) mapping millimeters to motor steps
//! - The step-command model: atomic 4-axis step/dir pulses with run-length
//!   repeat counts, the chase-steps kernel and stream analysis helpers
//! - Path utilities: Douglas-Peucker simplification, Bezier splines and
//!   velocity-paced polyline walking

pub mod command;
pub mod error;
pub mod kinematics;
pub mod limits;
pub mod path;
pub mod physics;
pub mod steps;
pub mod vector;

// Re-export core types for easier access
pub use command::{StepCommand, StepDir, MAX_REPEAT};
pub use error::Error;
pub use kinematics::{LayoutKind, MotorLayout};
pub use limits::Limits;
pub use physics::PathNode;
pub use steps::Steps;
pub use vector::{Distance, Waypoint};

/// Number of controlled axes: X, Y, Z and the rotational axis A.
pub const AXES: usize = 4;
