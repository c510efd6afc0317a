//! # Hardware Layer
//!
//! The contract between the motion stack and the machine: capability traits
//! for steppers, spindle PWM, buttons and pulse timers, simulation drivers
//! implementing them without any GPIO, and the stepping engine that turns a
//! step-command stream into precisely timed pulses.
//!
//! The engine owns the low-level stepper interface for the duration of one
//! [`stepping::StepperEngine::exec`] call; spindle PWM threads own their
//! output pins for the life of the process.

pub mod buttons;
pub mod drivers;
pub mod rt;
pub mod spindles;
pub mod stepping;
pub mod steppers;
pub mod timers;

pub use buttons::{ButtonCallback, Buttons};
pub use spindles::SpindlePwm;
pub use stepping::{BreakAction, StepperEngine, SteppingSim};
pub use steppers::Steppers;
pub use timers::PulseTimer;

use motion::Steps;

/// Errors surfaced by hardware adapters and the stepping engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// An adapter failed to perform a requested operation.
    #[error("hardware error: {0}")]
    Hardware(String),
    /// Execution was aborted from a suspension; carries the step vector
    /// achieved before stopping so callers can reconstruct position.
    #[error("stepping terminated after moving {delta_steps} steps")]
    Terminated { delta_steps: Steps },
}
