//! The low-level stepper contract.

use motion::{StepDir, Steps, AXES};

use crate::Error;

/// Abstract sink for atomic 4-axis step/dir pulses.
///
/// Implementations must pulse all commanded step lines high and back low
/// within one tick, with the direction lines settled before the step edge.
/// The step counters are maintained by the adapter itself so that position
/// survives an interrupted execution and can be read from other threads.
pub trait Steppers: Send + Sync {
    /// Executes a single step command: the most basic step/dir action,
    /// applied to every motor at once.
    fn do_step(&self, pulse: &[StepDir; AXES]) -> Result<(), Error>;

    /// Turns motor power stages on or off, one flag per motor.
    fn enable(&self, enabled: &[bool]) -> Result<(), Error>;

    /// Current step counters, one per motor. Safe to call concurrently with
    /// `do_step`.
    fn steps(&self) -> Steps;

    /// Overwrites the step counters, e.g. after re-homing.
    fn set_steps(&self, steps: &Steps);
}
