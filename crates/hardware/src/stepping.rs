//! The stepping engine: executes step-command streams with precise timing
//! and deterministic pause/resume/abort semantics.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use motion::command::{position_after, stream_positions};
use motion::{StepCommand, Steps};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::rt::set_thread_realtime;
use crate::steppers::Steppers;
use crate::timers::PulseTimer;
use crate::Error;

/// What the break callback decided while execution was suspended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BreakAction {
    /// Ramp back up and continue at the paused tick.
    Resume,
    /// Abandon the stream; `exec` returns [`Error::Terminated`].
    Abort,
}

/// Nominal per-mille pacing factor; 1000 means ticks run at the configured
/// duration.
const NOMINAL_PACE: i64 = 1000;

/// Executes step commands against a stepper driver, one pulse per tick.
///
/// `terminate(n)` requests a deceleration: from the next tick the effective
/// tick duration grows by 1/1000 of the base duration per tick, for `n`
/// ticks, after which the engine suspends and asks the break callback what
/// to do. Resuming ramps back down symmetrically and continues at the
/// paused tick index, so step positions are continuous across the pause.
///
/// Tick and step counters are plain atomics and may be read from any
/// thread while `exec` runs.
pub struct StepperEngine {
    steppers: Arc<dyn Steppers>,
    timer: Arc<dyn PulseTimer>,
    delay_us: i64,
    tick_index: AtomicI64,
    steps_counter: AtomicI64,
    terminate: AtomicI64,
}

impl StepperEngine {
    pub fn new(delay_us: i64, steppers: Arc<dyn Steppers>, timer: Arc<dyn PulseTimer>) -> Self {
        StepperEngine {
            steppers,
            timer,
            delay_us,
            tick_index: AtomicI64::new(0),
            steps_counter: AtomicI64::new(0),
            terminate: AtomicI64::new(0),
        }
    }

    /// Number of ticks emitted by the current/last `exec`.
    pub fn tick_index(&self) -> i64 {
        self.tick_index.load(Ordering::SeqCst)
    }

    /// Total step bits emitted across all motors.
    pub fn steps_counter(&self) -> i64 {
        self.steps_counter.load(Ordering::SeqCst)
    }

    /// Requests a stop after a deceleration ramp of `n` ticks. Safe to call
    /// from any thread; takes effect no later than the next tick. Repeated
    /// calls while a termination is pending are ignored.
    pub fn terminate(&self, n: i64) {
        let _ = self
            .terminate
            .compare_exchange(0, 1 + n, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Clears a pending termination. Required before the next `exec` after
    /// an aborted run.
    pub fn reset_after_terminate(&self) {
        self.terminate.store(0, Ordering::SeqCst);
    }

    /// Walks the stream, emitting one hardware pulse per tick.
    ///
    /// `on_break` runs on the engine thread while execution is suspended;
    /// it receives the step vector achieved since the start of this call
    /// and the tick index.
    pub fn exec(
        &self,
        commands: &[StepCommand],
        on_break: &mut dyn FnMut(Steps, i64) -> BreakAction,
    ) -> Result<(), Error> {
        set_thread_realtime();
        self.tick_index.store(0, Ordering::SeqCst);
        self.terminate.store(0, Ordering::SeqCst);
        let mut prev = self.timer.start();
        let mut counter_delay: i64 = NOMINAL_PACE;
        let mut ramp: i64 = 0;
        let mut ramp_origin: i64 = 0;

        for command in commands {
            for _ in 0..command.count {
                if self.terminate.load(Ordering::SeqCst) > 0 {
                    if ramp == 0 {
                        // termination just requested: start slowing down
                        ramp_origin = self.terminate.load(Ordering::SeqCst);
                        ramp = -1;
                    } else if ramp > 0 && counter_delay == NOMINAL_PACE {
                        // the ramp back up is complete
                        self.terminate.store(0, Ordering::SeqCst);
                        ramp_origin = 0;
                        ramp = 0;
                    }
                    if self.terminate.load(Ordering::SeqCst) == 1 && ramp < 0 {
                        let tick = self.tick_index.load(Ordering::SeqCst);
                        let achieved = position_after(commands, tick);
                        debug!("suspended at tick {} ({})", tick, achieved);
                        match on_break(achieved, tick) {
                            BreakAction::Resume => {
                                info!("resuming at tick {}", tick);
                                ramp = 1;
                                self.terminate.store(1, Ordering::SeqCst);
                                prev = self.timer.start();
                            }
                            BreakAction::Abort => {
                                return Err(Error::Terminated {
                                    delta_steps: achieved,
                                });
                            }
                        }
                    } else {
                        self.terminate.fetch_add(ramp, Ordering::SeqCst);
                        let pending = self.terminate.load(Ordering::SeqCst);
                        counter_delay = NOMINAL_PACE + (ramp_origin - pending);
                    }
                }
                self.steppers.do_step(&command.axes)?;
                let step_bits = command.axes.iter().filter(|a| a.step).count() as i64;
                self.steps_counter.fetch_add(step_bits, Ordering::SeqCst);
                self.tick_index.fetch_add(1, Ordering::SeqCst);
                prev = self
                    .timer
                    .wait_until(prev, self.delay_us * counter_delay / NOMINAL_PACE);
            }
        }
        Ok(())
    }
}

/// A stepping executor without a timer or driver: applies the stream to an
/// in-memory position and invokes a step callback, for tests and dry runs.
///
/// Termination is immediate here (no deceleration ramp): `terminate(n)`
/// suspends after `n` further ticks.
pub struct SteppingSim {
    current_steps: Mutex<Steps>,
    on_step: Mutex<Box<dyn FnMut(&Steps) + Send>>,
    terminate: AtomicI64,
    tick_index: AtomicI64,
}

impl SteppingSim {
    pub fn new(start_steps: Steps) -> Self {
        SteppingSim {
            current_steps: Mutex::new(start_steps),
            on_step: Mutex::new(Box::new(|_| {})),
            terminate: AtomicI64::new(0),
            tick_index: AtomicI64::new(0),
        }
    }

    pub fn set_callback(&self, on_step: impl FnMut(&Steps) + Send + 'static) {
        *self.on_step.lock() = Box::new(on_step);
    }

    pub fn current_steps(&self) -> Steps {
        *self.current_steps.lock()
    }

    pub fn tick_index(&self) -> i64 {
        self.tick_index.load(Ordering::SeqCst)
    }

    pub fn terminate(&self, n: i64) {
        self.terminate.store(1 + n, Ordering::SeqCst);
    }

    pub fn reset_after_terminate(&self) {
        self.terminate.store(0, Ordering::SeqCst);
    }

    pub fn exec(
        &self,
        commands: &[StepCommand],
        on_break: &mut dyn FnMut(Steps, i64) -> BreakAction,
    ) -> Result<(), Error> {
        self.terminate.store(0, Ordering::SeqCst);
        self.tick_index.store(0, Ordering::SeqCst);
        let start = *self.current_steps.lock();
        for steps in stream_positions(commands) {
            let pending = self.terminate.load(Ordering::SeqCst);
            if pending > 0 {
                if pending == 1 {
                    match on_break(Steps::default(), self.tick_index.load(Ordering::SeqCst)) {
                        BreakAction::Resume => self.terminate.store(0, Ordering::SeqCst),
                        BreakAction::Abort => {
                            return Err(Error::Terminated {
                                delta_steps: Steps::default(),
                            })
                        }
                    }
                } else {
                    self.terminate.fetch_sub(1, Ordering::SeqCst);
                }
            }
            *self.current_steps.lock() = start + steps;
            (self.on_step.lock())(&steps);
            self.tick_index.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
