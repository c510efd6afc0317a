//! In-memory stepper driver.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use motion::{StepDir, Steps, AXES};
use parking_lot::Mutex;

use crate::steppers::Steppers;
use crate::Error;

type StepObserver = Box<dyn Fn(&Steps) + Send + Sync>;
type EnableObserver = Box<dyn Fn(&[bool]) + Send + Sync>;

/// Counts steps instead of toggling pins. Used when no hardware is
/// available and as the reference implementation of the counter contract.
///
/// The counters are kept in five slots: one per motor plus their sum as a
/// checksum. A reader retries its snapshot until the checksum matches, so
/// concurrent reads during stepping never observe a torn position.
pub struct InMemSteppers {
    counters: [AtomicI64; AXES + 1],
    enabled: Mutex<Vec<bool>>,
    on_step: Mutex<Option<StepObserver>>,
    on_enable: Mutex<Option<EnableObserver>>,
    fail_next_step: AtomicBool,
}

impl Default for InMemSteppers {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemSteppers {
    pub fn new() -> Self {
        InMemSteppers {
            counters: Default::default(),
            enabled: Mutex::new(vec![false; AXES]),
            on_step: Mutex::new(None),
            on_enable: Mutex::new(None),
            fail_next_step: AtomicBool::new(false),
        }
    }

    /// Installs an observer invoked with the position after every step.
    pub fn set_step_callback(&self, on_step: impl Fn(&Steps) + Send + Sync + 'static) {
        *self.on_step.lock() = Some(Box::new(on_step));
    }

    /// Installs an observer for enable/disable transitions.
    pub fn set_enable_callback(&self, on_enable: impl Fn(&[bool]) + Send + Sync + 'static) {
        *self.on_enable.lock() = Some(Box::new(on_enable));
    }

    /// Current enable flags.
    pub fn enabled(&self) -> Vec<bool> {
        self.enabled.lock().clone()
    }

    /// Makes the next `do_step` fail, to exercise error propagation.
    pub fn fail_next_step(&self) {
        self.fail_next_step.store(true, Ordering::SeqCst);
    }
}

impl Steppers for InMemSteppers {
    fn do_step(&self, pulse: &[StepDir; AXES]) -> Result<(), Error> {
        if self.fail_next_step.swap(false, Ordering::SeqCst) {
            return Err(Error::Hardware("injected step failure".into()));
        }
        let mut snapshot = [0i64; AXES + 1];
        for i in 0..AXES {
            snapshot[i] = self.counters[i].load(Ordering::SeqCst) + pulse[i].delta() as i64;
            snapshot[AXES] += snapshot[i];
        }
        for i in 0..=AXES {
            self.counters[i].store(snapshot[i], Ordering::SeqCst);
        }
        if let Some(observer) = self.on_step.lock().as_ref() {
            observer(&self.steps());
        }
        Ok(())
    }

    fn enable(&self, enabled: &[bool]) -> Result<(), Error> {
        *self.enabled.lock() = enabled.to_vec();
        if let Some(observer) = self.on_enable.lock().as_ref() {
            observer(enabled);
        }
        Ok(())
    }

    fn steps(&self) -> Steps {
        loop {
            let mut snapshot = [0i64; AXES + 1];
            for i in 0..=AXES {
                snapshot[i] = self.counters[i].load(Ordering::SeqCst);
            }
            let checksum: i64 = snapshot[..AXES].iter().sum();
            if checksum == snapshot[AXES] {
                return Steps([
                    snapshot[0] as i32,
                    snapshot[1] as i32,
                    snapshot[2] as i32,
                    snapshot[3] as i32,
                ]);
            }
            std::thread::yield_now();
        }
    }

    fn set_steps(&self, steps: &Steps) {
        let mut checksum = 0i64;
        for i in 0..AXES {
            self.counters[i].store(steps[i] as i64, Ordering::SeqCst);
            checksum += steps[i] as i64;
        }
        self.counters[AXES].store(checksum, Ordering::SeqCst);
    }
}
