//! Spindle PWM: the contract and the software-PWM implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::Error;

/// Sets normalized spindle power per spindle index.
pub trait SpindlePwm: Send + Sync {
    /// `power` is 0 (stopped) to 1 (full). Values in (1.0, 1.1] clamp to 1;
    /// anything else out of range is a hardware error.
    fn set_power(&self, index: usize, power: f64) -> Result<(), Error>;
}

/// Validates and clamps a requested power value.
pub(crate) fn normalize_power(power: f64) -> Result<f64, Error> {
    if power < 0.0 {
        return Err(Error::Hardware(
            "spindle power must not be negative".into(),
        ));
    }
    if power > 1.1 {
        return Err(Error::Hardware(
            "spindle power must be at most 1".into(),
        ));
    }
    Ok(power.min(1.0))
}

/// An output line driven by a PWM thread.
pub trait PwmPin: Send + Sync + 'static {
    fn set(&self, high: bool);
}

impl<F> PwmPin for F
where
    F: Fn(bool) + Send + Sync + 'static,
{
    fn set(&self, high: bool) {
        self(high)
    }
}

/// PWM timing of one spindle output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpindleSettings {
    /// Full PWM period in seconds.
    pub cycle_time_seconds: f64,
    /// On-time in seconds mapped to power 0.
    pub duty_min: f64,
    /// On-time in seconds mapped to power 1.
    pub duty_max: f64,
}

struct SpindleSlot {
    settings: SpindleSettings,
    duty: Mutex<f64>,
}

/// Software PWM: one thread per spindle cycling its pin at the configured
/// period, with the on-time interpolated between `duty_min` and `duty_max`
/// by the commanded power.
pub struct PwmSpindles {
    slots: Arc<Vec<SpindleSlot>>,
    alive: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl PwmSpindles {
    pub fn new(spindles: Vec<(SpindleSettings, Box<dyn PwmPin>)>) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let slots = Arc::new(
            spindles
                .iter()
                .map(|(settings, _)| SpindleSlot {
                    settings: *settings,
                    duty: Mutex::new(settings.duty_min),
                })
                .collect::<Vec<_>>(),
        );
        let mut workers = Vec::new();
        for (index, (settings, pin)) in spindles.into_iter().enumerate() {
            let alive = alive.clone();
            let slots = slots.clone();
            workers.push(thread::spawn(move || {
                debug!("spindle {} PWM thread running", index);
                let cycle = Duration::from_secs_f64(settings.cycle_time_seconds.max(1e-6));
                let mut prev = Instant::now();
                while alive.load(Ordering::Relaxed) {
                    let duty = *slots[index].duty.lock();
                    if duty > 0.0 {
                        pin.set(true);
                        let on_time = prev + Duration::from_secs_f64(duty.min(settings.cycle_time_seconds));
                        let now = Instant::now();
                        if on_time > now {
                            thread::sleep(on_time - now);
                        }
                    }
                    if duty < settings.cycle_time_seconds {
                        pin.set(false);
                    }
                    prev += cycle;
                    let now = Instant::now();
                    if prev > now {
                        thread::sleep(prev - now);
                    } else {
                        // fell behind a full cycle; re-anchor instead of
                        // bursting to catch up
                        prev = now;
                    }
                }
                pin.set(false);
                debug!("spindle {} PWM thread finished", index);
            }));
        }
        PwmSpindles {
            slots,
            alive,
            workers,
        }
    }

    /// Current on-time of one spindle in seconds.
    pub fn duty(&self, index: usize) -> Option<f64> {
        self.slots.get(index).map(|s| *s.duty.lock())
    }
}

impl SpindlePwm for PwmSpindles {
    fn set_power(&self, index: usize, power: f64) -> Result<(), Error> {
        let power = normalize_power(power)?;
        let slot = self
            .slots
            .get(index)
            .ok_or_else(|| Error::Hardware(format!("no spindle at index {}", index)))?;
        let duty =
            (slot.settings.duty_max - slot.settings.duty_min) * power + slot.settings.duty_min;
        *slot.duty.lock() = duty;
        debug!("spindle {} duty set to {}s", index, duty);
        Ok(())
    }
}

impl Drop for PwmSpindles {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
