//! Spindle PWM stand-in that records commanded power.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::spindles::{normalize_power, SpindlePwm};
use crate::Error;

type PowerObserver = Box<dyn Fn(usize, f64) + Send + Sync>;

/// Validates and records power commands, optionally forwarding them to an
/// observer.
pub struct FakeSpindles {
    on_power: Option<PowerObserver>,
    last: Mutex<BTreeMap<usize, f64>>,
}

impl Default for FakeSpindles {
    fn default() -> Self {
        Self::silent()
    }
}

impl FakeSpindles {
    pub fn silent() -> Self {
        FakeSpindles {
            on_power: None,
            last: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn new(on_power: impl Fn(usize, f64) + Send + Sync + 'static) -> Self {
        FakeSpindles {
            on_power: Some(Box::new(on_power)),
            last: Mutex::new(BTreeMap::new()),
        }
    }

    /// The last power commanded for a spindle, if any.
    pub fn last_power(&self, index: usize) -> Option<f64> {
        self.last.lock().get(&index).copied()
    }
}

impl SpindlePwm for FakeSpindles {
    fn set_power(&self, index: usize, power: f64) -> Result<(), Error> {
        let power = normalize_power(power)?;
        self.last.lock().insert(index, power);
        if let Some(observer) = &self.on_power {
            observer(index, power);
        }
        Ok(())
    }
}
