//! Adapter assembly: puts together the stepper, spindle, button and timer
//! implementations the executive drives.

use std::sync::Arc;

use hardware::drivers::{FakeButtons, FakeSpindles, InMemSteppers};
use hardware::timers::{BusyWaitTimer, FakeTimer, SleepTimer};
use hardware::{Buttons, PulseTimer, SpindlePwm, Steppers};
use tracing::{info, warn};

use crate::config::{Config, TimerKind};

/// The four capability handles the executive works against.
pub struct Machine {
    pub steppers: Arc<dyn Steppers>,
    pub spindles: Arc<dyn SpindlePwm>,
    pub buttons: Arc<dyn Buttons>,
    pub timer: Arc<dyn PulseTimer>,
}

/// Concretely typed handles into the simulation drivers, for tests and
/// interactive triggering.
pub struct SimHandles {
    pub steppers: Arc<InMemSteppers>,
    pub spindles: Arc<FakeSpindles>,
    pub buttons: Arc<FakeButtons>,
}

/// Builds the machine from the configuration.
///
/// Only the simulation stack exists in this build; when the configuration
/// asks for real execution this logs a warning and falls back, the same way
/// a missing GPIO device would.
pub fn assemble(config: &Config) -> (Machine, SimHandles) {
    if !config.simulate_execution {
        warn!("no physical stepper driver is available; executing against in-memory drivers");
    }

    let steppers = Arc::new(InMemSteppers::new());
    steppers.set_enable_callback(|enabled| {
        info!(
            "steppers: {}",
            enabled
                .iter()
                .map(|e| if *e { '+' } else { ' ' })
                .collect::<String>()
        );
    });

    let spindles = Arc::new(FakeSpindles::new(|index, power| {
        info!("spindle {} power {}", index, power);
    }));

    // a few spare slots past the configured pins, like the physical banks
    let buttons = Arc::new(FakeButtons::new(config.buttons.len().max(10)));

    let timer: Arc<dyn PulseTimer> = match config.lowleveltimer {
        TimerKind::BusyWait => Arc::new(BusyWaitTimer),
        TimerKind::WaitFor => Arc::new(SleepTimer),
        TimerKind::Fake => Arc::new(FakeTimer::new()),
    };

    let machine = Machine {
        steppers: steppers.clone(),
        spindles: spindles.clone(),
        buttons: buttons.clone(),
        timer,
    };
    let handles = SimHandles {
        steppers,
        spindles,
        buttons,
    };
    (machine, handles)
}
