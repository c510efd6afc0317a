//! Control-button contract and the debounced poller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

/// Callback invoked with the button index and the new level (true = down).
pub type ButtonCallback = Arc<dyn Fn(usize, bool) + Send + Sync>;

/// Debounced level/edge notifications for control inputs.
pub trait Buttons: Send + Sync {
    /// Installs the callback for one button, replacing the previous one.
    /// Out-of-range indices are ignored.
    fn on_key(&self, key: usize, callback: ButtonCallback);

    /// The currently installed callback for a button; a no-op handler when
    /// none was ever set. Used to stack and restore handlers.
    fn handler(&self, key: usize) -> ButtonCallback;

    /// The last observed level of every button.
    fn state(&self) -> Vec<bool>;
}

fn noop_callback() -> ButtonCallback {
    Arc::new(|_, _| {})
}

/// Something that can be asked for the momentary level of a button input.
pub trait LevelSource: Send + Sync + 'static {
    fn read(&self, key: usize) -> bool;
}

impl<F> LevelSource for F
where
    F: Fn(usize) -> bool + Send + Sync + 'static,
{
    fn read(&self, key: usize) -> bool {
        self(key)
    }
}

struct PolledShared {
    callbacks: Mutex<Vec<ButtonCallback>>,
    state: Mutex<Vec<bool>>,
    alive: AtomicBool,
}

/// Polls a [`LevelSource`] on its own thread and dispatches debounced edge
/// callbacks. After an edge fires, the button is ignored for
/// `debounce_polls` rounds.
pub struct PolledButtons {
    shared: Arc<PolledShared>,
    poller: Option<JoinHandle<()>>,
}

impl PolledButtons {
    pub fn new(
        count: usize,
        poll_interval: Duration,
        debounce_polls: u32,
        source: impl LevelSource,
    ) -> Self {
        let shared = Arc::new(PolledShared {
            callbacks: Mutex::new(vec![noop_callback(); count]),
            state: Mutex::new(vec![false; count]),
            alive: AtomicBool::new(true),
        });
        let poller_shared = shared.clone();
        let poller = thread::spawn(move || {
            let mut hold_off = vec![0u32; count];
            while poller_shared.alive.load(Ordering::Relaxed) {
                for key in 0..count {
                    if hold_off[key] > 0 {
                        hold_off[key] -= 1;
                        continue;
                    }
                    let level = source.read(key);
                    let previous = poller_shared.state.lock()[key];
                    if previous != level {
                        hold_off[key] = debounce_polls;
                        let callback = poller_shared.callbacks.lock()[key].clone();
                        callback(key, level);
                    }
                    poller_shared.state.lock()[key] = level;
                }
                thread::sleep(poll_interval);
            }
        });
        PolledButtons {
            shared,
            poller: Some(poller),
        }
    }
}

impl Buttons for PolledButtons {
    fn on_key(&self, key: usize, callback: ButtonCallback) {
        let mut callbacks = self.shared.callbacks.lock();
        if key < callbacks.len() {
            callbacks[key] = callback;
        }
    }

    fn handler(&self, key: usize) -> ButtonCallback {
        self.shared
            .callbacks
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(noop_callback)
    }

    fn state(&self) -> Vec<bool> {
        self.shared.state.lock().clone()
    }
}

impl Drop for PolledButtons {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::Relaxed);
        if let Some(handle) = self.poller.take() {
            let _ = handle.join();
        }
    }
}
