//! Manually triggered buttons for tests and simulation.

use parking_lot::Mutex;

use crate::buttons::{ButtonCallback, Buttons};

/// A button bank whose levels are set programmatically.
pub struct FakeButtons {
    callbacks: Mutex<Vec<ButtonCallback>>,
    state: Mutex<Vec<bool>>,
}

impl FakeButtons {
    pub fn new(count: usize) -> Self {
        FakeButtons {
            callbacks: Mutex::new(vec![std::sync::Arc::new(|_, _| {}); count]),
            state: Mutex::new(vec![false; count]),
        }
    }

    /// Sets a button level and fires its callback.
    pub fn trigger(&self, key: usize, down: bool) {
        self.state.lock()[key] = down;
        let callback = self.callbacks.lock()[key].clone();
        callback(key, down);
    }

    pub fn press(&self, key: usize) {
        self.trigger(key, true);
    }

    pub fn release(&self, key: usize) {
        self.trigger(key, false);
    }
}

impl Buttons for FakeButtons {
    fn on_key(&self, key: usize, callback: ButtonCallback) {
        let mut callbacks = self.callbacks.lock();
        if key < callbacks.len() {
            callbacks[key] = callback;
        }
    }

    fn handler(&self, key: usize) -> ButtonCallback {
        self.callbacks
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_else(|| std::sync::Arc::new(|_, _| {}))
    }

    fn state(&self) -> Vec<bool> {
        self.state.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn trigger_fires_the_installed_callback() {
        let buttons = FakeButtons::new(3);
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = hits.clone();
        buttons.on_key(
            1,
            Arc::new(move |key, down| {
                assert_eq!(key, 1);
                assert!(down);
                sink.fetch_add(1, Ordering::Relaxed);
            }),
        );
        buttons.press(1);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(buttons.state(), vec![false, true, false]);
    }

    #[test]
    fn handlers_can_be_stacked_and_restored() {
        let buttons = FakeButtons::new(1);
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = hits.clone();
        buttons.on_key(0, Arc::new(move |_, _| {
            sink.fetch_add(1, Ordering::Relaxed);
        }));
        let saved = buttons.handler(0);
        buttons.on_key(0, Arc::new(|_, _| {}));
        buttons.press(0);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        buttons.on_key(0, saved);
        buttons.press(0);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
