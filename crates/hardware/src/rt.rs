//! Realtime scheduling for the stepping worker.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

static WARNED: AtomicBool = AtomicBool::new(false);

/// Requests round-robin realtime scheduling for the calling thread.
///
/// Correctness does not depend on this, only jitter; failure (typically a
/// missing capability) is logged once and execution continues at normal
/// priority.
#[cfg(target_os = "linux")]
pub fn set_thread_realtime() {
    let priority = unsafe { libc::sched_get_priority_max(libc::SCHED_RR) };
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) };
    if rc != 0 && !WARNED.swap(true, Ordering::Relaxed) {
        warn!(
            "failed to acquire realtime scheduling ({}); continuing at normal priority",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn set_thread_realtime() {
    if !WARNED.swap(true, Ordering::Relaxed) {
        warn!("realtime scheduling is not supported on this platform");
    }
}
