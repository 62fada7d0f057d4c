//! Cooperative cancellation: one shared flag, polled by every callback and every poll loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long shutdown waits for a thread to notice the stop flag.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Shared stop flag. Cloning shares the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks everything holding this flag to stop. Idempotent.
    pub fn stop(&self) {
        self.inner.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

/// Makes Ctrl+C set `stop` instead of killing the process, so shutdown still joins the
/// workers and saves any recording. Only one handler can be installed per process.
pub fn stop_on_interrupt(stop: StopFlag) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(interrupt_handler(stop))
}

fn interrupt_handler(stop: StopFlag) -> impl FnMut() + Send + 'static {
    move || {
        log::info!("Ctrl+C received, stopping...");
        stop.stop();
    }
}

/// Joins `handle`, giving up after `timeout`. Returns the thread's result if it finished
/// in time and did not panic. A thread that misses the deadline is left detached.
pub fn join_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!("thread '{}' did not stop within {:?}", name, timeout);
            return None;
        }
        thread::sleep(JOIN_POLL);
    }
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            log::error!("thread '{}' panicked", name);
            None
        }
    }
}
