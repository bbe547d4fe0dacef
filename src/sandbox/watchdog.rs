use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// How many interpreter operations pass between wall-clock checks
const CLOCK_CHECK_INTERVAL: u64 = 1024;

/// Trips a shared flag once a wall-clock budget has elapsed
///
/// The interpreter polls the flag from its progress callback, so a runaway
/// script is stopped without signals. Dropping the watchdog disarms it.
pub(super) struct Watchdog {
    cancel: CancelHandle,
    disarmed: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

/// Cheap, cloneable view of a watchdog for progress callbacks
#[derive(Clone)]
pub(super) struct CancelHandle {
    tripped: Arc<AtomicBool>,
    deadline: Instant,
}

impl CancelHandle {
    /// Whether execution must stop; `operations` is the interpreter's op count
    pub fn is_cancelled(&self, operations: u64) -> bool {
        if self.tripped.load(Ordering::Relaxed) {
            return true;
        }
        // Fallback for when the timer thread could not be spawned
        if operations % CLOCK_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            self.tripped.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }
}

impl Watchdog {
    pub fn arm(budget: Duration) -> Self {
        let cancel = CancelHandle {
            tripped: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now() + budget,
        };
        let disarmed = Arc::new((Mutex::new(false), Condvar::new()));

        let thread = thread::Builder::new()
            .name("harness-watchdog".to_string())
            .spawn({
                let tripped = Arc::clone(&cancel.tripped);
                let disarmed = Arc::clone(&disarmed);
                move || {
                    let (lock, condvar) = &*disarmed;
                    let mut done = lock.lock();
                    let wait = condvar.wait_while_for(&mut done, |done| !*done, budget);
                    if wait.timed_out() && !*done {
                        tripped.store(true, Ordering::Relaxed);
                    }
                }
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Failed to spawn watchdog thread, polling the clock instead: {e}");
                None
            }
        };

        Self {
            cancel,
            disarmed,
            thread,
        }
    }

    pub fn handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let (lock, condvar) = &*self.disarmed;
        *lock.lock() = true;
        condvar.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trips_after_budget() {
        let watchdog = Watchdog::arm(Duration::from_millis(50));
        let handle = watchdog.handle();
        assert!(!handle.is_cancelled(1));
        thread::sleep(Duration::from_millis(150));
        assert!(handle.is_cancelled(1));
    }

    #[test]
    fn test_drop_disarms_without_waiting() {
        let start = Instant::now();
        let watchdog = Watchdog::arm(Duration::from_secs(30));
        let handle = watchdog.handle();
        drop(watchdog);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!handle.is_cancelled(1));
    }
}
