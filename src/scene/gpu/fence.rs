//! `Fence`: a synchronization primitive observed by one thread and signaled
//! by another — the "camera-drawn" and "texture-uploaded" ordering points
//! between the render and upload threads. Built on `parking_lot`'s
//! `Mutex`+`Condvar` rather than a raw `wgpu` sync object — a submitted
//! queue's completion still has to hand off to *some* thread-visible state,
//! and a monotonically increasing counter plus a condition variable is the
//! simplest correct way to do that across the render/upload thread split.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A monotonically increasing counter, signaled by `signal()` and observed
/// by `wait_at_least()`.
pub struct Fence {
    count: Mutex<u64>,
    condvar: Condvar,
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

impl Fence {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Advances the fence and wakes every waiter.
    pub fn signal(&self) -> u64 {
        let mut count = self.count.lock();
        *count += 1;
        let value = *count;
        self.condvar.notify_all();
        value
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        *self.count.lock()
    }

    /// Blocks until the fence reaches at least `target` or `timeout`
    /// elapses. Returns whether the target was reached.
    pub fn wait_at_least(&self, target: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count < target {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return *count >= target;
            }
            let timed_out = self.condvar.wait_for(&mut count, remaining).timed_out();
            if timed_out && *count < target {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn signal_wakes_a_waiting_thread() {
        let fence = Arc::new(Fence::new());
        let waiter = Arc::clone(&fence);
        let handle = std::thread::spawn(move || waiter.wait_at_least(1, Duration::from_secs(2)));
        std::thread::sleep(Duration::from_millis(20));
        fence.signal();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_times_out_if_never_signaled() {
        let fence = Fence::new();
        assert!(!fence.wait_at_least(1, Duration::from_millis(20)));
    }
}
