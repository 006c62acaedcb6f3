//! Process-monotonic timestamps and frame timing.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Nanoseconds elapsed since the first call to any function in this module.
/// Monotonic within a process; used to order attribute last-changed
/// timestamps and stamp outgoing Link frames. Not a wall-clock timestamp —
/// never compared across processes.
#[must_use]
pub fn now_nanos() -> u64 {
    epoch().elapsed().as_nanos() as u64
}

/// Frame pacing helper, ticked once per render-thread iteration.
#[derive(Debug)]
pub struct Timer {
    start_time: Instant,
    last_update: Instant,
    /// Time since the previous tick.
    pub delta: std::time::Duration,
    /// Total elapsed time since creation.
    pub elapsed: std::time::Duration,
    /// Total number of ticks observed.
    pub frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Starts a new timer running from now.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update: now,
            delta: std::time::Duration::ZERO,
            elapsed: std::time::Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advances the timer by one frame.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.elapsed = now - self.start_time;
        self.last_update = now;
        self.frame_count += 1;
    }

    #[must_use]
    pub fn dt_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_nanos_is_monotonic() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
    }

    #[test]
    fn timer_tracks_frame_count() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count, 2);
    }
}
