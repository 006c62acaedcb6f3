//! User-input aggregator: `Keyboard`, `Mouse`, `Joystick` and `DragNDrop`
//! each run their own loop thread, coalescing window/device events into a
//! pollable, callback-dispatchable `State` FIFO.

pub mod dragndrop;
pub mod joystick;
pub mod keyboard;
pub mod mouse;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use state::UserInputCore;

/// Spawns the per-subclass loop thread: drain whatever subclass-specific
/// accumulator needs flushing (a no-op for `Keyboard`/`Mouse`/`DragNDrop`,
/// which translate events eagerly; `Joystick` flushes its axis
/// accumulator here), dispatch any matching callbacks, then sleep
/// `1e6/updateRate` microseconds.
pub fn run_loop_thread<F>(core: Arc<UserInputCore>, mut drain: F, stop: Arc<AtomicBool>) -> std::thread::JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            drain();
            core.dispatch_callbacks();
            std::thread::sleep(core.tick_interval());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn loop_thread_drains_and_dispatches_until_stopped() {
        let core = Arc::new(UserInputCore::new());
        core.set_update_rate(1_000);
        let ticks = Arc::new(Mutex::new(0u32));
        let ticks_clone = ticks.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let handle = run_loop_thread(core, move || *ticks_clone.lock().unwrap() += 1, stop.clone());
        std::thread::sleep(std::time::Duration::from_millis(20));
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap();
        assert!(*ticks.lock().unwrap() > 0);
    }
}
