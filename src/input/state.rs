//! Shared state machinery behind every `UserInput` subclass:
//! capture/release exclusivity, the FIFO state buffer, and the
//! `(action, modifiers)`-keyed callback table. Events accumulate between
//! polls and drain on read.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::value::Values;

/// Loop rate used when a `UserInput` subclass's `updateRate` attribute has
/// never been set.
pub const DEFAULT_UPDATE_RATE: u32 = 100;

/// Floor enforced on `updateRate`; a setter asking for less is clamped.
pub const MIN_UPDATE_RATE: u32 = 10;

/// Dead-zone threshold for joystick axes: absolute values below this are
/// zeroed before being accumulated.
pub const JOYSTICK_DEAD_ZONE: f32 = 0.2;

/// One recorded input event.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub action: String,
    pub value: Values,
    pub modifiers: u32,
    pub window: String,
}

type Callback = Box<dyn Fn(&State) + Send + Sync>;

/// The capture/buffer/callback machinery common to every `UserInput`
/// subclass. Embedded by `Keyboard`, `Mouse`, `Joystick` and `DragNDrop`
/// the way `GraphObjectBase` is embedded by every `GraphObject`.
pub struct UserInputCore {
    capturer: Mutex<Option<String>>,
    buffer: Mutex<VecDeque<State>>,
    callbacks: Mutex<FxHashMap<(String, u32), Callback>>,
    update_rate: AtomicU32,
}

impl Default for UserInputCore {
    fn default() -> Self {
        Self { capturer: Mutex::new(None), buffer: Mutex::new(VecDeque::new()), callbacks: Mutex::new(FxHashMap::default()), update_rate: AtomicU32::new(DEFAULT_UPDATE_RATE) }
    }
}

impl UserInputCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn update_rate(&self) -> u32 {
        self.update_rate.load(Ordering::Relaxed)
    }

    /// Sets the loop rate, clamped to [`MIN_UPDATE_RATE`].
    pub fn set_update_rate(&self, hz: u32) {
        self.update_rate.store(hz.max(MIN_UPDATE_RATE), Ordering::Relaxed);
    }

    /// Interval a `run_loop_thread` driver should sleep between ticks.
    #[must_use]
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / u64::from(self.update_rate()))
    }

    /// Appends a freshly-observed event to the FIFO buffer.
    pub fn push(&self, state: State) {
        self.buffer.lock().push_back(state);
    }

    /// Atomically claims exclusive access for `id`. Idempotent for the
    /// current holder; fails while another id holds it.
    #[must_use]
    pub fn capture(&self, id: &str) -> bool {
        let mut capturer = self.capturer.lock();
        match capturer.as_deref() {
            None => {
                *capturer = Some(id.to_owned());
                true
            }
            Some(held) => held == id,
        }
    }

    /// Releases `id`'s exclusive hold, if it currently holds one.
    pub fn release(&self, id: &str) {
        let mut capturer = self.capturer.lock();
        if capturer.as_deref() == Some(id) {
            *capturer = None;
        }
    }

    /// Snapshots and clears the buffer for `id`. Returns an empty
    /// snapshot if another id currently holds the capture.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Vec<State> {
        let capturer = self.capturer.lock();
        if let Some(held) = capturer.as_deref() {
            if held != id {
                return Vec::new();
            }
        }
        drop(capturer);
        let mut buffer = self.buffer.lock();
        buffer.drain(..).collect()
    }

    /// Registers a callback keyed by `(action, modifiers)`, replacing any
    /// previous registration for the same key.
    pub fn set_callback(&self, action: impl Into<String>, modifiers: u32, callback: impl Fn(&State) + Send + Sync + 'static) {
        self.callbacks.lock().insert((action.into(), modifiers), Box::new(callback));
    }

    /// Removes a callback registration; a no-op if none was registered.
    pub fn reset_callback(&self, action: &str, modifiers: u32) {
        self.callbacks.lock().remove(&(action.to_owned(), modifiers));
    }

    /// Runs after each loop tick's `read_state`: any buffered state
    /// matching a registered `(action, modifiers)` key is removed and its
    /// callback invoked synchronously; everything else is left for the
    /// next `snapshot`.
    pub fn dispatch_callbacks(&self) {
        let callbacks = self.callbacks.lock();
        if callbacks.is_empty() {
            return;
        }
        let mut buffer = self.buffer.lock();
        let mut remaining = VecDeque::with_capacity(buffer.len());
        while let Some(state) = buffer.pop_front() {
            if let Some(callback) = callbacks.get(&(state.action.clone(), state.modifiers)) {
                callback(&state);
            } else {
                remaining.push_back(state);
            }
        }
        *buffer = remaining;
    }
}
