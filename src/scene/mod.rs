//! `Scene`: a per-GPU worker process.
//!
//! Wraps a [`RootObject`] behind one `Mutex` — the same lock the render
//! thread's object scan and the texture-upload thread's snapshot-and-push
//! both serialize against, which makes it double as the texture lock the
//! scheduler's camera band holds. A ghost registered here (ghost owner
//! map) is a name this Scene observes but doesn't own; `link`/`set`
//! against one are transparently forwarded to the peer Scene that does.

pub mod gpu;
pub mod objects;
pub mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::blender::{self, BlendSync, FollowOutcome};
use crate::graph_object::{Category, Ghost};
use crate::link::wire::Frame;
use crate::root_object::RootObject;
use crate::value::Value;

pub use gpu::GpuContext;
pub use gpu::RenderResources;
pub use gpu::fence::Fence;

/// Ghost-eligible type names: concrete graphics object types a Scene may
/// register a placeholder for without knowing which peer owns it yet.
pub const GHOST_ELIGIBLE_TYPES: &[&str] = &["camera", "object", "geometry", "warp", "window", "image"];

pub struct Scene {
    root: Mutex<RootObject>,
    gpu: Arc<GpuContext>,
    camera_drawn: Arc<Fence>,
    texture_uploaded: Arc<Fence>,
    paused: AtomicBool,
    started: AtomicBool,
    master: bool,
    swap_interval: i32,
    target_frame_duration: Duration,
    stop: Arc<AtomicBool>,
    ghost_owners: Mutex<FxHashMap<String, String>>,
    buffer_updated: Arc<Fence>,
    /// How many `buffer_updated` signals the upload thread has fully
    /// committed. The render thread's camera band compares this against
    /// the signal count to know whether any upload is still outstanding.
    uploads_committed: AtomicU64,
    blend_sync: BlendSync,
    /// GPU resource cache shared by the render and upload threads. Lock
    /// order: the root lock first, then this — both threads follow it.
    render_resources: Mutex<RenderResources>,
    frame_counter: AtomicU64,
}

impl Scene {
    #[must_use]
    pub fn new(name: impl Into<String>, master: bool, gpu: GpuContext) -> Self {
        let mut root = RootObject::new(name);
        objects::register_all(root.factory_mut());
        Self {
            root: Mutex::new(root),
            gpu: Arc::new(gpu),
            camera_drawn: Arc::new(Fence::new()),
            texture_uploaded: Arc::new(Fence::new()),
            paused: AtomicBool::new(false),
            started: AtomicBool::new(true),
            master,
            swap_interval: 1,
            target_frame_duration: Duration::from_secs_f64(1.0 / 60.0),
            stop: Arc::new(AtomicBool::new(false)),
            ghost_owners: Mutex::new(FxHashMap::default()),
            buffer_updated: Arc::new(Fence::new()),
            uploads_committed: AtomicU64::new(0),
            blend_sync: BlendSync::new(),
            render_resources: Mutex::new(RenderResources::new()),
            frame_counter: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn render_resources(&self) -> &Mutex<RenderResources> {
        &self.render_resources
    }

    /// Advances and returns the frame counter, used to version per-frame
    /// GPU buffer uploads.
    pub fn next_frame_index(&self) -> u64 {
        self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.master
    }

    #[must_use]
    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    #[must_use]
    pub fn camera_drawn_fence(&self) -> &Arc<Fence> {
        &self.camera_drawn
    }

    #[must_use]
    pub fn texture_uploaded_fence(&self) -> &Arc<Fence> {
        &self.texture_uploaded
    }

    #[must_use]
    pub fn buffer_updated_fence(&self) -> &Arc<Fence> {
        &self.buffer_updated
    }

    /// Marks a texture-backed object dirty — `Image::reload` and
    /// `Geometry::receive_buffer` both call this, waking the upload
    /// thread's buffer-updated wait.
    pub fn notify_buffer_updated(&self) {
        self.buffer_updated.signal();
    }

    /// Records that every buffer-updated signal up to `through` has been
    /// pushed to the GPU. Called by the upload pass just before it signals
    /// the texture-uploaded fence.
    pub fn mark_uploads_committed(&self, through: u64) {
        self.uploads_committed.store(through, Ordering::Release);
    }

    /// Blocks until every buffer update signaled so far has been committed
    /// by the upload thread, or `timeout` elapses. The camera band calls
    /// this before sampling so no camera ever reads a texture whose upload
    /// is still outstanding; on timeout the caller skips the frame.
    pub fn wait_textures_committed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let needed = self.buffer_updated.value();
            if self.uploads_committed.load(Ordering::Acquire) >= needed {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let next = self.texture_uploaded.value() + 1;
            self.texture_uploaded.wait_at_least(next, remaining);
        }
    }

    pub fn with_root<R>(&self, f: impl FnOnce(&mut RootObject) -> R) -> R {
        f(&mut self.root.lock())
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn target_frame_duration(&self) -> Duration {
        self.target_frame_duration
    }

    pub fn set_target_frame_rate(&mut self, hz: f64) {
        if hz > 0.0 {
            self.target_frame_duration = Duration::from_secs_f64(1.0 / hz);
        }
    }

    #[must_use]
    pub fn swap_interval(&self) -> i32 {
        self.swap_interval
    }

    /// Registers a placeholder for `name`, physically owned by `owner`.
    /// Only ghost-eligible graphics types get placeholders; a ghost's twin
    /// lives on exactly one worker Scene.
    pub fn observe_ghost(&self, name: &str, type_name: &'static str, category: Category, owner: &str) {
        if !GHOST_ELIGIBLE_TYPES.contains(&type_name) {
            log::warn!("scene: type {type_name} is not ghost-eligible, ignoring {name}");
            return;
        }
        self.ghost_owners.lock().insert(name.to_owned(), owner.to_owned());
        self.root.lock().add_object(Box::new(Ghost::new(name.to_owned(), type_name, category)));
    }

    /// Links `from` to `to` locally; if `from` is a ghost, also forwards
    /// the link to the peer that owns it, so it takes effect where the
    /// object actually lives.
    pub fn link(&self, from: &str, to: &str) -> bool {
        let owner = self.ghost_owners.lock().get(from).cloned();
        let local_ok = self.root.lock().link(from, to);
        if local_ok {
            if let Some(peer) = owner {
                self.root.lock().send_message(&peer, from, "__link__", vec![Value::String(to.to_owned())]);
            }
        }
        local_ok
    }

    /// Drains Link's inbox and dispatches every inbound `Message`/`Buffer`
    /// frame this scene hasn't already resolved as an answer. `__link__` is
    /// a private control message used by ghost-link forwarding;
    /// `blendingUpdated` is the Blender's wake-up broadcast (carrying no
    /// addressed object); everything else is an ordinary attribute set
    /// (replying `ok`/`false` if an answer was requested).
    pub fn dispatch_inbound(&self) {
        let unhandled = self.root.lock().poll_link();
        for item in unhandled {
            match item.frame {
                Frame::Message { id, target, name, values, wants_answer, .. } => {
                    let ok = if name == "__link__" {
                        let to = values.first().map(Value::as_string).unwrap_or_default();
                        self.root.lock().link(&target, &to)
                    } else if name == "blendingUpdated" {
                        self.blend_sync.broadcast_received();
                        true
                    } else {
                        self.root.lock().set(&target, &name, &values)
                    };
                    if wants_answer {
                        self.root.lock().reply_to(&item.from, id, vec![Value::Bool(ok)]);
                    }
                }
                Frame::Buffer { object, payload, .. } => {
                    let (accepted, is_geometry) = self
                        .root
                        .lock()
                        .with_object_mut(&object, |obj| (obj.receive_buffer(&payload), obj.base().category() == Category::Geometry))
                        .unwrap_or((false, false));
                    if accepted {
                        if is_geometry {
                            self.blend_sync.geometry_received();
                        }
                        self.notify_buffer_updated();
                    }
                }
                Frame::Answer { .. } => {}
            }
        }
    }

    /// One non-master Blender follower tick: if replicated geometry landed
    /// since the last tick, wait up to `timeout` for the master's
    /// `blendingUpdated` broadcast and then activate vertex blending on
    /// every local Object. On timeout the Scene logs and keeps rendering
    /// with the geometry it last activated rather than stalling.
    pub fn follow_blending_update(&self, timeout: Duration) -> bool {
        match self.blend_sync.wait_updated(timeout) {
            FollowOutcome::Idle => true,
            FollowOutcome::Updated => {
                blender::activate_received_blending(&self.root.lock());
                true
            }
            FollowOutcome::TimedOut => {
                let name = self.root.lock().name().to_owned();
                log::warn!("{name}: no blendingUpdated broadcast within {timeout:?}, continuing with stale geometry");
                false
            }
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }
}

// `Scene::new` requires a live wgpu adapter, so its ghost/link/pause
// bookkeeping is exercised through `RootObject`'s own test suite
// (`root_object.rs`) and `Ghost` (`graph_object.rs`) instead, which run
// headless.
