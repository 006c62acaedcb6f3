//! The Blender: a controller attached to the master Scene that computes
//! per-vertex visibility and blending weights across all Cameras, then
//! replicates the tessellated geometry to every other Scene.
//!
//! The batched traversal gathers Cameras and their linked Objects, runs
//! each pass in registration order, and writes the accumulated weights
//! back. The GPU feedback-shader tessellation pass itself is outside this
//! crate's testable surface (see `scene::objects::camera`); this controller
//! carries geometry through unchanged rather than subdividing it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::graph_object::{Category, GraphObject};
use crate::root_object::RootObject;
use crate::scene::gpu::fence::Fence;
use crate::value::Values;

/// How long a non-master Scene waits for the master's `blendingUpdated`
/// broadcast before proceeding with whatever geometry it last received.
pub const BLENDING_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlenderMode {
    #[default]
    None,
    Once,
    Continuous,
}

impl BlenderMode {
    /// Parses the `mode` attribute's string form.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "once" => Some(Self::Once),
            "continuous" => Some(Self::Continuous),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Once => "once",
            Self::Continuous => "continuous",
        }
    }
}

/// Per-Scene Blender state. `World` owns one per master Scene and calls
/// `update` on whatever cadence the Scene's scheduler ticks at.
#[derive(Default)]
pub struct Blender {
    mode: BlenderMode,
    computed: bool,
}

impl Blender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> BlenderMode {
        self.mode
    }

    /// Changes mode. Switching to `None` after a previous computation
    /// triggers deactivation on the next `update`.
    pub fn set_mode(&mut self, mode: BlenderMode) {
        self.mode = mode;
    }

    /// Runs one tick. `root` must be the master Scene's `RootObject`;
    /// `peers` lists every non-master Scene name to replicate geometry to.
    /// Returns whether a (re)compute or deactivation ran.
    pub fn update(&mut self, root: &mut RootObject, peers: &[String]) -> bool {
        if self.mode == BlenderMode::None {
            if self.computed {
                Self::deactivate(root, peers);
                self.computed = false;
                return true;
            }
            return false;
        }

        let should_run = self.mode == BlenderMode::Continuous || !self.computed;
        if !should_run {
            return false;
        }

        if !Self::recompute(root, peers) {
            return false;
        }
        self.computed = true;
        true
    }

    fn cameras_in_order(root: &RootObject) -> Vec<String> {
        let mut entries: Vec<(u64, String)> = root
            .object_names()
            .into_iter()
            .filter_map(|name| root.with_object(&name, |obj| (obj.base().category() == Category::Camera).then(|| obj.id())).flatten().map(|id| (id, name)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// Objects linked (one hop) from any Camera, deduplicated, in
    /// registration order.
    fn linked_objects(root: &RootObject, cameras: &[String]) -> Vec<String> {
        let mut seen = FxHashMap::default();
        for camera in cameras {
            let targets = root.with_object(camera, |obj| obj.base().links_out().to_vec()).unwrap_or_default();
            for target in targets {
                if root.with_object(&target, |obj| obj.base().category() == Category::Object).unwrap_or(false) {
                    let id = root.with_object(&target, |obj| obj.id()).unwrap_or(0);
                    seen.entry(target).or_insert(id);
                }
            }
        }
        let mut entries: Vec<(u64, String)> = seen.into_iter().map(|(name, id)| (id, name)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// The full recompute: reset tessellation, per-camera visibility and
    /// tessellation passes, blending-weight accumulation, activation, and
    /// replication to the other Scenes. Returns `false` (a no-op) if there
    /// are no cameras at all.
    fn recompute(root: &mut RootObject, peers: &[String]) -> bool {
        let cameras = Self::cameras_in_order(root);
        if cameras.is_empty() {
            return false;
        }
        let objects = Self::linked_objects(root, &cameras);
        let geometries: Vec<(String, String)> = objects.iter().filter_map(|object| root.with_object(object, |o| o.linked_geometry()).flatten().map(|geometry| (object.clone(), geometry))).collect();

        // resetTessellation on every Object (clears the dirty bit and,
        // transitively, its Geometry's alternative buffer).
        for object in &objects {
            root.with_object_mut(object, |obj| attribute_reset(obj, "resetTessellation"));
        }
        for (_, geometry) in &geometries {
            root.with_object_mut(geometry, |g| g.reset_geometry_tessellation());
        }

        // Tessellation pass, one camera at a time, then clear the blending
        // accumulator. Tessellation is a content-preserving copy into the
        // alternative buffer (see module doc).
        for camera in &cameras {
            for (_, geometry) in &geometries {
                let Some(positions) = root.with_object(geometry, |g| g.mesh_positions()).flatten() else { continue };
                let _ = root.with_object(camera, |cam| cam.compute_camera_visibility(&positions));
                root.with_object_mut(geometry, |g| g.apply_tessellated_positions(positions));
            }
        }
        for object in &objects {
            root.with_object_mut(object, |obj| attribute_reset(obj, "resetBlendingAttribute"));
        }

        // Re-run visibility on the tessellated mesh, accumulate each
        // camera's blending contribution.
        let mut weights: FxHashMap<String, Vec<f32>> = FxHashMap::default();
        for camera in &cameras {
            for (_, geometry) in &geometries {
                let Some(positions) = root.with_object(geometry, |g| g.mesh_positions()).flatten() else { continue };
                let Some((visible, weight)) = root.with_object(camera, |cam| cam.compute_camera_visibility(&positions)).flatten() else { continue };
                let accumulator = weights.entry(geometry.clone()).or_insert_with(|| weight.clone());
                root.with_object(camera, |cam| cam.accumulate_camera_blending(&visible, accumulator));
            }
        }
        for (geometry, weight) in &weights {
            root.with_object_mut(geometry, |g| g.set_blend_weights(weight.clone()));
        }

        // Activate vertex blending on every Object.
        for object in &objects {
            root.with_object_mut(object, |obj| attribute_reset(obj, "activateVertexBlending"));
        }

        // Serialize and push to every non-master Scene, then wake them so
        // their follower tick can activate what just arrived.
        for (_, geometry) in &geometries {
            let Some(payload) = root.with_object(geometry, |g| g.serialize_active_mesh()).flatten() else { continue };
            for peer in peers {
                if let Err(err) = root.link_transport().send_buffer(peer, crate::link::wire::Frame::Buffer { object: geometry.clone(), timestamp: crate::util::time::now_nanos(), payload: payload.clone() }) {
                    log::warn!("blender: failed to replicate {geometry} to {peer}: {err}");
                }
            }
        }
        for peer in peers {
            root.send_message(peer, "", "blendingUpdated", Values::new());
        }

        true
    }

    /// Deactivation: reset tessellation/visibility on every Object, then
    /// broadcast the all-off signal.
    fn deactivate(root: &mut RootObject, peers: &[String]) {
        let cameras = Self::cameras_in_order(root);
        let objects = Self::linked_objects(root, &cameras);
        for object in &objects {
            root.with_object_mut(object, |obj| {
                attribute_reset(obj, "resetTessellation");
                attribute_reset(obj, "resetVisibility");
            });
        }
        for peer in peers {
            root.send_message(peer, "", "blendingUpdated", Values::new());
        }
    }
}

fn attribute_reset(obj: &mut (dyn GraphObject + Send), name: &str) {
    crate::attribute::apply_set(obj, name, &Values::new());
}

/// Applies `activateVertexBlending` to every Object in the registry — the
/// non-master side of geometry replication, run once the master's
/// `blendingUpdated` broadcast arrives (the replicated `Geometry` buffers
/// already activated their alternative buffer slots on receipt).
pub fn activate_received_blending(root: &RootObject) {
    for name in root.object_names() {
        let is_object = root.with_object(&name, |obj| obj.base().category() == Category::Object).unwrap_or(false);
        if is_object {
            root.with_object_mut(&name, |obj| attribute_reset(obj, "activateVertexBlending"));
        }
    }
}

/// The registry-visible face of the Blender: a `GraphObject` the Factory
/// builds under the `blender` type string, carrying the `mode` attribute a
/// configuration (or a GUI) sets. The Scene's blender tick reads the mode
/// back through [`configured_mode`] each pass.
pub struct BlenderObject {
    base: crate::graph_object::GraphObjectBase,
    mode: BlenderMode,
}

fn blender_descriptors() -> &'static [crate::attribute::AttributeDescriptor] {
    use crate::attribute::{ArgKind, AttributeDescriptor, SyncPolicy, descriptor};
    static TABLE: std::sync::OnceLock<Vec<AttributeDescriptor>> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| vec![descriptor("mode", vec![ArgKind::String], "blending mode: none, once or continuous", SyncPolicy::Auto, true, false, true)])
}

impl BlenderObject {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut base = crate::graph_object::GraphObjectBase::new(name, "blender", Category::Other);
        base.set_render_priority(crate::graph_object::RenderPriority::NoRender);
        Self { base, mode: BlenderMode::None }
    }

    #[must_use]
    pub fn mode(&self) -> BlenderMode {
        self.mode
    }
}

impl GraphObject for BlenderObject {
    fn base(&self) -> &crate::graph_object::GraphObjectBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut crate::graph_object::GraphObjectBase {
        &mut self.base
    }
    fn attribute_descriptors(&self) -> &[crate::attribute::AttributeDescriptor] {
        blender_descriptors()
    }
    fn set_attribute(&mut self, name: &str, values: &Values) -> bool {
        match name {
            "mode" => match BlenderMode::from_name(&values[0].as_string()) {
                Some(mode) => {
                    self.mode = mode;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }
    fn get_attribute(&self, name: &str) -> Option<Values> {
        match name {
            "mode" => Some(crate::value::single(self.mode.name())),
            _ => None,
        }
    }
}

/// The mode of the first registered `blender`-typed object, if any — what
/// the Scene's blender tick applies before each `update`.
#[must_use]
pub fn configured_mode(root: &RootObject) -> Option<BlenderMode> {
    root.object_names().into_iter().find_map(|name| {
        root.with_object(&name, |obj| {
            if obj.type_name() == "blender" {
                BlenderMode::from_name(&crate::attribute::apply_get(obj, "mode").first().map(crate::value::Value::as_string).unwrap_or_default())
            } else {
                None
            }
        })
        .flatten()
    })
}

/// Outcome of one non-master follower tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    /// No replicated geometry has arrived since the last tick.
    Idle,
    /// The master's broadcast arrived; vertex blending should be activated.
    Updated,
    /// Geometry arrived but the broadcast didn't within the wait window;
    /// the Scene keeps rendering with the geometry it last activated.
    TimedOut,
}

/// Handshake between the Link dispatcher and a non-master Scene's Blender
/// follower: the dispatcher records replicated-geometry arrival and the
/// master's `blendingUpdated` broadcast, and the follower waits — bounded —
/// for the broadcast that closes each replication round.
#[derive(Default)]
pub struct BlendSync {
    updated: Fence,
    seen: AtomicU64,
    pending: AtomicBool,
}

impl BlendSync {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a replicated `Geometry` buffer lands, arming the next
    /// `wait_updated` call.
    pub fn geometry_received(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Called when the master's `blendingUpdated` broadcast arrives.
    pub fn broadcast_received(&self) {
        self.updated.signal();
    }

    /// One follower tick: if geometry arrived since the last tick, wait up
    /// to `timeout` for the matching broadcast. The broadcast may already
    /// have been observed (message and buffer ports drain independently),
    /// in which case this returns immediately.
    pub fn wait_updated(&self, timeout: Duration) -> FollowOutcome {
        if !self.pending.swap(false, Ordering::AcqRel) {
            return FollowOutcome::Idle;
        }
        let seen = self.seen.load(Ordering::Acquire);
        if self.updated.wait_at_least(seen + 1, timeout) {
            self.seen.store(self.updated.value(), Ordering::Release);
            FollowOutcome::Updated
        } else {
            FollowOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::objects::{Camera, Geometry, Object};
    use crate::scene::objects::geometry::MeshBuffers;
    use glam::Vec3;

    fn wire_camera_object_geometry(root: &mut RootObject) {
        root.add_object(Box::new(Camera::new("cam1")));
        root.add_object(Box::new(Object::new("obj1")));
        let mut geometry = Geometry::new("geo1");
        geometry.set_source_buffers(MeshBuffers { positions: vec![Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 5.0)], ..Default::default() });
        root.add_object(Box::new(geometry));
        root.link("cam1", "obj1");
        root.with_object_mut("obj1", |obj| {
            crate::attribute::apply_set(obj, "geometry", &vec![crate::value::Value::String("geo1".into())]);
        });
    }

    #[test]
    fn no_cameras_is_a_no_op() {
        let mut root = RootObject::new("master");
        root.add_object(Box::new(Object::new("obj1")));
        let mut blender = Blender::new();
        blender.set_mode(BlenderMode::Once);
        assert!(!blender.update(&mut root, &[]));
    }

    #[test]
    fn once_mode_recomputes_exactly_once() {
        let mut root = RootObject::new("master");
        wire_camera_object_geometry(&mut root);

        let mut blender = Blender::new();
        blender.set_mode(BlenderMode::Once);
        assert!(blender.update(&mut root, &[]));
        assert!(!blender.update(&mut root, &[]));
        assert!(root.with_object("obj1", |obj| obj.base().category() == Category::Object).unwrap());
    }

    #[test]
    fn recompute_activates_vertex_blending_on_linked_objects() {
        let mut root = RootObject::new("master");
        wire_camera_object_geometry(&mut root);

        let mut blender = Blender::new();
        blender.set_mode(BlenderMode::Once);
        blender.update(&mut root, &[]);

        assert!(root.with_object("obj1", |o| o.is_vertex_blending_active()).unwrap());
    }

    #[test]
    fn deactivating_after_compute_clears_vertex_blending() {
        let mut root = RootObject::new("master");
        wire_camera_object_geometry(&mut root);

        let mut blender = Blender::new();
        blender.set_mode(BlenderMode::Once);
        blender.update(&mut root, &[]);
        assert!(root.with_object("obj1", |o| o.is_vertex_blending_active()).unwrap());

        blender.set_mode(BlenderMode::None);
        assert!(blender.update(&mut root, &[]));
        assert!(!root.with_object("obj1", |o| o.is_vertex_blending_active()).unwrap());
        assert!(!blender.update(&mut root, &[]));
    }

    #[test]
    fn follower_is_idle_until_geometry_arrives() {
        let sync = BlendSync::new();
        assert_eq!(sync.wait_updated(Duration::from_millis(1)), FollowOutcome::Idle);
    }

    #[test]
    fn follower_sees_an_update_even_if_the_broadcast_arrived_first() {
        let sync = BlendSync::new();
        sync.broadcast_received();
        sync.geometry_received();
        assert_eq!(sync.wait_updated(Duration::from_millis(1)), FollowOutcome::Updated);
        assert_eq!(sync.wait_updated(Duration::from_millis(1)), FollowOutcome::Idle);
    }

    #[test]
    fn follower_times_out_without_a_broadcast_and_disarms() {
        let sync = BlendSync::new();
        sync.geometry_received();
        assert_eq!(sync.wait_updated(Duration::from_millis(10)), FollowOutcome::TimedOut);
        assert_eq!(sync.wait_updated(Duration::from_millis(1)), FollowOutcome::Idle);
    }

    #[test]
    fn activate_received_blending_reaches_every_object() {
        let root = RootObject::new("s2");
        root.add_object(Box::new(Object::new("obj1")));
        root.add_object(Box::new(Camera::new("cam1")));
        activate_received_blending(&root);
        assert!(root.with_object("obj1", |o| o.is_vertex_blending_active()).unwrap());
    }

    #[test]
    fn blender_object_mode_round_trips_and_rejects_garbage() {
        let mut blender = BlenderObject::new("blender");
        assert!(crate::attribute::apply_set(&mut blender, "mode", &vec![crate::value::Value::String("once".into())]));
        assert_eq!(blender.mode(), BlenderMode::Once);
        assert!(!crate::attribute::apply_set(&mut blender, "mode", &vec![crate::value::Value::String("sometimes".into())]));
        assert_eq!(blender.mode(), BlenderMode::Once);
    }

    #[test]
    fn configured_mode_reads_the_registered_blender_object() {
        let root = RootObject::new("master");
        assert_eq!(configured_mode(&root), None);
        root.add_object(Box::new(BlenderObject::new("blender")));
        root.set("blender", "mode", &vec![crate::value::Value::String("continuous".into())]);
        assert_eq!(configured_mode(&root), Some(BlenderMode::Continuous));
    }
}
