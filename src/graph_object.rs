//! The `GraphObject` trait and the fields every concrete object shares.
//!
//! Splash's object model isn't a class hierarchy: a `Camera`, a `Warp` and a
//! `Gui` share only a handful of concerns (a stable identity, a name other
//! objects and Links address it by, the attribute plumbing, and whether it
//! renders). Rather than force them under one inheritance tree, each
//! concrete type embeds a [`GraphObjectBase`] and implements
//! [`GraphObject`] by delegating the shared fields to it — composition
//! over inheritance.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::attribute::AttributeDescriptor;
use crate::value::Values;

/// Process-wide unique object identifier, vended by [`next_object_id`].
pub type ObjectId = u64;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Vends a fresh, process-unique [`ObjectId`].
#[must_use]
pub fn next_object_id() -> ObjectId {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Coarse category an object falls into, used for render ordering and for
/// Factory type dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A virtual camera driving one projector output.
    Camera,
    /// A renderable mesh instance placed in the scene.
    Object,
    /// Raw vertex/index geometry shared by one or more `Object`s.
    Geometry,
    /// A warp/blend surface applied to a camera's output.
    Warp,
    /// An on-screen output window.
    Window,
    /// An on-screen debug/control overlay.
    Gui,
    /// A decoded image resource (texture source).
    Image,
    /// A GPU-side texture.
    Texture,
    /// A post-processing filter stage.
    Filter,
    /// An ordered render queue grouping.
    Queue,
    /// Anything that doesn't need its own category.
    Other,
}

/// Render-band ordering key. The scheduler iterates bands in this
/// declaration order; within a band, objects render in stable insertion
/// order. `NoRender` and ghost objects are skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPriority {
    Media,
    PreCamera,
    Camera,
    PostCamera,
    Blending,
    Window,
    NoRender,
    Gui,
}

/// Default render priority used when a constructor doesn't set one.
pub const DEFAULT_RENDER_PRIORITY: RenderPriority = RenderPriority::PreCamera;

/// Fields shared by every `GraphObject` implementation. Embedded as a
/// struct field (`base: GraphObjectBase`), never derived from.
#[derive(Debug)]
pub struct GraphObjectBase {
    id: ObjectId,
    name: String,
    type_name: &'static str,
    category: Category,
    render_priority: RenderPriority,
    savable: bool,
    /// Ghost objects exist as a name placeholder for a Link the peer has not
    /// yet resolved; they hold no state of their own.
    ghost: bool,
    updated: bool,
    links_out: Vec<String>,
    links_in: Vec<String>,
    /// Per-attribute last-set value and timestamp, used as the fallback
    /// getter and for `describe`/introspection and config save.
    cache: FxHashMap<String, (u64, Values)>,
}

impl GraphObjectBase {
    /// Creates a new base with a freshly vended id.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: &'static str, category: Category) -> Self {
        Self {
            id: next_object_id(),
            name: name.into(),
            type_name,
            category,
            render_priority: DEFAULT_RENDER_PRIORITY,
            savable: true,
            ghost: false,
            updated: true,
            links_out: Vec::new(),
            links_in: Vec::new(),
            cache: FxHashMap::default(),
        }
    }

    /// Creates a ghost placeholder: a name with no backing object yet.
    #[must_use]
    pub fn new_ghost(name: impl Into<String>, type_name: &'static str, category: Category) -> Self {
        let mut base = Self::new(name, type_name, category);
        base.ghost = true;
        base
    }

    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn render_priority(&self) -> RenderPriority {
        self.render_priority
    }

    pub fn set_render_priority(&mut self, priority: RenderPriority) {
        self.render_priority = priority;
    }

    #[must_use]
    pub fn savable(&self) -> bool {
        self.savable
    }

    pub fn set_savable(&mut self, savable: bool) {
        self.savable = savable;
    }

    #[must_use]
    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    /// Resolves a ghost into a real object once its backing state exists.
    pub fn resolve_ghost(&mut self) {
        self.ghost = false;
    }

    #[must_use]
    pub fn was_updated(&self) -> bool {
        self.updated
    }

    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    pub fn clear_updated(&mut self) {
        self.updated = false;
    }

    #[must_use]
    pub fn links_out(&self) -> &[String] {
        &self.links_out
    }

    #[must_use]
    pub fn links_in(&self) -> &[String] {
        &self.links_in
    }

    /// Registers an outgoing link to `peer`, if not already present.
    pub fn link_to(&mut self, peer: &str) -> bool {
        if self.links_out.iter().any(|p| p == peer) {
            return false;
        }
        self.links_out.push(peer.to_owned());
        true
    }

    /// Removes an outgoing link to `peer`.
    pub fn unlink_from(&mut self, peer: &str) {
        self.links_out.retain(|p| p != peer);
    }

    /// Registers an incoming link from `peer`.
    pub fn link_from(&mut self, peer: &str) -> bool {
        if self.links_in.iter().any(|p| p == peer) {
            return false;
        }
        self.links_in.push(peer.to_owned());
        true
    }

    /// Removes an incoming link from `peer`.
    pub fn unlink_to(&mut self, peer: &str) {
        self.links_in.retain(|p| p != peer);
    }

    /// Records a successful `set` for the default getter and marks the
    /// object updated. `timestamp_nanos` should come from
    /// [`crate::util::time::now_nanos`].
    pub fn record_set(&mut self, attr: &str, values: Values) {
        let ts = crate::util::time::now_nanos();
        self.cache.insert(attr.to_owned(), (ts, values));
        self.updated = true;
    }

    /// Returns the last-set `Values` for `attr`, if any.
    #[must_use]
    pub fn cached(&self, attr: &str) -> Option<Values> {
        self.cache.get(attr).map(|(_, values)| values.clone())
    }

    /// Returns the timestamp, in nanoseconds, of the last successful set of
    /// `attr`, if it was ever set.
    #[must_use]
    pub fn last_changed(&self, attr: &str) -> Option<u64> {
        self.cache.get(attr).map(|(ts, _)| *ts)
    }

    /// Iterates every attribute that has ever been set, for config save.
    pub fn iter_cached(&self) -> impl Iterator<Item = (&str, &Values)> {
        self.cache.iter().map(|(k, (_, v))| (k.as_str(), v))
    }
}

/// The behavior every object participating in the name registry, the
/// attribute runtime, and (optionally) rendering must provide.
pub trait GraphObject: Send {
    /// Shared state accessor.
    fn base(&self) -> &GraphObjectBase;

    /// Mutable shared state accessor.
    fn base_mut(&mut self) -> &mut GraphObjectBase;

    /// Process-unique identifier.
    fn id(&self) -> ObjectId {
        self.base().id()
    }

    /// Registry name.
    fn name(&self) -> &str {
        self.base().name()
    }

    /// Concrete type name (`"Camera"`, `"Warp"`, ...), used by Factory and
    /// by config save/load.
    fn type_name(&self) -> &'static str {
        self.base().type_name()
    }

    /// The descriptor table this concrete type registers. Stable for the
    /// lifetime of the object; implementors typically return a `'static`
    /// slice built once via `OnceLock`.
    fn attribute_descriptors(&self) -> &[AttributeDescriptor];

    /// Applies a validated attribute set. Returns `false` to reject a value
    /// the signature let through (e.g. out-of-range), which the attribute
    /// runtime treats the same as a validation failure.
    fn set_attribute(&mut self, name: &str, values: &Values) -> bool;

    /// Custom getter. Returning `None` tells the attribute runtime to fall
    /// back to the cached last-set `Values` in `base()`.
    fn get_attribute(&self, _name: &str) -> Option<Values> {
        None
    }

    /// Whether this object participates in the render scheduler at all
    /// (most do; an object with no GPU representation, such as a pure data
    /// holder, does not).
    fn renders(&self) -> bool {
        false
    }

    /// Per-frame state update, called by the scheduler before `render`.
    /// Most types have nothing to do here; `Camera`/`Window` use it to
    /// recompute per-frame bookkeeping.
    fn update(&mut self) {}

    /// Per-frame draw submission, called by the scheduler after `update`.
    /// The [`crate::scene::gpu::RenderFrame`] carries the encoder, the
    /// resource cache, and the data the scheduler gathered for this frame;
    /// types with no GPU output keep the no-op default.
    fn render(&mut self, _frame: &mut crate::scene::gpu::RenderFrame<'_>) {}

    /// Swap-chain presentation, called once per frame after every band has
    /// been submitted. Only `Window` overrides; a window with no attached
    /// surface just records its swap time.
    fn present(&mut self, _gpu: &crate::scene::gpu::GpuContext, _resources: &mut crate::scene::gpu::RenderResources, _frame_index: u64) {}

    /// `BufferObject::deserialize`: accepts a raw payload pushed over a
    /// Link buffer port (the Blender's cross-process mesh distribution,
    /// or a replicated `World` buffer). Returns whether it was understood;
    /// most types don't accept buffers and keep the default.
    fn receive_buffer(&mut self, _payload: &[u8]) -> bool {
        false
    }

    // -- Blender hooks --------------------------------------------------
    //
    // The Blender walks the registry through `dyn GraphObject` only — these
    // default-`None`/no-op hooks let `Object`/`Geometry`/`Camera` opt in to
    // the specific step of the algorithm they implement, without the
    // Blender ever downcasting to a concrete type.

    /// `Object`'s linked `Geometry` name, if any.
    fn linked_geometry(&self) -> Option<String> {
        None
    }

    /// Whether `activateVertexBlending` is currently set. `Object`
    /// overrides; used by tests and the Blender to verify step 6 ran.
    fn is_vertex_blending_active(&self) -> bool {
        false
    }

    /// Clears any Blender-produced alternative mesh. `Geometry` overrides.
    fn reset_geometry_tessellation(&mut self) {}

    /// Source-mesh vertex positions, for a `Geometry` to expose to the
    /// Blender's visibility/tessellation passes.
    fn mesh_positions(&self) -> Option<Vec<glam::Vec3>> {
        None
    }

    /// The currently active mesh (positions, uvs) — the alternative buffer
    /// when vertex blending installed one, the source mesh otherwise.
    /// `Geometry` overrides; the scheduler snapshots this when gathering a
    /// camera's draw batches.
    fn active_mesh_snapshot(&self) -> Option<(Vec<glam::Vec3>, Vec<[f32; 2]>)> {
        None
    }

    /// The ordered texture-object names this object samples from.
    /// `Object` overrides.
    fn texture_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Version stamp of this object's CPU-side pixel content, if it is a
    /// texture source. `Image` overrides; the upload thread compares this
    /// against the last committed version.
    fn texture_version(&self) -> Option<u64> {
        None
    }

    /// Snapshot of this object's pixel content as `(width, height,
    /// RGBA8 bytes)`. `Image` overrides; only called when
    /// `texture_version` is ahead of the committed one.
    fn texture_pixels(&self) -> Option<(u32, u32, Vec<u8>)> {
        None
    }

    /// Installs a Blender-tessellated position set as the active mesh.
    /// `Geometry` overrides; stores into the alternative buffer slot and
    /// activates it.
    fn apply_tessellated_positions(&mut self, _positions: Vec<glam::Vec3>) {}

    /// Flattens the active mesh into the little-endian wire format
    /// `Geometry::receive_buffer` understands, for cross-process
    /// replication.
    fn serialize_active_mesh(&self) -> Option<Vec<u8>> {
        None
    }

    /// A `Camera`'s current view-projection-space visibility test against
    /// `positions`: per-vertex `(visible, weight)`. `None` for non-Camera
    /// types.
    fn compute_camera_visibility(&self, _positions: &[glam::Vec3]) -> Option<(Vec<bool>, Vec<f32>)> {
        None
    }

    /// Adds this `Camera`'s contribution to a running per-vertex blending
    /// weight accumulator, given the visibility flags from
    /// `compute_camera_visibility`.
    fn accumulate_camera_blending(&self, _visible: &[bool], _weight: &mut [f32]) {}

    /// Stores the final, fully-accumulated per-vertex blending weight
    /// produced by step 5 of the Blender's algorithm. `Geometry` overrides;
    /// lets `blend_weights` below read back the integrated result a
    /// render pass would otherwise only consume as a vertex attribute.
    fn set_blend_weights(&mut self, _weights: Vec<f32>) {}

    /// The weights `set_blend_weights` last stored, if any.
    fn blend_weights(&self) -> Option<Vec<f32>> {
        None
    }
}

/// A placeholder registered for a name a Link references that has no
/// locally-owned backing object — the master's view of `cam1`, say, when
/// `cam1` actually lives in Scene `S1`. Holds no attributes of its own;
/// `set`/`get` against a ghost are expected to be intercepted and forwarded
/// to the owning peer before they ever reach [`GraphObject::set_attribute`].
pub struct Ghost {
    base: GraphObjectBase,
}

impl Ghost {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: &'static str, category: Category) -> Self {
        Self { base: GraphObjectBase::new_ghost(name, type_name, category) }
    }
}

impl GraphObject for Ghost {
    fn base(&self) -> &GraphObjectBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut GraphObjectBase {
        &mut self.base
    }
    fn attribute_descriptors(&self) -> &[AttributeDescriptor] {
        &[]
    }
    fn set_attribute(&mut self, _name: &str, _values: &Values) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        base: GraphObjectBase,
    }

    impl GraphObject for Dummy {
        fn base(&self) -> &GraphObjectBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut GraphObjectBase {
            &mut self.base
        }
        fn attribute_descriptors(&self) -> &[AttributeDescriptor] {
            &[]
        }
        fn set_attribute(&mut self, _name: &str, _values: &Values) -> bool {
            false
        }
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = GraphObjectBase::new("a", "Dummy", Category::Other);
        let b = GraphObjectBase::new("b", "Dummy", Category::Other);
        assert!(b.id() > a.id());
    }

    #[test]
    fn link_to_is_idempotent() {
        let mut base = GraphObjectBase::new("a", "Dummy", Category::Other);
        assert!(base.link_to("b"));
        assert!(!base.link_to("b"));
        assert_eq!(base.links_out(), ["b"]);
        base.unlink_from("b");
        assert!(base.links_out().is_empty());
    }

    #[test]
    fn ghost_starts_ghost_and_resolves() {
        let mut base = GraphObjectBase::new_ghost("a", "Dummy", Category::Other);
        assert!(base.is_ghost());
        base.resolve_ghost();
        assert!(!base.is_ghost());
    }

    #[test]
    fn record_set_populates_cache_and_marks_updated() {
        let dummy = Dummy {
            base: GraphObjectBase::new("a", "Dummy", Category::Other),
        };
        let mut dummy = dummy;
        dummy.base_mut().clear_updated();
        dummy.base_mut().record_set("x", crate::value::single(1i64));
        assert!(dummy.base().was_updated());
        assert_eq!(dummy.base().cached("x"), Some(crate::value::single(1i64)));
    }
}
