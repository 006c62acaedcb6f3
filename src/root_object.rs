//! `RootObject`: the registry, task queue and Link endpoint shared by both
//! `World` and every `Scene`.
//!
//! One aggregation point: the GraphObject registry, a FIFO task queue
//! drained once per tick on the owning thread, a periodic-task table, a
//! `Link`, a `NameRegistry`, and the pending-answer slots
//! `send_message_with_answer` waits on. It owns no rendering or
//! process-supervision logic of its own — `World` and `Scene` each embed
//! one and build their own behavior on top.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::attribute::{self, AttributeDescriptor};
use crate::errors::{Result, SplashError};
use crate::factory::Factory;
use crate::graph_object::GraphObject;
use crate::link::wire::Frame;
use crate::link::Link;
use crate::name_registry::NameRegistry;
use crate::value::Values;

/// A callable queued to run once on the owning thread's next tick.
pub type Task = Box<dyn FnOnce(&mut RootObject) + Send>;

struct PeriodicTask {
    callable: Box<dyn FnMut(&mut RootObject) + Send>,
    period: Duration,
    last_run: Instant,
}

/// Aggregates the object registry, task queue, Link endpoint and pending
/// message answers for one process role (World, or a Scene).
pub struct RootObject {
    name: String,
    registry: RwLock<FxHashMap<String, Box<dyn GraphObject + Send>>>,
    factory: Factory,
    names: NameRegistry,
    link: Link,
    tasks: Mutex<VecDeque<Task>>,
    periodic: Mutex<FxHashMap<String, PeriodicTask>>,
    pending_answers: Mutex<FxHashMap<(u64, String), flume::Sender<Values>>>,
}

impl RootObject {
    /// Creates an empty `RootObject` with its own Link endpoint named
    /// `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            link: Link::new(name.clone()),
            name,
            registry: RwLock::new(FxHashMap::default()),
            factory: Factory::new(),
            names: NameRegistry::new(),
            tasks: Mutex::new(VecDeque::new()),
            periodic: Mutex::new(FxHashMap::default()),
            pending_answers: Mutex::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn link_transport(&self) -> &Link {
        &self.link
    }

    #[must_use]
    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut Factory {
        &mut self.factory
    }

    #[must_use]
    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Inserts `object` under its own name. Fails (returning `false`,
    /// logging a warning) if the name is already taken: object names are
    /// unique within a `RootObject`.
    pub fn add_object(&self, object: Box<dyn GraphObject + Send>) -> bool {
        let name = object.name().to_owned();
        let mut registry = self.registry.write();
        if registry.contains_key(&name) {
            log::warn!("{}: object name {name} is already registered", self.name);
            return false;
        }
        registry.insert(name, object);
        true
    }

    /// Builds an object of `type_name` via the `Factory` and registers it.
    pub fn create_object(&self, type_name: &str, name: impl Into<String>) -> bool {
        let name = name.into();
        let Some(object) = self.factory.build(type_name, name.clone()) else {
            log::warn!("{}: no factory constructor registered for type {type_name}", self.name);
            return false;
        };
        self.add_object(object)
    }

    /// Removes and drops the object named `name`.
    pub fn remove_object(&self, name: &str) -> bool {
        self.registry.write().remove(name).is_some()
    }

    #[must_use]
    pub fn has_object(&self, name: &str) -> bool {
        self.registry.read().contains_key(name)
    }

    /// Every registered object name, for config save and introspection.
    #[must_use]
    pub fn object_names(&self) -> Vec<String> {
        self.registry.read().keys().cloned().collect()
    }

    pub fn with_object<R>(&self, name: &str, f: impl FnOnce(&dyn GraphObject) -> R) -> Option<R> {
        self.registry.read().get(name).map(|obj| f(obj.as_ref()))
    }

    pub fn with_object_mut<R>(&self, name: &str, f: impl FnOnce(&mut (dyn GraphObject + Send)) -> R) -> Option<R> {
        self.registry.write().get_mut(name).map(|obj| f(obj.as_mut()))
    }

    /// The render scheduler's priority-banded object list: every non-ghost,
    /// renderable object, grouped by `RenderPriority` in band order and,
    /// within a band, by object id (stable insertion order). Ghosts and
    /// objects whose priority is `NoRender` are excluded entirely.
    #[must_use]
    pub fn render_plan(&self) -> Vec<(crate::graph_object::RenderPriority, String)> {
        let registry = self.registry.read();
        let mut plan: Vec<_> = registry
            .values()
            .filter(|obj| !obj.base().is_ghost() && obj.renders() && obj.base().render_priority() != crate::graph_object::RenderPriority::NoRender)
            .map(|obj| (obj.base().render_priority(), obj.id(), obj.name().to_owned()))
            .collect();
        plan.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        plan.into_iter().map(|(priority, _, name)| (priority, name)).collect()
    }

    // ------------------------------------------------------------------
    // Attribute runtime: the three operations the registry exposes.
    // ------------------------------------------------------------------

    /// `set(name, attr, values)` — looks up `name` and delegates to the
    /// attribute runtime. Returns `false` for an unknown object, exactly as
    /// the attribute runtime does for an unknown attribute.
    pub fn set(&self, object: &str, attr: &str, values: &Values) -> bool {
        let mut registry = self.registry.write();
        let Some(obj) = registry.get_mut(object) else {
            log::warn!("{}: set on unknown object {object}", self.name);
            return false;
        };
        attribute::apply_set(obj.as_mut(), attr, values)
    }

    /// `get(name, attr)`.
    #[must_use]
    pub fn get(&self, object: &str, attr: &str) -> Values {
        let registry = self.registry.read();
        registry.get(object).map_or_else(Values::new, |obj| attribute::apply_get(obj.as_ref(), attr))
    }

    /// `describe(name, attr)`.
    #[must_use]
    pub fn describe(&self, object: &str, attr: &str) -> String {
        let registry = self.registry.read();
        registry.get(object).map_or_else(String::new, |obj| attribute::describe(obj.as_ref(), attr))
    }

    /// Lists the descriptors registered on `object`, for config save.
    pub fn describe_all(&self, object: &str) -> Vec<AttributeDescriptor> {
        self.registry
            .read()
            .get(object)
            .map(|obj| obj.attribute_descriptors().to_vec())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Links between named objects
    // ------------------------------------------------------------------

    /// Registers a link from `from` to `to`, recorded on both endpoints
    /// (outgoing on `from`, incoming on `to`). Both must already exist in
    /// the registry; a link is a relation plus lookup, never an ownership
    /// transfer.
    pub fn link(&self, from: &str, to: &str) -> bool {
        let mut registry = self.registry.write();
        if !registry.contains_key(to) {
            log::warn!("{}: link {from} -> {to} references unknown object {to}", self.name);
            return false;
        }
        let added = {
            let Some(origin) = registry.get_mut(from) else {
                log::warn!("{}: link {from} -> {to} references unknown object {from}", self.name);
                return false;
            };
            origin.base_mut().link_to(to)
        };
        if added {
            if let Some(target) = registry.get_mut(to) {
                target.base_mut().link_from(from);
            }
        }
        added
    }

    // ------------------------------------------------------------------
    // Task queue
    // ------------------------------------------------------------------

    /// Queues `task` to run on the next call to `run_pending_tasks`.
    pub fn post_task(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }

    /// Drains and runs every currently queued task, in FIFO order.
    pub fn run_pending_tasks(&mut self) {
        loop {
            let next = self.tasks.lock().pop_front();
            let Some(task) = next else { break };
            task(self);
        }
    }

    /// Registers (or replaces) a periodic task run at most once per
    /// `period` by `run_due_periodic_tasks`.
    pub fn set_periodic_task(&self, name: impl Into<String>, period: Duration, callable: Box<dyn FnMut(&mut RootObject) + Send>) {
        self.periodic.lock().insert(
            name.into(),
            PeriodicTask {
                callable,
                period,
                last_run: Instant::now() - period,
            },
        );
    }

    pub fn cancel_periodic_task(&self, name: &str) {
        self.periodic.lock().remove(name);
    }

    /// Runs every periodic task whose period has elapsed since its last
    /// run. Call once per tick alongside `run_pending_tasks`.
    pub fn run_due_periodic_tasks(&mut self) {
        let due: Vec<String> = {
            let periodic = self.periodic.lock();
            periodic
                .iter()
                .filter(|(_, task)| task.last_run.elapsed() >= task.period)
                .map(|(name, _)| name.clone())
                .collect()
        };
        for name in due {
            // Re-borrow per task since `callable` needs `&mut self`.
            let mut callable = {
                let mut periodic = self.periodic.lock();
                let Some(task) = periodic.get_mut(&name) else { continue };
                task.last_run = Instant::now();
                std::mem::replace(&mut task.callable, Box::new(|_| {}))
            };
            callable(self);
            if let Some(task) = self.periodic.lock().get_mut(&name) {
                task.callable = callable;
            }
        }
    }

    // ------------------------------------------------------------------
    // Messaging over Link
    // ------------------------------------------------------------------

    /// Sends `name(values)` to `target` on `peer`, not waiting for a reply.
    ///
    /// `peer` may be [`crate::link::ALL_PEERS`] (every connected peer),
    /// [`crate::link::ALL_SCENES`] (every connected peer except the World
    /// endpoint), or this root's own name, in which case the set is
    /// enqueued as a local task instead of travelling over the Link.
    pub fn send_message(&self, peer: &str, target: &str, name: &str, values: Values) -> bool {
        if peer == self.name {
            let target = target.to_owned();
            let name = name.to_owned();
            self.post_task(Box::new(move |root| {
                root.set(&target, &name, &values);
            }));
            return true;
        }

        let recipients: Vec<String> = match peer {
            crate::link::ALL_PEERS => self.link.peer_names(),
            crate::link::ALL_SCENES => self.link.peer_names().into_iter().filter(|p| p != crate::link::WORLD_PEER).collect(),
            single => vec![single.to_owned()],
        };

        let id = self.link.next_message_id();
        let mut all_sent = true;
        for recipient in &recipients {
            let sent = self.link.send_message(
                recipient,
                Frame::Message {
                    id,
                    origin: self.name.clone(),
                    target: target.to_owned(),
                    name: name.to_owned(),
                    values: values.clone(),
                    wants_answer: false,
                },
            );
            all_sent &= sent;
        }
        all_sent
    }

    /// Sends `name(values)` to `target` on `peer` and blocks up to
    /// `timeout` for the matching `Answer` frame, registering a pending
    /// slot keyed by `(message_id, peer)` until the answer (or the
    /// deadline) arrives.
    pub fn send_message_with_answer(&self, peer: &str, target: &str, name: &str, values: Values, timeout: Duration) -> Result<Values> {
        let id = self.link.next_message_id();
        let (tx, rx) = flume::bounded(1);
        self.pending_answers.lock().insert((id, peer.to_owned()), tx);

        let sent = self.link.send_message(
            peer,
            Frame::Message {
                id,
                origin: self.name.clone(),
                target: target.to_owned(),
                name: name.to_owned(),
                values,
                wants_answer: true,
            },
        );
        if !sent {
            self.pending_answers.lock().remove(&(id, peer.to_owned()));
            return Err(SplashError::Link(format!("message port to {peer} is at capacity")));
        }

        rx.recv_timeout(timeout).map_err(|_| {
            self.pending_answers.lock().remove(&(id, peer.to_owned()));
            SplashError::Timeout(format!("answer from {peer} for message {id}"))
        })
    }

    /// Drains Link's inbox. `Message` frames wanting an answer are left for
    /// the caller to dispatch and reply to (via `reply_to`); `Answer`
    /// frames matching a pending slot fulfil it and are consumed here.
    /// Returns the frames the caller must still act on.
    pub fn poll_link(&self) -> Vec<crate::link::Inbound> {
        let inbound = self.link.poll_inbox();
        let mut unhandled = Vec::with_capacity(inbound.len());
        for item in inbound {
            if let Frame::Answer { id, values } = &item.frame {
                let slot = self.pending_answers.lock().remove(&(*id, item.from.clone()));
                if let Some(tx) = slot {
                    let _ = tx.send(values.clone());
                    continue;
                }
            }
            unhandled.push(item);
        }
        unhandled
    }

    /// Sends the `Answer` frame replying to an inbound `Message` with id
    /// `id`, destined back to `peer`.
    pub fn reply_to(&self, peer: &str, id: u64, values: Values) -> bool {
        self.link.send_message(peer, Frame::Answer { id, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{ArgKind, SyncPolicy};
    use crate::graph_object::{Category, GraphObjectBase};
    use crate::value::{self, Value};
    use std::sync::OnceLock;

    struct Window {
        base: GraphObjectBase,
        position: (i64, i64),
        size: (i64, i64),
    }

    fn window_descriptors() -> &'static [AttributeDescriptor] {
        static DESCRIPTORS: OnceLock<Vec<AttributeDescriptor>> = OnceLock::new();
        DESCRIPTORS.get_or_init(|| {
            vec![
                attribute::descriptor("position", vec![ArgKind::Integer, ArgKind::Integer], "window top-left position", SyncPolicy::Auto, true, false, false),
                attribute::descriptor("size", vec![], "window size in pixels", SyncPolicy::Auto, true, false, true),
            ]
        })
    }

    impl GraphObject for Window {
        fn base(&self) -> &GraphObjectBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut GraphObjectBase {
            &mut self.base
        }
        fn attribute_descriptors(&self) -> &[AttributeDescriptor] {
            window_descriptors()
        }
        fn set_attribute(&mut self, name: &str, values: &Values) -> bool {
            match name {
                "position" => {
                    self.position = (values[0].as_integer(), values[1].as_integer());
                    true
                }
                _ => false,
            }
        }
        fn get_attribute(&self, name: &str) -> Option<Values> {
            match name {
                "size" => Some(vec![Value::Integer(self.size.0), Value::Integer(self.size.1)]),
                _ => None,
            }
        }
    }

    fn root_with_window() -> RootObject {
        let root = RootObject::new("S1");
        root.add_object(Box::new(Window {
            base: GraphObjectBase::new("window", "Window", Category::Window),
            position: (0, 0),
            size: (1920, 1080),
        }));
        root
    }

    #[test]
    fn attribute_round_trip_scenario() {
        let root = root_with_window();
        assert!(root.set("window", "position", &vec![Value::Integer(10), Value::Integer(20)]));
        assert_eq!(root.get("window", "position"), vec![Value::Integer(10), Value::Integer(20)]);
        let size = root.get("window", "size");
        assert_eq!(size.len(), 2);
        assert!(size[0].as_integer() > 0 && size[1].as_integer() > 0);
    }

    #[test]
    fn set_on_unknown_object_fails() {
        let root = root_with_window();
        assert!(!root.set("missing", "position", &value::single(1i64)));
    }

    #[test]
    fn link_requires_both_endpoints_to_exist() {
        let root = root_with_window();
        assert!(!root.link("window", "gui")); // "gui" does not exist
        root.add_object(Box::new(Window {
            base: GraphObjectBase::new("gui", "Window", Category::Gui),
            position: (0, 0),
            size: (200, 200),
        }));
        assert!(root.link("window", "gui"));
    }

    #[test]
    fn pending_tasks_run_in_fifo_order() {
        let mut root = root_with_window();
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            root.post_task(Box::new(move |_| order.lock().push(i)));
        }
        root.run_pending_tasks();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn message_to_own_name_is_applied_on_the_next_tick() {
        let mut root = root_with_window();
        assert!(root.send_message("S1", "window", "position", vec![Value::Integer(3), Value::Integer(4)]));
        assert_eq!(root.get("window", "position"), Values::new());
        root.run_pending_tasks();
        assert_eq!(root.get("window", "position"), vec![Value::Integer(3), Value::Integer(4)]);
    }

    #[test]
    fn all_scenes_sentinel_skips_the_world_peer() {
        let root = RootObject::new("master");
        root.link_transport().connect_to(crate::link::WORLD_PEER, "inproc://sentinel-world").unwrap();
        root.link_transport().connect_to("s2", "inproc://sentinel-s2").unwrap();
        let world_end = crate::link::Link::new(crate::link::WORLD_PEER);
        world_end.connect_to("master", "inproc://sentinel-world").unwrap();
        let s2_end = crate::link::Link::new("s2");
        s2_end.connect_to("master", "inproc://sentinel-s2").unwrap();

        assert!(root.send_message(crate::link::ALL_SCENES, "", "blendingUpdated", Values::new()));
        assert!(s2_end.recv_timeout(Duration::from_millis(200)).is_some());
        assert!(world_end.poll_inbox().is_empty());
    }
}
