//! `World`: the master coordinator process.
//!
//! Owns the loaded configuration, the subprocess handles of spawned Scenes,
//! a replicated map of `BufferObject`s (per-object name → destination Scene
//! list), and the save/quit flag pair. `World` never renders; it applies
//! configuration, spawns and supervises Scene processes over their Links,
//! and periodically pushes updated buffers out to every Scene that
//! subscribed to them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::config::{self, Config, WorldSettings};
use crate::errors::Result;
use crate::link;
use crate::link::wire::Frame;
use crate::root_object::RootObject;
use crate::value::Values;

/// How often and how long World redials a freshly spawned Scene before
/// giving up on its Link.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const CONNECT_RETRY_ATTEMPTS: u32 = 40;

/// Supervision state of one spawned Scene child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStatus {
    /// Spawned (or assumed already running) and its Link is connected.
    Running,
    /// The child process exited. World never auto-restarts a failed Scene;
    /// rendering continues on whatever Scenes remain.
    Failed,
    /// `spawn: 0` in the config — the Scene is expected to already be
    /// running externally; World never owns its process lifetime.
    ExternallyManaged,
}

struct SpawnedScene {
    child: Option<Child>,
    status: SceneStatus,
}

/// A replicated `BufferObject`'s current payload and subscriber list.
#[derive(Default)]
struct ReplicatedBuffer {
    timestamp: u64,
    payload: Vec<u8>,
    destinations: Vec<String>,
}

/// The master coordinator. One per installation.
pub struct World {
    root: RootObject,
    settings: RwLock<WorldSettings>,
    config: RwLock<Option<Config>>,
    config_path: RwLock<Option<PathBuf>>,
    scenes: Mutex<HashMap<String, SpawnedScene>>,
    buffers: RwLock<HashMap<String, ReplicatedBuffer>>,
    save_requested: Mutex<bool>,
    quit_requested: Mutex<bool>,
}

impl World {
    /// Creates an unconfigured `World`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: RootObject::new(link::WORLD_PEER),
            settings: RwLock::new(WorldSettings::default()),
            config: RwLock::new(None),
            config_path: RwLock::new(None),
            scenes: Mutex::new(HashMap::new()),
            buffers: RwLock::new(HashMap::new()),
            save_requested: Mutex::new(false),
            quit_requested: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn root(&self) -> &RootObject {
        &self.root
    }

    #[must_use]
    pub fn setting(&self, key: &str) -> Option<Values> {
        self.settings.read().get(key).cloned()
    }

    /// Loads `path`, applies `world` to the settings bag, and remembers the
    /// document for `save`. Does not spawn Scenes; call `spawn_scenes`
    /// after this returns.
    pub fn load_config(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let loaded = Config::load(&path)?;
        config::apply_world_section(&mut self.settings.write(), &loaded.world);
        *self.config.write() = Some(loaded);
        *self.config_path.write() = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Writes the current settings and registry state back to `path`,
    /// preserving each scene's already-loaded section verbatim (World does
    /// not own a Scene's live registry across the process boundary; only a
    /// Scene can save its own objects, via its own `RootObject`).
    pub fn save_config(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let mut config = self.config.read().clone().unwrap_or_default();
        config.world = config::save_world_section(&self.settings.read());
        config::write(path, &config)
    }

    /// Spawns (or marks externally managed) every scene named in the
    /// loaded config's `scenes` list, connecting World's `Link` to each.
    ///
    /// A spawned Scene receives its own name as the positional argument,
    /// `-d` when `debug` is set, and `-o <config>` so it can apply its own
    /// section. A per-scene `display` index is exported as `DISPLAY`;
    /// without one the child inherits the parent's environment untouched.
    pub fn spawn_scenes(&self, scene_exe: &str, debug: bool) -> Result<()> {
        let Some(config) = self.config.read().clone() else {
            return Ok(());
        };
        let config_path = self.config_path.read().clone();
        for spec in &config.scenes {
            if !spec.address.starts_with("localhost") {
                log::warn!("world: scene {} at {} is not on this machine, assuming externally managed", spec.name, spec.address);
                self.scenes.lock().insert(spec.name.clone(), SpawnedScene { child: None, status: SceneStatus::ExternallyManaged });
                continue;
            }
            {
                let mut scenes = self.scenes.lock();
                if spec.spawn > 0 {
                    let mut command = std::process::Command::new(scene_exe);
                    command.arg(&spec.name);
                    if debug {
                        command.arg("-d");
                    }
                    if let Some(path) = &config_path {
                        command.arg("-o").arg(path);
                    }
                    if let Some(display) = spec.display {
                        command.env("DISPLAY", format!(":{display}"));
                    }
                    match command.spawn() {
                        Ok(child) => {
                            scenes.insert(spec.name.clone(), SpawnedScene { child: Some(child), status: SceneStatus::Running });
                        }
                        Err(e) => {
                            log::error!("world: failed to spawn scene {}: {e}", spec.name);
                            scenes.insert(spec.name.clone(), SpawnedScene { child: None, status: SceneStatus::Failed });
                            continue;
                        }
                    }
                } else {
                    scenes.insert(spec.name.clone(), SpawnedScene { child: None, status: SceneStatus::ExternallyManaged });
                }
            }
            if !self.connect_with_retry(&spec.name, &link::world_address(&spec.name)) {
                log::warn!("world: could not connect to scene {}", spec.name);
            }
        }
        Ok(())
    }

    /// Redials `address` until the freshly spawned Scene has bound its
    /// listener, or the retry budget runs out.
    fn connect_with_retry(&self, peer: &str, address: &str) -> bool {
        for attempt in 0..CONNECT_RETRY_ATTEMPTS {
            match self.root.link_transport().connect_to(peer, address) {
                Ok(()) => return true,
                Err(e) => {
                    if attempt + 1 == CONNECT_RETRY_ATTEMPTS {
                        log::warn!("world: giving up dialing {peer} at {address}: {e}");
                    }
                    std::thread::sleep(CONNECT_RETRY_INTERVAL);
                }
            }
        }
        false
    }

    /// Polls every spawned child's exit status, marking any that have
    /// exited as `Failed`.
    pub fn reap_exited_scenes(&self) {
        let mut scenes = self.scenes.lock();
        for (name, scene) in scenes.iter_mut() {
            if scene.status != SceneStatus::Running {
                continue;
            }
            if let Some(child) = scene.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(_)) => {
                        log::error!("world: scene {name} exited, marking Failed");
                        scene.status = SceneStatus::Failed;
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("world: could not poll scene {name}: {e}"),
                }
            }
        }
    }

    #[must_use]
    pub fn scene_status(&self, name: &str) -> Option<SceneStatus> {
        self.scenes.lock().get(name).map(|s| s.status)
    }

    // ------------------------------------------------------------------
    // Buffer replication
    // ------------------------------------------------------------------

    /// Registers `destinations` as the Scenes that should receive updates
    /// to the buffer object named `object`.
    pub fn register_buffer_destinations(&self, object: &str, destinations: Vec<String>) {
        self.buffers.write().entry(object.to_owned()).or_default().destinations = destinations;
    }

    /// Updates a replicated buffer's payload, bumping its timestamp. A
    /// buffer's timestamp only ever increases, so a destination can always
    /// tell a newer payload from a redelivered one.
    pub fn update_buffer(&self, object: &str, payload: Vec<u8>) {
        let mut buffers = self.buffers.write();
        let entry = buffers.entry(object.to_owned()).or_default();
        entry.timestamp = entry.timestamp.saturating_add(1);
        entry.payload = payload;
    }

    /// Pushes every buffer that has subscribers out over the Link. Called
    /// once per World tick.
    pub fn replicate_buffers(&self) {
        let buffers = self.buffers.read();
        for (object, buffer) in buffers.iter() {
            for dest in &buffer.destinations {
                let frame = Frame::Buffer {
                    object: object.clone(),
                    timestamp: buffer.timestamp,
                    payload: buffer.payload.clone(),
                };
                if let Err(e) = self.root.link_transport().send_buffer(dest, frame) {
                    log::warn!("world: replicating {object} to {dest}: {e}");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Save / quit
    // ------------------------------------------------------------------

    pub fn request_save(&self) {
        *self.save_requested.lock() = true;
    }

    pub fn take_save_request(&self) -> bool {
        std::mem::take(&mut *self.save_requested.lock())
    }

    pub fn request_quit(&self) {
        *self.quit_requested.lock() = true;
    }

    #[must_use]
    pub fn quit_requested(&self) -> bool {
        *self.quit_requested.lock()
    }

    /// Runs one coordination tick: drain the task queue, run due periodic
    /// tasks, reap exited children, and replicate updated buffers.
    pub fn tick(&mut self) {
        self.root.run_pending_tasks();
        self.root.run_due_periodic_tasks();
        self.reap_exited_scenes();
        self.replicate_buffers();
    }

    /// Blocks the calling thread in a coordination loop until `quit` is
    /// requested, sleeping `period` between ticks.
    pub fn run(&mut self, period: Duration) {
        while !self.quit_requested() {
            self.tick();
            std::thread::sleep(period);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_update_always_increases_timestamp() {
        let world = World::new();
        world.update_buffer("img1", vec![1, 2, 3]);
        let ts1 = world.buffers.read()["img1"].timestamp;
        world.update_buffer("img1", vec![4, 5, 6]);
        let ts2 = world.buffers.read()["img1"].timestamp;
        assert!(ts2 > ts1);
    }

    #[test]
    fn quit_flag_round_trips() {
        let world = World::new();
        assert!(!world.quit_requested());
        world.request_quit();
        assert!(world.quit_requested());
    }

    #[test]
    fn save_request_is_consumed_once() {
        let world = World::new();
        world.request_save();
        assert!(world.take_save_request());
        assert!(!world.take_save_request());
    }
}
