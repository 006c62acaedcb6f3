//! Configuration file schema: a JSON document with a `world` section, an
//! ordered `scenes` list, and one key per scene name holding that scene's
//! objects and links.
//!
//! Loading applies the same `RootObject::set`/`create_object`/`link` calls
//! a hand-written setup script would issue — `World::apply_config` is the
//! only caller, and it runs those calls before any Scene is spawned.
//! Saving walks the live registry and writes only savable objects and
//! savable attributes (ghosts and non-savable attributes are omitted),
//! using `ryu`-free `f64`/`i64` `Display` formatting, which is already
//! locale-independent (decimal point, not comma) in Rust.

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::errors::{Result, SplashError};
use crate::root_object::RootObject;
use crate::value::Values;

/// World's settings are a loosely-typed bag (whatever keys the config file
/// happens to carry), not a reflected `GraphObject` — there is no fixed
/// descriptor table to validate an arbitrary `frameRate`/`masterName`/...
/// against.
pub type WorldSettings = FxHashMap<String, Values>;

/// One entry of the `scenes` list.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SceneSpec {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub spawn: i64,
    #[serde(default)]
    pub display: Option<i64>,
}

/// One object definition inside a scene's `objects` map.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub attrs: Map<String, Json>,
}

/// The per-scene section: its objects and the links between them.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SceneConfig {
    #[serde(default)]
    pub objects: FxHashMap<String, ObjectConfig>,
    #[serde(default)]
    pub links: Vec<(String, String)>,
}

/// The whole configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub world: Map<String, Json>,
    #[serde(default)]
    pub scenes: Vec<SceneSpec>,
    #[serde(flatten)]
    pub scene_configs: FxHashMap<String, SceneConfig>,
}

impl Config {
    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Finds the first local scene in `scenes` (`spawn > 0`, or `spawn ==
    /// 0` with an `address` of `localhost`) — the master.
    #[must_use]
    pub fn master_scene(&self) -> Option<&SceneSpec> {
        self.scenes.iter().find(|s| s.spawn > 0 || s.address.starts_with("localhost"))
    }
}

/// Converts a leaf JSON value (anything but an object) into `Values`.
/// Numbers that parse as an integer losslessly become `Value::Integer`;
/// everything else with a fractional/exponent form becomes `Value::Real`.
fn json_leaf_to_values(json: &Json) -> Values {
    match json {
        Json::Null => Values::new(),
        Json::Bool(b) => crate::value::single(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                crate::value::single(i)
            } else {
                crate::value::single(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => crate::value::single(s.clone()),
        Json::Array(items) => items.iter().map(json_leaf_to_value).collect(),
        Json::Object(_) => unreachable!("objects are flattened before reaching json_leaf_to_values"),
    }
}

fn json_leaf_to_value(json: &Json) -> crate::value::Value {
    match json {
        Json::Null => crate::value::Value::Bool(false),
        Json::Bool(b) => crate::value::Value::Bool(*b),
        Json::Number(n) => n.as_i64().map_or_else(|| crate::value::Value::Real(n.as_f64().unwrap_or(0.0)), crate::value::Value::Integer),
        Json::String(s) => crate::value::Value::String(s.clone()),
        Json::Array(items) => crate::value::Value::Sequence(items.iter().map(json_leaf_to_value).collect()),
        Json::Object(_) => unreachable!("objects are flattened before reaching json_leaf_to_value"),
    }
}

/// Walks a JSON object, turning nested objects into dotted attribute paths
/// (`"transform.position"`) and collecting every literal/array leaf as one
/// `(path, Values)` pair ready for `RootObject::set`.
fn flatten_attrs(prefix: &str, map: &Map<String, Json>, out: &mut Vec<(String, Values)>) {
    for (key, value) in map {
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
        match value {
            Json::Object(nested) => flatten_attrs(&path, nested, out),
            leaf => out.push((path, json_leaf_to_values(leaf))),
        }
    }
}

/// Applies `world`'s attributes into `settings`, flattening nested objects
/// to dotted keys.
pub fn apply_world_section(settings: &mut WorldSettings, world: &Map<String, Json>) {
    let mut flat = Vec::new();
    flatten_attrs("", world, &mut flat);
    for (key, values) in flat {
        settings.insert(key, values);
    }
}

/// Creates every object in `scene.objects`, then applies their attributes,
/// then establishes `scene.links`. Objects are created before any
/// attributes are applied so that a link or attribute referencing another
/// object defined later in the same map still resolves.
pub fn apply_scene_section(root: &RootObject, scene: &SceneConfig) {
    for (name, object) in &scene.objects {
        if !root.has_object(name) {
            root.create_object(&object.type_name, name.clone());
        }
    }
    for (name, object) in &scene.objects {
        let mut flat = Vec::new();
        flatten_attrs("", &object.attrs, &mut flat);
        for (attr, values) in flat {
            if !root.set(name, &attr, &values) {
                log::warn!("config: {name}.{attr} could not be applied");
            }
        }
    }
    for (from, to) in &scene.links {
        if !root.link(from, to) {
            log::warn!("config: link {from} -> {to} could not be established");
        }
    }
}

/// Rebuilds a `Config`'s `world` section from the live `WorldSettings` bag.
#[must_use]
pub fn save_world_section(settings: &WorldSettings) -> Map<String, Json> {
    let sorted: BTreeMap<&String, &Values> = settings.iter().collect();
    sorted.into_iter().map(|(k, v)| (k.clone(), values_to_json(v))).collect()
}

/// Rebuilds one scene's `objects`/`links` section from the live registry,
/// omitting ghost objects and non-savable attributes.
#[must_use]
pub fn save_scene_section(root: &RootObject) -> SceneConfig {
    let mut objects = FxHashMap::default();
    for name in root.object_names() {
        if name == "world" {
            continue;
        }
        let Some((type_name, savable, is_ghost)) = root.with_object(&name, |obj| (obj.type_name().to_owned(), obj.base().savable(), obj.base().is_ghost())) else {
            continue;
        };
        if is_ghost || !savable {
            continue;
        }
        objects.insert(
            name.clone(),
            ObjectConfig {
                type_name,
                attrs: save_object_attrs(root, &name),
            },
        );
    }
    let mut links = Vec::new();
    for name in root.object_names() {
        if let Some(outs) = root.with_object(&name, |obj| obj.base().links_out().to_vec()) {
            for to in outs {
                links.push((name.clone(), to));
            }
        }
    }
    SceneConfig { objects, links }
}

fn save_object_attrs(root: &RootObject, object: &str) -> Map<String, Json> {
    let descriptors = root.describe_all(object);
    // BTreeMap keeps output deterministic across save cycles (byte-identical
    // reload→save round trip).
    let mut sorted: BTreeMap<String, Json> = BTreeMap::new();
    for descriptor in descriptors {
        if !descriptor.savable {
            continue;
        }
        let values = root.get(object, descriptor.name);
        if values.is_empty() {
            continue;
        }
        sorted.insert(descriptor.name.to_owned(), values_to_json(&values));
    }
    sorted.into_iter().collect()
}

fn values_to_json(values: &Values) -> Json {
    if values.len() == 1 {
        value_to_json(&values[0])
    } else {
        Json::Array(values.iter().map(value_to_json).collect())
    }
}

fn value_to_json(value: &crate::value::Value) -> Json {
    match value {
        crate::value::Value::Integer(v) => Json::Number((*v).into()),
        crate::value::Value::Real(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
        crate::value::Value::String(v) => Json::String(v.clone()),
        crate::value::Value::Bool(v) => Json::Bool(*v),
        crate::value::Value::Buffer(v) => Json::Array(v.iter().map(|b| Json::Number((*b).into())).collect()),
        crate::value::Value::Sequence(seq) => Json::Array(seq.iter().map(value_to_json).collect()),
    }
}

/// Serializes `config` to pretty JSON with a trailing newline, matching
/// the "decimal point, not comma" requirement via `serde_json`'s formatter
/// (always `.`, regardless of OS locale).
pub fn write(path: impl AsRef<Path>, config: &Config) -> Result<()> {
    let mut text = serde_json::to_string_pretty(config).map_err(SplashError::ConfigJson)?;
    text.push('\n');
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document() {
        let json = r#"{
            "world": { "frameRate": 60 },
            "scenes": [ { "name": "S1", "address": "localhost", "spawn": 0 } ],
            "S1": { "objects": { "window": { "type": "window", "position": [0, 0] } }, "links": [] }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.scenes[0].name, "S1");
        assert_eq!(config.scene_configs["S1"].objects["window"].type_name, "window");
    }

    #[test]
    fn nested_object_flattens_to_dotted_attribute_path() {
        let mut map = Map::new();
        let mut nested = Map::new();
        nested.insert("x".into(), Json::from(1));
        nested.insert("y".into(), Json::from(2));
        map.insert("position".into(), Json::Object(nested));
        let mut out = Vec::new();
        flatten_attrs("", &map, &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(out[0].0, "position.x");
        assert_eq!(out[1].0, "position.y");
    }

    #[test]
    fn save_reload_save_is_byte_identical() {
        let json = r#"{
            "world": { "frameRate": 60, "looseClock": true },
            "scenes": [ { "name": "S1", "address": "localhost", "spawn": 1 } ],
            "S1": { "objects": { "window": { "type": "window", "position": [0, 0] } }, "links": [["cam1", "window"]] }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        let dir = std::env::temp_dir();
        let first = dir.join("splash-config-roundtrip-first.json");
        let second = dir.join("splash-config-roundtrip-second.json");
        write(&first, &config).unwrap();
        let reloaded = Config::load(&first).unwrap();
        write(&second, &reloaded).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        let _ = std::fs::remove_file(first);
        let _ = std::fs::remove_file(second);
    }

    #[test]
    fn master_scene_prefers_spawn_positive_or_localhost() {
        let config = Config {
            scenes: vec![
                SceneSpec { name: "S1".into(), address: "localhost".into(), spawn: 1, display: None },
                SceneSpec { name: "S2".into(), address: "10.0.0.2".into(), spawn: 0, display: None },
            ],
            ..Default::default()
        };
        assert_eq!(config.master_scene().unwrap().name, "S1");
    }
}
