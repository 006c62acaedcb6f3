//! Runtime core for a multi-projector compositing and blending
//! installation: a master `World` process drives configuration and
//! cross-process replication, and one or more `Scene` processes (one per
//! GPU) render through the projectors they own.
//!
//! Module dependency order, leaves first: [`value`]/[`attribute`] →
//! [`link`] + [`name_registry`] → [`root_object`] → [`world`] / [`scene`].
//! Inside a Scene: GPU resource wrappers → graphics objects → controllers
//! ([`blender`], [`color_calibration`], [`input`]).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]

pub mod attribute;
pub mod blender;
pub mod color_calibration;
pub mod config;
pub mod errors;
pub mod factory;
pub mod graph_object;
pub mod input;
pub mod link;
pub mod name_registry;
pub mod root_object;
pub mod scene;
pub mod util;
pub mod value;
pub mod world;

pub use errors::{Result, SplashError};
pub use graph_object::{GraphObject, GraphObjectBase, ObjectId};
pub use link::Link;
pub use name_registry::NameRegistry;
pub use root_object::RootObject;
pub use value::{Value, Values};
pub use world::World;
