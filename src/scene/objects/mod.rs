//! The graphics object model: Camera, Object, Geometry, Warp, Window, Gui,
//! Image and Filter/Queue groupings, each a `GraphObject` a Scene's
//! `Factory` knows how to build.
//!
//! Every type here follows the same shape: a `GraphObjectBase`, a
//! `'static` descriptor table built once via `OnceLock`, and plain fields
//! the attribute setters/getters read and write directly — no `wgpu` call
//! is hidden behind an attribute.

pub mod camera;
pub mod filter;
pub mod geometry;
pub mod gui;
pub mod image;
pub mod object;
pub mod queue;
pub mod warp;
pub mod window;

pub use camera::Camera;
pub use filter::Filter;
pub use geometry::Geometry;
pub use gui::Gui;
pub use image::Image;
pub use object::Object;
pub use queue::Queue;
pub use warp::Warp;
pub use window::Window;

use crate::factory::Factory;

/// Registers every concrete graphics object type's constructor — the
/// Factory table a Scene consults for config-driven creation.
pub fn register_all(factory: &mut Factory) {
    factory.register("camera", |name| Box::new(Camera::new(name)));
    factory.register("object", |name| Box::new(Object::new(name)));
    factory.register("geometry", |name| Box::new(Geometry::new(name)));
    factory.register("mesh", |name| Box::new(Geometry::with_type(name, "mesh")));
    factory.register("warp", |name| Box::new(Warp::new(name)));
    factory.register("window", |name| Box::new(Window::new(name)));
    factory.register("gui", |name| Box::new(Gui::new(name)));
    factory.register("image", |name| Box::new(Image::new(name)));
    factory.register("texture_image", |name| Box::new(Image::with_type(name, "texture_image")));
    factory.register("filter", |name| Box::new(Filter::new(name)));
    factory.register("queue", |name| Box::new(Queue::new(name)));
    factory.register("blender", |name| Box::new(crate::blender::BlenderObject::new(name)));
    factory.register("colorCalibrator", |name| Box::new(crate::color_calibration::CalibratorObject::new(name)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_object::GraphObject;

    #[test]
    fn factory_table_covers_every_config_type() {
        let mut factory = Factory::new();
        register_all(&mut factory);
        for type_name in ["camera", "object", "geometry", "mesh", "warp", "window", "gui", "image", "texture_image", "filter", "queue", "blender", "colorCalibrator"] {
            assert!(factory.supports(type_name), "missing constructor for {type_name}");
        }
    }

    #[test]
    fn aliased_types_save_back_under_their_own_name() {
        let mut factory = Factory::new();
        register_all(&mut factory);
        let mesh = factory.build("mesh", "m1".into()).unwrap();
        assert_eq!(mesh.type_name(), "mesh");
        let texture = factory.build("texture_image", "t1".into()).unwrap();
        assert_eq!(texture.type_name(), "texture_image");
    }
}
