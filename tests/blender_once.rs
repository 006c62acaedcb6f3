//! With two cameras whose frusta overlap on part of a shared quad, one
//! `BlenderMode::Once` tick integrates the per-vertex blending weight to
//! exactly 2 in the overlap, 1 where only one camera sees the vertex, and
//! 0 outside both frusta.

use glam::Vec3;

use splash::blender::{Blender, BlenderMode};
use splash::graph_object::{Category, GraphObject};
use splash::root_object::RootObject;
use splash::scene::objects::geometry::MeshBuffers;
use splash::scene::objects::{Camera, Geometry, Object};
use splash::value::Value;

#[test]
fn overlap_region_integrates_to_two_and_outside_both_to_zero() {
    let mut root = RootObject::new("master");

    root.add_object(Box::new(Camera::new("cam1")));
    root.add_object(Box::new(Camera::new("cam2")));
    root.add_object(Box::new(Object::new("obj1")));

    let mut geometry = Geometry::new("geo1");
    geometry.set_source_buffers(MeshBuffers {
        positions: vec![
            Vec3::new(0.0, 0.0, 0.0),  // inside both frusta
            Vec3::new(-2.0, 0.0, 0.0), // inside cam1 only
            Vec3::new(5.0, 0.0, 0.0),  // outside both
        ],
        ..Default::default()
    });
    root.add_object(Box::new(geometry));

    root.link("cam1", "obj1");
    root.link("cam2", "obj1");
    root.with_object_mut("obj1", |obj| {
        splash::attribute::apply_set(obj, "geometry", &vec![Value::String("geo1".into())]);
    });

    root.with_object_mut("cam1", |obj| {
        splash::attribute::apply_set(obj, "eye", &vec![Value::Real(-0.5), Value::Real(0.0), Value::Real(5.0)]);
        splash::attribute::apply_set(obj, "target", &vec![Value::Real(-0.5), Value::Real(0.0), Value::Real(0.0)]);
        splash::attribute::apply_set(obj, "fov", &vec![Value::Real(40.0)]);
        splash::attribute::apply_set(obj, "aspect", &vec![Value::Real(1.0)]);
    });
    root.with_object_mut("cam2", |obj| {
        splash::attribute::apply_set(obj, "eye", &vec![Value::Real(0.5), Value::Real(0.0), Value::Real(5.0)]);
        splash::attribute::apply_set(obj, "target", &vec![Value::Real(0.5), Value::Real(0.0), Value::Real(0.0)]);
        splash::attribute::apply_set(obj, "fov", &vec![Value::Real(40.0)]);
        splash::attribute::apply_set(obj, "aspect", &vec![Value::Real(1.0)]);
    });

    let mut blender = Blender::new();
    blender.set_mode(BlenderMode::Once);
    assert!(blender.update(&mut root, &[]));

    assert!(root.with_object("obj1", |obj| obj.base().category() == Category::Object).unwrap());
    assert!(root.with_object("obj1", |o| o.is_vertex_blending_active()).unwrap());

    let weights = root.with_object("geo1", |o| o.blend_weights()).flatten().unwrap();
    assert_eq!(weights, vec![2.0, 1.0, 0.0]);
}
