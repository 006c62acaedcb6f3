//! Add a window object, set its position, and read both the position back
//! and the untouched default size.

use splash::root_object::RootObject;
use splash::scene::objects;
use splash::value::Value;

#[test]
fn position_round_trips_and_size_defaults_to_positive_integers() {
    let mut root = RootObject::new("scene1");
    root.factory_mut().register("window", |name| Box::new(objects::Window::new(name)));
    assert!(root.create_object("window", "window"));

    assert!(root.set("window", "position", &vec![Value::Integer(10), Value::Integer(20)]));
    assert_eq!(root.get("window", "position"), vec![Value::Integer(10), Value::Integer(20)]);

    let size = root.get("window", "size");
    assert_eq!(size.len(), 2);
    assert!(size[0].as_integer() > 0);
    assert!(size[1].as_integer() > 0);
}
