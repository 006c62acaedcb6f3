//! A ghost placeholder linked locally forwards the link to the peer that
//! physically owns the target object, over a real Link.
//! `Scene::link`/`observe_ghost` wrap exactly this sequence but need a
//! live GPU adapter to construct `Scene`, so the test exercises the
//! `RootObject`/`Link` layer the wrapper delegates to and stays headless.

use splash::graph_object::{Category, Ghost};
use splash::link::wire::Frame;
use splash::root_object::RootObject;
use splash::scene::objects::{Camera, Gui, Window};
use splash::value::Value;

#[test]
fn ghost_link_is_forwarded_to_the_owning_peer() {
    let s1 = RootObject::new("s1");
    let s2 = RootObject::new("s2");

    s1.link_transport().connect_to("s2", "inproc://ghost-link-topic").unwrap();
    s2.link_transport().listen_for("s1", "inproc://ghost-link-topic").unwrap();

    // S2 physically owns cam1, and a window it links to directly.
    s2.add_object(Box::new(Camera::new("cam1")));
    s2.add_object(Box::new(Window::new("win1")));
    assert!(s2.link("cam1", "win1"));

    // S1 only observes a ghost for cam1, alongside its own local gui object.
    s1.add_object(Box::new(Ghost::new("cam1", "camera", Category::Camera)));
    s1.add_object(Box::new(Gui::new("gui")));
    assert!(s1.link("cam1", "gui"));

    // Forward the link to s2, the way `Scene::link` does when `from` is a
    // ghost it doesn't physically own.
    assert!(s1.send_message("s2", "cam1", "__link__", vec![Value::String("gui".to_owned())]));

    let inbound = s2.poll_link();
    assert_eq!(inbound.len(), 1);
    let Frame::Message { target, name, values, .. } = &inbound[0].frame else {
        panic!("expected a Message frame");
    };
    assert_eq!(target, "cam1");
    assert_eq!(name, "__link__");
    assert_eq!(*values, vec![Value::String("gui".to_owned())]);

    // s2 materializes a placeholder for the peer-owned target, the way a
    // Scene registers a ghost for a name it learns about from a peer, then
    // applies the forwarded link: cam1 is now linked to both win1 (local)
    // and gui (forwarded from s1).
    let to = values[0].as_string();
    s2.add_object(Box::new(Ghost::new(to.clone(), "gui", Category::Gui)));
    assert!(s2.link("cam1", &to));
}
