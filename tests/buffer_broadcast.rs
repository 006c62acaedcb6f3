//! A World-owned buffer update reaches a destination Scene's local Image
//! object with a monotonically increasing timestamp and byte-equal pixel
//! content.

use splash::graph_object::GraphObject;
use splash::link::wire::Frame;
use splash::root_object::RootObject;
use splash::scene::objects::Image;
use splash::scene::objects::image::{ImageFrame, encode_frame};
use splash::world::World;

fn rgba_frame(pixels: Vec<u8>) -> Vec<u8> {
    encode_frame(&ImageFrame {
        width: (pixels.len() / 4) as u32,
        height: 1,
        channels: 4,
        bits_per_pixel: 32,
        format: "RGBA".to_owned(),
        timestamp: 0,
        video_frame: false,
        pixels,
    })
}

#[test]
fn buffer_update_reaches_the_destination_scene_byte_equal() {
    let world = World::new();
    let scene = RootObject::new("s1");

    world.root().link_transport().connect_to("s1", "inproc://buffer-broadcast-topic").unwrap();
    scene.link_transport().listen_for("world", "inproc://buffer-broadcast-topic").unwrap();

    scene.add_object(Box::new(Image::new("img1")));

    world.register_buffer_destinations("img1", vec!["s1".to_owned()]);
    let pixels = vec![10u8, 20, 30, 255, 40, 50, 60, 255];
    let encoded = rgba_frame(pixels.clone());
    world.update_buffer("img1", encoded.clone());
    world.replicate_buffers();

    let inbound = scene.poll_link();
    assert_eq!(inbound.len(), 1);
    let Frame::Buffer { object, timestamp, payload } = &inbound[0].frame else {
        panic!("expected a Buffer frame");
    };
    assert_eq!(object, "img1");
    assert_eq!(*timestamp, 1);
    assert_eq!(*payload, encoded);

    assert!(scene.with_object_mut("img1", |obj| obj.receive_buffer(payload)).unwrap());
    let received = scene.with_object("img1", |obj| obj.get_attribute("width")).flatten().unwrap();
    assert_eq!(received[0].as_integer(), 2);

    // Pixel content survives the trip byte-equal.
    let mut check = Image::new("img_check");
    assert!(GraphObject::receive_buffer(&mut check, payload));
    assert_eq!(check.pixels(), &pixels[..]);

    // A second update strictly increases the timestamp.
    world.update_buffer("img1", rgba_frame(vec![1, 2, 3, 4]));
    world.replicate_buffers();
    let second = scene.poll_link();
    let Frame::Buffer { timestamp: second_timestamp, .. } = &second[0].frame else {
        panic!("expected a Buffer frame");
    };
    assert!(*second_timestamp > 1);
}
