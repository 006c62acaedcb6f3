//! A saturated buffer port reports `LinkOverflow` promptly rather than
//! blocking forever, and the frames that did make it through are delivered
//! in send order — over both the in-process transport and a real socket.

use std::thread;
use std::time::{Duration, Instant};

use splash::errors::SplashError;
use splash::link::wire::Frame;
use splash::link::{Link, BUFFER_PORT_HWM};

#[test]
fn overflow_is_reported_promptly_and_delivered_frames_stay_in_order() {
    let sender = Link::new("sender");
    let receiver = Link::new("receiver");
    sender.connect_to("receiver", "inproc://link-overflow-topic").unwrap();
    receiver.connect_to("sender", "inproc://link-overflow-topic").unwrap();

    // Nothing drains the receiver during the burst, so the buffer port's
    // queue (capacity BUFFER_PORT_HWM) fills and every send past it must
    // hit the 100ms deadline and report overflow rather than hang.
    let total = BUFFER_PORT_HWM as u64 + 3;
    let mut overflowed = 0;
    for i in 0..total {
        let start = std::time::Instant::now();
        match sender.send_buffer("receiver", Frame::Buffer { object: "img1".into(), timestamp: i, payload: vec![i as u8; 4] }) {
            Ok(()) => {}
            Err(SplashError::LinkOverflow { .. }) => {
                overflowed += 1;
                assert!(start.elapsed() < Duration::from_millis(150), "overflow must be reported near the 100ms deadline, not after a long hang");
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(overflowed > 0, "expected at least one LinkOverflow once the buffer port saturated");

    let mut delivered_timestamps = Vec::new();
    thread::sleep(Duration::from_millis(20));
    for inbound in receiver.poll_inbox() {
        if let Frame::Buffer { timestamp, .. } = inbound.frame {
            delivered_timestamps.push(timestamp);
        }
    }
    let mut sorted = delivered_timestamps.clone();
    sorted.sort_unstable();
    assert_eq!(delivered_timestamps, sorted, "delivered frames must preserve send order");
}

/// The same backpressure contract over a Unix-socket link: the listener
/// stays idle long enough for the sender to saturate the buffer port's
/// outbox through the OS socket buffer, then drains and must observe the
/// frames that got through in send order.
#[cfg(unix)]
#[test]
fn ipc_buffer_overflow_reports_link_overflow_and_preserves_order() {
    let path = std::env::temp_dir().join(format!("splash-ipc-overflow-{}", std::process::id()));
    let address = format!("ipc://{}", path.display());

    let listener_address = address.clone();
    let listener = thread::spawn(move || {
        let receiver = Link::new("receiver");
        if let Err(e) = receiver.listen_for("sender", &listener_address) {
            panic!("listener could not bind: {e}");
        }
        // Stay idle so the sender's flood backs up through the socket.
        thread::sleep(Duration::from_millis(600));
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut delivered = Vec::new();
        while Instant::now() < deadline {
            for inbound in receiver.poll_inbox() {
                if let Frame::Buffer { timestamp, .. } = inbound.frame {
                    delivered.push(timestamp);
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        delivered
    });

    // The listener binds its sockets shortly after the thread starts;
    // redial until they exist.
    let sender = Link::new("sender");
    let mut connected = false;
    for _ in 0..250 {
        if sender.connect_to("receiver", &address).is_ok() {
            connected = true;
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    assert!(connected, "sender never reached the listener");

    // Payloads larger than the OS socket buffer make the writer thread
    // block mid-frame, so the bounded outbox fills after a few sends.
    let payload = vec![7u8; 256 * 1024];
    let mut overflowed = 0;
    for i in 0..30u64 {
        let start = Instant::now();
        match sender.send_buffer("receiver", Frame::Buffer { object: "img1".into(), timestamp: i, payload: payload.clone() }) {
            Ok(()) => {}
            Err(SplashError::LinkOverflow { .. }) => {
                overflowed += 1;
                assert!(start.elapsed() < Duration::from_millis(200), "overflow must be reported near the deadline, not after a long hang");
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(overflowed > 0, "the ipc buffer port never reported overflow");

    let delivered = listener.join().expect("listener thread panicked");
    assert!(!delivered.is_empty(), "receiver observed no frames");
    let mut sorted = delivered.clone();
    sorted.sort_unstable();
    assert_eq!(delivered, sorted, "delivered frames must preserve send order");
    assert_eq!(delivered[0], 0, "the first accepted frame must arrive first");

    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(format!("{}.buf", path.display()));
}
