//! Link: the inter-process transport every `RootObject` uses to talk to its
//! peers.
//!
//! A `Link` owns two kinds of port per connected peer — a message port
//! (attribute sets and calls, high-water-mark 1000, drops and logs on
//! overflow rather than blocking) and a buffer port (`BufferObject`
//! replication, high-water-mark 8, blocks the sender for up to 100 ms before
//! reporting [`SplashError::LinkOverflow`]). The high-water-mark is the
//! transport's own queue capacity (see `link/transport.rs`); there is no
//! separate relay stage, so a slow or absent reader on the far side is
//! exactly what trips a port's HWM.

pub mod transport;
pub mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{Result, SplashError};
use crate::link::transport::{InprocTransport, Transport, TrySendOutcome};
use crate::link::wire::Frame;

/// Message port high-water-mark: queued frames before new sends are dropped.
pub const MESSAGE_PORT_HWM: usize = 1000;
/// Buffer port high-water-mark.
pub const BUFFER_PORT_HWM: usize = 8;
/// Buffer port backpressure deadline before reporting overflow.
pub const BUFFER_PORT_DEADLINE: Duration = Duration::from_millis(100);
/// How long a listening endpoint waits for its peer to dial in before
/// giving up on that peer.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Broadcast sentinel: routes a message to every connected peer.
pub const ALL_PEERS: &str = "__ALL__";
/// Broadcast sentinel: routes a message to every connected Scene, skipping
/// the World endpoint.
pub const ALL_SCENES: &str = "__ALL_SCENES__";
/// The peer name every Scene knows its World endpoint by.
pub const WORLD_PEER: &str = "world";

/// Socket address for the World ↔ `peer` link — one socket path per peer
/// name, derived identically on both sides so no address needs to travel
/// out of band.
#[must_use]
pub fn world_address(peer: &str) -> String {
    format!("ipc:///tmp/splash-world-{peer}")
}

/// Socket address for the master-Scene ↔ `peer` link, used to replicate
/// blending geometry to non-master Scenes.
#[must_use]
pub fn scene_address(peer: &str) -> String {
    format!("ipc:///tmp/splash-scene-{peer}")
}

/// A frame received from `from`, queued for the owning `RootObject` to
/// process on its next tick.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub from: String,
    pub frame: Frame,
}

struct PeerHandle {
    message: Box<dyn Transport>,
    buffer: Box<dyn Transport>,
}

/// One endpoint of the inter-process transport. Owned by a `RootObject`.
pub struct Link {
    name: String,
    peers: Mutex<FxHashMap<String, PeerHandle>>,
    next_message_id: AtomicU64,
}

impl Link {
    /// Creates an unconnected Link identified as `name` in log output and
    /// in frames this endpoint originates.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            peers: Mutex::new(FxHashMap::default()),
            next_message_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vends the next message id for `send_message_with_answer` callers.
    pub fn next_message_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Dials out to `peer` at `address` (`inproc://topic` or
    /// `ipc:///path`). The other endpoint calls `listen_for` with the same
    /// address for `ipc://`, or `connect_to` with the same topic for
    /// `inproc://` (rendezvous is symmetric for `inproc://`).
    pub fn connect_to(&self, peer: &str, address: &str) -> Result<()> {
        let (message, buffer) = dial(address)?;
        self.peers.lock().insert(peer.to_owned(), PeerHandle { message, buffer });
        Ok(())
    }

    /// Binds and accepts a connection from `peer` at `address`. Only
    /// meaningful for `ipc://`; for `inproc://` this is identical to
    /// `connect_to` (rendezvous by topic name works either way).
    pub fn listen_for(&self, peer: &str, address: &str) -> Result<()> {
        let (message, buffer) = listen(address)?;
        self.peers.lock().insert(peer.to_owned(), PeerHandle { message, buffer });
        Ok(())
    }

    /// Drops the connection to `peer`; queued-but-undelivered frames are
    /// discarded.
    pub fn disconnect(&self, peer: &str) {
        self.peers.lock().remove(peer);
    }

    #[must_use]
    pub fn is_connected(&self, peer: &str) -> bool {
        self.peers.lock().contains_key(peer)
    }

    #[must_use]
    pub fn peer_names(&self) -> Vec<String> {
        self.peers.lock().keys().cloned().collect()
    }

    /// Enqueues `frame` on `peer`'s message port. Non-blocking: if the port
    /// is at its high-water-mark the frame is dropped and a warning logged,
    /// matching the `auto` sync policy's "never block the sender" contract.
    pub fn send_message(&self, peer: &str, frame: Frame) -> bool {
        let peers = self.peers.lock();
        let Some(handle) = peers.get(peer) else {
            log::warn!("link {}: send_message to unknown peer {peer}", self.name);
            return false;
        };
        match handle.message.try_send(frame) {
            Ok(()) => true,
            Err(TrySendOutcome::Full(_)) => {
                log::warn!("link {}: message port to {peer} is at capacity, dropping frame", self.name);
                false
            }
            Err(TrySendOutcome::Disconnected) => {
                log::warn!("link {}: message port to {peer} disconnected", self.name);
                false
            }
        }
    }

    /// Enqueues `frame` on `peer`'s buffer port, retrying for up to
    /// [`BUFFER_PORT_DEADLINE`] if the port is saturated. Returns
    /// [`SplashError::LinkOverflow`] if the deadline elapses first. An
    /// empty payload is a no-op, not an error — there is nothing for the
    /// far side to deserialize.
    pub fn send_buffer(&self, peer: &str, frame: Frame) -> Result<()> {
        if let Frame::Buffer { payload, .. } = &frame {
            if payload.is_empty() {
                return Ok(());
            }
        }
        let start = Instant::now();
        let mut pending = frame;
        loop {
            let outcome = {
                let peers = self.peers.lock();
                let Some(handle) = peers.get(peer) else {
                    return Err(SplashError::Link(format!("send_buffer to unknown peer {peer}")));
                };
                handle.buffer.try_send(pending)
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(TrySendOutcome::Full(returned)) => {
                    if start.elapsed() >= BUFFER_PORT_DEADLINE {
                        return Err(SplashError::LinkOverflow {
                            peer: peer.to_owned(),
                            deadline_ms: BUFFER_PORT_DEADLINE.as_millis() as u64,
                        });
                    }
                    pending = returned;
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(TrySendOutcome::Disconnected) => {
                    return Err(SplashError::Link(format!("buffer port to {peer} disconnected")));
                }
            }
        }
    }

    /// Drains every inbound frame currently available across all connected
    /// peers' ports, without blocking.
    pub fn poll_inbox(&self) -> Vec<Inbound> {
        let peers = self.peers.lock();
        let mut inbound = Vec::new();
        for (peer, handle) in peers.iter() {
            while let Some(frame) = handle.message.recv_timeout(Duration::ZERO) {
                inbound.push(Inbound { from: peer.clone(), frame });
            }
            while let Some(frame) = handle.buffer.recv_timeout(Duration::ZERO) {
                inbound.push(Inbound { from: peer.clone(), frame });
            }
        }
        inbound
    }

    /// Polls every connected peer's ports in a loop until a frame arrives
    /// or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Inbound> {
        let start = Instant::now();
        loop {
            let mut inbound = self.poll_inbox();
            if !inbound.is_empty() {
                return Some(inbound.remove(0));
            }
            if start.elapsed() >= timeout {
                return None;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

/// Topic-named rendezvous point for `inproc://` transports: the first
/// caller to dial a topic stashes the mirrored half for the second caller.
static INPROC_REGISTRY: OnceLock<Mutex<FxHashMap<String, (InprocTransport, InprocTransport)>>> = OnceLock::new();

fn inproc_registry() -> &'static Mutex<FxHashMap<String, (InprocTransport, InprocTransport)>> {
    INPROC_REGISTRY.get_or_init(|| Mutex::new(FxHashMap::default()))
}

fn rendezvous_inproc(topic: &str) -> (Box<dyn Transport>, Box<dyn Transport>) {
    let mut registry = inproc_registry().lock();
    if let Some((message, buffer)) = registry.remove(topic) {
        (Box::new(message), Box::new(buffer))
    } else {
        let (message_a, message_b) = InprocTransport::pair(MESSAGE_PORT_HWM);
        let (buffer_a, buffer_b) = InprocTransport::pair(BUFFER_PORT_HWM);
        registry.insert(topic.to_owned(), (message_b, buffer_b));
        (Box::new(message_a), Box::new(buffer_a))
    }
}

fn dial(address: &str) -> Result<(Box<dyn Transport>, Box<dyn Transport>)> {
    if let Some(topic) = address.strip_prefix("inproc://") {
        return Ok(rendezvous_inproc(topic));
    }
    #[cfg(unix)]
    if let Some(path) = address.strip_prefix("ipc://") {
        let message = transport::IpcTransport::connect(path, MESSAGE_PORT_HWM)?;
        let buffer = transport::IpcTransport::connect(&format!("{path}.buf"), BUFFER_PORT_HWM)?;
        return Ok((Box::new(message), Box::new(buffer)));
    }
    Err(SplashError::Link(format!("unsupported or malformed Link address: {address}")))
}

fn listen(address: &str) -> Result<(Box<dyn Transport>, Box<dyn Transport>)> {
    if let Some(topic) = address.strip_prefix("inproc://") {
        return Ok(rendezvous_inproc(topic));
    }
    #[cfg(unix)]
    if let Some(path) = address.strip_prefix("ipc://") {
        let (message, buffer) = transport::IpcTransport::listen_pair(path, ACCEPT_TIMEOUT, MESSAGE_PORT_HWM, BUFFER_PORT_HWM)?;
        return Ok((Box::new(message), Box::new(buffer)));
    }
    Err(SplashError::Link(format!("unsupported or malformed Link address: {address}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::time::Duration;

    #[test]
    fn inproc_round_trip_delivers_message() {
        let a = Link::new("a");
        let b = Link::new("b");
        a.connect_to("b", "inproc://a-b").unwrap();
        b.connect_to("a", "inproc://a-b").unwrap();

        assert!(a.send_message(
            "b",
            Frame::Message {
                id: 1,
                origin: "a".into(),
                target: "b".into(),
                name: "ping".into(),
                values: vec![Value::Integer(1)],
                wants_answer: false,
            }
        ));

        let inbound = b.recv_timeout(Duration::from_millis(500)).expect("frame delivered");
        assert_eq!(inbound.from, "a");
    }

    #[test]
    fn empty_buffer_send_is_a_no_op() {
        let a = Link::new("a");
        let b = Link::new("b");
        a.connect_to("b", "inproc://empty-buffer-topic").unwrap();
        b.connect_to("a", "inproc://empty-buffer-topic").unwrap();

        assert!(a.send_buffer("b", Frame::Buffer { object: "img1".into(), timestamp: 1, payload: Vec::new() }).is_ok());
        assert!(b.poll_inbox().is_empty());
    }

    #[test]
    fn buffer_overflow_reports_link_overflow_within_deadline() {
        let a = Link::new("a");
        let b = Link::new("b");
        a.connect_to("b", "inproc://overflow-test").unwrap();
        b.connect_to("a", "inproc://overflow-test").unwrap();

        // Starve the receiver's inbox so the forwarder thread stalls once
        // the buffer transport's own channel (capacity BUFFER_PORT_HWM)
        // fills up, and the port-level queue saturates behind it.
        for i in 0..(BUFFER_PORT_HWM as u64 * 3) {
            let result = a.send_buffer(
                "b",
                Frame::Buffer {
                    object: "img1".into(),
                    timestamp: i,
                    payload: vec![0u8; 16],
                },
            );
            if result.is_err() {
                assert!(matches!(result, Err(SplashError::LinkOverflow { .. })));
                return;
            }
        }
        panic!("expected at least one LinkOverflow before exhausting the send loop");
    }
}
