//! Transport backends for a Link endpoint: `inproc://` (same-process,
//! zero-copy `Frame` passing over a channel) and `ipc://` (Unix domain
//! socket, wire-framed).

#[cfg(unix)]
use std::io::{BufReader, BufWriter, Write};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::time::Duration;
#[cfg(unix)]
use std::time::Instant;

use crate::errors::{Result, SplashError};
use crate::link::wire::Frame;

/// Outcome of a non-blocking send attempt.
pub enum TrySendOutcome {
    /// The transport's own queue is full; `Frame` is handed back so the
    /// caller can retry or report overflow.
    Full(Frame),
    /// The peer has gone away.
    Disconnected,
}

/// One direction of a connected transport: send a frame, or try to receive
/// one without blocking past `deadline`.
pub trait Transport: Send {
    /// Sends `frame` to the peer, blocking if the transport needs to.
    fn send(&self, frame: Frame) -> Result<()>;

    /// Attempts to send without blocking. The high-water-mark a Link port
    /// enforces is the capacity this returns `Full` against — a bounded
    /// channel for the in-process transport, a bounded outbox drained by
    /// a writer thread for the socket transport.
    fn try_send(&self, frame: Frame) -> std::result::Result<(), TrySendOutcome>;

    /// Waits up to `timeout` for the next inbound frame.
    fn recv_timeout(&self, timeout: Duration) -> Option<Frame>;
}

/// Same-process transport: frames are moved through a bounded channel with
/// no serialization — pointer passing, never a wire copy.
pub struct InprocTransport {
    tx: flume::Sender<Frame>,
    rx: flume::Receiver<Frame>,
}

impl InprocTransport {
    /// Builds a connected pair of transports sharing one bounded channel in
    /// each direction.
    #[must_use]
    pub fn pair(capacity: usize) -> (InprocTransport, InprocTransport) {
        let (tx_ab, rx_ab) = flume::bounded(capacity);
        let (tx_ba, rx_ba) = flume::bounded(capacity);
        (
            InprocTransport { tx: tx_ab, rx: rx_ba },
            InprocTransport { tx: tx_ba, rx: rx_ab },
        )
    }
}

impl Transport for InprocTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| SplashError::Link("inproc peer disconnected".into()))
    }

    fn try_send(&self, frame: Frame) -> std::result::Result<(), TrySendOutcome> {
        self.tx.try_send(frame).map_err(|e| match e {
            flume::TrySendError::Full(f) => TrySendOutcome::Full(f),
            flume::TrySendError::Disconnected(_) => TrySendOutcome::Disconnected,
        })
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.rx.recv_timeout(timeout).ok()
    }
}

/// Unix-domain-socket transport, used for `ipc://` addresses that cross
/// process boundaries on the same machine.
///
/// Each stream gets two dedicated blocking threads: an input thread that
/// decodes frames off the socket into a bounded inbox, and an output
/// thread that drains a bounded outbox onto the socket. `capacity` sizes
/// both queues and is the port's high-water mark — when a slow peer backs
/// the writer up through the OS socket buffer, the outbox fills and
/// `try_send` reports `Full`, exactly as the in-process transport does. A
/// corrupted inbound frame closes the stream (the input thread exits, the
/// inbox disconnects) — the framing carries no way to resynchronize
/// mid-stream, and a fresh connection is cheaper than scanning for one.
#[cfg(unix)]
pub struct IpcTransport {
    outbox: flume::Sender<Frame>,
    inbox: flume::Receiver<Frame>,
}

#[cfg(unix)]
impl IpcTransport {
    /// Connects to a listening Unix socket at `path`.
    pub fn connect(path: &str, capacity: usize) -> Result<Self> {
        let stream = UnixStream::connect(path).map_err(|e| SplashError::Link(format!("connect to {path}: {e}")))?;
        Self::from_stream(stream, capacity)
    }

    /// Binds listeners for both ports (at `path` and `path.buf`), removing
    /// any stale socket files first, then accepts one peer connection on
    /// each. The buffer socket is bound before the message socket: a
    /// dialer connects them in the opposite order, so once its first
    /// connect lands the second socket is guaranteed to exist.
    pub fn listen_pair(path: &str, accept_timeout: Duration, message_capacity: usize, buffer_capacity: usize) -> Result<(Self, Self)> {
        let buffer_path = format!("{path}.buf");
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(&buffer_path);
        let buffer_listener = UnixListener::bind(&buffer_path).map_err(|e| SplashError::Link(format!("bind {buffer_path}: {e}")))?;
        let message_listener = UnixListener::bind(path).map_err(|e| SplashError::Link(format!("bind {path}: {e}")))?;
        let message = Self::from_stream(accept_one(&message_listener, accept_timeout, path)?, message_capacity)?;
        let buffer = Self::from_stream(accept_one(&buffer_listener, accept_timeout, &buffer_path)?, buffer_capacity)?;
        Ok((message, buffer))
    }

    fn from_stream(stream: UnixStream, capacity: usize) -> Result<Self> {
        let read_half = stream.try_clone().map_err(|e| SplashError::Link(e.to_string()))?;
        let (inbox_tx, inbox_rx) = flume::bounded(capacity);
        std::thread::spawn(move || {
            let mut reader = BufReader::new(read_half);
            loop {
                match Frame::read_from(&mut reader) {
                    Ok(frame) => {
                        if inbox_tx.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if e.kind() == std::io::ErrorKind::InvalidData {
                            log::warn!("link: corrupted frame on ipc stream, closing: {e}");
                        }
                        break;
                    }
                }
            }
        });

        let (outbox_tx, outbox_rx) = flume::bounded::<Frame>(capacity);
        std::thread::spawn(move || {
            let mut writer = BufWriter::new(stream);
            for frame in outbox_rx.iter() {
                let written = writer.write_all(&frame.encode()).and_then(|()| writer.flush());
                if let Err(e) = written {
                    log::warn!("link: ipc stream write failed, closing: {e}");
                    break;
                }
            }
        });

        Ok(Self { outbox: outbox_tx, inbox: inbox_rx })
    }
}

#[cfg(unix)]
fn accept_one(listener: &UnixListener, timeout: Duration, path: &str) -> Result<UnixStream> {
    listener.set_nonblocking(true).map_err(|e| SplashError::Link(e.to_string()))?;
    let deadline = Instant::now() + timeout;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false).map_err(|e| SplashError::Link(e.to_string()))?;
                return Ok(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(SplashError::Timeout(format!("peer connection on {path}")));
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(SplashError::Link(format!("accept on {path}: {e}"))),
        }
    }
}

#[cfg(unix)]
impl Transport for IpcTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        self.outbox.send(frame).map_err(|_| SplashError::Link("ipc stream closed".into()))
    }

    fn try_send(&self, frame: Frame) -> std::result::Result<(), TrySendOutcome> {
        self.outbox.try_send(frame).map_err(|e| match e {
            flume::TrySendError::Full(f) => TrySendOutcome::Full(f),
            flume::TrySendError::Disconnected(_) => TrySendOutcome::Disconnected,
        })
    }

    fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.inbox.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn inproc_pair_delivers_in_order() {
        let (a, b) = InprocTransport::pair(4);
        a.send(Frame::Answer {
            id: 1,
            values: vec![Value::Integer(1)],
        })
        .unwrap();
        a.send(Frame::Answer {
            id: 2,
            values: vec![Value::Integer(2)],
        })
        .unwrap();
        let first = b.recv_timeout(Duration::from_millis(50)).unwrap();
        let second = b.recv_timeout(Duration::from_millis(50)).unwrap();
        assert_eq!(first, Frame::Answer { id: 1, values: vec![Value::Integer(1)] });
        assert_eq!(second, Frame::Answer { id: 2, values: vec![Value::Integer(2)] });
    }
}
