//! Binary wire framing for `ipc://` transports.
//!
//! Length-prefixed UTF-8 strings, little-endian 64-bit integers/reals, and a
//! one-byte kind tag per [`Value`] — the same tagged-union-on-the-wire shape
//! `value.rs` models in memory. `inproc://` transports skip all of this and
//! pass `Frame` values directly (see `link/transport.rs`).

use std::io::{self, Read, Write};

use crate::value::{Value, Values};

const KIND_INTEGER: u8 = 0;
const KIND_REAL: u8 = 1;
const KIND_STRING: u8 = 2;
const KIND_BOOL: u8 = 3;
const KIND_BUFFER: u8 = 4;
const KIND_SEQUENCE: u8 = 5;

const FRAME_MESSAGE: u8 = 0;
const FRAME_ANSWER: u8 = 1;
const FRAME_BUFFER: u8 = 2;

/// One frame exchanged between Link endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An attribute set, a plain call, or a message awaiting an answer.
    Message {
        id: u64,
        origin: String,
        target: String,
        name: String,
        values: Values,
        wants_answer: bool,
    },
    /// The reply to a `Message` with `wants_answer = true`.
    Answer { id: u64, values: Values },
    /// A `BufferObject` replication frame: raw bytes plus the timestamp
    /// they were captured at.
    Buffer {
        object: String,
        timestamp: u64,
        payload: Vec<u8>,
    },
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_i64<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn write_f64<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_f64<R: Read>(r: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u64(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u64(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    write_bytes(w, s.as_bytes())
}

fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn write_value<W: Write>(w: &mut W, value: &Value) -> io::Result<()> {
    match value {
        Value::Integer(v) => {
            w.write_all(&[KIND_INTEGER])?;
            write_i64(w, *v)
        }
        Value::Real(v) => {
            w.write_all(&[KIND_REAL])?;
            write_f64(w, *v)
        }
        Value::String(v) => {
            w.write_all(&[KIND_STRING])?;
            write_string(w, v)
        }
        Value::Bool(v) => w.write_all(&[KIND_BOOL, u8::from(*v)]),
        Value::Buffer(v) => {
            w.write_all(&[KIND_BUFFER])?;
            write_bytes(w, v)
        }
        Value::Sequence(seq) => {
            w.write_all(&[KIND_SEQUENCE])?;
            write_values(w, seq)
        }
    }
}

fn read_value<R: Read>(r: &mut R) -> io::Result<Value> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    Ok(match tag[0] {
        KIND_INTEGER => Value::Integer(read_i64(r)?),
        KIND_REAL => Value::Real(read_f64(r)?),
        KIND_STRING => Value::String(read_string(r)?),
        KIND_BOOL => {
            let mut b = [0u8; 1];
            r.read_exact(&mut b)?;
            Value::Bool(b[0] != 0)
        }
        KIND_BUFFER => Value::Buffer(read_bytes(r)?),
        KIND_SEQUENCE => Value::Sequence(read_values(r)?),
        other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad value kind tag {other}"))),
    })
}

fn write_values<W: Write>(w: &mut W, values: &Values) -> io::Result<()> {
    write_u64(w, values.len() as u64)?;
    for v in values {
        write_value(w, v)?;
    }
    Ok(())
}

fn read_values<R: Read>(r: &mut R) -> io::Result<Values> {
    let count = read_u64(r)? as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_value(r)?);
    }
    Ok(values)
}

impl Frame {
    /// Encodes this frame as a length-prefixed byte buffer suitable for a
    /// stream transport (the length prefix lets the reader know how much of
    /// the socket to read before decoding).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        self.encode_body(&mut body).expect("encoding into a Vec cannot fail");
        let mut framed = Vec::with_capacity(body.len() + 8);
        framed.extend_from_slice(&(body.len() as u64).to_le_bytes());
        framed.extend_from_slice(&body);
        framed
    }

    fn encode_body<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Frame::Message {
                id,
                origin,
                target,
                name,
                values,
                wants_answer,
            } => {
                w.write_all(&[FRAME_MESSAGE])?;
                write_u64(w, *id)?;
                write_string(w, origin)?;
                write_string(w, target)?;
                write_string(w, name)?;
                write_values(w, values)?;
                w.write_all(&[u8::from(*wants_answer)])
            }
            Frame::Answer { id, values } => {
                w.write_all(&[FRAME_ANSWER])?;
                write_u64(w, *id)?;
                write_values(w, values)
            }
            Frame::Buffer {
                object,
                timestamp,
                payload,
            } => {
                w.write_all(&[FRAME_BUFFER])?;
                write_string(w, object)?;
                write_u64(w, *timestamp)?;
                write_bytes(w, payload)
            }
        }
    }

    /// Decodes one length-prefixed frame from `bytes`, which must hold
    /// exactly one frame body (without the length prefix) — the caller
    /// reads the length prefix from the stream first.
    pub fn decode_body(mut bytes: &[u8]) -> io::Result<Frame> {
        let r = &mut bytes;
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        Ok(match tag[0] {
            FRAME_MESSAGE => {
                let id = read_u64(r)?;
                let origin = read_string(r)?;
                let target = read_string(r)?;
                let name = read_string(r)?;
                let values = read_values(r)?;
                let mut wa = [0u8; 1];
                r.read_exact(&mut wa)?;
                Frame::Message {
                    id,
                    origin,
                    target,
                    name,
                    values,
                    wants_answer: wa[0] != 0,
                }
            }
            FRAME_ANSWER => Frame::Answer {
                id: read_u64(r)?,
                values: read_values(r)?,
            },
            FRAME_BUFFER => Frame::Buffer {
                object: read_string(r)?,
                timestamp: read_u64(r)?,
                payload: read_bytes(r)?,
            },
            other => return Err(io::Error::new(io::ErrorKind::InvalidData, format!("bad frame kind tag {other}"))),
        })
    }

    /// Reads the 8-byte length prefix, then that many body bytes, decoding
    /// one complete frame from a stream.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Frame> {
        let len = read_u64(r)? as usize;
        let mut body = vec![0u8; len];
        r.read_exact(&mut body)?;
        Frame::decode_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_frame_round_trips() {
        let frame = Frame::Message {
            id: 7,
            origin: "S1".into(),
            target: "cam1".into(),
            name: "position".into(),
            values: vec![Value::Integer(10), Value::Integer(20)],
            wants_answer: true,
        };
        let encoded = frame.encode();
        let decoded = Frame::read_from(&mut &encoded[..]).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn buffer_frame_round_trips_with_empty_payload() {
        let frame = Frame::Buffer {
            object: "img1".into(),
            timestamp: 42,
            payload: Vec::new(),
        };
        let encoded = frame.encode();
        let decoded = Frame::read_from(&mut &encoded[..]).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn nested_sequence_values_round_trip() {
        let frame = Frame::Answer {
            id: 1,
            values: vec![Value::Sequence(vec![Value::Real(1.5), Value::Bool(true)])],
        };
        let encoded = frame.encode();
        let decoded = Frame::read_from(&mut &encoded[..]).unwrap();
        assert_eq!(frame, decoded);
    }
}
