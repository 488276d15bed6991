//! Reply frames of the Redis serialization protocol (RESP2).

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// One reply written back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+<text>`
    Simple(String),
    /// `-<text>`; the text already carries its `ERR` prefix
    Error(String),
    /// `:<n>`
    Integer(i64),
    /// `$<len>` followed by the payload
    Bulk(Bytes),
    /// `$-1`
    Null,
}

impl Frame {
    /// The `+OK` acknowledgement.
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// An error reply with the conventional `ERR ` prefix.
    pub fn error(message: impl fmt::Display) -> Self {
        Frame::Error(format!("ERR {}", message))
    }

    /// Appends the wire encoding of this frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        match self {
            Frame::Simple(text) => {
                dst.put_u8(b'+');
                put_line(dst, text.as_bytes());
            }
            Frame::Error(text) => {
                dst.put_u8(b'-');
                // Error text must stay on one line.
                let text = text.replace(&['\r', '\n'][..], " ");
                put_line(dst, text.as_bytes());
            }
            Frame::Integer(n) => {
                dst.put_u8(b':');
                put_line(dst, n.to_string().as_bytes());
            }
            Frame::Bulk(payload) => {
                dst.put_u8(b'$');
                put_line(dst, payload.len().to_string().as_bytes());
                put_line(dst, payload);
            }
            Frame::Null => dst.put_slice(b"$-1\r\n"),
        }
    }
}

fn put_line(dst: &mut BytesMut, line: &[u8]) {
    dst.reserve(line.len() + 2);
    dst.put_slice(line);
    dst.put_slice(b"\r\n");
}
