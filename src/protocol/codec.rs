//! Incremental request decoding.
//!
//! Accepts both multibulk requests (`*2\r\n$3\r\nGET\r\n$1\r\nk\r\n`) and
//! inline requests (`GET k\r\n`). A request split across reads is left in
//! the buffer untouched until the rest arrives; for multibulk requests the
//! codec remembers how far it has parsed.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, Result};
use crate::protocol::Frame;

/// Largest accepted bulk argument.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest accepted number of arguments in one multibulk request.
pub const MAX_MULTIBULK_LEN: usize = 1024 * 1024;

/// Longest accepted inline request or header line.
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// Arguments preallocated for a multibulk request, whatever its header
/// announces.
const MAX_PREALLOCATED_ARGS: usize = 1024;

/// Decodes requests into argument lists and encodes reply frames.
///
/// Keeps the progress of a multibulk request whose arguments have only
/// partly arrived, so each read resumes after the last complete argument
/// instead of re-parsing the request from its first byte.
#[derive(Debug, Default, Clone)]
pub struct RespCodec {
    partial: Option<Multibulk>,
}

/// A multibulk request in progress. Offsets are into the undrained input
/// buffer, which only grows until the request is complete.
#[derive(Debug, Clone)]
struct Multibulk {
    remaining: usize,
    args: Vec<Range<usize>>,
    /// Just past the last complete argument
    pos: usize,
}

impl RespCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RespCodec {
    type Item = Vec<Bytes>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Vec<Bytes>>> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }
            let parsed = match self.partial.take() {
                Some(request) => self.resume_multibulk(src, request)?,
                None if src[0] == b'*' => self.start_multibulk(src)?,
                None => parse_inline(src)?,
            };
            let Some((ranges, consumed)) = parsed else {
                return Ok(None);
            };

            let request = src.split_to(consumed).freeze();
            if ranges.is_empty() {
                // Blank line or `*0`; nothing to dispatch.
                continue;
            }
            return Ok(Some(ranges.into_iter().map(|r| request.slice(r)).collect()));
        }
    }
}

impl Encoder<Frame> for RespCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.encode(dst);
        Ok(())
    }
}

/// Argument positions of a complete request and the number of bytes it
/// occupies, or `None` when more input is needed.
type Parsed = Option<(Vec<Range<usize>>, usize)>;

impl RespCodec {
    fn start_multibulk(&mut self, buf: &[u8]) -> Result<Parsed> {
        let Some((header, pos)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let count = parse_len(header)
            .filter(|n| *n <= MAX_MULTIBULK_LEN as i64)
            .ok_or_else(|| Error::Protocol("invalid multibulk length".to_string()))?;
        if count <= 0 {
            return Ok(Some((Vec::new(), pos)));
        }

        let count = count as usize;
        let request = Multibulk {
            remaining: count,
            args: Vec::with_capacity(count.min(MAX_PREALLOCATED_ARGS)),
            pos,
        };
        self.resume_multibulk(buf, request)
    }

    /// Parses further arguments of `request`. Stashes it again when the
    /// input runs out.
    fn resume_multibulk(&mut self, buf: &[u8], mut request: Multibulk) -> Result<Parsed> {
        while request.remaining > 0 {
            match parse_bulk(buf, request.pos)? {
                Some((arg, next)) => {
                    request.args.push(arg);
                    request.pos = next;
                    request.remaining -= 1;
                }
                None => {
                    self.partial = Some(request);
                    return Ok(None);
                }
            }
        }
        Ok(Some((request.args, request.pos)))
    }
}

/// Parses one `$<len>\r\n<bytes>\r\n` argument at `pos`.
fn parse_bulk(buf: &[u8], pos: usize) -> Result<Option<(Range<usize>, usize)>> {
    match buf.get(pos) {
        None => return Ok(None),
        Some(b'$') => {}
        Some(other) => {
            return Err(Error::Protocol(format!(
                "expected '$', got '{}'",
                char::from(*other)
            )))
        }
    }
    let Some((header, start)) = read_line(buf, pos + 1)? else {
        return Ok(None);
    };
    let len = parse_len(header)
        .filter(|n| (0..=MAX_BULK_LEN as i64).contains(n))
        .ok_or_else(|| Error::Protocol("invalid bulk length".to_string()))?
        as usize;

    let end = start + len;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(Error::Protocol("invalid bulk terminator".to_string()));
    }
    Ok(Some((start..end, end + 2)))
}

fn parse_inline(buf: &[u8]) -> Result<Parsed> {
    let Some(newline) = buf.iter().position(|b| *b == b'\n') else {
        if buf.len() > MAX_INLINE_LEN {
            return Err(Error::Protocol("too big inline request".to_string()));
        }
        return Ok(None);
    };

    let line_end = if newline > 0 && buf[newline - 1] == b'\r' {
        newline - 1
    } else {
        newline
    };

    let mut args = Vec::new();
    let mut start = None;
    for (i, byte) in buf[..line_end].iter().enumerate() {
        match (byte.is_ascii_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                args.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        args.push(s..line_end);
    }
    Ok(Some((args, newline + 1)))
}

/// Reads a CRLF-terminated line starting at `from`. Returns the line and
/// the position just past its terminator.
fn read_line(buf: &[u8], from: usize) -> Result<Option<(&[u8], usize)>> {
    let rest = buf.get(from..).unwrap_or_default();
    let window = &rest[..rest.len().min(MAX_INLINE_LEN + 2)];
    match window.windows(2).position(|w| w == b"\r\n") {
        Some(i) => Ok(Some((&rest[..i], from + i + 2))),
        None if rest.len() > MAX_INLINE_LEN => {
            Err(Error::Protocol("too big header line".to_string()))
        }
        None => Ok(None),
    }
}

fn parse_len(digits: &[u8]) -> Option<i64> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}
