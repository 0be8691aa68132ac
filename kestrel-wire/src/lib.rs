//! # Shared Wire Format (Instrument ↔ Agent)
//!
//! Defines the records an instrumented child process writes onto the local
//! socket, and the codec the agent uses to read them back. Both sides of the
//! boundary depend on this crate so the shapes cannot drift apart.
//!
//! ## Records
//!
//! - [`Event`] — one function entry or exit, timestamped at the call site.
//! - [`StackRecord`] — one pre-built root→leaf stack snapshot, optionally
//!   pre-aggregated with a per-frame call count.
//!
//! ## Encoding
//!
//! Little-endian, tag-prefixed, fixed-shape:
//!
//! ```text
//! 0x01  fn:u64  cs:u64  kind:u8  t:i64            (event)
//! 0x02  depth:u16  depth × (fn:u64 cs:u64 n:u32)  (stack snapshot)
//! ```
//!
//! The transport is a byte stream, so [`decode`] is incremental: it parses
//! at most one record from the front of a buffer and reports how many bytes
//! it consumed, or that the buffer does not yet hold a complete record.

use thiserror::Error;

/// Maximum frames in a single stack record.
///
/// A deeper record is treated as corrupt rather than allocated for; real
/// instrumented stacks stay far below this.
pub const MAX_STACK_DEPTH: usize = 512;

/// Wire tag for an enter/exit event record.
pub const TAG_EVENT: u8 = 0x01;

/// Wire tag for a stack snapshot record.
pub const TAG_STACK: u8 = 0x02;

const EVENT_PAYLOAD_LEN: usize = 8 + 8 + 1 + 8;
const STACK_FRAME_LEN: usize = 8 + 8 + 4;

/// One point in the call graph: a function entered from a particular
/// call site. Two frames are equal iff both addresses match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    pub function_addr: u64,
    pub callsite_addr: u64,
}

impl Frame {
    #[must_use]
    pub const fn new(function_addr: u64, callsite_addr: u64) -> Self {
        Self { function_addr, callsite_addr }
    }
}

/// Whether an [`Event`] marks the start or the end of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Enter,
    Exit,
}

impl EventKind {
    const fn as_wire(self) -> u8 {
        match self {
            Self::Enter => 0,
            Self::Exit => 1,
        }
    }
}

/// A single timestamped entry or exit reported by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub frame: Frame,
    pub kind: EventKind,
    pub timestamp_ns: i64,
}

/// One frame of a [`StackRecord`], with an optional pre-aggregated call
/// count. `ncalls == 0` means the producer reported no call weight for the
/// frame, only its presence on the sampled stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledFrame {
    pub frame: Frame,
    pub ncalls: u32,
}

/// A complete root→leaf stack snapshot from a sampling-mode instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRecord {
    pub frames: Vec<SampledFrame>,
}

/// One decoded wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Event(Event),
    Stack(StackRecord),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown record tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("invalid event kind {0}")]
    BadKind(u8),

    #[error("stack record depth {0} exceeds limit {MAX_STACK_DEPTH}")]
    StackTooDeep(u16),
}

/// Try to decode one record from the front of `buf`.
///
/// Returns the record and the number of bytes consumed, or `Ok(None)` when
/// `buf` does not yet hold a complete record and more input is needed.
/// Errors are not recoverable: a stream that produced one is corrupt.
pub fn decode(buf: &[u8]) -> Result<Option<(Record, usize)>, DecodeError> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };
    let body = &buf[1..];

    match tag {
        TAG_EVENT => {
            if body.len() < EVENT_PAYLOAD_LEN {
                return Ok(None);
            }
            let function_addr = read_u64(&body[0..8]);
            let callsite_addr = read_u64(&body[8..16]);
            let kind = match body[16] {
                0 => EventKind::Enter,
                1 => EventKind::Exit,
                other => return Err(DecodeError::BadKind(other)),
            };
            let timestamp_ns = read_i64(&body[17..25]);
            let event = Event {
                frame: Frame::new(function_addr, callsite_addr),
                kind,
                timestamp_ns,
            };
            Ok(Some((Record::Event(event), 1 + EVENT_PAYLOAD_LEN)))
        }
        TAG_STACK => {
            if body.len() < 2 {
                return Ok(None);
            }
            let depth = u16::from_le_bytes([body[0], body[1]]);
            if usize::from(depth) > MAX_STACK_DEPTH {
                return Err(DecodeError::StackTooDeep(depth));
            }
            let frames_len = usize::from(depth) * STACK_FRAME_LEN;
            if body.len() < 2 + frames_len {
                return Ok(None);
            }
            let mut frames = Vec::with_capacity(usize::from(depth));
            for chunk in body[2..2 + frames_len].chunks_exact(STACK_FRAME_LEN) {
                frames.push(SampledFrame {
                    frame: Frame::new(read_u64(&chunk[0..8]), read_u64(&chunk[8..16])),
                    ncalls: u32::from_le_bytes([chunk[16], chunk[17], chunk[18], chunk[19]]),
                });
            }
            Ok(Some((Record::Stack(StackRecord { frames }), 1 + 2 + frames_len)))
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

impl Record {
    /// Append the wire encoding of this record to `out`.
    ///
    /// # Panics
    ///
    /// Panics if a stack record exceeds [`MAX_STACK_DEPTH`]; producers must
    /// truncate before encoding.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Event(e) => {
                out.push(TAG_EVENT);
                out.extend_from_slice(&e.frame.function_addr.to_le_bytes());
                out.extend_from_slice(&e.frame.callsite_addr.to_le_bytes());
                out.push(e.kind.as_wire());
                out.extend_from_slice(&e.timestamp_ns.to_le_bytes());
            }
            Self::Stack(s) => {
                assert!(s.frames.len() <= MAX_STACK_DEPTH, "stack record too deep");
                out.push(TAG_STACK);
                let depth = u16::try_from(s.frames.len()).expect("depth fits in u16");
                out.extend_from_slice(&depth.to_le_bytes());
                for f in &s.frames {
                    out.extend_from_slice(&f.frame.function_addr.to_le_bytes());
                    out.extend_from_slice(&f.frame.callsite_addr.to_le_bytes());
                    out.extend_from_slice(&f.ncalls.to_le_bytes());
                }
            }
        }
    }
}

fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes(b.try_into().expect("slice is 8 bytes"))
}

fn read_i64(b: &[u8]) -> i64 {
    i64::from_le_bytes(b.try_into().expect("slice is 8 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(fn_addr: u64, cs_addr: u64, kind: EventKind, t: i64) -> Record {
        Record::Event(Event { frame: Frame::new(fn_addr, cs_addr), kind, timestamp_ns: t })
    }

    #[test]
    fn event_record_round_trips() {
        let rec = event(42, 311, EventKind::Enter, 1_000_000_007);
        let mut buf = Vec::new();
        rec.encode_into(&mut buf);

        let (decoded, used) = decode(&buf).expect("decodes").expect("complete");
        assert_eq!(decoded, rec);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn stack_record_round_trips() {
        let rec = Record::Stack(StackRecord {
            frames: vec![
                SampledFrame { frame: Frame::new(1, 2), ncalls: 3 },
                SampledFrame { frame: Frame::new(4, 5), ncalls: 0 },
            ],
        });
        let mut buf = Vec::new();
        rec.encode_into(&mut buf);

        let (decoded, used) = decode(&buf).expect("decodes").expect("complete");
        assert_eq!(decoded, rec);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn truncated_input_asks_for_more() {
        let rec = event(42, 311, EventKind::Exit, 99);
        let mut buf = Vec::new();
        rec.encode_into(&mut buf);

        // Every strict prefix is incomplete, never an error.
        for n in 0..buf.len() {
            assert_eq!(decode(&buf[..n]), Ok(None), "prefix of {n} bytes");
        }
    }

    #[test]
    fn two_records_decode_in_sequence() {
        let first = event(1, 2, EventKind::Enter, 10);
        let second = event(1, 2, EventKind::Exit, 20);
        let mut buf = Vec::new();
        first.encode_into(&mut buf);
        second.encode_into(&mut buf);

        let (a, used) = decode(&buf).unwrap().unwrap();
        let (b, rest) = decode(&buf[used..]).unwrap().unwrap();
        assert_eq!(a, first);
        assert_eq!(b, second);
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert_eq!(decode(&[0x7f, 0, 0]), Err(DecodeError::UnknownTag(0x7f)));
    }

    #[test]
    fn bad_event_kind_is_an_error() {
        let mut buf = Vec::new();
        event(1, 2, EventKind::Enter, 0).encode_into(&mut buf);
        buf[17] = 9; // kind byte
        assert_eq!(decode(&buf), Err(DecodeError::BadKind(9)));
    }

    #[test]
    fn oversized_stack_depth_is_an_error() {
        let depth = u16::try_from(MAX_STACK_DEPTH + 1).unwrap();
        let mut buf = vec![TAG_STACK];
        buf.extend_from_slice(&depth.to_le_bytes());
        assert_eq!(decode(&buf), Err(DecodeError::StackTooDeep(depth)));
    }

    #[test]
    fn frames_compare_by_both_addresses() {
        assert_eq!(Frame::new(1, 2), Frame::new(1, 2));
        assert_ne!(Frame::new(1, 2), Frame::new(1, 3));
        assert_ne!(Frame::new(1, 2), Frame::new(2, 2));
    }
}
