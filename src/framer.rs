//! Control-stream framer (C3): turns the order-preserving byte stream the
//! carrier hands us into a sequence of complete [`Message`]s.
//!
//! Generalizes the buffer-accumulate-and-retry loop that a QUIC stream
//! reader needs, but without any dependency on the carrier itself: `feed`
//! appends bytes, `drain` extracts as many complete messages as currently
//! possible.

use std::io;

use bytes::{Buf, Bytes, BytesMut};

use crate::coding::{Decode, DecodeError};
use crate::message::Message;

/// What to do when `drain` hits bytes that don't decode as a valid message
/// header (as opposed to simply being incomplete).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MalformedPolicy {
    /// Drop one byte from the front and keep trying. Tolerates uncoordinated
    /// resync but can silently swallow real protocol violations.
    Resync,

    /// Stop draining and report the error so the caller can close the
    /// session with `PROTOCOL_VIOLATION`.
    Close,
}

pub struct ControlFramer {
    buffer: BytesMut,
    on_malformed: MalformedPolicy,
}

impl ControlFramer {
    pub fn new(on_malformed: MalformedPolicy) -> Self {
        Self {
            buffer: BytesMut::new(),
            on_malformed,
        }
    }

    /// Append newly-arrived control-stream bytes.
    pub fn feed(&mut self, bytes: Bytes) {
        self.buffer.extend_from_slice(&bytes);
    }

    /// Extract every complete message currently buffered, in order.
    ///
    /// Stops on `DecodeError::More` (not enough bytes yet, buffer left
    /// untouched). On any other decode error, either resyncs by dropping one
    /// byte and retrying, or returns the error immediately, depending on
    /// `on_malformed`.
    pub fn drain(&mut self) -> Result<Vec<Message>, DecodeError> {
        let mut out = Vec::new();

        loop {
            let mut cursor = io::Cursor::new(&self.buffer[..]);
            match Message::decode(&mut cursor) {
                Ok(msg) => {
                    let consumed = cursor.position() as usize;
                    self.buffer.advance(consumed);
                    out.push(msg);
                }
                Err(DecodeError::More(_)) => break,
                Err(err) => match self.on_malformed {
                    MalformedPolicy::Resync if !self.buffer.is_empty() => {
                        log::warn!("control framer: resyncing after {}", err);
                        self.buffer.advance(1);
                    }
                    _ => return Err(err),
                },
            }
        }

        Ok(out)
    }
}
