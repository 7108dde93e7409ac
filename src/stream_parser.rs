//! Data-stream parser (C4): a per-stream state machine that turns the raw
//! bytes of one unidirectional stream into a sequence of decoded objects.
//!
//! Each incoming stream starts with a `SUBGROUP_HEADER` or `FETCH_HEADER`
//! variant (selected by the stream's first varint) and is otherwise *not*
//! length-prefixed at the message level: bytes accumulate until FIN.

use std::io;

use bytes::{Buf, Bytes, BytesMut};

use crate::coding::{Decode, DecodeError, KeyValuePairs};
use crate::data::{FetchHeader, FetchObject, ObjectStatus, StreamHeaderType, SubgroupHeader, SubgroupObject};

/// One fully-decoded object, independent of whether it arrived on a subgroup
/// stream or a fetch stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedObject {
    pub track_alias: Option<u64>,
    pub request_id: Option<u64>,
    pub group_id: u64,
    pub subgroup_id: u64,
    pub object_id: u64,
    pub publisher_priority: u8,
    pub extension_headers: Option<KeyValuePairs>,
    pub payload: Option<Bytes>,
    pub status: Option<ObjectStatus>,
}

enum State {
    WaitingHeader,
    WaitingObjects {
        header_type: StreamHeaderType,
        subgroup_header: Option<SubgroupHeader>,
        fetch_header: Option<FetchHeader>,
        prev_object_id: Option<u64>,
        subgroup_id_resolved: Option<u64>,
    },
    Done,
}

pub struct DataStreamParser {
    buffer: BytesMut,
    state: State,
}

impl DataStreamParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            state: State::WaitingHeader,
        }
    }

    pub fn feed(&mut self, bytes: Bytes) {
        self.buffer.extend_from_slice(&bytes);
    }

    /// Extract every object that is fully buffered. If `is_complete` is set
    /// (the carrier reported FIN), the stream's state is torn down after
    /// draining, and any leftover partial bytes are reported as an error.
    pub fn drain(&mut self, is_complete: bool) -> Result<Vec<ParsedObject>, DecodeError> {
        let mut out = Vec::new();

        loop {
            match &self.state {
                State::WaitingHeader => {
                    let mut cursor = io::Cursor::new(&self.buffer[..]);
                    let header_type = match StreamHeaderType::decode(&mut cursor) {
                        Ok(t) => t,
                        Err(DecodeError::More(_)) => break,
                        Err(err) => return Err(err),
                    };

                    let (subgroup_header, fetch_header, subgroup_id_resolved) = if header_type.is_subgroup() {
                        match SubgroupHeader::decode(header_type, &mut cursor) {
                            Ok(h) => {
                                let resolved = if header_type.has_subgroup_id() {
                                    h.subgroup_id
                                } else if header_type.derives_subgroup_id_from_first_object() {
                                    None
                                } else {
                                    Some(0)
                                };
                                (Some(h), None, resolved)
                            }
                            Err(DecodeError::More(_)) => break,
                            Err(err) => return Err(err),
                        }
                    } else {
                        match FetchHeader::decode(header_type, &mut cursor) {
                            Ok(h) => (None, Some(h), Some(0)),
                            Err(DecodeError::More(_)) => break,
                            Err(err) => return Err(err),
                        }
                    };

                    let consumed = cursor.position() as usize;
                    self.buffer.advance(consumed);
                    self.state = State::WaitingObjects {
                        header_type,
                        subgroup_header,
                        fetch_header,
                        prev_object_id: None,
                        subgroup_id_resolved,
                    };
                }
                State::WaitingObjects { .. } => {
                    let mut cursor = io::Cursor::new(&self.buffer[..]);
                    let decoded = {
                        let State::WaitingObjects { header_type, .. } = &self.state else {
                            unreachable!()
                        };
                        if header_type.is_subgroup() {
                            SubgroupObject::decode(*header_type, &mut cursor).map(Decoded::Subgroup)
                        } else {
                            FetchObject::decode(&mut cursor).map(Decoded::Fetch)
                        }
                    };

                    let decoded = match decoded {
                        Ok(d) => d,
                        Err(DecodeError::More(_)) => break,
                        Err(err) => return Err(err),
                    };

                    let header_len = cursor.position() as usize;
                    let payload_length = match &decoded {
                        Decoded::Subgroup(o) if o.status.is_none() => o.payload_length,
                        Decoded::Fetch(o) if o.status.is_none() => o.payload_length,
                        _ => 0,
                    };

                    // The header fields decode cleanly, but the payload itself
                    // (not covered by `Decode`) may not have fully arrived yet.
                    if self.buffer.len() < header_len + payload_length {
                        break;
                    }

                    self.buffer.advance(header_len);
                    let payload = if payload_length > 0 {
                        Some(self.buffer.split_to(payload_length).freeze())
                    } else {
                        None
                    };

                    let State::WaitingObjects {
                        header_type,
                        subgroup_header,
                        fetch_header,
                        prev_object_id,
                        subgroup_id_resolved,
                    } = &mut self.state
                    else {
                        unreachable!()
                    };

                    out.push(Self::finish_object(
                        *header_type,
                        subgroup_header,
                        fetch_header,
                        prev_object_id,
                        subgroup_id_resolved,
                        decoded,
                        payload,
                    ));
                }
                State::Done => break,
            }
        }

        if is_complete {
            if !self.buffer.is_empty() {
                return Err(DecodeError::More(0));
            }
            self.state = State::Done;
        }

        Ok(out)
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish_object(
        header_type: StreamHeaderType,
        subgroup_header: &Option<SubgroupHeader>,
        fetch_header: &Option<FetchHeader>,
        prev_object_id: &mut Option<u64>,
        subgroup_id_resolved: &mut Option<u64>,
        decoded: Decoded,
        payload: Option<Bytes>,
    ) -> ParsedObject {
        let object_id = match *prev_object_id {
            None => match &decoded {
                Decoded::Subgroup(o) => o.object_id_delta,
                Decoded::Fetch(o) => o.object_id,
            },
            Some(prev) => match &decoded {
                Decoded::Subgroup(o) => prev + o.object_id_delta + 1,
                Decoded::Fetch(o) => o.object_id,
            },
        };
        *prev_object_id = Some(object_id);

        // The first object on a "subgroup id = first object id" stream backfills
        // the header's subgroup id.
        if subgroup_id_resolved.is_none() {
            *subgroup_id_resolved = Some(object_id);
        }

        match decoded {
            Decoded::Subgroup(o) => {
                let header = subgroup_header.as_ref().expect("subgroup header set for subgroup stream");
                ParsedObject {
                    track_alias: Some(header.track_alias),
                    request_id: None,
                    group_id: header.group_id,
                    subgroup_id: subgroup_id_resolved.unwrap_or(0),
                    object_id,
                    publisher_priority: header.publisher_priority,
                    extension_headers: o.extension_headers,
                    payload,
                    status: o.status,
                }
            }
            Decoded::Fetch(o) => {
                let header = fetch_header.as_ref().expect("fetch header set for fetch stream");
                ParsedObject {
                    track_alias: None,
                    request_id: Some(header.request_id),
                    group_id: o.group_id,
                    subgroup_id: o.subgroup_id,
                    object_id: o.object_id,
                    publisher_priority: o.publisher_priority,
                    extension_headers: Some(o.extension_headers),
                    payload,
                    status: o.status,
                }
            }
        }
    }
}

impl Default for DataStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

enum Decoded {
    Subgroup(SubgroupObject),
    Fetch(FetchObject),
}
