use crate::coding::{Decode, DecodeError, Encode, EncodeError, KeyValuePairs};
use crate::data::{ObjectStatus, StreamHeaderType};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubgroupHeader {
    pub header_type: StreamHeaderType,

    /// The track alias.
    pub track_alias: u64,

    /// The group sequence number
    pub group_id: u64,

    /// The subgroup sequence number. `None` when the header type derives it
    /// from the first object instead of carrying it explicitly.
    pub subgroup_id: Option<u64>,

    /// Publisher priority, where **smaller** values are sent first.
    pub publisher_priority: u8,
}

impl SubgroupHeader {
    /// Decode the fields that follow an already-consumed `header_type` varint.
    pub fn decode<R: bytes::Buf>(header_type: StreamHeaderType, r: &mut R) -> Result<Self, DecodeError> {
        let track_alias = u64::decode(r)?;
        let group_id = u64::decode(r)?;
        let subgroup_id = if header_type.has_subgroup_id() {
            Some(u64::decode(r)?)
        } else {
            None
        };
        let publisher_priority = u8::decode(r)?;

        Ok(Self {
            header_type,
            track_alias,
            group_id,
            subgroup_id,
            publisher_priority,
        })
    }
}

impl Encode for SubgroupHeader {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.header_type.encode(w)?;
        self.track_alias.encode(w)?;
        self.group_id.encode(w)?;
        if self.header_type.has_subgroup_id() {
            match self.subgroup_id {
                Some(id) => id.encode(w)?,
                None => return Err(EncodeError::MissingField("subgroup_id".to_string())),
            }
        }
        self.publisher_priority.encode(w)?;

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubgroupObject {
    pub object_id_delta: u64,
    pub extension_headers: Option<KeyValuePairs>,
    pub payload_length: usize,
    pub status: Option<ObjectStatus>,
}

impl SubgroupObject {
    /// Decode one object. `header_type` tells us whether extension headers
    /// are present on the wire for this stream.
    pub fn decode<R: bytes::Buf>(header_type: StreamHeaderType, r: &mut R) -> Result<Self, DecodeError> {
        let object_id_delta = u64::decode(r)?;
        let extension_headers = if header_type.has_extension_headers() {
            Some(KeyValuePairs::decode(r)?)
        } else {
            None
        };
        let payload_length = usize::decode(r)?;
        let status = match payload_length {
            0 => Some(ObjectStatus::decode(r)?),
            _ => None,
        };

        Ok(Self {
            object_id_delta,
            extension_headers,
            payload_length,
            status,
        })
    }
}

impl Encode for SubgroupObject {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.object_id_delta.encode(w)?;
        if let Some(extension_headers) = &self.extension_headers {
            extension_headers.encode(w)?;
        }
        self.payload_length.encode(w)?;
        if self.payload_length == 0 {
            match self.status {
                Some(status) => status.encode(w)?,
                None => return Err(EncodeError::MissingField("status".to_string())),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode_header_with_subgroup_id() {
        let mut buf = BytesMut::new();
        let header = SubgroupHeader {
            header_type: StreamHeaderType::SubgroupId,
            track_alias: 7,
            group_id: 1,
            subgroup_id: Some(2),
            publisher_priority: 128,
        };
        header.encode(&mut buf).unwrap();

        let header_type = StreamHeaderType::decode(&mut buf).unwrap();
        let decoded = SubgroupHeader::decode(header_type, &mut buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn encode_decode_header_without_subgroup_id() {
        let mut buf = BytesMut::new();
        let header = SubgroupHeader {
            header_type: StreamHeaderType::SubgroupZeroId,
            track_alias: 7,
            group_id: 1,
            subgroup_id: None,
            publisher_priority: 128,
        };
        header.encode(&mut buf).unwrap();

        let header_type = StreamHeaderType::decode(&mut buf).unwrap();
        let decoded = SubgroupHeader::decode(header_type, &mut buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn encode_decode_object_no_extensions() {
        let mut buf = BytesMut::new();
        let object = SubgroupObject {
            object_id_delta: 0,
            extension_headers: None,
            payload_length: 5,
            status: None,
        };
        object.encode(&mut buf).unwrap();
        let decoded = SubgroupObject::decode(StreamHeaderType::SubgroupZeroId, &mut buf).unwrap();
        assert_eq!(decoded, object);
    }

    #[test]
    fn encode_decode_object_status_only() {
        let mut buf = BytesMut::new();
        let object = SubgroupObject {
            object_id_delta: 3,
            extension_headers: None,
            payload_length: 0,
            status: Some(ObjectStatus::EndOfGroup),
        };
        object.encode(&mut buf).unwrap();
        let decoded = SubgroupObject::decode(StreamHeaderType::SubgroupZeroId, &mut buf).unwrap();
        assert_eq!(decoded, object);
    }
}
