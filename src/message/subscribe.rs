use crate::coding::{
    Decode, DecodeError, Encode, EncodeError, KeyValuePairs, Location, TrackNamespace,
};
use crate::message::FilterType;
use crate::message::GroupOrder;

/// Sent by the subscriber to request a new subscription to a track.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Subscribe {
    /// The subscription request ID
    pub id: u64,

    /// Track properties
    pub track_namespace: TrackNamespace,
    pub track_name: String,

    /// Subscriber Priority
    pub subscriber_priority: u8,
    pub group_order: GroupOrder,

    /// Forward Flag
    pub forward: bool,

    /// Filter type
    pub filter_type: FilterType,

    /// The starting location for this subscription. Only present for "AbsoluteStart" and "AbsoluteRange" filter types.
    pub start_location: Option<Location>,
    /// End group id, inclusive, for the subscription, if applicable. Only present for "AbsoluteRange" filter type.
    pub end_group_id: Option<u64>,

    /// Subscribe Parameters
    pub params: KeyValuePairs,
}

impl Decode for Subscribe {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let id = u64::decode(r)?;

        let track_namespace = TrackNamespace::decode(r)?;
        let track_name = String::decode(r)?;

        let subscriber_priority = u8::decode(r)?;
        let group_order = GroupOrder::decode(r)?;

        let forward = bool::decode(r)?;

        let filter_type = FilterType::decode(r)?;
        let (start_location, end_group_id) = match filter_type {
            FilterType::AbsoluteStart => (Some(Location::decode(r)?), None),
            FilterType::AbsoluteRange => {
                let start = Location::decode(r)?;
                let end = u64::decode(r)?;
                (Some(start), Some(end))
            }
            FilterType::NextGroupStart | FilterType::LargestObject => (None, None),
        };

        let params = KeyValuePairs::decode(r)?;

        Ok(Self {
            id,
            track_namespace,
            track_name,
            subscriber_priority,
            group_order,
            forward,
            filter_type,
            start_location,
            end_group_id,
            params,
        })
    }
}

impl Encode for Subscribe {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.id.encode(w)?;

        self.track_namespace.encode(w)?;
        self.track_name.encode(w)?;

        self.subscriber_priority.encode(w)?;
        self.group_order.encode(w)?;

        self.forward.encode(w)?;

        self.filter_type.encode(w)?;
        match self.filter_type {
            FilterType::AbsoluteStart => {
                let start = self
                    .start_location
                    .as_ref()
                    .ok_or_else(|| EncodeError::MissingField("StartLocation".to_string()))?;
                start.encode(w)?;
            }
            FilterType::AbsoluteRange => {
                let start = self
                    .start_location
                    .as_ref()
                    .ok_or_else(|| EncodeError::MissingField("StartLocation".to_string()))?;
                start.encode(w)?;
                let end = self
                    .end_group_id
                    .ok_or_else(|| EncodeError::MissingField("EndGroupId".to_string()))?;
                end.encode(w)?;
            }
            FilterType::NextGroupStart | FilterType::LargestObject => {}
        }

        self.params.encode(w)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn base() -> Subscribe {
        Subscribe {
            id: 12345,
            track_namespace: TrackNamespace::from_utf8_path("test/path/to/resource"),
            track_name: "audiotrack".to_string(),
            subscriber_priority: 127,
            group_order: GroupOrder::Ascending,
            forward: true,
            filter_type: FilterType::LargestObject,
            start_location: None,
            end_group_id: None,
            params: Default::default(),
        }
    }

    #[test]
    fn encode_decode_latest() {
        let mut buf = BytesMut::new();
        let msg = base();
        msg.encode(&mut buf).unwrap();
        let decoded = Subscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_decode_absolute_range() {
        let mut buf = BytesMut::new();
        let msg = Subscribe {
            filter_type: FilterType::AbsoluteRange,
            start_location: Some(Location::new(12, 0)),
            end_group_id: Some(45),
            ..base()
        };
        msg.encode(&mut buf).unwrap();
        let decoded = Subscribe::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_missing_start_location() {
        let mut buf = BytesMut::new();
        let msg = Subscribe {
            filter_type: FilterType::AbsoluteStart,
            ..base()
        };
        let err = msg.encode(&mut buf).unwrap_err();
        assert!(matches!(err, EncodeError::MissingField(_)));
    }
}
