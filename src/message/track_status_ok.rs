use crate::coding::{Decode, DecodeError, Encode, EncodeError, KeyValuePairs, Location};
use crate::message::GroupOrder;

/// Sent by the publisher to answer a TrackStatus request with a point-in-time
/// status, without establishing an ongoing subscription.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrackStatusOk {
    /// The request ID of the TrackStatus this message is replying to.
    pub id: u64,

    /// Order groups would be delivered in, were the track subscribed to.
    pub group_order: GroupOrder,

    /// If content_exists, then largest_location is the location of the largest
    /// object available for this track.
    pub content_exists: bool,
    pub largest_location: Option<Location>,

    /// Optional parameters
    pub params: KeyValuePairs,
}

impl Decode for TrackStatusOk {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let id = u64::decode(r)?;
        let group_order = GroupOrder::decode(r)?;
        let content_exists = bool::decode(r)?;
        let largest_location = match content_exists {
            true => Some(Location::decode(r)?),
            false => None,
        };
        let params = KeyValuePairs::decode(r)?;

        Ok(Self {
            id,
            group_order,
            content_exists,
            largest_location,
            params,
        })
    }
}

impl Encode for TrackStatusOk {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.id.encode(w)?;
        self.group_order.encode(w)?;
        self.content_exists.encode(w)?;
        if self.content_exists {
            let largest = self
                .largest_location
                .as_ref()
                .ok_or_else(|| EncodeError::MissingField("LargestLocation".to_string()))?;
            largest.encode(w)?;
        }
        self.params.encode(w)?;

        Ok(())
    }
}
