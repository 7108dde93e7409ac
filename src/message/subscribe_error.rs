use crate::coding::{Decode, DecodeError, Encode, EncodeError, ReasonPhrase};

/// Sent by the publisher to reject a Subscribe.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscribeError {
    /// The request ID of the Subscribe this message is replying to.
    pub id: u64,

    /// An error code.
    pub error_code: u64,

    /// An optional, human-readable reason.
    pub reason_phrase: ReasonPhrase,

    /// The track alias the publisher wants to use if the subscriber
    /// retries with a different track name, otherwise 0.
    pub track_alias: u64,
}

impl Decode for SubscribeError {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let id = u64::decode(r)?;
        let error_code = u64::decode(r)?;
        let reason_phrase = ReasonPhrase::decode(r)?;
        let track_alias = u64::decode(r)?;

        Ok(Self {
            id,
            error_code,
            reason_phrase,
            track_alias,
        })
    }
}

impl Encode for SubscribeError {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.id.encode(w)?;
        self.error_code.encode(w)?;
        self.reason_phrase.encode(w)?;
        self.track_alias.encode(w)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = SubscribeError {
            id: 12345,
            error_code: 0x4,
            reason_phrase: ReasonPhrase("Track does not exist".to_string()),
            track_alias: 0,
        };
        msg.encode(&mut buf).unwrap();
        let decoded = SubscribeError::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
