use crate::coding::{Decode, DecodeError, Encode, EncodeError, ReasonPhrase};

/// Sent by the subscriber to reject a PublishNamespace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishNamespaceError {
    /// The request ID of the PublishNamespace this message is replying to.
    pub id: u64,

    /// An error code.
    pub error_code: u64,

    /// An optional, human-readable reason.
    pub reason_phrase: ReasonPhrase,
}

impl Decode for PublishNamespaceError {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let id = u64::decode(r)?;
        let error_code = u64::decode(r)?;
        let reason_phrase = ReasonPhrase::decode(r)?;

        Ok(Self {
            id,
            error_code,
            reason_phrase,
        })
    }
}

impl Encode for PublishNamespaceError {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.id.encode(w)?;
        self.error_code.encode(w)?;
        self.reason_phrase.encode(w)?;

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

        let msg = PublishNamespaceError {
            id: 12345,
            error_code: 0x3,
            reason_phrase: ReasonPhrase("not supported".to_string()),
        };
        msg.encode(&mut buf).unwrap();
        let decoded = PublishNamespaceError::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
