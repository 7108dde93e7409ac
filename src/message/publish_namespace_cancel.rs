use crate::coding::{Decode, DecodeError, Encode, EncodeError, ReasonPhrase, TrackNamespace};

/// Sent by the subscriber to terminate an Announce after PUBLISH_NAMESPACE_OK
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishNamespaceCancel {
    // Echo back the namespace that was reset
    pub track_namespace: TrackNamespace,
    // An error code.
    pub error_code: u64,
    // An optional, human-readable reason.
    pub reason_phrase: ReasonPhrase,
}

impl Decode for PublishNamespaceCancel {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let track_namespace = TrackNamespace::decode(r)?;
        let error_code = u64::decode(r)?;
        let reason_phrase = ReasonPhrase::decode(r)?;

        Ok(Self {
            track_namespace,
            error_code,
            reason_phrase,
        })
    }
}

impl Encode for PublishNamespaceCancel {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.track_namespace.encode(w)?;
        self.error_code.encode(w)?;
        self.reason_phrase.encode(w)?;

        Ok(())
    }
}
