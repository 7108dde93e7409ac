use super::{ParameterType, Role, Versions};
use crate::coding::{Decode, DecodeError, Encode, EncodeError, KeyValuePairs, Value};

/// CLIENT_SETUP, the first message the client sends on the control stream.
#[derive(Debug)]
pub struct Client {
    /// The list of supported versions in preferred order.
    pub versions: Versions,

    /// Indicate if the client is a publisher, a subscriber, or both.
    pub role: Role,

    /// Remaining setup parameters (MAX_REQUEST_ID, PATH, AUTHORIZATION_TOKEN, ...).
    pub params: KeyValuePairs,
}

impl Decode for Client {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let typ = u64::decode(r)?;
        if typ != 0x20 {
            return Err(DecodeError::InvalidMessage(typ));
        }

        let _len = u16::decode(r)?;

        let versions = Versions::decode(r)?;
        let mut params = KeyValuePairs::decode(r)?;

        let role_key: u64 = ParameterType::Role.into();
        let role = match params.get(role_key) {
            Some(kv) => match &kv.value {
                Value::IntValue(v) => Role::try_from(*v)?,
                Value::BytesValue(_) => return Err(DecodeError::InvalidParameter),
            },
            None => return Err(DecodeError::MissingParameter),
        };
        params.0.remove(&role_key);

        Ok(Self {
            versions,
            role,
            params,
        })
    }
}

impl Encode for Client {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        0x20_u64.encode(w)?;

        let mut buf = Vec::new();

        self.versions.encode(&mut buf)?;

        let mut params = self.params.clone();
        params.set_intvalue(ParameterType::Role.into(), self.role as u64);
        params.encode(&mut buf)?;

        if buf.len() > u16::MAX as usize {
            return Err(EncodeError::MsgBoundsExceeded);
        }
        (buf.len() as u16).encode(w)?;

        Self::encode_remaining(w, buf.len())?;
        w.put_slice(&buf);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::Version;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();
        let mut params = KeyValuePairs::default();
        params.set_varint(ParameterType::MaxRequestId.into(), 128);

        let client = Client {
            versions: [Version::DRAFT_14].into(),
            role: Role::Both,
            params,
        };

        client.encode(&mut buf).unwrap();
        let mut decoded = Client::decode(&mut buf).unwrap();
        assert_eq!(decoded.versions, client.versions);
        assert_eq!(decoded.role, client.role);
        assert_eq!(
            decoded.params.get_varint(ParameterType::MaxRequestId.into()).unwrap(),
            Some(128)
        );
    }

    #[test]
    fn decode_missing_role() {
        let mut buf = BytesMut::new();
        0x20_u64.encode(&mut buf).unwrap();
        let mut body = Vec::new();
        Versions::from([Version::DRAFT_14]).encode(&mut body).unwrap();
        KeyValuePairs::default().encode(&mut body).unwrap();
        (body.len() as u16).encode(&mut buf).unwrap();
        buf.extend_from_slice(&body);

        let err = Client::decode(&mut buf).unwrap_err();
        assert!(matches!(err, DecodeError::MissingParameter));
    }
}
