use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Indicates whether an endpoint intends to publish, subscribe, or both.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Publisher = 0x0,
    Subscriber = 0x1,
    Both = 0x2,
}

impl Encode for Role {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let val = *self as u64;
        val.encode(w)
    }
}

impl Decode for Role {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::try_from(u64::decode(r)?)
    }
}

impl TryFrom<u64> for Role {
    type Error = DecodeError;

    fn try_from(v: u64) -> Result<Self, DecodeError> {
        match v {
            0x0 => Ok(Self::Publisher),
            0x1 => Ok(Self::Subscriber),
            0x2 => Ok(Self::Both),
            _ => Err(DecodeError::InvalidParameter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();
        let role = Role::Both;
        role.encode(&mut buf).unwrap();
        let decoded = Role::decode(&mut buf).unwrap();
        assert_eq!(decoded, role);
    }
}
