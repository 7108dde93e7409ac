use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Filter Types
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterType {
    NextGroupStart = 0x1,
    LargestObject = 0x2,
    AbsoluteStart = 0x3,
    AbsoluteRange = 0x4,
}

impl Encode for FilterType {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let val = *self as u64;
        val.encode(w)?;
        Ok(())
    }
}

impl Decode for FilterType {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u64::decode(r)? {
            0x1_u64 => Ok(Self::NextGroupStart),
            0x2_u64 => Ok(Self::LargestObject),
            0x3_u64 => Ok(Self::AbsoluteStart),
            0x4_u64 => Ok(Self::AbsoluteRange),
            _ => Err(DecodeError::InvalidFilterType),
        }
    }
}
