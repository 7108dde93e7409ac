use std::convert::TryFrom;

use bytes::{Buf, BufMut};

use super::{Decode, DecodeError, Encode, EncodeError};

/// A QUIC-style variable-length integer, as used throughout MoQ Transport.
///
/// Values up to 2^62-1 are encoded using the 2-bit length prefix scheme from
/// QUIC (RFC 9000 Section 16): the top two bits of the first byte select a
/// 1/2/4/8 byte encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

impl VarInt {
    pub const MAX: Self = Self((1 << 62) - 1);

    pub fn into_inner(self) -> u64 {
        self.0
    }

    pub const fn from_u32(v: u32) -> Self {
        Self(v as u64)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("varint exceeds 2^62-1")]
pub struct BoundsExceeded;

impl TryFrom<u64> for VarInt {
    type Error = BoundsExceeded;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        if v > Self::MAX.0 {
            Err(BoundsExceeded)
        } else {
            Ok(Self(v))
        }
    }
}

impl TryFrom<usize> for VarInt {
    type Error = BoundsExceeded;

    fn try_from(v: usize) -> Result<Self, Self::Error> {
        Self::try_from(v as u64)
    }
}

impl From<VarInt> for u64 {
    fn from(v: VarInt) -> Self {
        v.0
    }
}

impl From<u8> for VarInt {
    fn from(v: u8) -> Self {
        Self(v as u64)
    }
}

impl From<u32> for VarInt {
    fn from(v: u32) -> Self {
        Self(v as u64)
    }
}

impl Encode for VarInt {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let x = self.0;
        if x < 2u64.pow(6) {
            Self::encode_remaining(w, 1)?;
            w.put_u8(x as u8);
        } else if x < 2u64.pow(14) {
            Self::encode_remaining(w, 2)?;
            w.put_u16(0b01 << 14 | x as u16);
        } else if x < 2u64.pow(30) {
            Self::encode_remaining(w, 4)?;
            w.put_u32(0b10 << 30 | x as u32);
        } else if x < 2u64.pow(62) {
            Self::encode_remaining(w, 8)?;
            w.put_u64(0b11 << 62 | x);
        } else {
            return Err(EncodeError::BoundsExceeded(BoundsExceeded));
        }

        Ok(())
    }
}

impl Decode for VarInt {
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 1)?;
        let first = r.chunk()[0];
        let tag = first >> 6;

        Ok(match tag {
            0b00 => {
                Self::decode_remaining(r, 1)?;
                Self(r.get_u8() as u64 & 0x3f)
            }
            0b01 => {
                Self::decode_remaining(r, 2)?;
                Self(r.get_u16() as u64 & 0x3fff)
            }
            0b10 => {
                Self::decode_remaining(r, 4)?;
                Self(r.get_u32() as u64 & 0x3fff_ffff)
            }
            0b11 => {
                Self::decode_remaining(r, 8)?;
                Self(r.get_u64() & 0x3fff_ffff_ffff_ffff)
            }
            _ => unreachable!(),
        })
    }
}

impl Encode for usize {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        VarInt::try_from(*self)?.encode(w)
    }
}

impl Decode for usize {
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(VarInt::decode(r)?.into_inner() as usize)
    }
}

impl Encode for u64 {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        VarInt::try_from(*self)?.encode(w)
    }
}

impl Decode for u64 {
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(VarInt::decode(r)?.into_inner())
    }
}
