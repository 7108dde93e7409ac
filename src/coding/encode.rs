use bytes::BufMut;

/// Encode a type to a buffer, symmetric with [`super::Decode`].
pub trait Encode: Sized {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError>;

    /// Sanity check that the writer has room for `size` more bytes.
    ///
    /// `BufMut` doesn't have a fallible write API, so this mostly catches
    /// bugs where a bounded field would silently overflow its limit.
    fn encode_remaining<W: BufMut>(w: &W, size: usize) -> Result<(), EncodeError> {
        let remaining = w.remaining_mut();
        if remaining < size {
            Err(EncodeError::More(size - remaining))
        } else {
            Ok(())
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("needs {0} more bytes of capacity")]
    More(usize),

    #[error("invalid value")]
    InvalidValue,

    #[error("varint bounds exceeded")]
    BoundsExceeded(#[from] super::BoundsExceeded),

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("message body exceeds u16 length prefix")]
    MsgBoundsExceeded,
}
