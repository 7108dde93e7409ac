use bytes::Buf;

/// Decode a type from a buffer, symmetric with [`super::Encode`].
pub trait Decode: Sized {
    /// Decode a value from the buffer.
    ///
    /// Returns `DecodeError::More(n)` if the buffer doesn't contain enough
    /// bytes yet; the caller should read `n` more bytes and try again.
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError>;

    /// Checks that at least `required` bytes remain, without consuming any.
    fn decode_remaining<R: Buf>(r: &R, required: usize) -> Result<(), DecodeError> {
        let remaining = r.remaining();
        if remaining < required {
            Err(DecodeError::More(required - remaining))
        } else {
            Ok(())
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("needs {0} more bytes")]
    More(usize),

    #[error("invalid value")]
    InvalidValue,

    #[error("invalid message type: {0}")]
    InvalidMessage(u64),

    #[error("invalid stream header type")]
    InvalidHeaderType,

    #[error("invalid datagram type")]
    InvalidDatagramType,

    #[error("invalid fetch type")]
    InvalidFetchType,

    #[error("invalid filter type")]
    InvalidFilterType,

    #[error("invalid group order")]
    InvalidGroupOrder,

    #[error("invalid object status")]
    InvalidObjectStatus,

    #[error("invalid setup parameter")]
    InvalidParameter,

    #[error("missing required parameter")]
    MissingParameter,

    #[error("varint bounds exceeded")]
    BoundsExceeded(#[from] super::BoundsExceeded),

    #[error("duplicate parameter: {0}")]
    DuplicateParameter(u64),

    #[error("key-value-pair length exceeded")]
    KeyValuePairLengthExceeded(),

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("invalid utf-8: {0}")]
    InvalidUtf8(String),
}

impl From<std::string::FromUtf8Error> for DecodeError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        DecodeError::InvalidUtf8(e.to_string())
    }
}

impl DecodeError {
    /// The MoQ session-termination error code for this decode error,
    /// per draft-ietf-moq-transport-14 Section 13.1.1. Anything that
    /// indicates malformed framing or an unparsable message is a
    /// PROTOCOL_VIOLATION.
    pub fn code(&self) -> u64 {
        match self {
            Self::More(_) => 0x3,
            _ => 0x3,
        }
    }
}
