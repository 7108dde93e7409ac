use crate::{carrier::CarrierError, coding, setup};

#[derive(thiserror::Error, Debug, Clone)]
pub enum SessionError {
    #[error("carrier error: {0}")]
    Carrier(#[from] CarrierError),

    #[error("encode error: {0}")]
    Encode(#[from] coding::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] coding::DecodeError),

    #[error("unsupported versions: client={0:?} server={1:?}")]
    Version(setup::Versions, setup::Versions),

    #[error("setup timed out")]
    SetupTimeout,

    /// The role negotiated in the handshake was violated: e.g. a publisher
    /// sent a SUBSCRIBE, or a subscriber sent a PUBLISH.
    #[error("role violation")]
    RoleViolation,

    #[error("varint bounds exceeded")]
    BoundsExceeded(#[from] coding::BoundsExceeded),

    /// A duplicate request id or track alias was used.
    #[error("duplicate")]
    Duplicate,

    /// Too many requests are outstanding against the server-advertised limit.
    #[error("requests blocked: max_request_id={0}")]
    RequestsBlocked(u64),

    /// The session is no longer usable: the carrier closed, or GOAWAY fired.
    #[error("session closed")]
    Closed,

    #[error("internal error")]
    Internal,

    #[error("no matching request: {0}")]
    UnknownRequest(u64),
}

// Session Termination Error Codes from draft-ietf-moq-transport-14 Section 13.1.1
impl SessionError {
    /// An integer code that is sent over the wire on session close.
    pub fn code(&self) -> u64 {
        match self {
            Self::RoleViolation => 0x3,
            Self::Carrier(_) => 0x1,
            Self::Encode(_) => 0x1,
            Self::Internal => 0x1,
            Self::Version(..) => 0x15,
            Self::Decode(_) => 0x3,
            Self::BoundsExceeded(_) => 0x1,
            Self::Duplicate => 0x5,
            Self::RequestsBlocked(_) => 0x1a,
            Self::SetupTimeout => 0x1,
            Self::Closed => 0x1,
            Self::UnknownRequest(_) => 0x3,
        }
    }
}
