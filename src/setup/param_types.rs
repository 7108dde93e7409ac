/// Setup Parameter Types, per draft-ietf-moq-transport-14 Section 8.2.
///
/// MAX_REQUEST_ID is 0x01 and PATH is 0x02, per Section 8.2 of the draft.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u64)]
pub enum ParameterType {
    Role = 0x0,
    MaxRequestId = 0x1,
    Path = 0x2,
    AuthorizationToken = 0x3,
    MaxAuthTokenCacheSize = 0x4,
    Authority = 0x5,
    MOQTImplementation = 0x7,
}

impl From<ParameterType> for u64 {
    fn from(value: ParameterType) -> Self {
        value as u64
    }
}
