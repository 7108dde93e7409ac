//! A client-side Media over QUIC Transport engine (draft-ietf-moq-transport-14).
//!
//! The engine is transport-agnostic: it speaks the MoQT wire format and
//! session state machine against any [`carrier::Carrier`] implementation,
//! leaving the actual QUIC/WebTransport connection to the caller.

pub mod carrier;
pub mod coding;
pub mod data;
pub mod framer;
pub mod message;
pub mod session;
pub mod setup;
pub mod stream_parser;

pub use carrier::Carrier;
pub use session::{Session, SessionError};
