//! The only dependency the session engine has on the outside world: a QUIC or
//! WebTransport connection capable of carrying a bidirectional control
//! stream, many unidirectional data streams, and datagrams.
//!
//! The engine is generic over `Carrier` so it never depends on a specific
//! QUIC stack. A real implementation wraps `quinn` or `web_transport`; tests
//! use an in-memory mock.

use bytes::Bytes;

/// Identifies one unidirectional data stream for the lifetime of the session.
pub type StreamId = u64;

/// Options accepted by [`Carrier::connect`].
#[derive(Clone, Debug, Default)]
pub struct ConnectOptions {
    /// Skip peer certificate validation. Only useful against local/dev relays.
    pub insecure: bool,

    /// URL path used to establish the WebTransport session.
    pub path: Option<String>,
}

/// One chunk of bytes read from an incoming unidirectional data stream.
#[derive(Clone, Debug)]
pub struct DataStreamChunk {
    pub stream_id: StreamId,
    pub bytes: Bytes,
    pub is_complete: bool,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum CarrierError {
    #[error("carrier connect failed: {0}")]
    Connect(String),

    #[error("carrier is closed")]
    Closed,

    #[error("carrier io error: {0}")]
    Io(String),
}

/// The carrier interface. All methods that touch the network are `async` so
/// that a single-threaded cooperative session task can suspend on them
/// without blocking the rest of the engine.
pub trait Carrier: Send {
    /// Establish the underlying QUIC/WebTransport connection. Does not write
    /// `CLIENT_SETUP` itself; that is the session engine's job.
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        options: ConnectOptions,
    ) -> Result<(), CarrierError>;

    /// Tear down the connection. Idempotent.
    async fn disconnect(&mut self);

    /// Write bytes onto the bidirectional control stream.
    async fn send_control(&mut self, bytes: Bytes) -> Result<(), CarrierError>;

    /// Open a new unidirectional stream, returning an id the caller uses for
    /// subsequent `stream_write`/`stream_finish` calls.
    async fn open_uni_stream(&mut self) -> Result<StreamId, CarrierError>;

    /// Write bytes to a previously opened unidirectional stream.
    async fn stream_write(&mut self, stream_id: StreamId, bytes: Bytes) -> Result<(), CarrierError>;

    /// Signal FIN on a unidirectional stream.
    async fn stream_finish(&mut self, stream_id: StreamId) -> Result<(), CarrierError>;

    /// Send an unreliable datagram.
    async fn send_datagram(&mut self, bytes: Bytes) -> Result<(), CarrierError>;

    /// Pull the next chunk of order-preserving control-stream bytes, or
    /// `None` once the stream has ended.
    fn incoming_control(&mut self) -> impl std::future::Future<Output = Option<Bytes>> + Send;

    /// Pull the next chunk from any incoming unidirectional data stream.
    fn incoming_data_streams(&mut self) -> impl std::future::Future<Output = Option<DataStreamChunk>> + Send;

    /// Pull the next incoming datagram.
    fn incoming_datagrams(&mut self) -> impl std::future::Future<Output = Option<Bytes>> + Send;

    /// Pull the next connection-state transition (`true` = connected).
    fn connection_state_events(&mut self) -> impl std::future::Future<Output = Option<bool>> + Send;
}
