//! The session engine: owns the handshake, request-id allocation, control
//! message correlation, and ingress object routing, independent of the
//! carrier underneath it.
//!
//! Each of the carrier's four ingress sequences runs on its own cloned
//! handle (mirroring how a cloned QUIC connection handle lets independent
//! tasks read concurrently), so the engine never needs to multiplex them
//! through a single `&mut` borrow.

mod error;
pub use error::SessionError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::carrier::{Carrier, ConnectOptions, DataStreamChunk, StreamId};
use crate::coding::{Decode, Encode, KeyValuePairs, Location, TrackNamespace};
use crate::data;
use crate::framer::{ControlFramer, MalformedPolicy};
use crate::message::{self, FetchType, FilterType, GroupOrder, Message};
use crate::setup::{self, ParameterType};
use crate::stream_parser::{DataStreamParser, ParsedObject};

/// Versions this engine offers during the handshake, in preference order.
pub const SUPPORTED_VERSIONS: &[setup::Version] = &[setup::Version::DRAFT_14];

/// Initial concurrent-request allowance advertised to the peer via the
/// MAX_REQUEST_ID setup parameter.
pub const DEFAULT_MAX_REQUEST_ID: u64 = 128;

const SETUP_TIMEOUT: Duration = Duration::from_secs(10);

/// A caller-declared track kind, supplied at subscribe time for the
/// caller's own bookkeeping. The engine never inspects it: ingress object
/// routing is keyed entirely on track alias / request id, not on track
/// or namespace name, so renaming a track can't silently misroute it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrackKind {
    Audio,
    Video,
    Other,
}

/// The object range a SUBSCRIBE asks for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubscribeFilter {
    NextGroupStart,
    LargestObject,
    AbsoluteStart(Location),
    AbsoluteRange(Location, u64),
}

impl SubscribeFilter {
    fn filter_type(&self) -> FilterType {
        match self {
            Self::NextGroupStart => FilterType::NextGroupStart,
            Self::LargestObject => FilterType::LargestObject,
            Self::AbsoluteStart(_) => FilterType::AbsoluteStart,
            Self::AbsoluteRange(..) => FilterType::AbsoluteRange,
        }
    }

    fn start_location(&self) -> Option<Location> {
        match self {
            Self::AbsoluteStart(loc) | Self::AbsoluteRange(loc, _) => Some(*loc),
            _ => None,
        }
    }

    fn end_group_id(&self) -> Option<u64> {
        match self {
            Self::AbsoluteRange(_, end) => Some(*end),
            _ => None,
        }
    }
}

fn subscribe_filter_from_wire(filter_type: FilterType, start_location: Option<Location>, end_group_id: Option<u64>) -> SubscribeFilter {
    match filter_type {
        FilterType::NextGroupStart => SubscribeFilter::NextGroupStart,
        FilterType::LargestObject => SubscribeFilter::LargestObject,
        FilterType::AbsoluteStart => SubscribeFilter::AbsoluteStart(start_location.unwrap_or_default()),
        FilterType::AbsoluteRange => {
            SubscribeFilter::AbsoluteRange(start_location.unwrap_or_default(), end_group_id.unwrap_or_default())
        }
    }
}

/// What a SUBSCRIBE_OK carried.
#[derive(Clone, Debug)]
pub struct SubscribeOkInfo {
    pub track_alias: u64,
    pub expires: u64,
    pub group_order: GroupOrder,
    pub content_exists: bool,
    pub largest_location: Option<Location>,
}

/// What a FETCH_OK carried.
#[derive(Clone, Debug)]
pub struct FetchOkInfo {
    pub group_order: GroupOrder,
    pub end_of_track: bool,
    pub end_location: Location,
}

#[derive(Clone, Debug)]
pub struct GoawayEvent {
    pub new_uri: Option<String>,
}

impl GoawayEvent {
    pub fn has_migration_uri(&self) -> bool {
        self.new_uri.is_some()
    }
}

/// A peer offering to publish a track to us (PUBLISH), surfaced for the
/// application to accept or reject.
#[derive(Clone, Debug)]
pub struct IncomingPublish {
    pub id: u64,
    pub track_namespace: TrackNamespace,
    pub track_name: String,
    pub track_alias: u64,
}

/// A peer asking us to publish a track to them (SUBSCRIBE), surfaced for the
/// application to accept or reject. Only relevant when we hold the
/// publisher role.
#[derive(Clone, Debug)]
pub struct IncomingSubscribe {
    pub id: u64,
    pub track_namespace: TrackNamespace,
    pub track_name: String,
    pub filter: SubscribeFilter,
}

type ResponseTx<T> = oneshot::Sender<Result<T, (u64, String)>>;
type ResponseRx<T> = oneshot::Receiver<Result<T, (u64, String)>>;

struct Subscription {
    objects: mpsc::UnboundedSender<ParsedObject>,
}

struct State {
    peer_max_request_id: u64,
    goaway_received: bool,
    closed: bool,

    pending_subscribes: HashMap<u64, ResponseTx<SubscribeOkInfo>>,
    subscriptions: HashMap<u64, Subscription>,
    alias_to_request: HashMap<u64, u64>,

    pending_fetches: HashMap<u64, ResponseTx<FetchOkInfo>>,
    fetches: HashMap<u64, mpsc::UnboundedSender<ParsedObject>>,

    pending_namespace_announcements: HashMap<u64, ResponseTx<()>>,
    pending_namespace_subscriptions: HashMap<u64, ResponseTx<()>>,

    incoming_publish: HashMap<u64, IncomingPublish>,
    incoming_subscribe: HashMap<u64, IncomingSubscribe>,
}

impl State {
    fn new(peer_max_request_id: u64) -> Self {
        Self {
            peer_max_request_id,
            goaway_received: false,
            closed: false,
            pending_subscribes: HashMap::new(),
            subscriptions: HashMap::new(),
            alias_to_request: HashMap::new(),
            pending_fetches: HashMap::new(),
            fetches: HashMap::new(),
            pending_namespace_announcements: HashMap::new(),
            pending_namespace_subscriptions: HashMap::new(),
            incoming_publish: HashMap::new(),
            incoming_subscribe: HashMap::new(),
        }
    }
}

struct Inner<C: Carrier> {
    egress: tokio::sync::Mutex<C>,
    request_ids: AtomicU64,
    state: Mutex<State>,

    connection_state_tx: broadcast::Sender<bool>,
    goaway_tx: broadcast::Sender<GoawayEvent>,
    incoming_publish_tx: broadcast::Sender<IncomingPublish>,
    incoming_subscribe_tx: broadcast::Sender<IncomingSubscribe>,
}

/// A running MoQ Transport session, generic over the carrier that moves
/// bytes for it. Cheap to clone: every clone shares the same handshake
/// result, correlation tables, and ingress task.
#[derive(Clone)]
pub struct Session<C: Carrier> {
    inner: Arc<Inner<C>>,
}

enum IngressEvent {
    Control(Option<Bytes>),
    Data(Option<DataStreamChunk>),
    Datagram(Option<Bytes>),
    ConnectionState(Option<bool>),
}

impl<C: Carrier + Clone + 'static> Session<C> {
    /// Connect the carrier, run the CLIENT_SETUP/SERVER_SETUP exchange, and
    /// spawn the background ingress task. Returns once the session is ready
    /// to carry requests.
    pub async fn connect(
        mut carrier: C,
        host: &str,
        port: u16,
        options: ConnectOptions,
        role: setup::Role,
    ) -> Result<Self, SessionError> {
        carrier.connect(host, port, options).await?;

        let mut params = KeyValuePairs::new();
        params.set_varint(ParameterType::MaxRequestId.into(), DEFAULT_MAX_REQUEST_ID);

        let client = setup::Client {
            versions: SUPPORTED_VERSIONS.to_vec().into(),
            role,
            params,
        };

        log::debug!("sending CLIENT_SETUP: {:?}", client);
        let mut buf = BytesMut::new();
        client.encode(&mut buf)?;
        carrier.send_control(buf.freeze()).await?;

        let mut server = tokio::time::timeout(SETUP_TIMEOUT, Self::read_server_setup(&mut carrier))
            .await
            .map_err(|_| SessionError::SetupTimeout)??;
        log::debug!("received SERVER_SETUP: {:?}", server);

        if !SUPPORTED_VERSIONS.contains(&server.version) {
            return Err(SessionError::Version(client.versions, [server.version].into()));
        }

        let peer_max_request_id = server
            .params
            .get_varint(ParameterType::MaxRequestId.into())?
            .unwrap_or(0);

        let (connection_state_tx, _) = broadcast::channel(16);
        let (goaway_tx, _) = broadcast::channel(16);
        let (incoming_publish_tx, _) = broadcast::channel(64);
        let (incoming_subscribe_tx, _) = broadcast::channel(64);

        let inner = Arc::new(Inner {
            egress: tokio::sync::Mutex::new(carrier.clone()),
            request_ids: AtomicU64::new(0),
            state: Mutex::new(State::new(peer_max_request_id)),
            connection_state_tx,
            goaway_tx,
            incoming_publish_tx,
            incoming_subscribe_tx,
        });

        let session = Self { inner };

        let _ = session.inner.connection_state_tx.send(true);
        tokio::spawn(session.clone().run_ingress(carrier));

        Ok(session)
    }

    async fn read_server_setup(carrier: &mut C) -> Result<setup::Server, SessionError> {
        let mut buf = BytesMut::new();
        loop {
            let chunk = carrier.incoming_control().await.ok_or(SessionError::Closed)?;
            buf.extend_from_slice(&chunk);
            let mut cursor = std::io::Cursor::new(&buf[..]);
            match setup::Server::decode(&mut cursor) {
                Ok(server) => return Ok(server),
                Err(crate::coding::DecodeError::More(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Close the underlying carrier and fail every outstanding request.
    pub async fn disconnect(&self) {
        self.fail_all(SessionError::Closed);
        self.inner.egress.lock().await.disconnect().await;
    }

    /// A stream of connection-state transitions (`true` = connected).
    pub fn connection_state(&self) -> broadcast::Receiver<bool> {
        self.inner.connection_state_tx.subscribe()
    }

    /// A stream of GOAWAY events.
    pub fn goaway_events(&self) -> broadcast::Receiver<GoawayEvent> {
        self.inner.goaway_tx.subscribe()
    }

    /// A stream of peers offering to publish a track to us.
    pub fn incoming_publish_requests(&self) -> broadcast::Receiver<IncomingPublish> {
        self.inner.incoming_publish_tx.subscribe()
    }

    /// A stream of peers asking us to publish a track to them.
    pub fn incoming_subscribe_requests(&self) -> broadcast::Receiver<IncomingSubscribe> {
        self.inner.incoming_subscribe_tx.subscribe()
    }

    fn allocate_request_id(&self) -> u64 {
        self.inner.request_ids.fetch_add(2, Ordering::Relaxed)
    }

    async fn send_control_message(&self, msg: Message) -> Result<(), SessionError> {
        let mut buf = BytesMut::new();
        msg.encode(&mut buf)?;
        self.inner.egress.lock().await.send_control(buf.freeze()).await?;
        Ok(())
    }

    fn check_not_closed(&self) -> Result<(), SessionError> {
        if self.inner.state.lock().unwrap().closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// Whether allocating the next request ID would push it past the peer's
    /// advertised MAX_REQUEST_ID. Checked against the allocator's next value,
    /// not the count of outstanding requests: the allocator never rewinds
    /// when a subscription or fetch completes, so the count can't stand in
    /// for it.
    fn next_request_id_would_exceed_peer_limit(&self) -> bool {
        let peer_max_request_id = self.inner.state.lock().unwrap().peer_max_request_id;
        peer_max_request_id != 0 && self.inner.request_ids.load(Ordering::Relaxed) >= peer_max_request_id
    }

    /// Request a track. Resolves once SUBSCRIBE_OK/SUBSCRIBE_ERROR arrives;
    /// on success also returns the channel objects are delivered on.
    pub async fn subscribe(
        &self,
        track_namespace: TrackNamespace,
        track_name: String,
        _kind: TrackKind,
        filter: SubscribeFilter,
        params: KeyValuePairs,
    ) -> Result<(SubscribeOkInfo, mpsc::UnboundedReceiver<ParsedObject>), SessionError> {
        self.check_not_closed()?;

        if self.next_request_id_would_exceed_peer_limit() {
            return Err(SessionError::RequestsBlocked(
                self.inner.state.lock().unwrap().peer_max_request_id,
            ));
        }

        let id = self.allocate_request_id();
        let (tx, rx): (ResponseTx<SubscribeOkInfo>, ResponseRx<SubscribeOkInfo>) = oneshot::channel();
        self.inner.state.lock().unwrap().pending_subscribes.insert(id, tx);

        let msg = message::Subscribe {
            id,
            track_namespace,
            track_name,
            subscriber_priority: 128,
            group_order: GroupOrder::Publisher,
            forward: true,
            filter_type: filter.filter_type(),
            start_location: filter.start_location(),
            end_group_id: filter.end_group_id(),
            params,
        };
        self.send_control_message(Message::from(msg)).await?;

        match rx.await.map_err(|_| SessionError::Closed)? {
            Ok(info) => {
                let (objects_tx, objects_rx) = mpsc::unbounded_channel();
                let mut state = self.inner.state.lock().unwrap();
                state.alias_to_request.insert(info.track_alias, id);
                state.subscriptions.insert(id, Subscription { objects: objects_tx });
                Ok((info, objects_rx))
            }
            Err((code, reason)) => {
                log::debug!("subscribe {} rejected: {} {}", id, code, reason);
                Err(SessionError::UnknownRequest(id))
            }
        }
    }

    /// Change the range of an active subscription.
    pub async fn update_subscription(
        &self,
        id: u64,
        start_location: Location,
        end_group_id: u64,
        subscriber_priority: u8,
        forward: bool,
        params: KeyValuePairs,
    ) -> Result<(), SessionError> {
        self.check_not_closed()?;
        let msg = message::SubscribeUpdate {
            id,
            start_location,
            end_group_id,
            subscriber_priority,
            forward,
            params,
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Cancel an active subscription. Does not wait for any acknowledgement.
    pub async fn unsubscribe(&self, id: u64) -> Result<(), SessionError> {
        self.inner.state.lock().unwrap().subscriptions.remove(&id);
        self.send_control_message(Message::from(message::Unsubscribe { id })).await
    }

    /// Fetch a bounded range of already-published objects.
    pub async fn fetch(
        &self,
        track_namespace: TrackNamespace,
        track_name: String,
        start_location: Location,
        end_location: Location,
        params: KeyValuePairs,
    ) -> Result<(FetchOkInfo, mpsc::UnboundedReceiver<ParsedObject>), SessionError> {
        let standalone = message::StandaloneFetch {
            track_namespace,
            track_name,
            start_location,
            end_location,
        };
        self.fetch_inner(FetchType::Standalone, Some(standalone), None, params).await
    }

    /// Fetch objects preceding an active subscription, relative to its start.
    pub async fn joining_fetch_relative(
        &self,
        joining_request_id: u64,
        preceding_group_count: u64,
        params: KeyValuePairs,
    ) -> Result<(FetchOkInfo, mpsc::UnboundedReceiver<ParsedObject>), SessionError> {
        let joining = message::JoiningFetch {
            joining_request_id,
            joining_start: preceding_group_count,
        };
        self.fetch_inner(FetchType::RelativeJoining, None, Some(joining), params).await
    }

    /// Fetch objects preceding an active subscription, from an absolute group.
    pub async fn joining_fetch_absolute(
        &self,
        joining_request_id: u64,
        start_group_id: u64,
        params: KeyValuePairs,
    ) -> Result<(FetchOkInfo, mpsc::UnboundedReceiver<ParsedObject>), SessionError> {
        let joining = message::JoiningFetch {
            joining_request_id,
            joining_start: start_group_id,
        };
        self.fetch_inner(FetchType::AbsoluteJoining, None, Some(joining), params).await
    }

    async fn fetch_inner(
        &self,
        fetch_type: FetchType,
        standalone_fetch: Option<message::StandaloneFetch>,
        joining_fetch: Option<message::JoiningFetch>,
        params: KeyValuePairs,
    ) -> Result<(FetchOkInfo, mpsc::UnboundedReceiver<ParsedObject>), SessionError> {
        self.check_not_closed()?;

        if self.next_request_id_would_exceed_peer_limit() {
            return Err(SessionError::RequestsBlocked(
                self.inner.state.lock().unwrap().peer_max_request_id,
            ));
        }

        let id = self.allocate_request_id();
        let (tx, rx): (ResponseTx<FetchOkInfo>, ResponseRx<FetchOkInfo>) = oneshot::channel();
        self.inner.state.lock().unwrap().pending_fetches.insert(id, tx);

        let msg = message::Fetch {
            id,
            subscriber_priority: 128,
            group_order: GroupOrder::Publisher,
            fetch_type,
            standalone_fetch,
            joining_fetch,
            params,
        };
        self.send_control_message(Message::from(msg)).await?;

        match rx.await.map_err(|_| SessionError::Closed)? {
            Ok(info) => {
                let (objects_tx, objects_rx) = mpsc::unbounded_channel();
                self.inner.state.lock().unwrap().fetches.insert(id, objects_tx);
                Ok((info, objects_rx))
            }
            Err((code, reason)) => {
                log::debug!("fetch {} rejected: {} {}", id, code, reason);
                Err(SessionError::UnknownRequest(id))
            }
        }
    }

    /// Cancel an in-flight or active fetch.
    pub async fn cancel_fetch(&self, id: u64) -> Result<(), SessionError> {
        self.inner.state.lock().unwrap().fetches.remove(&id);
        self.send_control_message(Message::from(message::FetchCancel { id })).await
    }

    /// Announce a namespace we intend to publish into. Resolves once
    /// PUBLISH_NAMESPACE_OK/_ERROR arrives.
    pub async fn announce_namespace(&self, track_namespace: TrackNamespace, params: KeyValuePairs) -> Result<(), SessionError> {
        self.check_not_closed()?;

        if self.next_request_id_would_exceed_peer_limit() {
            return Err(SessionError::RequestsBlocked(
                self.inner.state.lock().unwrap().peer_max_request_id,
            ));
        }

        let id = self.allocate_request_id();
        let (tx, rx): (ResponseTx<()>, ResponseRx<()>) = oneshot::channel();
        self.inner
            .state
            .lock()
            .unwrap()
            .pending_namespace_announcements
            .insert(id, tx);

        let msg = message::PublishNamespace {
            id,
            track_namespace,
            params,
        };
        self.send_control_message(Message::from(msg)).await?;

        rx.await
            .map_err(|_| SessionError::Closed)?
            .map_err(|(_, reason)| {
                log::debug!("announce {} rejected: {}", id, reason);
                SessionError::UnknownRequest(id)
            })
    }

    /// Withdraw a previously announced namespace.
    pub async fn withdraw_namespace(&self, track_namespace: TrackNamespace) -> Result<(), SessionError> {
        self.send_control_message(Message::from(message::PublishNamespaceDone { track_namespace }))
            .await
    }

    /// Subscribe to announcements under a namespace prefix. Resolves once
    /// SUBSCRIBE_NAMESPACE_OK/_ERROR arrives.
    pub async fn subscribe_namespace(&self, track_namespace_prefix: TrackNamespace, params: KeyValuePairs) -> Result<(), SessionError> {
        self.check_not_closed()?;

        if self.next_request_id_would_exceed_peer_limit() {
            return Err(SessionError::RequestsBlocked(
                self.inner.state.lock().unwrap().peer_max_request_id,
            ));
        }

        let id = self.allocate_request_id();
        let (tx, rx): (ResponseTx<()>, ResponseRx<()>) = oneshot::channel();
        self.inner
            .state
            .lock()
            .unwrap()
            .pending_namespace_subscriptions
            .insert(id, tx);

        let msg = message::SubscribeNamespace {
            id,
            track_namespace_prefix,
            params,
        };
        self.send_control_message(Message::from(msg)).await?;

        rx.await
            .map_err(|_| SessionError::Closed)?
            .map_err(|(_, reason)| {
                log::debug!("subscribe_namespace {} rejected: {}", id, reason);
                SessionError::UnknownRequest(id)
            })
    }

    /// Stop receiving announcements under a namespace prefix.
    pub async fn unsubscribe_namespace(&self, track_namespace_prefix: TrackNamespace) -> Result<(), SessionError> {
        self.send_control_message(Message::from(message::UnsubscribeNamespace { track_namespace_prefix }))
            .await
    }

    /// Accept a peer's offer to publish a track to us.
    pub async fn accept_publish(&self, id: u64) -> Result<(), SessionError> {
        self.inner.state.lock().unwrap().incoming_publish.remove(&id);
        let msg = message::PublishOk {
            id,
            forward: true,
            subscriber_priority: 128,
            group_order: GroupOrder::Publisher,
            filter_type: FilterType::LargestObject,
            start_location: None,
            end_group_id: None,
            params: KeyValuePairs::new(),
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Reject a peer's offer to publish a track to us.
    pub async fn reject_publish(&self, id: u64, code: u64, reason: String) -> Result<(), SessionError> {
        self.inner.state.lock().unwrap().incoming_publish.remove(&id);
        let msg = message::PublishError {
            id,
            error_code: code,
            reason_phrase: crate::coding::ReasonPhrase(reason),
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Accept a peer's request that we publish a track to them.
    #[allow(clippy::too_many_arguments)]
    pub async fn accept_subscribe(
        &self,
        id: u64,
        track_alias: u64,
        expires: u64,
        group_order: GroupOrder,
        content_exists: bool,
        largest_location: Option<Location>,
        params: KeyValuePairs,
    ) -> Result<(), SessionError> {
        self.inner.state.lock().unwrap().incoming_subscribe.remove(&id);
        let msg = message::SubscribeOk {
            id,
            track_alias,
            expires,
            group_order,
            content_exists,
            largest_location,
            params,
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Reject a peer's request that we publish a track to them.
    pub async fn reject_subscribe(&self, id: u64, code: u64, reason: String) -> Result<(), SessionError> {
        self.inner.state.lock().unwrap().incoming_subscribe.remove(&id);
        let msg = message::SubscribeError {
            id,
            error_code: code,
            reason_phrase: crate::coding::ReasonPhrase(reason),
            track_alias: 0,
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Signal that a track we are publishing (in response to an accepted
    /// SUBSCRIBE) has ended.
    pub async fn send_publish_done(&self, id: u64, status_code: u64, stream_count: u64, reason: String) -> Result<(), SessionError> {
        let msg = message::PublishDone {
            id,
            status_code,
            stream_count,
            reason: crate::coding::ReasonPhrase(reason),
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Announce a session-level GOAWAY, optionally redirecting the peer to a
    /// new URI.
    pub async fn send_goaway(&self, new_uri: Option<String>) -> Result<(), SessionError> {
        let msg = message::GoAway {
            uri: crate::coding::SessionUri(new_uri.unwrap_or_default()),
        };
        self.send_control_message(Message::from(msg)).await
    }

    /// Open a new unidirectional stream and write its subgroup header.
    /// Returns a handle used for subsequent `write_object`/`finish_data_stream` calls.
    pub async fn open_data_stream(
        &self,
        header_type: data::StreamHeaderType,
        track_alias: u64,
        group_id: u64,
        subgroup_id: Option<u64>,
        publisher_priority: u8,
    ) -> Result<StreamId, SessionError> {
        let header = data::SubgroupHeader {
            header_type,
            track_alias,
            group_id,
            subgroup_id,
            publisher_priority,
        };
        let mut buf = BytesMut::new();
        header.encode(&mut buf)?;

        let mut egress = self.inner.egress.lock().await;
        let stream_id = egress.open_uni_stream().await?;
        egress.stream_write(stream_id, buf.freeze()).await?;
        Ok(stream_id)
    }

    /// Write one object (and its payload) onto a previously opened data stream.
    pub async fn write_object(
        &self,
        stream_id: StreamId,
        object_id_delta: u64,
        extension_headers: Option<KeyValuePairs>,
        status: Option<data::ObjectStatus>,
        payload: Bytes,
    ) -> Result<(), SessionError> {
        let object = data::SubgroupObject {
            object_id_delta,
            extension_headers,
            payload_length: if status.is_some() { 0 } else { payload.len() },
            status,
        };
        let mut buf = BytesMut::new();
        object.encode(&mut buf)?;
        buf.extend_from_slice(&payload);

        self.inner.egress.lock().await.stream_write(stream_id, buf.freeze()).await?;
        Ok(())
    }

    /// Finish (FIN) a previously opened data stream.
    pub async fn finish_data_stream(&self, stream_id: StreamId) -> Result<(), SessionError> {
        self.inner.egress.lock().await.stream_finish(stream_id).await?;
        Ok(())
    }

    fn fail_all(&self, err: SessionError) {
        let mut state = self.inner.state.lock().unwrap();
        state.closed = true;

        for (_, tx) in state.pending_subscribes.drain() {
            let _ = tx.send(Err((err.code(), err.to_string())));
        }
        for (_, tx) in state.pending_fetches.drain() {
            let _ = tx.send(Err((err.code(), err.to_string())));
        }
        for (_, tx) in state.pending_namespace_announcements.drain() {
            let _ = tx.send(Err((err.code(), err.to_string())));
        }
        for (_, tx) in state.pending_namespace_subscriptions.drain() {
            let _ = tx.send(Err((err.code(), err.to_string())));
        }
        state.subscriptions.clear();
        state.fetches.clear();
        state.alias_to_request.clear();
    }

    /// Runs the ingress side of the session: feeds the control framer and
    /// per-stream data parsers, and routes every event to its correlated
    /// caller. Exits (and marks the session closed) once the carrier's
    /// connection-state sequence reports a disconnect, or the control
    /// sequence ends.
    async fn run_ingress(self, carrier: C) {
        let mut control_framer = ControlFramer::new(MalformedPolicy::Resync);
        let mut stream_parsers: HashMap<StreamId, DataStreamParser> = HashMap::new();

        let mut control_carrier = carrier.clone();
        let mut data_carrier = carrier.clone();
        let mut datagram_carrier = carrier.clone();
        let mut state_carrier = carrier;

        loop {
            let event = tokio::select! {
                c = control_carrier.incoming_control() => IngressEvent::Control(c),
                d = data_carrier.incoming_data_streams() => IngressEvent::Data(d),
                g = datagram_carrier.incoming_datagrams() => IngressEvent::Datagram(g),
                e = state_carrier.connection_state_events() => IngressEvent::ConnectionState(e),
            };

            match event {
                IngressEvent::Control(Some(bytes)) => {
                    control_framer.feed(bytes);
                    match control_framer.drain() {
                        Ok(msgs) => {
                            for msg in msgs {
                                self.handle_control_message(msg);
                            }
                        }
                        Err(err) => {
                            log::warn!("session: closing after malformed control message: {}", err);
                            self.fail_all(SessionError::Decode(err));
                            break;
                        }
                    }
                }
                IngressEvent::Control(None) => {
                    self.fail_all(SessionError::Closed);
                    break;
                }
                IngressEvent::Data(Some(chunk)) => {
                    let parser = stream_parsers.entry(chunk.stream_id).or_insert_with(DataStreamParser::new);
                    parser.feed(chunk.bytes);
                    match parser.drain(chunk.is_complete) {
                        Ok(objects) => {
                            for obj in objects {
                                self.deliver_object(obj);
                            }
                            if parser.is_done() {
                                stream_parsers.remove(&chunk.stream_id);
                            }
                        }
                        Err(err) => {
                            log::warn!("session: dropping stream {} after decode error: {}", chunk.stream_id, err);
                            stream_parsers.remove(&chunk.stream_id);
                        }
                    }
                }
                IngressEvent::Data(None) => {}
                IngressEvent::Datagram(Some(bytes)) => self.handle_datagram(bytes),
                IngressEvent::Datagram(None) => {}
                IngressEvent::ConnectionState(Some(connected)) => {
                    let _ = self.inner.connection_state_tx.send(connected);
                    if !connected {
                        self.fail_all(SessionError::Closed);
                        break;
                    }
                }
                IngressEvent::ConnectionState(None) => {
                    self.fail_all(SessionError::Closed);
                    break;
                }
            }
        }
    }

    fn deliver_object(&self, obj: ParsedObject) {
        let state = self.inner.state.lock().unwrap();

        if let Some(request_id) = obj.request_id {
            if let Some(tx) = state.fetches.get(&request_id) {
                let _ = tx.send(obj);
            }
            return;
        }

        if let Some(alias) = obj.track_alias {
            if let Some(request_id) = state.alias_to_request.get(&alias) {
                if let Some(sub) = state.subscriptions.get(request_id) {
                    let _ = sub.objects.send(obj);
                }
            }
        }
    }

    fn handle_datagram(&self, bytes: Bytes) {
        let mut cursor = std::io::Cursor::new(&bytes[..]);
        let datagram = match data::Datagram::decode(&mut cursor) {
            Ok(d) => d,
            Err(err) => {
                log::warn!("session: dropping malformed datagram: {}", err);
                return;
            }
        };

        let obj = ParsedObject {
            track_alias: Some(datagram.track_alias),
            request_id: None,
            group_id: datagram.group_id,
            subgroup_id: 0,
            object_id: datagram.object_id,
            publisher_priority: datagram.publisher_priority,
            extension_headers: datagram.extension_headers,
            payload: datagram.payload,
            status: datagram.status,
        };
        self.deliver_object(obj);
    }

    fn handle_control_message(&self, msg: Message) {
        log::debug!("received message: {:?}", msg);

        match msg {
            Message::SubscribeOk(m) => self.complete_subscribe(m),
            Message::SubscribeError(m) => self.fail_subscribe(m),
            Message::FetchOk(m) => self.complete_fetch(m),
            Message::FetchError(m) => self.fail_fetch(m),
            Message::PublishNamespaceOk(m) => self.complete_namespace_announcement(m.id, Ok(())),
            Message::PublishNamespaceError(m) => {
                self.complete_namespace_announcement(m.id, Err((m.error_code, m.reason_phrase.0)))
            }
            Message::SubscribeNamespaceOk(_) => {
                // Carries only the matched prefix, not the request id, so we
                // complete the oldest still-pending subscription instead.
                self.complete_oldest_pending_namespace_subscription(Ok(()));
            }
            Message::SubscribeNamespaceError(m) => {
                // Also carries no request id; same fallback as the OK case.
                self.complete_oldest_pending_namespace_subscription(Err((m.code, m.reason)));
            }
            Message::GoAway(m) => {
                let new_uri = if m.uri.0.is_empty() { None } else { Some(m.uri.0) };
                self.inner.state.lock().unwrap().goaway_received = true;
                let _ = self.inner.goaway_tx.send(GoawayEvent { new_uri });
            }
            Message::MaxRequestId(m) => {
                self.inner.state.lock().unwrap().peer_max_request_id = m.request_id;
            }
            Message::RequestsBlocked(m) => {
                log::debug!("peer reports it is requests-blocked at {}", m.max_request_id);
            }
            Message::Publish(m) => {
                let incoming = IncomingPublish {
                    id: m.id,
                    track_namespace: m.track_namespace,
                    track_name: m.track_name,
                    track_alias: m.track_alias,
                };
                self.inner.state.lock().unwrap().incoming_publish.insert(m.id, incoming.clone());
                let _ = self.inner.incoming_publish_tx.send(incoming);
            }
            Message::Subscribe(m) => {
                let filter = subscribe_filter_from_wire(m.filter_type, m.start_location, m.end_group_id);
                let incoming = IncomingSubscribe {
                    id: m.id,
                    track_namespace: m.track_namespace,
                    track_name: m.track_name,
                    filter,
                };
                self.inner.state.lock().unwrap().incoming_subscribe.insert(m.id, incoming.clone());
                let _ = self.inner.incoming_subscribe_tx.send(incoming);
            }
            Message::PublishDone(m) => {
                self.inner.state.lock().unwrap().subscriptions.remove(&m.id);
            }
            other => {
                log::debug!("unhandled control message: {}", other.name());
            }
        }
    }

    fn complete_subscribe(&self, m: message::SubscribeOk) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(tx) = state.pending_subscribes.remove(&m.id) {
            let _ = tx.send(Ok(SubscribeOkInfo {
                track_alias: m.track_alias,
                expires: m.expires,
                group_order: m.group_order,
                content_exists: m.content_exists,
                largest_location: m.largest_location,
            }));
        }
    }

    fn fail_subscribe(&self, m: message::SubscribeError) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(tx) = state.pending_subscribes.remove(&m.id) {
            let _ = tx.send(Err((m.error_code, m.reason_phrase.0)));
        }
    }

    fn complete_fetch(&self, m: message::FetchOk) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(tx) = state.pending_fetches.remove(&m.id) {
            let _ = tx.send(Ok(FetchOkInfo {
                group_order: m.group_order,
                end_of_track: m.end_of_track,
                end_location: m.end_location,
            }));
        }
    }

    fn fail_fetch(&self, m: message::FetchError) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(tx) = state.pending_fetches.remove(&m.id) {
            let _ = tx.send(Err((m.code, m.reason)));
        }
    }

    fn complete_namespace_announcement(&self, id: u64, result: Result<(), (u64, String)>) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(tx) = state.pending_namespace_announcements.remove(&id) {
            let _ = tx.send(result);
        }
    }

    fn complete_oldest_pending_namespace_subscription(&self, result: Result<(), (u64, String)>) {
        let mut state = self.inner.state.lock().unwrap();
        if let Some(&id) = state.pending_namespace_subscriptions.keys().next() {
            if let Some(tx) = state.pending_namespace_subscriptions.remove(&id) {
                let _ = tx.send(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carrier::CarrierError;
    use crate::coding::{SessionUri, TrackNamespace};
    use tokio::sync::Mutex as AsyncMutex;

    /// An in-memory [`Carrier`] standing in for a real QUIC/WebTransport
    /// connection: every inbound sequence is backed by an unbounded channel
    /// a test feeds directly, and outbound control writes are captured for
    /// inspection instead of going anywhere.
    #[derive(Clone)]
    struct MockCarrier {
        control_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Bytes>>>,
        data_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<DataStreamChunk>>>,
        datagram_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Bytes>>>,
        state_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<bool>>>,
        sent_control: mpsc::UnboundedSender<Bytes>,
        next_stream_id: Arc<AtomicU64>,
    }

    struct MockPeer {
        control_tx: mpsc::UnboundedSender<Bytes>,
        #[allow(dead_code)]
        data_tx: mpsc::UnboundedSender<DataStreamChunk>,
        #[allow(dead_code)]
        datagram_tx: mpsc::UnboundedSender<Bytes>,
        #[allow(dead_code)]
        state_tx: mpsc::UnboundedSender<bool>,
        sent_control: AsyncMutex<mpsc::UnboundedReceiver<Bytes>>,
    }

    fn mock_pair() -> (MockCarrier, MockPeer) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        let (datagram_tx, datagram_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let carrier = MockCarrier {
            control_rx: Arc::new(AsyncMutex::new(control_rx)),
            data_rx: Arc::new(AsyncMutex::new(data_rx)),
            datagram_rx: Arc::new(AsyncMutex::new(datagram_rx)),
            state_rx: Arc::new(AsyncMutex::new(state_rx)),
            sent_control: sent_tx,
            next_stream_id: Arc::new(AtomicU64::new(0)),
        };
        let peer = MockPeer {
            control_tx,
            data_tx,
            datagram_tx,
            state_tx,
            sent_control: AsyncMutex::new(sent_rx),
        };
        (carrier, peer)
    }

    impl Carrier for MockCarrier {
        async fn connect(&mut self, _host: &str, _port: u16, _options: ConnectOptions) -> Result<(), CarrierError> {
            Ok(())
        }

        async fn disconnect(&mut self) {}

        async fn send_control(&mut self, bytes: Bytes) -> Result<(), CarrierError> {
            let _ = self.sent_control.send(bytes);
            Ok(())
        }

        async fn open_uni_stream(&mut self) -> Result<StreamId, CarrierError> {
            Ok(self.next_stream_id.fetch_add(1, Ordering::Relaxed))
        }

        async fn stream_write(&mut self, _stream_id: StreamId, _bytes: Bytes) -> Result<(), CarrierError> {
            Ok(())
        }

        async fn stream_finish(&mut self, _stream_id: StreamId) -> Result<(), CarrierError> {
            Ok(())
        }

        async fn send_datagram(&mut self, _bytes: Bytes) -> Result<(), CarrierError> {
            Ok(())
        }

        async fn incoming_control(&mut self) -> Option<Bytes> {
            self.control_rx.lock().await.recv().await
        }

        async fn incoming_data_streams(&mut self) -> Option<DataStreamChunk> {
            self.data_rx.lock().await.recv().await
        }

        async fn incoming_datagrams(&mut self) -> Option<Bytes> {
            self.datagram_rx.lock().await.recv().await
        }

        async fn connection_state_events(&mut self) -> Option<bool> {
            self.state_rx.lock().await.recv().await
        }
    }

    async fn recv_sent_message(peer: &MockPeer) -> Message {
        let bytes = peer
            .sent_control
            .lock()
            .await
            .recv()
            .await
            .expect("expected a sent control message");
        let mut cursor = std::io::Cursor::new(&bytes[..]);
        Message::decode(&mut cursor).unwrap()
    }

    fn encode_server_setup(version: setup::Version, params: KeyValuePairs) -> Bytes {
        let mut buf = BytesMut::new();
        setup::Server { version, params }.encode(&mut buf).unwrap();
        buf.freeze()
    }

    fn encode_message(msg: impl Into<Message>) -> Bytes {
        let mut buf = BytesMut::new();
        msg.into().encode(&mut buf).unwrap();
        buf.freeze()
    }

    /// Drives the CLIENT_SETUP/SERVER_SETUP exchange and drains the
    /// resulting CLIENT_SETUP off the wire (it isn't a [`Message`] variant,
    /// so callers that only care about application-level traffic don't have
    /// to special-case it on every subsequent `recv_sent_message`).
    async fn connected_session(peer: &MockPeer, carrier: MockCarrier) -> (Session<MockCarrier>, setup::Client) {
        peer.control_tx
            .send(encode_server_setup(setup::Version::DRAFT_14, KeyValuePairs::new()))
            .unwrap();

        let session = Session::connect(carrier, "localhost", 0, ConnectOptions::default(), setup::Role::Both)
            .await
            .expect("setup should succeed");

        let client_setup_bytes = peer.sent_control.lock().await.recv().await.unwrap();
        let mut cursor = std::io::Cursor::new(&client_setup_bytes[..]);
        let client_setup = setup::Client::decode(&mut cursor).unwrap();

        (session, client_setup)
    }

    #[tokio::test]
    async fn e1_setup_reaches_connected() {
        let (carrier, peer) = mock_pair();
        let (session, mut client_setup) = connected_session(&peer, carrier).await;

        assert_eq!(client_setup.role, setup::Role::Both);
        assert_eq!(
            client_setup.params.get_varint(ParameterType::MaxRequestId.into()).unwrap(),
            Some(DEFAULT_MAX_REQUEST_ID)
        );

        let mut conn_state = session.connection_state();
        assert!(conn_state.recv().await.unwrap());
    }

    #[tokio::test]
    async fn e2_subscribe_success_registers_alias() {
        let (carrier, peer) = mock_pair();
        let (session, _client_setup) = connected_session(&peer, carrier).await;

        let ns = TrackNamespace::from_utf8_path("demo");
        let subscribe_fut = session.subscribe(
            ns.clone(),
            "video".to_string(),
            TrackKind::Video,
            SubscribeFilter::LargestObject,
            KeyValuePairs::new(),
        );
        tokio::pin!(subscribe_fut);

        // Drain the CLIENT_SETUP's sent control message before the SUBSCRIBE.
        let sent = recv_sent_message(&peer).await;
        let subscribe = match sent {
            Message::Subscribe(m) => m,
            other => panic!("expected Subscribe, got {:?}", other),
        };
        assert_eq!(subscribe.id, 0);
        assert_eq!(subscribe.filter_type, FilterType::LargestObject);

        peer.control_tx
            .send(encode_message(message::SubscribeOk {
                id: 0,
                track_alias: 7,
                expires: 0,
                group_order: GroupOrder::Ascending,
                content_exists: false,
                largest_location: None,
                params: KeyValuePairs::new(),
            }))
            .unwrap();

        let (info, _objects) = subscribe_fut.await.unwrap();
        assert_eq!(info.track_alias, 7);
        assert_eq!(info.expires, 0);
        assert!(!info.content_exists);
    }

    #[tokio::test]
    async fn e5_fetch_standalone_resolves_on_fetch_ok() {
        let (carrier, peer) = mock_pair();
        let (session, _client_setup) = connected_session(&peer, carrier).await;

        let ns = TrackNamespace::from_utf8_path("demo");
        let fetch_fut = session.fetch(
            ns,
            "video".to_string(),
            Location::new(10, 0),
            Location::new(12, 0),
            KeyValuePairs::new(),
        );
        tokio::pin!(fetch_fut);

        let sent = recv_sent_message(&peer).await;
        let fetch = match sent {
            Message::Fetch(m) => m,
            other => panic!("expected Fetch, got {:?}", other),
        };
        assert_eq!(fetch.id, 0);
        assert_eq!(fetch.fetch_type, FetchType::Standalone);

        peer.control_tx
            .send(encode_message(message::FetchOk {
                id: 0,
                group_order: GroupOrder::Ascending,
                end_of_track: false,
                end_location: Location::new(12, 0),
                params: KeyValuePairs::new(),
            }))
            .unwrap();

        let (info, _objects) = fetch_fut.await.unwrap();
        assert_eq!(info.group_order, GroupOrder::Ascending);
        assert!(!info.end_of_track);
    }

    #[tokio::test]
    async fn e6_goaway_with_migration_uri() {
        let (carrier, peer) = mock_pair();
        let (session, _client_setup) = connected_session(&peer, carrier).await;

        let mut goaway_events = session.goaway_events();

        peer.control_tx
            .send(encode_message(message::GoAway {
                uri: SessionUri("https://relay2.example:4433/moq".to_string()),
            }))
            .unwrap();

        let event = goaway_events.recv().await.unwrap();
        assert_eq!(event.new_uri.as_deref(), Some("https://relay2.example:4433/moq"));
        assert!(event.has_migration_uri());
    }
}
