pub mod codec;
pub mod dispatcher;
pub mod events;
pub mod heartbeat;
pub mod session;

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::lock;
use crate::models::device::DeviceState;
use codec::{Compression, Encoding, WireCodec};
use dispatcher::Dispatcher;
use events::{Envelope, EventName, GatewayEvent, Inbound, Op};
use heartbeat::{heartbeat_timer, Backoff};
use session::{HelloOutcome, Session};

pub const DEFAULT_GATEWAY_URL: &str = "wss://rosin.puff.social";

/// Name announced when none is configured.
pub const DEFAULT_DISPLAY_NAME: &str = "Unnamed";

/// Connection lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    /// Socket open, HELLO not yet received.
    Open,
    /// HELLO processed, heartbeat running.
    Ready,
    Closed,
    /// Waiting before reconnect attempt `n`.
    Backoff(u32),
    Shutdown,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Ready)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    pub encoding: Encoding,
    pub compression: Compression,
    /// Announced with UPDATE_USER after every HELLO, falling back to
    /// [`DEFAULT_DISPLAY_NAME`].
    pub display_name: Option<String>,
    pub backoff: Backoff,
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            encoding: Encoding::default(),
            compression: Compression::default(),
            display_name: None,
            backoff: Backoff::default(),
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn socket_url(&self) -> String {
        format!(
            "{}/socket?encoding={}&compression={}",
            self.url.trim_end_matches('/'),
            self.encoding,
            self.compression
        )
    }
}

/// What an inbound envelope means for this socket's heartbeat timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeartbeatChange {
    Keep,
    Start(Duration),
    Stop,
}

/// Writer half of the live socket, present only while a socket is open.
struct Link {
    tx: mpsc::UnboundedSender<Message>,
    codec: WireCodec,
}

struct Inner {
    dispatcher: Dispatcher,
    session: Mutex<Session>,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Realtime gateway client. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<Inner>,
}

impl Default for GatewayClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayClient {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(),
                session: Mutex::new(Session::default()),
                state,
                link: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Start the connection loop. Never fails: connection errors go
    /// through the backoff schedule. Calling again replaces the running loop.
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, options: ConnectOptions) {
        let mut task = lock(&self.inner.task);
        if let Some(previous) = task.take() {
            previous.abort();
            *lock(&self.inner.link) = None;
        }
        let inner = self.inner.clone();
        *task = Some(tokio::spawn(run(inner, options)));
    }

    /// Stop reconnecting and drop the socket. The session is kept.
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.inner.task).take() {
            task.abort();
        }
        *lock(&self.inner.link) = None;
        self.inner.set_state(ConnectionState::Shutdown);
        tracing::info!("gateway client shut down");
    }

    pub fn on<F>(&self, event: EventName, listener: F)
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, listener);
    }

    /// Send an envelope. Dropped (returns false) unless a socket is open.
    pub fn send(&self, op: Op, payload: Option<serde_json::Value>) -> bool {
        self.inner.send(Envelope::new(op, payload))
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn session(&self) -> Session {
        lock(&self.inner.session).clone()
    }

    /// Seed a session from a previous run so the next HELLO resumes it.
    pub fn restore_session(&self, session_id: impl Into<String>, session_token: impl Into<String>) {
        let mut session = lock(&self.inner.session);
        session.session_id = Some(session_id.into());
        session.session_token = Some(session_token.into());
    }

    pub fn join_group(&self, group_id: &str) -> bool {
        self.send(Op::Join, Some(serde_json::json!({ "group_id": group_id })))
    }

    pub fn create_group(&self, name: &str, visibility: &str) -> bool {
        self.send(
            Op::CreateGroup,
            Some(serde_json::json!({ "name": name, "visibility": visibility })),
        )
    }

    pub fn update_group(&self, name: Option<&str>, visibility: Option<&str>) -> bool {
        let mut payload = serde_json::Map::new();
        if let Some(name) = name {
            payload.insert("name".into(), name.into());
        }
        if let Some(visibility) = visibility {
            payload.insert("visibility".into(), visibility.into());
        }
        self.send(Op::UpdateGroup, Some(serde_json::Value::Object(payload)))
    }

    pub fn delete_group(&self) -> bool {
        self.send(Op::DeleteGroup, None)
    }

    pub fn leave_group(&self) -> bool {
        self.send(Op::LeaveGroup, None)
    }

    pub fn update_user(&self, name: &str) -> bool {
        self.send(Op::UpdateUser, Some(serde_json::json!({ "name": name })))
    }

    pub fn send_device_state(&self, state: &DeviceState) -> bool {
        match serde_json::to_value(state) {
            Ok(payload) => self.send(Op::SendDeviceState, Some(payload)),
            Err(e) => {
                tracing::warn!("failed to encode device state: {e}");
                false
            }
        }
    }

    pub fn inquire_heating(&self) -> bool {
        self.send(Op::InquireHeating, None)
    }

    pub fn start_with_ready(&self) -> bool {
        self.send(Op::StartWithReady, None)
    }

    pub fn stop_awaiting(&self) -> bool {
        self.send(Op::StopAwaiting, None)
    }

    pub fn disconnect_device(&self) -> bool {
        self.send(Op::DisconnectDevice, None)
    }

    pub fn send_message(&self, content: &str) -> bool {
        self.send(Op::SendMessage, Some(serde_json::json!({ "content": content })))
    }

    pub fn send_reaction(&self, emoji: &str) -> bool {
        self.send(Op::SendReaction, Some(serde_json::json!({ "emoji": emoji })))
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn send(&self, envelope: Envelope) -> bool {
        let open = self.state.borrow().is_open();
        if !open {
            tracing::trace!("dropping op {} while not connected", envelope.op);
            return false;
        }
        let link = lock(&self.link);
        let Some(link) = link.as_ref() else {
            return false;
        };
        match link.codec.encode(&envelope) {
            Ok(message) => link.tx.send(message).is_ok(),
            Err(e) => {
                tracing::warn!("failed to encode op {}: {e}", envelope.op);
                false
            }
        }
    }

    fn opened(&self, link: Link) {
        lock(&self.session).opened();
        *lock(&self.link) = Some(link);
        self.set_state(ConnectionState::Open);
        tracing::info!("gateway connection opened");
        self.dispatcher.emit(&GatewayEvent::Connected);
    }

    /// Returns the attempt number and the delay before it.
    fn closed(&self, backoff: &Backoff) -> (u32, Duration) {
        *lock(&self.link) = None;
        self.set_state(ConnectionState::Closed);
        let mut session = lock(&self.session);
        let delay = session.closed(backoff);
        (session.reconnect_attempt, delay)
    }

    /// Process one inbound envelope. Every HELLO replaces the heartbeat
    /// timer; a zero interval clears it.
    fn handle(&self, envelope: Envelope, options: &ConnectOptions) -> HeartbeatChange {
        let inbound = match Inbound::decode(envelope) {
            Ok(inbound) => inbound,
            Err(e) => {
                tracing::debug!("skipping malformed envelope: {e}");
                return HeartbeatChange::Keep;
            }
        };

        match inbound {
            Inbound::Hello(hello) => {
                let name = options
                    .display_name
                    .as_deref()
                    .unwrap_or(DEFAULT_DISPLAY_NAME);
                self.send(Envelope::new(
                    Op::UpdateUser,
                    Some(serde_json::json!({ "name": name })),
                ));

                let outcome = lock(&self.session).hello(&hello);
                match outcome {
                    HelloOutcome::Resume(resume) => {
                        tracing::info!("resuming session {}", resume.session_id);
                        match serde_json::to_value(&resume) {
                            Ok(payload) => {
                                self.send(Envelope::new(Op::ResumeSession, Some(payload)));
                            }
                            Err(e) => tracing::warn!("failed to encode resume: {e}"),
                        }
                    }
                    HelloOutcome::Adopted => {
                        tracing::info!("adopted session {:?}", hello.session_id);
                    }
                }

                self.set_state(ConnectionState::Ready);
                self.dispatcher.emit(&GatewayEvent::Init);

                if hello.heartbeat_interval == 0 {
                    HeartbeatChange::Stop
                } else {
                    HeartbeatChange::Start(Duration::from_millis(hello.heartbeat_interval))
                }
            }
            Inbound::Event(event) => {
                if let GatewayEvent::SessionResumed(resumed) = &event {
                    lock(&self.session).resumed(&resumed.session_id);
                    tracing::info!("session resumed as {}", resumed.session_id);
                }
                self.dispatcher.emit(&event);
                HeartbeatChange::Keep
            }
            Inbound::Ignored => HeartbeatChange::Keep,
        }
    }
}

async fn run(inner: Arc<Inner>, options: ConnectOptions) {
    let url = options.socket_url();
    loop {
        inner.set_state(ConnectionState::Connecting);
        tracing::debug!("connecting to {url}");
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => serve(&inner, socket, &options).await,
            Err(e) => tracing::warn!("gateway connection failed: {e}"),
        }

        let (attempt, delay) = inner.closed(&options.backoff);
        inner.set_state(ConnectionState::Backoff(attempt));
        tracing::info!("gateway closed, reconnect attempt {attempt} in {delay:?}");
        tokio::time::sleep(delay).await;
    }
}

enum Step {
    Outbound(Message),
    Heartbeat,
    Inbound(Option<Result<Message, tungstenite::Error>>),
}

async fn next_beat(timer: &mut Option<Interval>) {
    match timer.as_mut() {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn serve(
    inner: &Arc<Inner>,
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    options: &ConnectOptions,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let codec = WireCodec::new(options.compression);
    inner.opened(Link { tx, codec });

    // Owned by this connection only, so it dies with the socket.
    let mut heartbeat: Option<Interval> = None;

    loop {
        let step = tokio::select! {
            Some(message) = rx.recv() => Step::Outbound(message),
            _ = next_beat(&mut heartbeat) => Step::Heartbeat,
            message = ws_stream.next() => Step::Inbound(message),
        };

        match step {
            Step::Outbound(message) => {
                if ws_sink.send(message).await.is_err() {
                    break;
                }
            }
            Step::Heartbeat => match codec.encode(&Envelope::new(Op::Heartbeat, None)) {
                Ok(message) => {
                    tracing::trace!("sending heartbeat");
                    if ws_sink.send(message).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("failed to encode heartbeat: {e}"),
            },
            Step::Inbound(Some(Ok(Message::Close(_)))) | Step::Inbound(None) => break,
            Step::Inbound(Some(Ok(message))) => match codec.decode(&message) {
                Ok(Some(envelope)) => match inner.handle(envelope, options) {
                    HeartbeatChange::Start(period) => heartbeat = Some(heartbeat_timer(period)),
                    HeartbeatChange::Stop => heartbeat = None,
                    HeartbeatChange::Keep => {}
                },
                Ok(None) => {}
                Err(e) => tracing::debug!("skipping inbound frame: {e}"),
            },
            Step::Inbound(Some(Err(e))) => {
                tracing::warn!("gateway socket error: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_carries_options() {
        let options = ConnectOptions::new("ws://127.0.0.1:9000/").with_compression(Compression::None);
        assert_eq!(
            options.socket_url(),
            "ws://127.0.0.1:9000/socket?encoding=json&compression=none"
        );
        assert_eq!(
            ConnectOptions::new(DEFAULT_GATEWAY_URL).socket_url(),
            "wss://rosin.puff.social/socket?encoding=json&compression=zlib"
        );
    }

    #[test]
    fn test_send_is_dropped_when_not_connected() {
        let client = GatewayClient::new();
        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.send(Op::Heartbeat, None));
        assert!(!client.send_reaction("🤙"));
    }

    #[test]
    fn test_restore_session() {
        let client = GatewayClient::new();
        client.restore_session("abc", "tok");
        let session = client.session();
        assert_eq!(session.session_id.as_deref(), Some("abc"));
        assert_eq!(session.session_token.as_deref(), Some("tok"));
    }

    fn hello(interval: u64) -> Envelope {
        serde_json::from_value(serde_json::json!({
            "op": 0,
            "d": { "heartbeat_interval": interval, "session_id": "abc", "session_token": "tok" }
        }))
        .unwrap()
    }

    #[test]
    fn test_every_hello_replaces_the_heartbeat() {
        let client = GatewayClient::new();
        let options = ConnectOptions::new(DEFAULT_GATEWAY_URL);

        assert_eq!(
            client.inner.handle(hello(100), &options),
            HeartbeatChange::Start(Duration::from_millis(100))
        );
        assert_eq!(client.inner.handle(hello(0), &options), HeartbeatChange::Stop);
        assert_eq!(client.session().heartbeat_interval, Some(Duration::ZERO));

        let event = serde_json::from_value(serde_json::json!({
            "op": 3, "t": "GROUP_START_HEATING", "d": {}
        }))
        .unwrap();
        assert_eq!(client.inner.handle(event, &options), HeartbeatChange::Keep);
        let unknown = serde_json::from_value(serde_json::json!({ "op": 99 })).unwrap();
        assert_eq!(client.inner.handle(unknown, &options), HeartbeatChange::Keep);
    }
}
