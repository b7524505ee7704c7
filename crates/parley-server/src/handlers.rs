//! Connection handlers for the Parley server.
//!
//! This module handles the connection lifecycle: the credential check at
//! upgrade time, the per-connection reader loop and the writer task that
//! drains the session's outbound queue.

use crate::api::{self, bearer_token};
use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_core::room::{private_room, validate_room_name};
use parley_core::{AuthGate, DispatchOutcome, Hub, Identity, MemoryStore, Outbound, Session, Store};
use parley_protocol::{codec, ClientEvent, Encoding, ProtocolError, ServerEvent};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, trace, warn};

/// Sent back when an inbound frame is not a known event.
pub const INVALID_PAYLOAD: &str = "Invalid event payload";

/// Shared server state.
pub struct AppState {
    /// The relay hub.
    pub hub: Hub,
    /// Credential verification.
    pub auth: AuthGate,
    /// Server configuration.
    pub config: Config,
    live_sessions: Arc<AtomicUsize>,
}

impl AppState {
    /// Create app state backed by the in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create app state over an existing store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        config.validate()?;

        let auth = AuthGate::new(&config.auth.secret)
            .with_token_ttl(config.auth.token_ttl_secs)
            .with_leeway(config.auth.leeway_secs);

        Ok(Self {
            hub: Hub::with_config(store, config.hub_config()),
            auth,
            config,
            live_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Number of open WebSocket sessions, replaced ones included.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.live_sessions.load(Ordering::Acquire)
    }

    /// Claim a session slot if `limits.max_connections` allows one more.
    fn try_reserve_session(&self) -> Option<SessionSlot> {
        let max = self.config.limits.max_connections;
        self.live_sessions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| SessionSlot(Arc::clone(&self.live_sessions)))
    }
}

/// A claimed session slot, released on drop.
struct SessionSlot(Arc<AtomicUsize>);

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Query parameters accepted on the WebSocket endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Credential, for clients that cannot set headers.
    pub token: Option<String>,
    /// Outbound encoding override.
    pub encoding: Option<Encoding>,
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler));

    if state.config.api.enabled {
        app = app.nest("/api", api::routes());
    }

    app.with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = build_app(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Parley server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "online": state.hub.stats().online_users,
    }))
}

/// WebSocket upgrade handler.
///
/// The credential is checked before upgrading, so a rejected client never
/// gets a socket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let token = bearer_token(&headers).or(params.token.as_deref());

    let identity = match state.auth.verify(token) {
        Ok(identity) => identity,
        Err(e) => {
            debug!(reason = e.kind(), "Connection refused");
            metrics::record_auth_rejection(e.kind());
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    if let Err(reason) = validate_room_name(&private_room(&identity.user_id)) {
        debug!(reason, "Connection refused: unusable user id");
        metrics::record_auth_rejection("user_id");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Invalid user id" })),
        )
            .into_response();
    }

    let Some(slot) = state.try_reserve_session() else {
        warn!(user = %identity.user_id, "Connection limit reached");
        metrics::record_error("connection_limit");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "Server is at capacity" })),
        )
            .into_response();
    };

    let encoding = params
        .encoding
        .unwrap_or(state.config.transport.default_encoding);

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity, encoding, slot))
}

/// Handle an authenticated WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: Identity,
    encoding: Encoding,
    _slot: SessionSlot,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (session, outbound) = match state.hub.connect(identity).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Failed to bring session online");
            metrics::record_error("connect");
            return;
        }
    };

    info!(
        user = %session.user_id,
        session = session.id,
        encoding = ?encoding,
        "WebSocket connected"
    );

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_outbound(sink, outbound, encoding));

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => match codec::decode_json::<ClientEvent>(&text) {
                Ok(event) => handle_event(&state, &session, event).await,
                Err(e) => reject_payload(&session, &e),
            },
            Ok(Message::Binary(data)) => {
                read_buffer.extend_from_slice(&data);

                loop {
                    match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                        Ok(Some(event)) => handle_event(&state, &session, event).await,
                        Ok(None) => break,
                        Err(e @ ProtocolError::FrameTooLarge(_)) => {
                            reject_payload(&session, &e);
                            read_buffer.clear();
                            break;
                        }
                        Err(e) => reject_payload(&session, &e),
                    }
                }
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!(session = session.id, "Received close frame");
                break;
            }
            Err(e) => {
                warn!(session = session.id, error = %e, "WebSocket error");
                metrics::record_error("websocket");
                break;
            }
        }
    }

    state.hub.disconnect(&session).await;
    writer.abort();

    info!(user = %session.user_id, session = session.id, "WebSocket disconnected");
}

/// Run one inbound event through the hub.
async fn handle_event(state: &AppState, session: &Session, event: ClientEvent) {
    let name = event.name();
    metrics::record_event(name, "in");
    let start = Instant::now();

    match state.hub.dispatch(session, event).await {
        DispatchOutcome::Relay(outcome) => metrics::record_relay_outcome(outcome.as_str()),
        DispatchOutcome::Typing { recipients } => {
            trace!(session = session.id, event = name, recipients, "Typing forwarded");
        }
    }

    metrics::record_dispatch_latency(start.elapsed().as_secs_f64());
}

fn reject_payload(session: &Session, error: &ProtocolError) {
    debug!(session = session.id, error = %error, "Undecodable frame");
    metrics::record_error("decode");
    session.handle.send(ServerEvent::error(INVALID_PAYLOAD));
}

/// Drain a session's outbound queue onto the socket.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: Outbound,
    encoding: Encoding,
) {
    while let Some(event) = outbound.recv().await {
        let message = match encode_event(&event, encoding) {
            Ok(message) => message,
            Err(e) => {
                error!(event = event.name(), error = %e, "Failed to encode event");
                metrics::record_error("encode");
                continue;
            }
        };

        if sink.send(message).await.is_err() {
            break;
        }
        metrics::record_event(event.name(), "out");
    }

    if let Err(e) = sink.close().await {
        trace!(error = %e, "Socket already closed");
    }
}

fn encode_event(event: &ServerEvent, encoding: Encoding) -> Result<Message, ProtocolError> {
    match encoding {
        Encoding::Json => codec::encode_json(event).map(Message::Text),
        Encoding::Msgpack => codec::encode(event).map(|data| Message::Binary(data.to_vec())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{AuthConfig, MetricsConfig};
    use futures_util::{SinkExt, StreamExt};
    use parley_core::UserStore;
    use parley_protocol::{MessageType, SendMessage, TypingTarget};
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

    pub(crate) fn test_config() -> Config {
        Config {
            auth: AuthConfig {
                secret: "test-secret".into(),
                ..AuthConfig::default()
            },
            metrics: MetricsConfig {
                enabled: false,
                ..MetricsConfig::default()
            },
            ..Config::default()
        }
    }

    async fn spawn_app(config: Config) -> (SocketAddr, Arc<AppState>) {
        let state = Arc::new(AppState::new(config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = build_app(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, state)
    }

    fn token_for(state: &AppState, user_id: &str, username: &str) -> String {
        state.auth.issue(&Identity::new(user_id, username)).unwrap()
    }

    async fn connect(addr: SocketAddr, state: &AppState, user_id: &str, query: &str) -> WsClient {
        let token = token_for(state, user_id, &user_id.to_uppercase());
        let url = format!("ws://{addr}/ws?token={token}{query}");
        let (ws, _) = connect_async(url).await.unwrap();
        wait_until(|| state.hub.registry().is_online(user_id)).await;
        ws
    }

    fn assert_refused<T>(result: Result<T, WsError>, status: u16) {
        match result {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), status),
            Err(e) => panic!("expected HTTP {status}, got {e}"),
            Ok(_) => panic!("expected HTTP {status}, connection was accepted"),
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    async fn next_json(ws: &mut WsClient) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for event")
                .expect("connection closed")
                .expect("websocket error");
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send_json(ws: &mut WsClient, value: Value) {
        ws.send(WsMessage::Text(value.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_token_is_refused() {
        let (addr, state) = spawn_app(test_config()).await;

        let result = connect_async(format!("ws://{addr}/ws")).await;
        assert!(result.is_err());

        let result = connect_async(format!("ws://{addr}/ws?token=garbage")).await;
        assert!(result.is_err());
        assert!(state.hub.registry().is_empty());
    }

    #[tokio::test]
    async fn test_connect_with_bearer_header() {
        let (addr, state) = spawn_app(test_config()).await;
        let token = token_for(&state, "alice", "Alice");

        let mut request = format!("ws://{addr}/ws").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {token}").parse().unwrap());
        let (_ws, _) = connect_async(request).await.unwrap();

        wait_until(|| state.hub.registry().is_online("alice")).await;
        let user = state.hub.store().find_user("alice").await.unwrap().unwrap();
        assert!(user.is_online);
    }

    #[tokio::test]
    async fn test_connect_over_capacity_is_refused() {
        let mut config = test_config();
        config.limits.max_connections = 1;
        let (addr, state) = spawn_app(config).await;

        let _alice = connect(addr, &state, "alice", "").await;

        let token = token_for(&state, "bob", "Bob");
        let result = connect_async(format!("ws://{addr}/ws?token={token}")).await;
        assert_refused(result, 503);
        assert!(!state.hub.registry().is_online("bob"));
    }

    #[tokio::test]
    async fn test_capacity_counts_replaced_sessions() {
        let mut config = test_config();
        config.limits.max_connections = 2;
        let (addr, state) = spawn_app(config).await;

        let first = connect(addr, &state, "alice", "").await;
        let _second = connect(addr, &state, "alice", "").await;
        assert_eq!(state.hub.registry().len(), 1);
        assert_eq!(state.live_sessions(), 2);

        // Same identity, but both earlier sockets are still open.
        let token = token_for(&state, "alice", "ALICE");
        let url = format!("ws://{addr}/ws?token={token}");
        assert_refused(connect_async(url.as_str()).await, 503);

        drop(first);
        wait_until(|| state.live_sessions() == 1).await;

        let (_third, _) = connect_async(url.as_str()).await.unwrap();
        assert_eq!(state.live_sessions(), 2);
    }

    #[tokio::test]
    async fn test_unusable_user_id_is_refused_before_upgrade() {
        let (addr, state) = spawn_app(test_config()).await;

        let long_id = "u".repeat(300);
        let token = token_for(&state, &long_id, "Long");
        let result = connect_async(format!("ws://{addr}/ws?token={token}")).await;
        assert_refused(result, 400);

        let token = token_for(&state, "bad\nid", "Bad");
        let result = connect_async(format!("ws://{addr}/ws?token={token}")).await;
        assert_refused(result, 400);

        assert_eq!(state.live_sessions(), 0);
        assert!(state.hub.registry().is_empty());
    }

    #[tokio::test]
    async fn test_message_exchange() {
        let (addr, state) = spawn_app(test_config()).await;

        let mut alice = connect(addr, &state, "alice", "").await;
        let mut bob = connect(addr, &state, "bob", "").await;

        let online = next_json(&mut alice).await;
        assert_eq!(online["event"], "user_online");
        assert_eq!(online["data"]["userId"], "bob");
        assert_eq!(online["data"]["username"], "BOB");

        send_json(
            &mut bob,
            json!({"event": "send_message", "data": {"receiverId": "alice", "content": "hi"}}),
        )
        .await;

        let received = next_json(&mut alice).await;
        assert_eq!(received["event"], "receive_message");
        assert_eq!(received["data"]["senderId"], "bob");
        assert_eq!(received["data"]["senderUsername"], "BOB");
        assert_eq!(received["data"]["content"], "hi");
        assert_eq!(received["data"]["messageType"], "text");

        let notification = next_json(&mut alice).await;
        assert_eq!(notification["event"], "new_notification");
        assert_eq!(notification["data"]["type"], "message");
        assert_eq!(notification["data"]["title"], "New message from BOB");

        let ack = next_json(&mut bob).await;
        assert_eq!(ack["event"], "message_sent");
        assert_eq!(ack["data"]["id"], received["data"]["id"]);
    }

    #[tokio::test]
    async fn test_typing_and_offline() {
        let (addr, state) = spawn_app(test_config()).await;

        let mut alice = connect(addr, &state, "alice", "").await;
        let mut bob = connect(addr, &state, "bob", "").await;
        assert_eq!(next_json(&mut alice).await["event"], "user_online");

        send_json(&mut bob, json!({"event": "typing_start", "data": {"receiverId": "alice"}})).await;
        let typing = next_json(&mut alice).await;
        assert_eq!(typing["event"], "user_typing");
        assert_eq!(typing["data"]["userId"], "bob");
        assert_eq!(typing["data"]["isTyping"], true);

        bob.close(None).await.unwrap();
        let offline = next_json(&mut alice).await;
        assert_eq!(offline["event"], "user_offline");
        assert_eq!(offline["data"]["userId"], "bob");

        let user = state.hub.store().find_user("bob").await.unwrap().unwrap();
        assert!(!user.is_online);
    }

    #[tokio::test]
    async fn test_invalid_payload_keeps_connection() {
        let (addr, state) = spawn_app(test_config()).await;
        let mut alice = connect(addr, &state, "alice", "").await;

        alice.send(WsMessage::Text("not json".into())).await.unwrap();
        let error = next_json(&mut alice).await;
        assert_eq!(error["event"], "error");
        assert_eq!(error["data"]["message"], INVALID_PAYLOAD);

        send_json(
            &mut alice,
            json!({"event": "send_message", "data": {"receiverId": "bob", "content": "   "}}),
        )
        .await;
        let error = next_json(&mut alice).await;
        assert_eq!(error["event"], "error");
        assert_eq!(error["data"]["message"], "Message content cannot be empty");

        assert!(state.hub.registry().is_online("alice"));
    }

    #[tokio::test]
    async fn test_msgpack_encoding() {
        let (addr, state) = spawn_app(test_config()).await;
        let mut bob = connect(addr, &state, "bob", "&encoding=msgpack").await;

        let event = ClientEvent::SendMessage(SendMessage {
            receiver_id: "alice".into(),
            content: "offline hello".into(),
            message_type: MessageType::Text,
        });
        let frame = codec::encode(&event).unwrap();
        bob.send(WsMessage::Binary(frame.to_vec())).await.unwrap();

        let reply = loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), bob.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let WsMessage::Binary(data) = msg {
                break codec::decode::<ServerEvent>(&data).unwrap();
            }
        };
        assert!(matches!(reply, ServerEvent::MessageSent(_)));

        // Typing to an offline user is dropped without a reply.
        let typing = ClientEvent::TypingStop(TypingTarget {
            receiver_id: "alice".into(),
        });
        let frame = codec::encode(&typing).unwrap();
        bob.send(WsMessage::Binary(frame.to_vec())).await.unwrap();
        assert!(
            tokio::time::timeout(Duration::from_millis(100), bob.next())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (addr, state) = spawn_app(test_config()).await;
        let _alice = connect(addr, &state, "alice", "").await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"status\":\"ok\""));
        assert!(response.contains("\"online\":1"));
    }
}
