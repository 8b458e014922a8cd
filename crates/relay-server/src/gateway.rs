use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use relay_core::backend::ChatBackend;
use relay_core::{ClientId, Frame};

use crate::dispatch::Dispatcher;
use crate::keepalive::{self, KEEPALIVE_INTERVAL};
use crate::proxy::RequestProxy;
use crate::registry::ConnectionRegistry;
use crate::sessions::SessionStore;

const WELCOME: &str = "Connected to Gemini WebSocket Server";
const STATUS_PAYLOAD: &str = "Gemini WebSocket Server is running";

/// Gateway configuration. Host and port are inputs, not forked code paths.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub keepalive_interval: Duration,
    pub proxy_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            max_send_queue: 256,
            keepalive_interval: KEEPALIVE_INTERVAL,
            proxy_timeout: Duration::from_secs(60),
        }
    }
}

/// Composition root for the per-connection lifecycle. Owns the registry,
/// the session store, and the dispatcher; every task that needs them
/// reaches them through this instance.
pub struct Gateway {
    config: GatewayConfig,
    registry: ConnectionRegistry,
    sessions: Arc<SessionStore>,
    dispatcher: Dispatcher,
}

impl Gateway {
    pub fn new(config: GatewayConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let registry = ConnectionRegistry::new(config.max_send_queue);
        let sessions = Arc::new(SessionStore::new(backend));
        let proxy = Arc::new(RequestProxy::with_timeout(config.proxy_timeout));
        let dispatcher = Dispatcher::new(Arc::clone(&sessions), proxy);
        Self {
            config,
            registry,
            sessions,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }
}

/// Build the axum router with the WebSocket routes and the status probe.
pub fn build_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .route("/ws", get(ws_handler))
        .route("/ws/{client_id}", get(ws_handler_with_id))
        .with_state(gateway)
        .layer(CorsLayer::permissive())
}

/// Bind and serve. Returns a handle that keeps the server task alive.
pub async fn start(
    config: GatewayConfig,
    backend: Arc<dyn ChatBackend>,
) -> Result<GatewayHandle, std::io::Error> {
    let addr = format!("{}:{}", config.host, config.port);
    let gateway = Arc::new(Gateway::new(config, backend));
    let router = build_router(Arc::clone(&gateway));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, backend = gateway.sessions.backend_name(), "Gateway listening");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(GatewayHandle {
        addr: local_addr,
        gateway,
        _server: server,
    })
}

/// Handle returned by `start()`.
pub struct GatewayHandle {
    pub addr: SocketAddr,
    gateway: Arc<Gateway>,
    _server: tokio::task::JoinHandle<()>,
}

impl GatewayHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }
}

/// Liveness probe, independent of connection state.
async fn status_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": STATUS_PAYLOAD }))
}

/// WebSocket upgrade without a path identity: one is generated.
async fn ws_handler(ws: WebSocketUpgrade, State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    let client_id = ClientId::generate();
    ws.on_upgrade(move |socket| serve_connection(gateway, socket, client_id))
}

/// WebSocket upgrade addressed by a path-embedded identity.
async fn ws_handler_with_id(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(gateway): State<Arc<Gateway>>,
) -> impl IntoResponse {
    let client_id = ClientId::from_path_segment(&client_id);
    ws.on_upgrade(move |socket| serve_connection(gateway, socket, client_id))
}

/// Per-connection lifecycle: CONNECTING → OPEN → CLOSING → CLOSED.
async fn serve_connection(gateway: Arc<Gateway>, mut socket: WebSocket, client_id: ClientId) {
    tracing::info!(client_id = %client_id, "New connection");

    // CONNECTING: register, then open the backend session. Both run on
    // this task before any frame is served, so no one can observe a
    // half-initialized pairing for this id.
    let (serial, tx, rx, cancel) = gateway.registry.register(&client_id);

    if let Err(e) = gateway.sessions.open(&client_id, serial).await {
        tracing::error!(client_id = %client_id, error = %e, "Failed to create chat session");
        send_direct(&mut socket, &Frame::error(e.to_string())).await;
        teardown(&gateway, &client_id, serial, &cancel);
        return;
    }

    // OPEN: greet, then start the writer and the keepalive supervisor.
    if !send_direct(
        &mut socket,
        &Frame::Connected {
            content: WELCOME.to_owned(),
        },
    )
    .await
    {
        teardown(&gateway, &client_id, serial, &cancel);
        return;
    }

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = spawn_writer(client_id.clone(), ws_tx, rx, cancel.clone());
    let pinger = keepalive::spawn(
        client_id.clone(),
        tx.clone(),
        cancel.clone(),
        gateway.config.keepalive_interval,
    );

    // Read loop: unbounded, one in-flight request per connection. Every
    // exit path below is an OPEN → CLOSING transition.
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            inbound = ws_rx.next() => match inbound {
                Some(Ok(WsMessage::Text(text))) => {
                    gateway.dispatcher.dispatch(&client_id, text.as_str(), &tx).await;
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::info!(client_id = %client_id, "Connection closed by client");
                    break;
                }
                Some(Ok(_)) => {} // binary and transport ping/pong carry no frames
                Some(Err(e)) => {
                    tracing::info!(client_id = %client_id, error = %e, "Connection error");
                    break;
                }
            }
        }
    }

    // CLOSING → CLOSED: stop the supervisor and writer, then drop the
    // per-client state.
    cancel.cancel();
    let _ = tokio::join!(writer, pinger);
    teardown(&gateway, &client_id, serial, &cancel);
    tracing::info!(client_id = %client_id, "Connection cleaned up");
}

/// Idempotent teardown, safe to run more than once for the same id. The
/// serial guard keeps a superseded connection from touching the state of
/// the connection that replaced it.
fn teardown(gateway: &Gateway, client_id: &ClientId, serial: u64, cancel: &CancellationToken) {
    cancel.cancel();
    let unregistered = gateway.registry.unregister(client_id, serial);
    let closed = gateway.sessions.close(client_id, serial);
    if unregistered || closed {
        tracing::debug!(client_id = %client_id, serial, "Released connection state");
    }
}

async fn send_direct(socket: &mut WebSocket, frame: &Frame) -> bool {
    let Ok(json) = frame.to_json() else {
        return false;
    };
    socket.send(WsMessage::Text(json.into())).await.is_ok()
}

/// Writer task: drains the outbound queue onto the socket in order. A
/// write failure means the transport is dead, which cancels the
/// connection token.
fn spawn_writer(
    client_id: ClientId,
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<Frame>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    let Ok(json) = frame.to_json() else { continue };
                    if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                        tracing::info!(client_id = %client_id, "Write failed, closing connection");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    })
}
