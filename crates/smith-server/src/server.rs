//! The protocol server: authenticated WebSocket connections, task
//! dispatch under the concurrency cap, idle eviction, and graceful
//! shutdown.
//!
//! Authentication happens before the WebSocket upgrade completes: a bad
//! token or protocol-version mismatch is refused with a plain HTTP status
//! and no frames. Every accepted connection receives a `register` frame
//! first, then enters the message loop.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use smith_tools::Executor;
use smith_types::{
    AgentConfig, DevkitReport, Inbound, Outbound, SmithError, TaskProgress, ToolResult,
    MAX_FRAME_BYTES, PROTOCOL_VERSION,
};

use crate::stats::collect_stats;

/// Sweep period cap: the idle sweeper never ticks slower than this.
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Close codes used on the way out.
const CLOSE_NORMAL: u16 = 1000;
const CLOSE_GOING_AWAY: u16 = 1001;

// ---------------------------------------------------------------------------
// Per-connection state
// ---------------------------------------------------------------------------

/// Directives queued for a connection's writer half.
enum OutboundCommand {
    Frame(String),
    Close { code: u16, reason: &'static str },
}

/// One controller session.
struct Connection {
    id: Uuid,
    addr: String,
    outbound: mpsc::Sender<OutboundCommand>,
    last_activity: std::sync::Mutex<Instant>,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
}

impl Connection {
    fn new(addr: String, outbound: mpsc::Sender<OutboundCommand>) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            outbound,
            last_activity: std::sync::Mutex::new(Instant::now()),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Queue an outbound frame. A full or closed queue drops the frame;
    /// the writer half going away means the connection is on its way out.
    async fn send_frame(&self, frame: &Outbound) {
        if self
            .outbound
            .send(OutboundCommand::Frame(frame.to_json()))
            .await
            .is_ok()
        {
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn request_close(&self, code: u16, reason: &'static str) {
        let _ = self.outbound.send(OutboundCommand::Close { code, reason }).await;
    }
}

/// Decrements the in-flight counter when a task ends, on every path.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

struct ServerState {
    config: Arc<AgentConfig>,
    executor: Arc<Executor>,
    in_flight: Arc<AtomicUsize>,
    connections: tokio::sync::Mutex<HashMap<Uuid, Arc<Connection>>>,
    shutdown_rx: watch::Receiver<bool>,
}

/// The protocol server. Owns the listener, the connection set, and the
/// idle sweeper.
pub struct ProtocolServer {
    state: Arc<ServerState>,
    handle: axum_server::Handle,
    shutdown_tx: watch::Sender<bool>,
}

impl ProtocolServer {
    pub fn new(config: Arc<AgentConfig>, executor: Arc<Executor>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            state: Arc::new(ServerState {
                config,
                executor,
                in_flight: Arc::new(AtomicUsize::new(0)),
                connections: tokio::sync::Mutex::new(HashMap::new()),
                shutdown_rx,
            }),
            handle: axum_server::Handle::new(),
            shutdown_tx,
        }
    }

    /// Address the listener is bound to (available once serving).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    /// Bind and serve until [`shutdown`](Self::shutdown) is called.
    ///
    /// With both `tls_cert` and `tls_key` configured the listener is
    /// TLS-wrapped; behavior above the transport is identical.
    pub async fn run(&self) -> Result<(), SmithError> {
        let state = Arc::clone(&self.state);
        let app = Router::new()
            .route("/", get(ws_upgrade))
            .with_state(Arc::clone(&state));
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.port));
        let sweeper = self.spawn_idle_sweeper();

        info!(
            %addr,
            tls = self.state.config.tls_cert.is_some(),
            "protocol server starting"
        );

        let served = match (&self.state.config.tls_cert, &self.state.config.tls_key) {
            (Some(cert), Some(key)) => {
                let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
                    .await
                    .map_err(|e| SmithError::Config(format!("cannot load TLS material: {e}")))?;
                axum_server::bind_rustls(addr, tls)
                    .handle(self.handle.clone())
                    .serve(make_service)
                    .await
            }
            _ => {
                axum_server::bind(addr)
                    .handle(self.handle.clone())
                    .serve(make_service)
                    .await
            }
        };

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        served.map_err(|e| SmithError::Internal(format!("listener failed: {e}")))
    }

    /// Stop accepting, close every connection with "going away", and wait
    /// for the accept loop to return. Idempotent; in-flight tools are not
    /// cancelled, their own timeouts bound them.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return; // already shut down
        }
        info!("protocol server shutting down");

        let connections: Vec<Arc<Connection>> =
            self.state.connections.lock().await.values().cloned().collect();
        for connection in connections {
            connection.request_close(CLOSE_GOING_AWAY, "going away").await;
        }

        self.handle.graceful_shutdown(Some(Duration::from_secs(5)));
    }

    /// One periodic task closes idle connections across the whole server.
    fn spawn_idle_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let idle_timeout = Duration::from_millis(self.state.config.idle_timeout_ms?);
        let period = idle_timeout.min(MAX_SWEEP_PERIOD);
        let state = Arc::clone(&self.state);
        let mut shutdown_rx = self.state.shutdown_rx.clone();

        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let connections: Vec<Arc<Connection>> =
                            state.connections.lock().await.values().cloned().collect();
                        for connection in connections {
                            if connection.idle_for() > idle_timeout {
                                info!(
                                    connection = %connection.id,
                                    client = %connection.addr,
                                    "closing idle connection"
                                );
                                connection.request_close(CLOSE_NORMAL, "idle timeout").await;
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

fn constant_time_token_eq(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// `GET /`: authenticate, then upgrade.
async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let presented = headers
        .get("x-smith-auth")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if presented.is_empty() || !constant_time_token_eq(presented, &state.config.auth_token) {
        warn!(client = %addr, "handshake refused: bad auth token");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if let Some(raw) = headers.get("x-smith-protocol-version") {
        let matches = raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok())
            .map(|v| v == PROTOCOL_VERSION);
        if matches != Some(true) {
            warn!(client = %addr, "handshake refused: protocol version mismatch");
            return StatusCode::UPGRADE_REQUIRED.into_response();
        }
    }

    let state = Arc::clone(&state);
    ws.on_upgrade(move |socket| handle_connection(socket, addr, state))
        .into_response()
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

async fn handle_connection(socket: WebSocket, addr: SocketAddr, state: Arc<ServerState>) {
    let (mut sink, mut source) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundCommand>(64);
    let connection = Arc::new(Connection::new(addr.to_string(), outbound_tx));

    state
        .connections
        .lock()
        .await
        .insert(connection.id, Arc::clone(&connection));
    info!(connection = %connection.id, client = %connection.addr, "connection accepted");

    // Dedicated writer task: everything outbound funnels through one
    // ordered channel, so task frames from spawned work and inline
    // replies cannot interleave mid-frame or stall the reader.
    let writer = tokio::spawn(async move {
        while let Some(command) = outbound_rx.recv().await {
            match command {
                OutboundCommand::Frame(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                OutboundCommand::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // The register frame is the first outbound frame on every connection:
    // it is queued before the reader processes anything.
    connection
        .send_frame(&Outbound::Register {
            name: state.config.name.clone(),
            capabilities: state.executor.capabilities(),
            protocol_version: PROTOCOL_VERSION,
        })
        .await;

    let mut shutdown_rx = state.shutdown_rx.clone();

    loop {
        tokio::select! {
            message = source.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(text.as_str(), &connection, &state).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => handle_frame(text, &connection, &state).await,
                        Err(_) => warn!(connection = %connection.id, "dropping non-UTF-8 binary frame"),
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => connection.touch(),
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %connection.id, "client closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(connection = %connection.id, error = %e, "socket error");
                    break;
                }
                None => break,
            },

            _ = wait_for_shutdown(&mut shutdown_rx) => {
                connection.request_close(CLOSE_GOING_AWAY, "going away").await;
                break;
            }
        }
    }

    state.connections.lock().await.remove(&connection.id);
    // Wake the writer if it is still draining; a close directive after the
    // writer already finished lands on a closed channel and is ignored.
    connection.request_close(CLOSE_NORMAL, "connection closed").await;
    let _ = tokio::time::timeout(Duration::from_secs(5), writer).await;
    info!(
        connection = %connection.id,
        client = %connection.addr,
        received = connection.frames_received.load(Ordering::Relaxed),
        sent = connection.frames_sent.load(Ordering::Relaxed),
        "connection closed"
    );
}

/// Loop on `changed()` rather than `wait_for` so no lock guard is held
/// across the select.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Frame dispatch
// ---------------------------------------------------------------------------

async fn handle_frame(text: &str, connection: &Arc<Connection>, state: &Arc<ServerState>) {
    connection.touch();

    // Oversized frames are logged and dropped; the connection survives.
    if text.len() > MAX_FRAME_BYTES {
        warn!(
            connection = %connection.id,
            size = text.len(),
            limit = MAX_FRAME_BYTES,
            "dropping oversized frame"
        );
        return;
    }

    let frame = match Inbound::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(connection = %connection.id, error = %e, "unparseable frame");
            return;
        }
    };

    match frame {
        Inbound::Task { id, payload } => {
            dispatch_task(id, payload, connection, state).await;
        }
        Inbound::Ping { .. } => {
            connection
                .send_frame(&Outbound::Pong {
                    stats: collect_stats(),
                })
                .await;
        }
        Inbound::ConfigQuery => {
            let ctx = state.executor.context();
            connection
                .send_frame(&Outbound::ConfigReport {
                    devkit: DevkitReport {
                        sandbox_dir: state.config.sandbox_dir.display().to_string(),
                        readonly_mode: state.config.readonly_mode,
                        enabled_categories: ctx.enabled_categories(),
                    },
                })
                .await;
        }
        Inbound::Unknown { kind } => {
            warn!(connection = %connection.id, kind, "unknown message type");
        }
    }
}

/// Launch a task asynchronously so a long tool never blocks the next
/// `ping` on the same channel. The concurrency cap is claimed atomically
/// before the spawn; a claimed slot is released by the drop guard.
async fn dispatch_task(
    id: String,
    payload: smith_types::TaskPayload,
    connection: &Arc<Connection>,
    state: &Arc<ServerState>,
) {
    let max = state.config.max_concurrent_tasks;
    let claimed = state
        .in_flight
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            if n < max {
                Some(n + 1)
            } else {
                None
            }
        });

    if claimed.is_err() {
        warn!(
            task_id = %id,
            tool = %payload.tool,
            client = %connection.addr,
            "task rejected: agent busy"
        );
        connection
            .send_frame(&Outbound::TaskResult {
                id,
                result: ToolResult::fail(SmithError::Busy(max).to_string(), 0),
            })
            .await;
        return;
    }

    let connection = Arc::clone(connection);
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let _slot = InFlightGuard(Arc::clone(&state.in_flight));

        // Audit lines carry a digest of the arguments, never the raw
        // payload, so secrets in tool inputs stay out of the logs.
        let input_hash = hash_args(&payload.args);
        info!(
            task_id = %id,
            tool = %payload.tool,
            client = %connection.addr,
            input_hash = %input_hash,
            "task started"
        );
        connection
            .send_frame(&Outbound::TaskProgress {
                id: id.clone(),
                progress: TaskProgress {
                    message: format!("started {}", payload.tool),
                    percent: Some(0),
                },
            })
            .await;

        let result = state.executor.execute(&payload.tool, payload.args).await;

        info!(
            task_id = %id,
            tool = %payload.tool,
            client = %connection.addr,
            input_hash = %input_hash,
            success = result.success,
            duration_ms = result.duration_ms,
            "task finished"
        );
        connection
            .send_frame(&Outbound::TaskResult { id, result })
            .await;
    });
}

/// SHA-256 hex digest of the serialized task arguments.
fn hash_args(args: &serde_json::Value) -> String {
    let serialized = serde_json::to_string(args).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}
