//! WebSocket endpoint serving one viewer at a time.
//!
//! A viewer connects to `/` with a WebSocket upgrade. The upgrade starts
//! a capture session whose pipelines write straight into the socket; a
//! second viewer arriving while a session is active gets `409 Conflict`.
//! The session ends when the viewer disconnects, when both pipelines
//! have failed, or when the server is stopped.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use beam_core::{BeamError, MessageSink, Session, SessionConfig, SessionReport, TransportWriter};

use crate::backends::ServerBackend;
use crate::config::ServerConfig;

// ── WsSink ───────────────────────────────────────────────────────

/// Sending half of a viewer socket, driven from pipeline threads by
/// blocking on the runtime that owns the connection.
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
    runtime: Handle,
}

impl WsSink {
    pub fn new(sink: SplitSink<WebSocket, Message>, runtime: Handle) -> Self {
        Self { sink, runtime }
    }
}

impl MessageSink for WsSink {
    fn send_binary(&mut self, frame: Vec<u8>) -> beam_core::Result<()> {
        self.runtime
            .block_on(self.sink.send(Message::Binary(frame)))
            .map_err(|e| BeamError::Transport(e.to_string()))
    }

    fn close(&mut self) -> beam_core::Result<()> {
        self.runtime
            .block_on(self.sink.close())
            .map_err(|e| BeamError::Transport(e.to_string()))
    }
}

// ── StreamServer ─────────────────────────────────────────────────

struct AppState {
    backend: ServerBackend,
    session: SessionConfig,
    /// One permit: held by the active viewer's session.
    viewer_slot: Arc<Semaphore>,
    shutdown: CancellationToken,
}

/// The top-level streaming server.
pub struct StreamServer {
    state: Arc<AppState>,
}

impl StreamServer {
    /// Validate the configuration and select the media backend.
    ///
    /// Nothing is opened until a viewer connects.
    pub fn new(config: &ServerConfig) -> beam_core::Result<Self> {
        let session = config.to_session_config()?;
        let backend = ServerBackend::new(config)?;
        Ok(Self {
            state: Arc::new(AppState {
                backend,
                session,
                viewer_slot: Arc::new(Semaphore::new(1)),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Token that stops the server and any active session when
    /// cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(viewer))
            .with_state(Arc::clone(&self.state))
    }

    /// Serve viewers on `listener` until stopped, then wait for the
    /// active session to finish its teardown.
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        info!("beam server listening on {}", listener.local_addr()?);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        // the slot is free again once the last session has been torn down
        let _ = self.state.viewer_slot.acquire().await;
        info!("beam server stopped");
        Ok(())
    }
}

async fn viewer(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Ok(permit) = Arc::clone(&state.viewer_slot).try_acquire_owned() else {
        warn!("viewer rejected: a session is already active");
        return (StatusCode::CONFLICT, "another viewer is connected").into_response();
    };
    ws.on_upgrade(move |socket| serve_viewer(socket, state, permit))
}

async fn serve_viewer(socket: WebSocket, state: Arc<AppState>, _permit: OwnedSemaphorePermit) {
    info!("viewer connected");
    let (sink, stream) = socket.split();
    let cancel = state.shutdown.child_token();

    let reader = tokio::spawn(watch_viewer(stream, cancel.clone()));
    let writer = TransportWriter::new(WsSink::new(sink, Handle::current()));

    let blocking_state = Arc::clone(&state);
    let blocking_cancel = cancel.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        run_session(&blocking_state, writer, blocking_cancel)
    })
    .await;

    match outcome {
        Ok(Ok(report)) => info!(
            video_frames = report.video.stats.iterations,
            audio_chunks = report.audio.stats.iterations,
            clean = report.is_clean(),
            "viewer session ended"
        ),
        Ok(Err(e)) => error!("failed to start session: {e}"),
        Err(e) => error!("session task failed: {e}"),
    }

    cancel.cancel();
    if let Err(e) = reader.await {
        warn!("viewer reader task failed: {e}");
    }
}

/// Blocking part of a viewer session, run off the async workers.
fn run_session(
    state: &AppState,
    writer: TransportWriter,
    cancel: CancellationToken,
) -> beam_core::Result<SessionReport> {
    let session = match Session::initialize(state.session.clone(), &state.backend) {
        Ok(session) => session,
        Err(e) => {
            if let Err(close) = writer.close() {
                debug!("closing viewer after failed start: {close}");
            }
            return Err(e);
        }
    };
    Ok(session.start(writer, cancel)?.wait())
}

/// Drain the receiving half so control frames are processed, and stop
/// the session when the viewer goes away.
async fn watch_viewer(mut stream: SplitStream<WebSocket>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            message = stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => {
                    info!("viewer disconnected");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("viewer connection error: {e}");
                    break;
                }
            },
        }
    }
    cancel.cancel();
}
