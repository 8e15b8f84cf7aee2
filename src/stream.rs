use crate::collectors::Collector;
use crate::http::HttpAppState;
use crate::metrics::Metrics;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, debug_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("не удалось сериализовать снимок: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("не удалось отправить снимок клиенту: {0}")]
    Send(#[source] axum::Error),
    #[error("ошибка чтения из сокета: {0}")]
    Receive(#[source] axum::Error),
}

impl StreamError {
    fn reason(&self) -> &'static str {
        match self {
            StreamError::Serialize(_) => "serialize_error",
            StreamError::Send(_) => "send_error",
            StreamError::Receive(_) => "receive_error",
        }
    }
}

/// Orderly ways a feed stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    ClientClosed,
    Shutdown,
}

impl StreamEnd {
    fn reason(self) -> &'static str {
        match self {
            StreamEnd::ClientClosed => "client_closed",
            StreamEnd::Shutdown => "shutdown",
        }
    }
}

/// Holds one slot in `healthd_ws_connections_active`. The slot is released on drop,
/// so an unwinding connection task is still counted out (as `aborted`).
struct ConnectionGuard {
    metrics: Arc<Metrics>,
    reason: &'static str,
}

impl ConnectionGuard {
    fn new(metrics: Arc<Metrics>) -> Self {
        metrics.ws_connected();
        Self {
            metrics,
            reason: "aborted",
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.metrics.ws_disconnected(self.reason);
    }
}

pub async fn ws_handler(State(state): State<HttpAppState>, ws: WebSocketUpgrade) -> Response {
    let interval = match state.stream.resolve_interval() {
        Ok(interval) => interval,
        Err(err) => {
            warn!(error = %err, "подключение к потоку отклонено");
            state.metrics.inc_ws_rejected();
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let span = debug_span!(
        "ws_stream",
        interval = %humantime::format_duration(interval)
    );
    ws.on_upgrade(move |socket| handle_socket(socket, state, interval).instrument(span))
}

async fn handle_socket(mut socket: WebSocket, state: HttpAppState, interval: Duration) {
    let mut guard = ConnectionGuard::new(state.metrics.clone());
    debug!(
        active = state.metrics.ws_active_connections(),
        "поток подключен"
    );

    let mut shutdown = state.shutdown.clone();
    let outcome = run_feed(
        &mut socket,
        &state.collector,
        &state.metrics,
        interval,
        &mut shutdown,
    )
    .await;

    guard.reason = match &outcome {
        Ok(end) => {
            debug!(reason = end.reason(), "поток завершен");
            end.reason()
        }
        Err(err) => {
            debug!(error = %err, "поток прерван");
            err.reason()
        }
    };

    // Best effort: after a transport failure the socket is already unusable.
    let frame = matches!(outcome, Ok(StreamEnd::Shutdown)).then(|| CloseFrame {
        code: close_code::AWAY,
        reason: Cow::from("server shutdown"),
    });
    socket.send(Message::Close(frame)).await.ok();
}

/// Push-then-wait loop. Returns on the first failed send or when the wait is interrupted.
async fn run_feed(
    socket: &mut WebSocket,
    collector: &Collector,
    metrics: &Metrics,
    interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StreamEnd, StreamError> {
    if *shutdown.borrow() {
        return Ok(StreamEnd::Shutdown);
    }

    loop {
        let snapshot = collector.snapshot();
        let payload = serde_json::to_string(&snapshot)?;
        socket
            .send(Message::Text(payload))
            .await
            .map_err(StreamError::Send)?;
        metrics.inc_ws_message_sent();

        if let Some(end) = wait_tick(socket, interval, shutdown).await? {
            return Ok(end);
        }
    }
}

/// Sleeps for one tick. Inbound frames are drained only to notice a close; content is ignored.
async fn wait_tick(
    socket: &mut WebSocket,
    interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<StreamEnd>, StreamError> {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return Ok(None),
            _ = shutdown.changed() => return Ok(Some(StreamEnd::Shutdown)),
            msg = socket.recv() => match msg {
                None | Some(Ok(Message::Close(_))) => return Ok(Some(StreamEnd::ClientClosed)),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(StreamError::Receive(err)),
            },
        }
    }
}
