//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use redcard_core::ConnectionId;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::game_loop::Inbound;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::hub::ConnectionHub;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_HEARTBEAT_TIMEOUTS_TOTAL,
};

/// What a socket task needs from the server.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// Socket registry the game delivers through.
    pub hub: Arc<ConnectionHub>,
    /// Queue into the game loop.
    pub inbound: mpsc::Sender<Inbound>,
    /// Ping cadence.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before eviction.
    pub heartbeat_timeout: Duration,
    /// Outbound queue depth for this socket.
    pub send_queue_size: usize,
    /// Server-wide shutdown signal.
    pub shutdown: CancellationToken,
}

/// Run one client socket.
///
/// 1. Registers the connection with the hub so the game can reach it
/// 2. Forwards text frames to the game loop
/// 3. Drains the outbound queue and sends pings on the heartbeat cadence
/// 4. Evicts the peer after missed pongs
/// 5. On exit, unregisters and tells the game loop the socket closed
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(ws: WebSocket, connection_id: ConnectionId, ctx: SessionContext) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(ctx.send_queue_size.max(1));
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));
    let started = Instant::now();

    ctx.hub.add(connection.clone());
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let local = ctx.shutdown.child_token();
    let ping = Arc::new(Notify::new());

    let writer_ping = ping.clone();
    let writer_cancel = local.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_ping.notified() => {
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
                () = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let hb_connection = connection.clone();
    let hb_cancel = local.clone();
    let hb_ping = ping.clone();
    let (interval, timeout) = (ctx.heartbeat_interval, ctx.heartbeat_timeout);
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(
            &hb_connection,
            interval,
            timeout,
            hb_cancel.clone(),
            || hb_ping.notify_one(),
        )
        .await;
        if result == HeartbeatResult::TimedOut {
            warn!(silent_for = ?hb_connection.last_pong_elapsed(), "client unresponsive, disconnecting");
            counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
            hb_cancel.cancel();
        }
    });

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = local.cancelled() => break,
        };
        let Some(Ok(msg)) = frame else { break };
        connection.mark_alive();
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "non-UTF8 binary frame ignored");
                    continue;
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        let inbound = Inbound::Frame {
            connection: connection_id.clone(),
            text,
        };
        if ctx.inbound.send(inbound).await.is_err() {
            warn!("game loop gone, closing socket");
            break;
        }
    }

    local.cancel();
    ctx.hub.remove(&connection_id);
    let _ = ctx
        .inbound
        .send(Inbound::Closed {
            connection: connection_id.clone(),
        })
        .await;
    let _ = heartbeat.await;
    let _ = writer.await;

    info!(age = ?connection.age(), dropped = connection.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
