//! The single task that owns command processing.
//!
//! Every socket forwards its frames here over one channel, so commands are
//! applied one at a time in arrival order and the game state needs no
//! finer-grained locking.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use redcard_core::ConnectionId;
use redcard_game::{Controller, Game};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{
    COMMAND_DURATION_SECONDS, COMMAND_ERRORS_TOTAL, COMMANDS_TOTAL, SESSIONS_ACTIVE,
};

/// Work item for the game loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame from a client.
    Frame {
        /// Sender.
        connection: ConnectionId,
        /// Raw JSON text.
        text: String,
    },
    /// A socket closed.
    Closed {
        /// The closed socket.
        connection: ConnectionId,
    },
}

/// Drain `rx` until it closes or `cancel` fires.
#[instrument(skip_all)]
pub async fn run_game_loop(
    mut rx: mpsc::Receiver<Inbound>,
    controller: Controller,
    game: Arc<Mutex<Game>>,
    cancel: CancellationToken,
) {
    info!("game loop started");
    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                handle_inbound(&controller, msg);
                #[allow(clippy::cast_precision_loss)]
                let sessions = game.lock().session_count() as f64;
                gauge!(SESSIONS_ACTIVE).set(sessions);
            }
            () = cancel.cancelled() => break,
        }
    }
    info!("game loop stopped");
}

fn handle_inbound(controller: &Controller, msg: Inbound) {
    match msg {
        Inbound::Frame { connection, text } => {
            let start = Instant::now();
            counter!(COMMANDS_TOTAL).increment(1);
            if let Err(e) = controller.dispatch(&connection, &text) {
                counter!(COMMAND_ERRORS_TOTAL, "code" => e.code()).increment(1);
                debug!(connection_id = %connection, code = e.code(), "command failed");
            }
            histogram!(COMMAND_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        }
        Inbound::Closed { connection } => {
            if let Err(e) = controller.connection_lost(&connection) {
                warn!(connection_id = %connection, error = %e, "disconnect handling failed");
            }
        }
    }
}
