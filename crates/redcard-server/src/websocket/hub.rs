//! Registry of open sockets and the game's [`Outbox`].

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use redcard_core::ConnectionId;
use redcard_game::Outbox;
use redcard_game::protocol::OutboundMessage;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::WS_SEND_DROPS_TOTAL;

/// Open sockets indexed by connection id.
///
/// Uses a blocking lock so delivery can happen from inside the game loop's
/// synchronous handlers.
#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket.
    pub fn add(&self, connection: Arc<ClientConnection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Forget a socket.
    pub fn remove(&self, id: &ConnectionId) {
        let _ = self.connections.write().remove(id);
    }

    /// Look up a socket.
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Open socket count.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Queue a raw text frame for `id`.
    pub fn send_text(&self, id: &ConnectionId, text: Arc<String>) -> bool {
        let Some(connection) = self.get(id) else {
            debug!(connection_id = %id, "send to unknown connection");
            return false;
        };
        if connection.send(text) {
            true
        } else {
            counter!(WS_SEND_DROPS_TOTAL).increment(1);
            warn!(
                connection_id = %id,
                dropped = connection.drop_count(),
                "outbound queue full or closed, message dropped"
            );
            false
        }
    }
}

impl Outbox for ConnectionHub {
    fn deliver(&self, connection: &ConnectionId, message: &OutboundMessage) -> bool {
        match message.to_json() {
            Ok(json) => self.send_text(connection, Arc::new(json)),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to serialize outbound message");
                false
            }
        }
    }
}
