//! Test doubles shared by unit and integration tests.

use parking_lot::Mutex;
use redcard_core::ConnectionId;

use crate::outbox::Outbox;
use crate::protocol::OutboundMessage;

/// [`Outbox`] that records every delivery in order.
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    sent: Mutex<Vec<(ConnectionId, OutboundMessage)>>,
}

impl RecordingOutbox {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery so far.
    pub fn all(&self) -> Vec<(ConnectionId, OutboundMessage)> {
        self.sent.lock().clone()
    }

    /// Messages delivered to `connection`, oldest first.
    pub fn sent_to(&self, connection: &ConnectionId) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| c == connection)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Wire types delivered to `connection`, oldest first.
    pub fn kinds_to(&self, connection: &ConnectionId) -> Vec<&'static str> {
        self.sent_to(connection).iter().map(OutboundMessage::kind).collect()
    }

    /// Most recent message delivered to `connection`.
    pub fn last_to(&self, connection: &ConnectionId) -> Option<OutboundMessage> {
        self.sent_to(connection).pop()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Outbox for RecordingOutbox {
    fn deliver(&self, connection: &ConnectionId, message: &OutboundMessage) -> bool {
        self.sent.lock().push((connection.clone(), message.clone()));
        true
    }
}
