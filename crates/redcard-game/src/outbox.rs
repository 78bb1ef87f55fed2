//! Delivery seam between the game core and the transport.

use redcard_core::ConnectionId;

use crate::protocol::OutboundMessage;

/// Queues outbound messages for a connection.
///
/// Implementations must not block: the game loop calls this while holding
/// the game lock. Returning `false` means the message was dropped (unknown
/// connection or full queue); the game does not retry.
pub trait Outbox: Send + Sync {
    /// Queue `message` for `connection`.
    fn deliver(&self, connection: &ConnectionId, message: &OutboundMessage) -> bool;
}
