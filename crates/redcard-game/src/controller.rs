//! Inbound command routing.
//!
//! The controller parses each text frame into a [`Command`] and emits it on
//! its bus under the command's name. Frames that fail to parse never reach
//! the bus; the sender gets an `error` reply instead.

use std::sync::Arc;

use redcard_core::ConnectionId;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::errors::{GameError, Result};
use crate::outbox::Outbox;
use crate::protocol::{Command, CommandEnvelope, CommandKind, OutboundMessage};

/// Bus carrying inbound commands.
pub type CommandBus = EventBus<CommandEnvelope, GameError>;

/// Frame parser and command router.
pub struct Controller {
    bus: CommandBus,
    outbox: Arc<dyn Outbox>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("bus", &self.bus).finish_non_exhaustive()
    }
}

impl Controller {
    /// Controller with no subscribers. Parse errors are replied through
    /// `outbox`.
    pub fn new(outbox: Arc<dyn Outbox>) -> Self {
        Self {
            bus: CommandBus::new(),
            outbox,
        }
    }

    /// Subscribe `handler` to commands of `kind`.
    pub fn on<F>(&mut self, kind: CommandKind, handler: F)
    where
        F: Fn(&CommandEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.bus.on(kind.as_str(), handler);
    }

    /// Subscriber count for `kind`.
    pub fn listener_count(&self, kind: CommandKind) -> usize {
        self.bus.listener_count(kind.as_str())
    }

    /// Parse one client frame and route it.
    pub fn dispatch(&self, connection: &ConnectionId, frame: &str) -> Result<()> {
        match Command::parse(frame) {
            Ok(command) => self.submit(&CommandEnvelope {
                connection: connection.clone(),
                command,
            }),
            Err(err) => {
                debug!(connection_id = %connection, error = %err, "unparsable frame");
                self.reply_error(connection, &err);
                Err(err)
            }
        }
    }

    /// Route the transport's notice that `connection` closed.
    pub fn connection_lost(&self, connection: &ConnectionId) -> Result<()> {
        self.submit(&CommandEnvelope {
            connection: connection.clone(),
            command: Command::LostConnection,
        })
    }

    /// Emit an already-parsed command.
    pub fn submit(&self, envelope: &CommandEnvelope) -> Result<()> {
        let kind = envelope.command.kind();
        let handled = self.bus.emit(kind.as_str(), envelope)?;
        if handled == 0 {
            warn!(connection_id = %envelope.connection, command = %kind, "no handler registered");
            if kind != CommandKind::LostConnection {
                let err = GameError::UnknownCommand(kind.as_str().to_string());
                self.reply_error(&envelope.connection, &err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn reply_error(&self, connection: &ConnectionId, err: &GameError) {
        let _ = self.outbox.deliver(connection, &OutboundMessage::error(err));
    }
}
