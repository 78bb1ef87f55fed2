//! Session registry and command handlers.
//!
//! `Game` owns every live [`Session`] plus a side-table mapping each bound
//! connection to its `(session, user)` pair. Handlers look the pair up,
//! authorize, mutate the session, and reply through the [`Outbox`]. A
//! rejected command gets an `error` reply on its own connection only.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use redcard_core::{ConnectionId, SessionId, UserId};
use redcard_settings::GameSettings;
use tracing::{debug, info, warn};

use crate::broadcast::{broadcast, install_phase_listeners};
use crate::controller::Controller;
use crate::deck::Deck;
use crate::errors::{GameError, Result};
use crate::outbox::Outbox;
use crate::protocol::{AvatarId, Command, CommandEnvelope, CommandKind, OutboundMessage};
use crate::session::{Session, Status};
use crate::user::User;

/// Which session and user a connection speaks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// Session the connection belongs to.
    pub session_id: SessionId,
    /// User the connection speaks for.
    pub user_id: UserId,
}

/// All live sessions and connection bindings.
pub struct Game {
    sessions: HashMap<SessionId, Session>,
    bindings: HashMap<ConnectionId, Binding>,
    outbox: Arc<dyn Outbox>,
    deck: Deck,
    rules: GameSettings,
    rng: StdRng,
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("sessions", &self.sessions.len())
            .field("bindings", &self.bindings.len())
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Game {
    /// Game with an OS-seeded shuffle.
    pub fn new(rules: GameSettings, deck: Deck, outbox: Arc<dyn Outbox>) -> Self {
        Self::with_rng(rules, deck, outbox, StdRng::from_os_rng())
    }

    /// Game with a caller-supplied RNG (seeded in tests).
    pub fn with_rng(rules: GameSettings, deck: Deck, outbox: Arc<dyn Outbox>, rng: StdRng) -> Self {
        Self {
            sessions: HashMap::new(),
            bindings: HashMap::new(),
            outbox,
            deck,
            rules,
            rng,
        }
    }

    /// Subscribe `game` to every command kind on `controller`'s bus.
    pub fn attach(game: &Arc<Mutex<Self>>, controller: &mut Controller) {
        for kind in CommandKind::ALL {
            let game = Arc::clone(game);
            controller.on(kind, move |envelope: &CommandEnvelope| game.lock().handle(envelope));
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of connections bound to a session.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Look up a session.
    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// What `connection` is bound to, if anything.
    pub fn binding(&self, connection: &ConnectionId) -> Option<&Binding> {
        self.bindings.get(connection)
    }

    /// Run one command. Failures are reported to the originating
    /// connection and returned.
    pub fn handle(&mut self, envelope: &CommandEnvelope) -> Result<()> {
        let connection = &envelope.connection;
        let result = match &envelope.command {
            Command::CreateSession {
                username,
                avatar_id,
            } => self.create_session(connection, username, avatar_id),
            Command::JoinSession {
                session_id,
                username,
                avatar_id,
            } => self.join_session(connection, session_id, username, avatar_id),
            Command::StartGame => self.start_game(connection),
            Command::Vote { text } => self.vote(connection, text),
            Command::Choose { user_id } => self.choose(connection, user_id),
            Command::ChooseBest { user_id } => self.choose_best(connection, user_id),
            Command::LostConnection => self.connection_lost(connection),
        };
        if let Err(err) = &result {
            self.report(connection, err);
        }
        result
    }

    /// Send an `error` reply to `connection`.
    pub fn report(&self, connection: &ConnectionId, err: &GameError) {
        debug!(connection_id = %connection, code = err.code(), error = %err, "command rejected");
        let _ = self.outbox.deliver(connection, &OutboundMessage::error(err));
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn create_session(
        &mut self,
        connection: &ConnectionId,
        username: &str,
        avatar_id: &AvatarId,
    ) -> Result<()> {
        ensure_username(username)?;
        self.leave_current(connection);

        let mut session = Session::new();
        install_phase_listeners(&mut session, &self.outbox);
        let user_id = session.add_user(connection.clone(), username, avatar_id.clone())?;
        let session_id = session.id().clone();

        let reply = OutboundMessage::Created {
            id: session_id.clone(),
            status: session.status(),
            users: session.user_views(),
            user_id: user_id.clone(),
        };
        let _ = self.sessions.insert(session_id.clone(), session);
        self.bind(connection, &session_id, &user_id);
        info!(%session_id, %user_id, username = username.trim(), "session created");
        let _ = self.outbox.deliver(connection, &reply);
        Ok(())
    }

    fn join_session(
        &mut self,
        connection: &ConnectionId,
        session_id: &SessionId,
        username: &str,
        avatar_id: &AvatarId,
    ) -> Result<()> {
        ensure_username(username)?;
        let username = username.trim();
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.clone()))?;
        if self
            .bindings
            .get(connection)
            .is_some_and(|b| &b.session_id == session_id)
        {
            return Err(GameError::AlreadyJoined(session_id.clone()));
        }
        let returning = match session.user_by_name(username) {
            Some(user) if user.is_disconnected() => Some(user.id().clone()),
            Some(_) => return Err(GameError::DuplicateNickname(username.to_string())),
            None => None,
        };

        self.leave_current(connection);
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.clone()))?;
        let user_id = match returning {
            Some(user_id) => {
                session.reconnect_user(&user_id, connection.clone(), avatar_id.clone())?;
                user_id
            }
            None => session.add_user(connection.clone(), username, avatar_id.clone())?,
        };

        let reply = OutboundMessage::Joined {
            id: session_id.clone(),
            status: session.status(),
            user_id: user_id.clone(),
            users: session.user_views(),
            white_cards: session.user_white_cards(&user_id).unwrap_or_default().to_vec(),
            red_card: session.red_card().map(str::to_owned),
        };
        let _ = self.outbox.deliver(connection, &reply);
        let notice = OutboundMessage::UserJoined {
            users: session.user_views(),
        };
        let _ = broadcast(self.outbox.as_ref(), session, &notice, Some(&user_id));
        info!(%session_id, %user_id, username, status = %session.status(), "user joined");
        self.bind(connection, session_id, &user_id);
        Ok(())
    }

    fn start_game(&mut self, connection: &ConnectionId) -> Result<()> {
        let binding = self.bound(connection)?;
        let session = self
            .sessions
            .get_mut(&binding.session_id)
            .ok_or(GameError::MissingContext)?;
        if !session.user(&binding.user_id).is_some_and(User::is_host) {
            return Err(GameError::PermissionDenied("only the host can start the game"));
        }
        install_phase_listeners(session, &self.outbox);
        session.start_game(&binding.user_id, &self.deck, &self.rules, &mut self.rng)
    }

    fn vote(&mut self, connection: &ConnectionId, text: &str) -> Result<()> {
        let binding = self.bound(connection)?;
        let session = self
            .sessions
            .get_mut(&binding.session_id)
            .ok_or(GameError::MissingContext)?;
        session.vote(&binding.user_id, text)?;
        if session.status() == Status::Voting {
            let notice = OutboundMessage::UserVoted {
                users: session.user_views(),
            };
            let _ = broadcast(self.outbox.as_ref(), session, &notice, None);
        }
        Ok(())
    }

    fn choose(&mut self, connection: &ConnectionId, target: &UserId) -> Result<()> {
        let binding = self.bound(connection)?;
        self.sessions
            .get_mut(&binding.session_id)
            .ok_or(GameError::MissingContext)?
            .choose(&binding.user_id, target)
    }

    fn choose_best(&mut self, connection: &ConnectionId, target: &UserId) -> Result<()> {
        let binding = self.bound(connection)?;
        self.sessions
            .get_mut(&binding.session_id)
            .ok_or(GameError::MissingContext)?
            .choose_best(&binding.user_id, target)
    }

    fn connection_lost(&mut self, connection: &ConnectionId) -> Result<()> {
        let Some(binding) = self.bindings.remove(connection) else {
            debug!(connection_id = %connection, "unbound connection closed");
            return Ok(());
        };
        let Some(session) = self.sessions.get_mut(&binding.session_id) else {
            return Ok(());
        };
        let mut emptied = false;
        session.disconnect_user(&binding.user_id, |_| emptied = true)?;
        if emptied {
            self.end_session(&binding.session_id);
        } else {
            let notice = OutboundMessage::UserLeft {
                users: session.user_views(),
            };
            let _ = broadcast(self.outbox.as_ref(), session, &notice, None);
            info!(session_id = %binding.session_id, user_id = %binding.user_id, "user left");
        }
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn bound(&self, connection: &ConnectionId) -> Result<Binding> {
        self.bindings
            .get(connection)
            .cloned()
            .ok_or(GameError::MissingContext)
    }

    fn bind(&mut self, connection: &ConnectionId, session_id: &SessionId, user_id: &UserId) {
        let _ = self.bindings.insert(
            connection.clone(),
            Binding {
                session_id: session_id.clone(),
                user_id: user_id.clone(),
            },
        );
    }

    /// Detach `connection` from whatever session it is in, as if it had
    /// closed.
    fn leave_current(&mut self, connection: &ConnectionId) {
        if !self.bindings.contains_key(connection) {
            return;
        }
        if let Err(err) = self.connection_lost(connection) {
            warn!(connection_id = %connection, error = %err, "failed to leave previous session");
        }
    }

    fn end_session(&mut self, session_id: &SessionId) {
        if let Some(mut session) = self.sessions.remove(session_id) {
            session.clear_listeners();
        }
        self.bindings.retain(|_, b| &b.session_id != session_id);
        info!(%session_id, remaining = self.sessions.len(), "session ended");
    }
}

fn ensure_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(GameError::InvalidMessage("username must not be empty".into()));
    }
    Ok(())
}
