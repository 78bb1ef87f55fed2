//! Game error codes and error type.
//!
//! Every rejection is terminal for the single command that caused it and is
//! reported only to the connection that sent that command.

use redcard_core::{SessionId, UserId};

use crate::session::Status;

// ── Error code constants ────────────────────────────────────────────

/// Join referenced an unknown session.
pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
/// Action not allowed in the session's current status.
pub const INVALID_PHASE: &str = "INVALID_PHASE";
/// Actor lacks the required role.
pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
/// Username already in use in the session.
pub const DUPLICATE_NICKNAME: &str = "DUPLICATE_NICKNAME";
/// User already submitted a card this round.
pub const ALREADY_VOTED: &str = "ALREADY_VOTED";
/// Card is not in the user's hand.
pub const UNKNOWN_CARD: &str = "UNKNOWN_CARD";
/// Target user has no submission this round.
pub const UNKNOWN_SUBMISSION: &str = "UNKNOWN_SUBMISSION";
/// Connection is not bound to a session/user.
pub const MISSING_CONTEXT: &str = "MISSING_CONTEXT";
/// Connection is already bound to the session it tried to join.
pub const ALREADY_JOINED: &str = "ALREADY_JOINED";
/// Too few connected players to start.
pub const NOT_ENOUGH_PLAYERS: &str = "NOT_ENOUGH_PLAYERS";
/// Deck cannot supply the cards a round needs.
pub const DECK_EXHAUSTED: &str = "DECK_EXHAUSTED";
/// Inbound frame could not be parsed.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
/// Inbound frame named a command nobody accepts.
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";

/// Error type raised by session operations and command handlers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// No session with this id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Status does not allow the action.
    #[error("cannot {action} while session is {status}")]
    InvalidPhase {
        /// What was attempted (e.g. `"vote"`).
        action: &'static str,
        /// Status at the time of the attempt.
        status: Status,
    },

    /// Actor is not host/master, or is the master trying to vote.
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    /// Username already taken.
    #[error("username already taken: {0}")]
    DuplicateNickname(String),

    /// Second vote in the same round.
    #[error("already voted this round")]
    AlreadyVoted,

    /// Voted card is not in the voter's hand.
    #[error("card not in hand: {0}")]
    UnknownCard(String),

    /// Master picked a user who has not submitted a card.
    #[error("no submission from user {0}")]
    UnknownSubmission(UserId),

    /// Connection has no session/user bound.
    #[error("connection has no active session")]
    MissingContext,

    /// Connection is already a member of that session.
    #[error("already joined session {0}")]
    AlreadyJoined(SessionId),

    /// Fewer connected players than the configured minimum.
    #[error("need at least {required} connected players, have {connected}")]
    NotEnoughPlayers {
        /// Configured minimum.
        required: usize,
        /// Currently connected.
        connected: usize,
    },

    /// Not enough undealt cards for the round.
    #[error("not enough cards left to deal")]
    DeckExhausted,

    /// Frame was not a valid `{type, details}` envelope for its kind.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Frame named an unknown or client-forbidden command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl GameError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => SESSION_NOT_FOUND,
            Self::InvalidPhase { .. } => INVALID_PHASE,
            Self::PermissionDenied(_) => PERMISSION_DENIED,
            Self::DuplicateNickname(_) => DUPLICATE_NICKNAME,
            Self::AlreadyVoted => ALREADY_VOTED,
            Self::UnknownCard(_) => UNKNOWN_CARD,
            Self::UnknownSubmission(_) => UNKNOWN_SUBMISSION,
            Self::MissingContext => MISSING_CONTEXT,
            Self::AlreadyJoined(_) => ALREADY_JOINED,
            Self::NotEnoughPlayers { .. } => NOT_ENOUGH_PLAYERS,
            Self::DeckExhausted => DECK_EXHAUSTED,
            Self::InvalidMessage(_) => INVALID_MESSAGE,
            Self::UnknownCommand(_) => UNKNOWN_COMMAND,
        }
    }
}

/// Result type for game operations.
pub type Result<T> = std::result::Result<T, GameError>;
