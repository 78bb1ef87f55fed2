//! Wire protocol: `{"type": ..., "details": {...}}` envelopes in both
//! directions.
//!
//! Inbound frames are parsed in two steps so an unknown `type` is reported
//! as [`GameError::UnknownCommand`] while a known `type` with malformed
//! `details` is [`GameError::InvalidMessage`].

use std::fmt;

use redcard_core::{ConnectionId, SessionId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::{GameError, Result};
use crate::session::Status;

// ── Avatar ──────────────────────────────────────────────────────────

/// Client-chosen avatar identifier. Accepts a JSON string or integer and
/// always serializes as a string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AvatarId(String);

impl AvatarId {
    /// The identifier as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AvatarId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for AvatarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AvatarId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Number(n) => Self(n.to_string()),
        })
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Names under which commands are routed on the controller bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Create a session and become its host.
    CreateSession,
    /// Join (or rejoin) an existing session.
    JoinSession,
    /// Host starts a round.
    StartGame,
    /// Player submits a white card.
    Vote,
    /// Master shortlists a submission.
    Choose,
    /// Master picks the winning submission.
    ChooseBest,
    /// Transport reports the connection closed. Never accepted from clients.
    LostConnection,
}

impl CommandKind {
    /// Every kind, in routing-table order.
    pub const ALL: [Self; 7] = [
        Self::CreateSession,
        Self::JoinSession,
        Self::StartGame,
        Self::Vote,
        Self::Choose,
        Self::ChooseBest,
        Self::LostConnection,
    ];

    /// Wire/bus name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateSession => "createsession",
            Self::JoinSession => "joinsession",
            Self::StartGame => "startgame",
            Self::Vote => "vote",
            Self::Choose => "choose",
            Self::ChooseBest => "choosebest",
            Self::LostConnection => "lostconnection",
        }
    }

    fn from_client(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .filter(|kind| *kind != Self::LostConnection)
            .find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inbound envelope before `details` is interpreted.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    /// Command name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Command arguments; may be omitted for `startgame`.
    #[serde(default)]
    pub details: Option<Value>,
}

/// A typed client command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `createsession{username, avatarId}`
    CreateSession {
        /// Display name.
        username: String,
        /// Chosen avatar.
        avatar_id: AvatarId,
    },
    /// `joinsession{sessionId, username, avatarId}`
    JoinSession {
        /// Session to join.
        session_id: SessionId,
        /// Display name (also the reconnect key).
        username: String,
        /// Chosen avatar.
        avatar_id: AvatarId,
    },
    /// `startgame{}`
    StartGame,
    /// `vote{text}`
    Vote {
        /// Card text from the voter's hand.
        text: String,
    },
    /// `choose{userId}`
    Choose {
        /// Author of the shortlisted submission.
        user_id: UserId,
    },
    /// `choosebest{userId}`
    ChooseBest {
        /// Author of the winning submission.
        user_id: UserId,
    },
    /// Synthesized by the transport when a connection closes.
    LostConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionDetails {
    username: String,
    avatar_id: AvatarId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinSessionDetails {
    session_id: SessionId,
    username: String,
    avatar_id: AvatarId,
}

#[derive(Deserialize)]
struct VoteDetails {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PickDetails {
    user_id: UserId,
}

fn details<T: DeserializeOwned>(kind: CommandKind, raw: Option<Value>) -> Result<T> {
    let value = raw.unwrap_or(Value::Object(serde_json::Map::new()));
    serde_json::from_value(value)
        .map_err(|e| GameError::InvalidMessage(format!("{kind}: {e}")))
}

impl Command {
    /// Parse one client text frame.
    pub fn parse(text: &str) -> Result<Self> {
        let envelope: InboundMessage =
            serde_json::from_str(text).map_err(|e| GameError::InvalidMessage(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    /// Interpret an already-decoded envelope.
    pub fn from_envelope(envelope: InboundMessage) -> Result<Self> {
        let kind = CommandKind::from_client(&envelope.kind)
            .ok_or_else(|| GameError::UnknownCommand(envelope.kind.clone()))?;
        let raw = envelope.details;
        Ok(match kind {
            CommandKind::CreateSession => {
                let d: CreateSessionDetails = details(kind, raw)?;
                Self::CreateSession {
                    username: d.username,
                    avatar_id: d.avatar_id,
                }
            }
            CommandKind::JoinSession => {
                let d: JoinSessionDetails = details(kind, raw)?;
                Self::JoinSession {
                    session_id: d.session_id,
                    username: d.username,
                    avatar_id: d.avatar_id,
                }
            }
            CommandKind::StartGame => Self::StartGame,
            CommandKind::Vote => {
                let d: VoteDetails = details(kind, raw)?;
                Self::Vote { text: d.text }
            }
            CommandKind::Choose => {
                let d: PickDetails = details(kind, raw)?;
                Self::Choose { user_id: d.user_id }
            }
            CommandKind::ChooseBest => {
                let d: PickDetails = details(kind, raw)?;
                Self::ChooseBest { user_id: d.user_id }
            }
            CommandKind::LostConnection => Self::LostConnection,
        })
    }

    /// Routing name for this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::CreateSession { .. } => CommandKind::CreateSession,
            Self::JoinSession { .. } => CommandKind::JoinSession,
            Self::StartGame => CommandKind::StartGame,
            Self::Vote { .. } => CommandKind::Vote,
            Self::Choose { .. } => CommandKind::Choose,
            Self::ChooseBest { .. } => CommandKind::ChooseBest,
            Self::LostConnection => CommandKind::LostConnection,
        }
    }
}

/// A command tagged with the connection it arrived on. This is the payload
/// type of the controller bus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandEnvelope {
    /// Originating connection.
    pub connection: ConnectionId,
    /// Parsed command.
    pub command: Command,
}

// ── Outbound ────────────────────────────────────────────────────────

/// Public view of one participant. Never carries the hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// User id.
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Avatar.
    pub avatar_id: AvatarId,
    /// Session creator.
    pub host: bool,
    /// Judge for the current round.
    pub master: bool,
    /// Transport currently closed.
    pub disconnected: bool,
    /// Submitted a card this round.
    pub voted: bool,
    /// Rounds won.
    pub score: u32,
}

/// One submitted card, attributed to its author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    /// Author.
    pub user_id: UserId,
    /// Card text.
    pub text: String,
}

/// Server → client messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "details",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum OutboundMessage {
    /// Reply to `createsession`.
    Created {
        /// New session id.
        id: SessionId,
        /// Session status.
        status: Status,
        /// Participants.
        users: Vec<UserView>,
        /// The creator's own user id.
        user_id: UserId,
    },
    /// Reply to `joinsession`.
    Joined {
        /// Session id.
        id: SessionId,
        /// Session status.
        status: Status,
        /// The joiner's own user id.
        user_id: UserId,
        /// Participants.
        users: Vec<UserView>,
        /// The joiner's hand.
        white_cards: Vec<String>,
        /// Current prompt, if a round has started.
        red_card: Option<String>,
    },
    /// Someone else joined or returned.
    UserJoined {
        /// Participants.
        users: Vec<UserView>,
    },
    /// Round is being set up.
    GameStart {
        /// Always `starting`.
        status: Status,
    },
    /// Round open for submissions. Sent per user with their own hand.
    VotingStarted {
        /// Recipient's hand.
        white_cards: Vec<String>,
        /// Round prompt.
        red_card: Option<String>,
        /// Participants.
        users: Vec<UserView>,
        /// Always `voting`.
        status: Status,
        /// Submissions so far.
        votes: Vec<VoteView>,
    },
    /// Every eligible player has submitted.
    ChoosingStarted {
        /// Always `choosing`.
        status: Status,
        /// All submissions.
        votes: Vec<VoteView>,
        /// Recipient's hand.
        white_cards: Vec<String>,
    },
    /// Master shortlisted a submission.
    ChoosingBestStarted {
        /// Always `choosingbest`.
        status: Status,
        /// Author of the shortlisted submission.
        chosen: UserId,
    },
    /// Master picked the winner.
    RoundEnded {
        /// Always `end`.
        status: Status,
        /// Winning author.
        winner: UserId,
        /// Winning card text.
        card: String,
        /// Round prompt.
        red_card: Option<String>,
        /// Participants with updated scores.
        users: Vec<UserView>,
    },
    /// Someone submitted a card.
    UserVoted {
        /// Participants.
        users: Vec<UserView>,
    },
    /// Someone's connection closed.
    UserLeft {
        /// Participants.
        users: Vec<UserView>,
    },
    /// Command rejected.
    Error {
        /// Machine-readable code (see [`crate::errors`]).
        code: String,
        /// Human-readable explanation.
        message: String,
    },
}

impl OutboundMessage {
    /// Error reply for `err`.
    pub fn error(err: &GameError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Joined { .. } => "joined",
            Self::UserJoined { .. } => "userjoined",
            Self::GameStart { .. } => "gamestart",
            Self::VotingStarted { .. } => "votingstarted",
            Self::ChoosingStarted { .. } => "choosingstarted",
            Self::ChoosingBestStarted { .. } => "choosingbeststarted",
            Self::RoundEnded { .. } => "roundended",
            Self::UserVoted { .. } => "uservoted",
            Self::UserLeft { .. } => "userleft",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GameError::InvalidMessage(e.to_string()))
    }
}
