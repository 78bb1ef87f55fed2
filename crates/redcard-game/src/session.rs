//! One game session: participants, phase, hands, submissions.
//!
//! ```text
//! waiting/end ──start_game──► starting ──► voting
//!                                            │ every eligible player voted
//!                                            ▼
//!        end ◄──choose_best── choosingbest ◄──choose── choosing
//! ```
//!
//! Every status change is published on the session's phase bus under the
//! status name, with a [`PhaseView`] snapshot as payload.

use std::collections::HashSet;
use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use redcard_core::{ConnectionId, SessionId, UserId};
use redcard_settings::GameSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bus::EventBus;
use crate::deck::Deck;
use crate::errors::{GameError, Result};
use crate::protocol::{AvatarId, UserView, VoteView};
use crate::user::User;

/// Session phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Lobby; nobody has started a round yet.
    #[default]
    Waiting,
    /// Round setup in progress.
    Starting,
    /// Players are submitting cards.
    Voting,
    /// Master is shortlisting.
    Choosing,
    /// Master is picking the winner.
    ChoosingBest,
    /// Round finished; host may start another.
    End,
}

impl Status {
    /// Wire and phase-bus name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::Voting => "voting",
            Self::Choosing => "choosing",
            Self::ChoosingBest => "choosingbest",
            Self::End => "end",
        }
    }

    /// Whether the host may start a round from here.
    pub fn accepts_start(self) -> bool {
        matches!(self, Self::Waiting | Self::End)
    }

    /// Whether a round is underway.
    pub fn in_round(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Voting | Self::Choosing | Self::ChoosingBest
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected participant's delivery address and private hand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    /// User id.
    pub user_id: UserId,
    /// Where to deliver.
    pub connection: ConnectionId,
    /// That user's hand.
    pub white_cards: Vec<String>,
}

/// Snapshot handed to phase listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseView {
    /// Session id.
    pub session_id: SessionId,
    /// Status just entered.
    pub status: Status,
    /// Public participant list.
    pub users: Vec<UserView>,
    /// Round prompt.
    pub red_card: Option<String>,
    /// Submissions in arrival order.
    pub votes: Vec<VoteView>,
    /// Shortlisted author.
    pub chosen: Option<UserId>,
    /// Winning author.
    pub winner: Option<UserId>,
    /// Winning card text.
    pub winning_card: Option<String>,
    /// Connected users, each with their own hand.
    pub recipients: Vec<Recipient>,
}

/// Bus carrying phase transitions.
pub type PhaseBus = EventBus<PhaseView, GameError>;

/// A game session.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    status: Status,
    users: Vec<User>,
    red_card: Option<String>,
    votes: Vec<VoteView>,
    chosen: Option<UserId>,
    winner: Option<UserId>,
    round: u32,
    white_pile: Vec<String>,
    red_pile: Vec<String>,
    bus: PhaseBus,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// New empty session with a fresh id.
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    /// New empty session with the given id.
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            status: Status::Waiting,
            users: Vec::new(),
            red_card: None,
            votes: Vec::new(),
            chosen: None,
            winner: None,
            round: 0,
            white_pile: Vec::new(),
            red_pile: Vec::new(),
            bus: PhaseBus::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current phase.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Participants in join order.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Current prompt.
    pub fn red_card(&self) -> Option<&str> {
        self.red_card.as_deref()
    }

    /// Submissions this round, in arrival order.
    pub fn votes(&self) -> &[VoteView] {
        &self.votes
    }

    /// Shortlisted author.
    pub fn chosen(&self) -> Option<&UserId> {
        self.chosen.as_ref()
    }

    /// Winner of the last finished round.
    pub fn winner(&self) -> Option<&UserId> {
        self.winner.as_ref()
    }

    /// Rounds started so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Look up a participant.
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id() == id)
    }

    fn user_mut(&mut self, id: &UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id() == id)
    }

    /// Look up a participant by display name.
    pub fn user_by_name(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username() == username)
    }

    /// The session creator.
    pub fn host(&self) -> Option<&User> {
        self.users.iter().find(|u| u.is_host())
    }

    /// This round's judge.
    pub fn master(&self) -> Option<&User> {
        self.users.iter().find(|u| u.is_master())
    }

    /// Participants whose transport is open.
    pub fn connected_count(&self) -> usize {
        self.users.iter().filter(|u| !u.is_disconnected()).count()
    }

    /// Public participant list.
    pub fn user_views(&self) -> Vec<UserView> {
        self.users.iter().map(User::view).collect()
    }

    /// Open connection of `id`; `None` while they are disconnected.
    pub fn user_socket(&self, id: &UserId) -> Option<&ConnectionId> {
        self.user(id).and_then(User::connection)
    }

    /// Private hand of `id`.
    pub fn user_white_cards(&self, id: &UserId) -> Option<&[String]> {
        self.user(id).map(User::white_cards)
    }

    /// Phase bus, for listeners.
    pub fn bus_mut(&mut self) -> &mut PhaseBus {
        &mut self.bus
    }

    /// Drop every phase listener.
    pub fn clear_listeners(&mut self) {
        self.bus.clear_listeners();
    }

    /// Snapshot of the session for phase listeners.
    pub fn phase_view(&self) -> PhaseView {
        let winning_card = self
            .winner
            .as_ref()
            .and_then(|w| self.submission_of(w))
            .map(str::to_owned);
        PhaseView {
            session_id: self.id.clone(),
            status: self.status,
            users: self.user_views(),
            red_card: self.red_card.clone(),
            votes: self.votes.clone(),
            chosen: self.chosen.clone(),
            winner: self.winner.clone(),
            winning_card,
            recipients: self
                .users
                .iter()
                .filter_map(|u| {
                    Some(Recipient {
                        user_id: u.id().clone(),
                        connection: u.connection()?.clone(),
                        white_cards: u.white_cards().to_vec(),
                    })
                })
                .collect(),
        }
    }

    fn submission_of(&self, author: &UserId) -> Option<&str> {
        self.votes
            .iter()
            .find(|v| &v.user_id == author)
            .map(|v| v.text.as_str())
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Add a participant. The first participant becomes host.
    ///
    /// Joining mid-round is allowed; the newcomer gets cards at the next
    /// deal and does not hold up the current vote.
    pub fn add_user(
        &mut self,
        connection: ConnectionId,
        username: &str,
        avatar_id: AvatarId,
    ) -> Result<UserId> {
        let username = username.trim();
        if username.is_empty() {
            return Err(GameError::InvalidMessage("username must not be empty".into()));
        }
        if self.user_by_name(username).is_some() {
            return Err(GameError::DuplicateNickname(username.to_string()));
        }
        let host = self.users.is_empty();
        let user = User::new(connection, username.to_string(), avatar_id, host);
        let id = user.id().clone();
        debug!(session_id = %self.id, user_id = %id, username, host, "user added");
        self.users.push(user);
        Ok(id)
    }

    /// Bring a disconnected participant back on a new connection.
    pub fn reconnect_user(
        &mut self,
        user_id: &UserId,
        connection: ConnectionId,
        avatar_id: AvatarId,
    ) -> Result<()> {
        let user = self.user_mut(user_id).ok_or(GameError::MissingContext)?;
        user.reconnect(connection, avatar_id);
        debug!(session_id = %self.id, %user_id, "user reconnected");
        Ok(())
    }

    /// Mark a participant disconnected.
    ///
    /// Calls `on_empty` with the session id when nobody is left connected.
    /// Otherwise a departing master hands the round to the next connected
    /// player, and a pending vote may complete without the leaver.
    pub fn disconnect_user<F>(&mut self, user_id: &UserId, on_empty: F) -> Result<()>
    where
        F: FnOnce(&SessionId),
    {
        let index = self
            .users
            .iter()
            .position(|u| u.id() == user_id)
            .ok_or(GameError::MissingContext)?;
        if self.users[index].is_disconnected() {
            return Ok(());
        }
        self.users[index].disconnect();
        debug!(session_id = %self.id, %user_id, "user disconnected");

        if self.connected_count() == 0 {
            on_empty(&self.id);
            return Ok(());
        }
        if self.users[index].master && self.status.in_round() {
            self.hand_over_master(index)?;
        }
        let _ = self.close_voting_if_complete()?;
        Ok(())
    }

    fn next_connected_after(&self, start: usize) -> Option<usize> {
        let n = self.users.len();
        (0..n)
            .map(|k| (start + k) % n)
            .find(|&i| !self.users[i].is_disconnected())
    }

    /// Pass the master role on. The heir's own submission is withdrawn
    /// because a master never votes; the round steps back a phase when
    /// that leaves nothing to judge.
    fn hand_over_master(&mut self, from: usize) -> Result<()> {
        let Some(to) = self.next_connected_after(from + 1) else {
            return Ok(());
        };
        self.users[from].master = false;
        self.users[to].master = true;
        let heir_id = self.users[to].id().clone();
        info!(session_id = %self.id, master = %heir_id, "master handed over");

        if !self.withdraw_vote(to) {
            return Ok(());
        }
        match self.status {
            Status::Choosing | Status::ChoosingBest if self.votes.is_empty() => {
                self.chosen = None;
                self.transition(Status::Voting)
            }
            Status::ChoosingBest if self.chosen.as_ref() == Some(&heir_id) => {
                self.chosen = None;
                self.transition(Status::Choosing)
            }
            Status::Choosing => self.transition(Status::Choosing),
            _ => Ok(()),
        }
    }

    /// Return the user's submitted card to their hand. Returns whether a
    /// submission was withdrawn.
    fn withdraw_vote(&mut self, index: usize) -> bool {
        let user_id = self.users[index].id().clone();
        let Some(pos) = self.votes.iter().position(|v| v.user_id == user_id) else {
            return false;
        };
        let vote = self.votes.remove(pos);
        let user = &mut self.users[index];
        user.voted = false;
        user.white_cards.push(vote.text);
        debug!(session_id = %self.id, %user_id, "submission withdrawn");
        true
    }

    // ── Round flow ──────────────────────────────────────────────────

    /// Host starts a round: pick the master, top up every hand, draw a
    /// prompt, then publish `starting` followed by `voting`.
    ///
    /// Nothing changes unless every precondition holds.
    pub fn start_game<R: Rng + ?Sized>(
        &mut self,
        actor: &UserId,
        deck: &Deck,
        rules: &GameSettings,
        rng: &mut R,
    ) -> Result<()> {
        let user = self.user(actor).ok_or(GameError::MissingContext)?;
        if !user.is_host() {
            return Err(GameError::PermissionDenied("only the host can start the game"));
        }
        if !self.status.accepts_start() {
            return Err(GameError::InvalidPhase {
                action: "start the game",
                status: self.status,
            });
        }
        let connected = self.connected_count();
        if connected < rules.min_players {
            return Err(GameError::NotEnoughPlayers {
                required: rules.min_players,
                connected,
            });
        }
        let master = self.next_master_index().ok_or(GameError::NotEnoughPlayers {
            required: rules.min_players,
            connected,
        })?;

        let needed: usize = self
            .users
            .iter()
            .map(|u| rules.hand_size.saturating_sub(u.white_cards.len()))
            .sum();
        if self.white_pile.len() < needed {
            self.refill_white(deck, rng);
        }
        if self.white_pile.len() < needed {
            return Err(GameError::DeckExhausted);
        }
        if self.red_pile.is_empty() {
            self.red_pile = deck.red().to_vec();
            self.red_pile.shuffle(rng);
        }
        let red_card = self.red_pile.pop().ok_or(GameError::DeckExhausted)?;

        for (i, user) in self.users.iter_mut().enumerate() {
            user.master = i == master;
            user.voted = false;
            while user.white_cards.len() < rules.hand_size {
                match self.white_pile.pop() {
                    Some(card) => user.white_cards.push(card),
                    None => break,
                }
            }
        }
        self.red_card = Some(red_card);
        self.votes.clear();
        self.chosen = None;
        self.winner = None;
        self.round += 1;
        info!(
            session_id = %self.id,
            round = self.round,
            master = %self.users[master].id(),
            players = connected,
            "round started"
        );

        self.transition(Status::Starting)?;
        self.transition(Status::Voting)
    }

    /// First round: the host (or the first connected user after them).
    /// Later rounds: the next connected user after the previous master.
    fn next_master_index(&self) -> Option<usize> {
        let start = match self.users.iter().position(|u| u.master) {
            Some(previous) => previous + 1,
            None => self.users.iter().position(User::is_host).unwrap_or(0),
        };
        self.next_connected_after(start)
    }

    fn refill_white<R: Rng + ?Sized>(&mut self, deck: &Deck, rng: &mut R) {
        let held: HashSet<&str> = self
            .users
            .iter()
            .flat_map(|u| u.white_cards.iter().map(String::as_str))
            .collect();
        let mut pile: Vec<String> = deck
            .white()
            .iter()
            .filter(|c| !held.contains(c.as_str()))
            .cloned()
            .collect();
        pile.shuffle(rng);
        debug!(session_id = %self.id, cards = pile.len(), "white pile refilled");
        self.white_pile = pile;
    }

    /// Submit `card` from `user_id`'s hand. Closes voting once every
    /// eligible player has submitted.
    pub fn vote(&mut self, user_id: &UserId, card: &str) -> Result<()> {
        if self.status != Status::Voting {
            return Err(GameError::InvalidPhase {
                action: "vote",
                status: self.status,
            });
        }
        let user = self.user_mut(user_id).ok_or(GameError::MissingContext)?;
        if user.master {
            return Err(GameError::PermissionDenied("the master does not vote"));
        }
        if user.voted {
            return Err(GameError::AlreadyVoted);
        }
        if !user.play(card) {
            return Err(GameError::UnknownCard(card.to_string()));
        }
        user.voted = true;
        self.votes.push(VoteView {
            user_id: user_id.clone(),
            text: card.to_string(),
        });
        debug!(session_id = %self.id, %user_id, votes = self.votes.len(), "vote recorded");
        let _ = self.close_voting_if_complete()?;
        Ok(())
    }

    /// Whether every connected non-master player holding cards has voted.
    pub fn voting_complete(&self) -> bool {
        !self.votes.is_empty()
            && self
                .users
                .iter()
                .filter(|u| !u.is_disconnected() && !u.master)
                .filter(|u| u.voted || !u.white_cards.is_empty())
                .all(|u| u.voted)
    }

    fn close_voting_if_complete(&mut self) -> Result<bool> {
        if self.status != Status::Voting || !self.voting_complete() {
            return Ok(false);
        }
        self.transition(Status::Choosing)?;
        Ok(true)
    }

    /// Master shortlists `target`'s submission.
    pub fn choose(&mut self, actor: &UserId, target: &UserId) -> Result<()> {
        self.ensure_master(actor, "only the master can choose")?;
        if self.status != Status::Choosing {
            return Err(GameError::InvalidPhase {
                action: "choose",
                status: self.status,
            });
        }
        if self.submission_of(target).is_none() {
            return Err(GameError::UnknownSubmission(target.clone()));
        }
        self.chosen = Some(target.clone());
        self.transition(Status::ChoosingBest)
    }

    /// Master names `target` the round winner.
    pub fn choose_best(&mut self, actor: &UserId, target: &UserId) -> Result<()> {
        self.ensure_master(actor, "only the master can choose the best card")?;
        if self.status != Status::ChoosingBest {
            return Err(GameError::InvalidPhase {
                action: "choose the best card",
                status: self.status,
            });
        }
        if self.submission_of(target).is_none() {
            return Err(GameError::UnknownSubmission(target.clone()));
        }
        if let Some(winner) = self.user_mut(target) {
            winner.score += 1;
        }
        self.winner = Some(target.clone());
        info!(session_id = %self.id, round = self.round, winner = %target, "round ended");
        self.transition(Status::End)
    }

    fn ensure_master(&self, actor: &UserId, reason: &'static str) -> Result<()> {
        let user = self.user(actor).ok_or(GameError::MissingContext)?;
        if user.is_master() {
            Ok(())
        } else {
            Err(GameError::PermissionDenied(reason))
        }
    }

    fn transition(&mut self, status: Status) -> Result<()> {
        debug!(session_id = %self.id, from = %self.status, to = %status, "status change");
        self.status = status;
        let view = self.phase_view();
        let _ = self.bus.emit(status.as_str(), &view)?;
        Ok(())
    }
}
