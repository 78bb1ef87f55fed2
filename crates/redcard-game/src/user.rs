//! A participant in one session.

use redcard_core::{ConnectionId, UserId};

use crate::protocol::{AvatarId, UserView};

/// Per-session participant record.
///
/// The hand is private: [`User::view`] never includes it.
#[derive(Clone, Debug)]
pub struct User {
    id: UserId,
    username: String,
    avatar_id: AvatarId,
    /// `None` while the transport is closed.
    connection: Option<ConnectionId>,
    host: bool,
    pub(crate) master: bool,
    pub(crate) voted: bool,
    pub(crate) score: u32,
    pub(crate) white_cards: Vec<String>,
}

impl User {
    pub(crate) fn new(
        connection: ConnectionId,
        username: String,
        avatar_id: AvatarId,
        host: bool,
    ) -> Self {
        Self {
            id: UserId::new(),
            username,
            avatar_id,
            connection: Some(connection),
            host,
            master: false,
            voted: false,
            score: 0,
            white_cards: Vec::new(),
        }
    }

    /// User id.
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Display name, unique within the session.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Avatar.
    pub fn avatar_id(&self) -> &AvatarId {
        &self.avatar_id
    }

    /// Open transport connection, if any.
    pub fn connection(&self) -> Option<&ConnectionId> {
        self.connection.as_ref()
    }

    /// Session creator.
    pub fn is_host(&self) -> bool {
        self.host
    }

    /// Judge for the current round.
    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Transport currently closed.
    pub fn is_disconnected(&self) -> bool {
        self.connection.is_none()
    }

    /// Submitted a card this round.
    pub fn has_voted(&self) -> bool {
        self.voted
    }

    /// Rounds won.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Private hand.
    pub fn white_cards(&self) -> &[String] {
        &self.white_cards
    }

    /// Point the user at a new connection and mark them present again.
    pub(crate) fn reconnect(&mut self, connection: ConnectionId, avatar_id: AvatarId) {
        self.connection = Some(connection);
        self.avatar_id = avatar_id;
    }

    /// Drop the connection association.
    pub(crate) fn disconnect(&mut self) {
        self.connection = None;
    }

    /// Remove `card` from the hand. Returns `false` if it was not held.
    pub(crate) fn play(&mut self, card: &str) -> bool {
        match self.white_cards.iter().position(|c| c == card) {
            Some(index) => {
                let _ = self.white_cards.remove(index);
                true
            }
            None => false,
        }
    }

    /// Public projection.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar_id: self.avatar_id.clone(),
            host: self.host,
            master: self.master,
            disconnected: self.is_disconnected(),
            voted: self.voted,
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(ConnectionId::from("c-1"), "ann".into(), AvatarId::from("1"), true)
    }

    #[test]
    fn new_user_defaults() {
        let u = user();
        assert!(u.is_host());
        assert!(!u.is_master());
        assert!(!u.is_disconnected());
        assert!(!u.has_voted());
        assert_eq!(u.score(), 0);
        assert!(u.white_cards().is_empty());
    }

    #[test]
    fn play_removes_only_held_card() {
        let mut u = user();
        u.white_cards = vec!["a".into(), "b".into()];
        assert!(u.play("a"));
        assert!(!u.play("a"));
        assert_eq!(u.white_cards(), ["b".to_string()]);
    }

    #[test]
    fn reconnect_updates_connection() {
        let mut u = user();
        u.disconnect();
        assert!(u.is_disconnected());
        assert!(u.connection().is_none());
        u.reconnect(ConnectionId::from("c-2"), AvatarId::from("9"));
        assert!(!u.is_disconnected());
        assert_eq!(u.connection().map(ConnectionId::as_str), Some("c-2"));
        assert_eq!(u.avatar_id().as_str(), "9");
    }

    #[test]
    fn view_hides_hand() {
        let mut u = user();
        u.white_cards = vec!["secret".into()];
        let json = serde_json::to_string(&u.view()).unwrap();
        assert!(!json.contains("secret"));
    }
}
