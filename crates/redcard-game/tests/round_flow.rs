//! Full rounds driven through the controller with JSON frames.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use redcard_core::{ConnectionId, SessionId, UserId};
use redcard_game::protocol::{OutboundMessage, UserView};
use redcard_game::test_utils::RecordingOutbox;
use redcard_game::{Controller, Deck, Game, GameError, Status};
use redcard_settings::GameSettings;
use serde_json::json;

struct Table {
    controller: Controller,
    game: Arc<Mutex<Game>>,
    outbox: Arc<RecordingOutbox>,
}

impl Table {
    fn new(min_players: usize) -> Self {
        let outbox = Arc::new(RecordingOutbox::new());
        let rules = GameSettings {
            hand_size: 5,
            min_players,
            deck_path: None,
        };
        let game = Arc::new(Mutex::new(Game::with_rng(
            rules,
            Deck::builtin(),
            outbox.clone(),
            StdRng::seed_from_u64(42),
        )));
        let mut controller = Controller::new(outbox.clone());
        Game::attach(&game, &mut controller);
        Self {
            controller,
            game,
            outbox,
        }
    }

    fn send(&self, conn: &str, frame: serde_json::Value) -> Result<(), GameError> {
        self.controller
            .dispatch(&ConnectionId::from(conn), &frame.to_string())
    }

    fn drop_connection(&self, conn: &str) {
        self.controller
            .connection_lost(&ConnectionId::from(conn))
            .unwrap();
    }

    fn last(&self, conn: &str) -> OutboundMessage {
        self.outbox
            .last_to(&ConnectionId::from(conn))
            .expect("no message delivered")
    }

    fn kinds(&self, conn: &str) -> Vec<&'static str> {
        self.outbox.kinds_to(&ConnectionId::from(conn))
    }

    fn create(&self, conn: &str, username: &str) -> (SessionId, UserId) {
        self.send(
            conn,
            json!({"type": "createsession", "details": {"username": username, "avatarId": 1}}),
        )
        .unwrap();
        match self.last(conn) {
            OutboundMessage::Created { id, user_id, .. } => (id, user_id),
            other => panic!("expected created, got {other:?}"),
        }
    }

    fn join(&self, conn: &str, session: &SessionId, username: &str) -> UserId {
        self.send(
            conn,
            json!({"type": "joinsession", "details": {"sessionId": session, "username": username, "avatarId": "2"}}),
        )
        .unwrap();
        match self.last(conn) {
            OutboundMessage::Joined { user_id, .. } => user_id,
            other => panic!("expected joined, got {other:?}"),
        }
    }

    /// Hand from the most recent `votingstarted` sent to `conn`.
    fn hand(&self, conn: &str) -> Vec<String> {
        self.outbox
            .sent_to(&ConnectionId::from(conn))
            .into_iter()
            .rev()
            .find_map(|m| match m {
                OutboundMessage::VotingStarted { white_cards, .. } => Some(white_cards),
                _ => None,
            })
            .expect("no votingstarted delivered")
    }

    fn vote_first(&self, conn: &str) -> String {
        let card = self.hand(conn)[0].clone();
        self.send(conn, json!({"type": "vote", "details": {"text": card}}))
            .unwrap();
        card
    }

    fn status(&self, session: &SessionId) -> Status {
        self.game.lock().session(session).unwrap().status()
    }
}

fn error_code(message: &OutboundMessage) -> &str {
    match message {
        OutboundMessage::Error { code, .. } => code,
        other => panic!("expected error, got {other:?}"),
    }
}

fn find_user<'a>(users: &'a [UserView], id: &UserId) -> &'a UserView {
    users.iter().find(|u| &u.id == id).expect("user missing")
}

/// ann hosts, bo and cy join.
fn three_players(table: &Table) -> (SessionId, [UserId; 3]) {
    let (session, ann) = table.create("c-ann", "ann");
    let bo = table.join("c-bo", &session, "bo");
    let cy = table.join("c-cy", &session, "cy");
    (session, [ann, bo, cy])
}

#[test]
fn full_round() {
    let table = Table::new(2);
    let (session, [ann, bo, cy]) = three_players(&table);
    assert_eq!(table.kinds("c-ann"), vec!["created", "userjoined", "userjoined"]);

    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    for conn in ["c-ann", "c-bo", "c-cy"] {
        let kinds = table.kinds(conn);
        assert_eq!(&kinds[kinds.len() - 2..], ["gamestart", "votingstarted"]);
        assert_eq!(table.hand(conn).len(), 5);
    }
    match table.last("c-bo") {
        OutboundMessage::VotingStarted {
            users,
            red_card,
            status,
            votes,
            ..
        } => {
            assert_eq!(status, Status::Voting);
            assert!(red_card.is_some());
            assert!(votes.is_empty());
            assert!(find_user(&users, &ann).master);
        }
        other => panic!("unexpected {other:?}"),
    }

    let bo_card = table.vote_first("c-bo");
    assert_eq!(table.last("c-ann").kind(), "uservoted");
    assert_eq!(table.last("c-bo").kind(), "uservoted");

    let cy_card = table.vote_first("c-cy");
    assert_eq!(table.status(&session), Status::Choosing);
    match table.last("c-ann") {
        OutboundMessage::ChoosingStarted { votes, status, .. } => {
            assert_eq!(status, Status::Choosing);
            let texts: Vec<_> = votes.iter().map(|v| (v.user_id.clone(), v.text.clone())).collect();
            assert_eq!(texts, vec![(bo.clone(), bo_card.clone()), (cy.clone(), cy_card)]);
        }
        other => panic!("unexpected {other:?}"),
    }
    match table.last("c-cy") {
        OutboundMessage::ChoosingStarted { white_cards, .. } => assert_eq!(white_cards.len(), 4),
        other => panic!("unexpected {other:?}"),
    }

    table
        .send("c-ann", json!({"type": "choose", "details": {"userId": bo}}))
        .unwrap();
    assert_eq!(
        table.last("c-cy"),
        OutboundMessage::ChoosingBestStarted {
            status: Status::ChoosingBest,
            chosen: bo.clone(),
        }
    );

    table
        .send("c-ann", json!({"type": "choosebest", "details": {"userId": bo}}))
        .unwrap();
    match table.last("c-bo") {
        OutboundMessage::RoundEnded {
            status,
            winner,
            card,
            users,
            ..
        } => {
            assert_eq!(status, Status::End);
            assert_eq!(winner, bo);
            assert_eq!(card, bo_card);
            assert_eq!(find_user(&users, &bo).score, 1);
            assert_eq!(find_user(&users, &cy).score, 0);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(table.status(&session), Status::End);
}

#[test]
fn next_round_rotates_master_and_refills_hands() {
    let table = Table::new(2);
    let (_, [_, bo, _]) = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let _ = table.vote_first("c-bo");
    let _ = table.vote_first("c-cy");
    table
        .send("c-ann", json!({"type": "choose", "details": {"userId": bo}}))
        .unwrap();
    table
        .send("c-ann", json!({"type": "choosebest", "details": {"userId": bo}}))
        .unwrap();

    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    match table.last("c-cy") {
        OutboundMessage::VotingStarted {
            users, white_cards, ..
        } => {
            assert!(find_user(&users, &bo).master);
            assert!(users.iter().all(|u| !u.voted));
            assert_eq!(white_cards.len(), 5);
        }
        other => panic!("unexpected {other:?}"),
    }
    // bo is master now; ann plays.
    assert_eq!(
        table
            .send("c-bo", json!({"type": "vote", "details": {"text": table.hand("c-bo")[0]}}))
            .unwrap_err()
            .code(),
        "PERMISSION_DENIED"
    );
    let _ = table.vote_first("c-ann");
    assert_eq!(table.last("c-ann").kind(), "uservoted");
}

#[test]
fn only_host_may_start() {
    let table = Table::new(2);
    let (session, _) = three_players(&table);
    let err = table.send("c-bo", json!({"type": "startgame", "details": {}})).unwrap_err();
    assert_eq!(err.code(), "PERMISSION_DENIED");
    assert_eq!(error_code(&table.last("c-bo")), "PERMISSION_DENIED");
    assert_eq!(table.last("c-ann").kind(), "userjoined");
    assert_eq!(table.status(&session), Status::Waiting);
}

#[test]
fn start_needs_enough_players() {
    let table = Table::new(3);
    let (session, _) = table.create("c-ann", "ann");
    let _ = table.join("c-bo", &session, "bo");
    let _ = table.send("c-ann", json!({"type": "startgame"}));
    assert_eq!(error_code(&table.last("c-ann")), "NOT_ENOUGH_PLAYERS");
}

#[test]
fn errors_go_only_to_sender() {
    let table = Table::new(2);
    let (_, [_, bo, _]) = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let before_ann = table.kinds("c-ann").len();
    let before_cy = table.kinds("c-cy").len();

    let _ = table.send("c-bo", json!({"type": "choose", "details": {"userId": bo}}));
    assert_eq!(error_code(&table.last("c-bo")), "PERMISSION_DENIED");
    let _ = table.send("c-bo", json!({"type": "vote", "details": {"text": "no such card"}}));
    assert_eq!(error_code(&table.last("c-bo")), "UNKNOWN_CARD");
    let _ = table.send("c-bo", json!({"type": "vote"}));
    assert_eq!(error_code(&table.last("c-bo")), "INVALID_MESSAGE");
    let _ = table.send("c-bo", json!({"type": "lostconnection"}));
    assert_eq!(error_code(&table.last("c-bo")), "UNKNOWN_COMMAND");

    assert_eq!(table.kinds("c-ann").len(), before_ann);
    assert_eq!(table.kinds("c-cy").len(), before_cy);
}

#[test]
fn double_vote_is_rejected() {
    let table = Table::new(2);
    let _ = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let card = table.vote_first("c-bo");
    let err = table
        .send("c-bo", json!({"type": "vote", "details": {"text": card}}))
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_VOTED");
}

#[test]
fn disconnect_and_rejoin_mid_round_keeps_hand() {
    let table = Table::new(2);
    let (session, [_, bo, _]) = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let hand = table.hand("c-bo");

    table.drop_connection("c-bo");
    match table.last("c-cy") {
        OutboundMessage::UserLeft { users } => assert!(find_user(&users, &bo).disconnected),
        other => panic!("unexpected {other:?}"),
    }

    let rejoined = table.join("c-bo-2", &session, "bo");
    assert_eq!(rejoined, bo);
    match table.last("c-bo-2") {
        OutboundMessage::Joined {
            status,
            white_cards,
            red_card,
            users,
            ..
        } => {
            assert_eq!(status, Status::Voting);
            assert_eq!(white_cards, hand);
            assert!(red_card.is_some());
            assert!(!find_user(&users, &bo).disconnected);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(table.last("c-ann").kind(), "userjoined");

    // The new connection speaks for bo.
    let card = hand[0].clone();
    table
        .send("c-bo-2", json!({"type": "vote", "details": {"text": card}}))
        .unwrap();
}

#[test]
fn rejoin_after_voting_keeps_vote() {
    let table = Table::new(2);
    let (session, [_, bo, _]) = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let card = table.vote_first("c-bo");
    table.drop_connection("c-bo");
    assert_eq!(table.status(&session), Status::Voting);

    assert_eq!(table.join("c-bo-2", &session, "bo"), bo);
    match table.last("c-bo-2") {
        OutboundMessage::Joined {
            white_cards, users, ..
        } => {
            assert!(find_user(&users, &bo).voted);
            assert!(!white_cards.contains(&card));
        }
        other => panic!("unexpected {other:?}"),
    }
    {
        let game = table.game.lock();
        let votes = game.session(&session).unwrap().votes();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].user_id, bo);
        assert_eq!(votes[0].text, card);
    }

    let other = table.hand("c-bo")[1].clone();
    let err = table
        .send("c-bo-2", json!({"type": "vote", "details": {"text": other}}))
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_VOTED");
    assert_eq!(error_code(&table.last("c-bo-2")), "ALREADY_VOTED");
}

#[test]
fn holdout_leaving_opens_choosing() {
    let table = Table::new(2);
    let (session, _) = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let _ = table.vote_first("c-bo");

    table.drop_connection("c-cy");
    assert_eq!(table.status(&session), Status::Choosing);
    let kinds = table.kinds("c-ann");
    assert_eq!(&kinds[kinds.len() - 2..], ["choosingstarted", "userleft"]);
}

#[test]
fn mid_game_joiner_waits_for_next_deal() {
    let table = Table::new(2);
    let (session, ann) = table.create("c-ann", "ann");
    let _ = table.join("c-bo", &session, "bo");
    table.send("c-ann", json!({"type": "startgame"})).unwrap();

    let _ = table.join("c-dee", &session, "dee");
    match table.last("c-dee") {
        OutboundMessage::Joined { white_cards, status, .. } => {
            assert!(white_cards.is_empty());
            assert_eq!(status, Status::Voting);
        }
        other => panic!("unexpected {other:?}"),
    }
    let _ = table.vote_first("c-bo");
    assert_eq!(table.status(&session), Status::Choosing);
    assert!(table.game.lock().session(&session).unwrap().user(&ann).unwrap().is_master());
}

#[test]
fn taken_nickname_is_rejected() {
    let table = Table::new(2);
    let (session, _) = table.create("c-ann", "ann");
    let err = table
        .send(
            "c-x",
            json!({"type": "joinsession", "details": {"sessionId": session, "username": "ann", "avatarId": 3}}),
        )
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_NICKNAME");
    assert!(table.game.lock().binding(&ConnectionId::from("c-x")).is_none());
}

#[test]
fn everyone_leaving_ends_session() {
    let table = Table::new(2);
    let (session, _) = three_players(&table);
    for conn in ["c-ann", "c-bo", "c-cy"] {
        table.drop_connection(conn);
    }
    assert_eq!(table.game.lock().session_count(), 0);

    let err = table
        .send(
            "c-new",
            json!({"type": "joinsession", "details": {"sessionId": session, "username": "ann", "avatarId": 1}}),
        )
        .unwrap_err();
    assert_eq!(err.code(), "SESSION_NOT_FOUND");
}

#[test]
fn choose_unknown_submission() {
    let table = Table::new(2);
    let (_, [ann, _, _]) = three_players(&table);
    table.send("c-ann", json!({"type": "startgame"})).unwrap();
    let _ = table.vote_first("c-bo");
    let _ = table.vote_first("c-cy");
    let err = table
        .send("c-ann", json!({"type": "choose", "details": {"userId": ann}}))
        .unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_SUBMISSION");
}
