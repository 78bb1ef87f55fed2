//! Fan-out of session state to connected participants.

use std::sync::Arc;

use redcard_core::UserId;
use tracing::{trace, warn};

use crate::outbox::Outbox;
use crate::protocol::OutboundMessage;
use crate::session::{PhaseView, Recipient, Session, Status};
use crate::user::User;

/// Phases that produce a broadcast.
pub const BROADCAST_PHASES: [Status; 5] = [
    Status::Starting,
    Status::Voting,
    Status::Choosing,
    Status::ChoosingBest,
    Status::End,
];

/// Replace `session`'s phase listeners with one per broadcast phase, each
/// delivering through `outbox`.
pub fn install_phase_listeners(session: &mut Session, outbox: &Arc<dyn Outbox>) {
    session.clear_listeners();
    for status in BROADCAST_PHASES {
        let outbox = Arc::clone(outbox);
        session.bus_mut().on(status.as_str(), move |view: &PhaseView| {
            let _ = deliver_phase(outbox.as_ref(), view);
            Ok(())
        });
    }
}

/// Message a phase produces for one recipient.
pub fn phase_message(view: &PhaseView, recipient: &Recipient) -> Option<OutboundMessage> {
    let message = match view.status {
        Status::Starting => OutboundMessage::GameStart {
            status: view.status,
        },
        Status::Voting => OutboundMessage::VotingStarted {
            white_cards: recipient.white_cards.clone(),
            red_card: view.red_card.clone(),
            users: view.users.clone(),
            status: view.status,
            votes: view.votes.clone(),
        },
        Status::Choosing => OutboundMessage::ChoosingStarted {
            status: view.status,
            votes: view.votes.clone(),
            white_cards: recipient.white_cards.clone(),
        },
        Status::ChoosingBest => OutboundMessage::ChoosingBestStarted {
            status: view.status,
            chosen: view.chosen.clone()?,
        },
        Status::End => OutboundMessage::RoundEnded {
            status: view.status,
            winner: view.winner.clone()?,
            card: view.winning_card.clone()?,
            red_card: view.red_card.clone(),
            users: view.users.clone(),
        },
        Status::Waiting => return None,
    };
    Some(message)
}

/// Deliver a phase to every connected participant. Returns how many
/// deliveries were accepted.
pub fn deliver_phase(outbox: &dyn Outbox, view: &PhaseView) -> usize {
    let mut delivered = 0;
    for recipient in &view.recipients {
        let Some(message) = phase_message(view, recipient) else {
            warn!(session_id = %view.session_id, status = %view.status, "incomplete phase view, skipping broadcast");
            return delivered;
        };
        if outbox.deliver(&recipient.connection, &message) {
            delivered += 1;
        } else {
            trace!(connection_id = %recipient.connection, kind = message.kind(), "phase delivery dropped");
        }
    }
    delivered
}

/// Send `message` to every connected participant except `except`.
pub fn broadcast(
    outbox: &dyn Outbox,
    session: &Session,
    message: &OutboundMessage,
    except: Option<&UserId>,
) -> usize {
    session
        .users()
        .iter()
        .filter(|u| Some(u.id()) != except)
        .filter_map(User::connection)
        .filter(|connection| outbox.deliver(connection, message))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AvatarId;
    use crate::test_utils::RecordingOutbox;
    use redcard_core::ConnectionId;

    fn session(n: usize) -> (Session, Vec<UserId>) {
        let mut s = Session::new();
        let ids = (0..n)
            .map(|i| {
                s.add_user(
                    ConnectionId::from(format!("c-{i}")),
                    &format!("u{i}"),
                    AvatarId::default(),
                )
                .unwrap()
            })
            .collect();
        (s, ids)
    }

    #[test]
    fn broadcast_skips_disconnected_and_excluded() {
        let outbox = RecordingOutbox::new();
        let (mut s, ids) = session(3);
        s.disconnect_user(&ids[2], |_| {}).unwrap();

        let msg = OutboundMessage::UserJoined { users: s.user_views() };
        assert_eq!(broadcast(&outbox, &s, &msg, Some(&ids[0])), 1);
        assert_eq!(outbox.kinds_to(&ConnectionId::from("c-1")), vec!["userjoined"]);
        assert!(outbox.sent_to(&ConnectionId::from("c-0")).is_empty());
        assert!(outbox.sent_to(&ConnectionId::from("c-2")).is_empty());
    }

    #[test]
    fn install_replaces_previous_listeners() {
        let outbox: Arc<dyn Outbox> = Arc::new(RecordingOutbox::new());
        let (mut s, _) = session(1);
        install_phase_listeners(&mut s, &outbox);
        install_phase_listeners(&mut s, &outbox);
        for status in BROADCAST_PHASES {
            assert_eq!(s.bus_mut().listener_count(status.as_str()), 1);
        }
    }

    #[test]
    fn voting_message_carries_recipient_hand() {
        let (s, ids) = session(1);
        let mut view = s.phase_view();
        view.status = Status::Voting;
        let recipient = Recipient {
            user_id: ids[0].clone(),
            connection: ConnectionId::from("c-0"),
            white_cards: vec!["mine".into()],
        };
        let msg = phase_message(&view, &recipient).unwrap();
        assert!(matches!(
            msg,
            OutboundMessage::VotingStarted { ref white_cards, .. }
                if white_cards == &["mine".to_string()]
        ));
    }

    #[test]
    fn end_without_winner_produces_nothing() {
        let (s, ids) = session(1);
        let mut view = s.phase_view();
        view.status = Status::End;
        let recipient = view.recipients[0].clone();
        assert_eq!(recipient.user_id, ids[0]);
        assert!(phase_message(&view, &recipient).is_none());
    }
}
