//! # redcard-game
//!
//! The session state machine and everything that drives it:
//!
//! - [`bus::EventBus`]: named publish/subscribe used for inbound command
//!   routing and for per-session phase broadcasts
//! - [`session::Session`]: users, phases, hands, votes and the master's picks
//! - [`game::Game`]: session registry, connection side-table, command handlers
//! - [`controller::Controller`]: turns raw frames into typed commands
//! - [`protocol`]: inbound commands and outbound payloads
//! - [`outbox::Outbox`]: the one thing the core needs from the transport
//!
//! ```text
//! frame ─► Controller.dispatch ─► bus.emit(kind) ─► Game handler
//!                                                     │
//!                                   Session mutation ◄┘
//!                                          │
//!                       session bus.emit(status) ─► Outbox.deliver per user
//! ```

#![deny(unsafe_code)]

pub mod broadcast;
pub mod bus;
pub mod controller;
pub mod deck;
pub mod errors;
pub mod game;
pub mod outbox;
pub mod protocol;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod user;

pub use bus::EventBus;
pub use controller::Controller;
pub use deck::Deck;
pub use errors::{GameError, Result};
pub use game::{Binding, Game};
pub use outbox::Outbox;
pub use protocol::{AvatarId, Command, CommandEnvelope, CommandKind, OutboundMessage};
pub use session::{Session, Status};
pub use user::User;
