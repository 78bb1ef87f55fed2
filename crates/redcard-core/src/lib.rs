//! # redcard-core
//!
//! Shared vocabulary for the redcard crates:
//!
//! - **Branded IDs**: `SessionId`, `UserId`, `ConnectionId` as newtypes so a
//!   connection id can never be handed to something expecting a user id
//! - **Logging**: `tracing` subscriber installation

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;

pub use ids::{ConnectionId, SessionId, UserId};
