//! # redcard-server
//!
//! Axum HTTP + `WebSocket` transport for the game core.
//!
//! - `/ws`: one socket per player; frames go to a single game-loop task
//! - `/health`: uptime, connection and session counts
//! - `/metrics`: Prometheus text format
//! - Heartbeat ping/pong with dead-peer eviction
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::RedcardServer;
