//! WebSocket connection management, heartbeat, and the game loop.

pub mod connection;
pub mod game_loop;
pub mod heartbeat;
pub mod hub;
pub mod session;
