//! WebSocket server and connection handling.
//!
//! Each accepted socket gets a [`handler::game_ws`] task. All game state
//! lives in a single [`server::GameServer`] task that the connection tasks
//! talk to through a [`server::GameServerHandle`].

pub mod handler;
pub mod server;

/// Connection ID type for identifying WebSocket clients.
pub type ConnId = u64;

/// Outbound item queued for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// JSON text frame
    Text(String),
    /// Close the connection once everything queued before it is sent
    Close,
}
