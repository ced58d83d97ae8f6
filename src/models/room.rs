use serde::{Deserialize, Serialize};

/// Room identifier, assigned monotonically by the room directory.
pub type RoomId = u64;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    /// Waiting for the host to start a game.
    #[default]
    Lobby,
    /// A game is running.
    InGame,
    /// The last member left.
    Closed,
}
