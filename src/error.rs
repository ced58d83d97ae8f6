//! Error types for every layer of the server.
//!
//! - [`ProtocolError`]: framing and decoding failures, always fatal to the connection
//! - [`AuthError`]: login and account failures, reported back to the client
//! - [`RoomError`]: room and game rule violations, reported as `info` notices
//! - [`StoreError`] / [`LoadError`]: credential and question file failures
//! - [`ServerError`]: startup failures
//!
//! The `Display` text of [`AuthError`] and [`RoomError`] is what the client sees.

use std::io;

use thiserror::Error;

use crate::protocol::MAX_FRAME_LENGTH;

/// Frame-level failures. The connection is torn down on any of these.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed message body: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProtocolError {
    pub(crate) fn too_large(len: usize) -> Self {
        ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LENGTH,
        }
    }
}

/// Credential and session admission failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("User not found.")]
    UnknownUser,

    #[error("Invalid password.")]
    WrongPassword,

    #[error("Your account is permanently blocked.")]
    Blocked,

    #[error("Account already logged in elsewhere.")]
    AlreadyLoggedIn,

    #[error("Username already exists.")]
    UsernameTaken,

    #[error("Server error saving new account.")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether this failure counts toward the per-connection strike limit.
    pub fn is_strike(&self) -> bool {
        matches!(self, AuthError::UnknownUser | AuthError::WrongPassword)
    }
}

/// Room and game rule violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room not found.")]
    RoomNotFound,

    #[error("Game is already in progress.")]
    GameInProgress,

    #[error("Only the host can start the game.")]
    HostRequired,

    #[error("You are not in a room.")]
    NotInRoom,

    #[error("No game is in progress.")]
    NoGameInProgress,

    #[error("You are not an active player in this game.")]
    NotActivePlayer,

    #[error("You have already answered this question.")]
    AlreadyAnswered,

    #[error("Answer must not be empty.")]
    EmptyAnswer,

    #[error("Player {0} is not online.")]
    PlayerOffline(String),
}

/// Credential file failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access credential file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse credential file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Question file failures.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read question file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse question file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("question file contains no questions")]
    Empty,
}

/// Failures that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind: {0}")]
    Bind(#[from] io::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
