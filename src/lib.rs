//! # quiz-arena
//!
//! A multiplayer elimination quiz server.
//!
//! Clients connect over TCP and speak length-prefixed JSON frames
//! (see [`protocol`]). After logging in they create or join rooms; the host
//! starts a game and every player who answers a question wrong is knocked
//! out until one winner, or nobody, is left.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use quiz_arena::{ServerConfig, ServerState};
//!
//! # async fn start() -> Result<(), quiz_arena::error::ServerError> {
//! let state = ServerState::load(ServerConfig::default())?;
//! quiz_arena::server::run(Arc::new(state)).await
//! # }
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod protocol;
pub mod server;

pub use config::ServerConfig;
pub use data::{AccountStore, CredentialStore};
pub use models::{Account, AccountStatus, Question, RoomId, RoomState};
pub use server::ServerState;
