//! Server-wide shared state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::data::{AccountStore, CredentialStore, load_questions_from_path};
use crate::error::{LoadError, ServerError};
use crate::models::Question;

use super::directory::RoomDirectory;
use super::session::SessionRegistry;

/// Everything connection handlers share, built once at startup.
///
/// Tests build a fresh one per case.
pub struct ServerState {
    pub config: ServerConfig,
    pub sessions: SessionRegistry,
    pub rooms: RoomDirectory,
    pub accounts: Arc<dyn CredentialStore>,
}

impl ServerState {
    pub fn new(config: ServerConfig, questions: Vec<Question>, accounts: Arc<dyn CredentialStore>) -> Self {
        let rooms = RoomDirectory::new(
            config.first_room_id,
            questions.into(),
            Arc::clone(&accounts),
            config.rng_seed,
        );
        Self {
            config,
            sessions: SessionRegistry::new(),
            rooms,
            accounts,
        }
    }

    /// Read the question and credential files named in `config`.
    ///
    /// An empty question file is allowed; games in such a server end at once.
    pub fn load(config: ServerConfig) -> Result<Self, ServerError> {
        let questions = match load_questions_from_path(&config.questions_path) {
            Ok(questions) => questions,
            Err(LoadError::Empty) => {
                warn!(path = %config.questions_path.display(), "question file is empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let accounts = AccountStore::open(&config.users_path)?;

        info!(questions = questions.len(), "server state ready");
        Ok(Self::new(config, questions, Arc::new(accounts)))
    }
}
