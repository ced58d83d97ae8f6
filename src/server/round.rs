//! Elimination round engine.
//!
//! Lives inside a [`Room`](super::room::Room) and runs under the room's lock.
//! Every player who answers a question wrong is knocked out; the game ends
//! when one player (the winner) or nobody is left. The engine reaches back
//! into its room only through [`RoundHost`].

use std::collections::HashMap;
use std::sync::Arc;

use rand::{Rng, RngCore};
use tracing::{debug, error, info};

use crate::data::CredentialStore;
use crate::error::RoomError;
use crate::models::{Question, RoomState};
use crate::protocol::{PlayerScore, ServerMessage};

use super::connection::ConnectionId;

/// What the round engine may ask of the room that owns it.
pub trait RoundHost {
    /// Send to every member, optionally skipping one.
    fn broadcast(&self, msg: &ServerMessage, excluding: Option<ConnectionId>);

    fn send_to_member(&self, conn: ConnectionId, msg: &ServerMessage);

    fn member_name(&self, conn: ConnectionId) -> Option<&str>;

    fn set_state(&mut self, state: RoomState);
}

/// Source of randomness for question selection.
pub type QuestionRng = Box<dyn RngCore + Send>;

/// Per-room game state machine.
pub struct RoundEngine {
    pool: Arc<[Question]>,
    accounts: Arc<dyn CredentialStore>,
    rng: QuestionRng,
    /// Index into `pool` of the question being answered.
    current: Option<usize>,
    /// Non-empty answers recorded this round, by player.
    answers: HashMap<ConnectionId, String>,
    /// Players still competing, in join order.
    active: Vec<ConnectionId>,
    /// Everyone who started the game and is still in the room.
    participants: Vec<(ConnectionId, String)>,
}

impl RoundEngine {
    pub fn new(pool: Arc<[Question]>, accounts: Arc<dyn CredentialStore>, rng: QuestionRng) -> Self {
        Self {
            pool,
            accounts,
            rng,
            current: None,
            answers: HashMap::new(),
            active: Vec::new(),
            participants: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.participants.is_empty()
    }

    pub fn active_players(&self) -> &[ConnectionId] {
        &self.active
    }

    pub fn is_active(&self, conn: ConnectionId) -> bool {
        self.active.contains(&conn)
    }

    pub fn has_answered(&self, conn: ConnectionId) -> bool {
        self.answers.contains_key(&conn)
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current.and_then(|i| self.pool.get(i))
    }

    /// Begin a game with `players` (in join order) as the active set.
    pub fn start(&mut self, host: &mut dyn RoundHost, players: &[ConnectionId]) {
        self.reset();
        host.set_state(RoomState::InGame);

        self.participants = players
            .iter()
            .filter_map(|&conn| host.member_name(conn).map(|name| (conn, name.to_string())))
            .collect();
        self.active = self.participants.iter().map(|(conn, _)| *conn).collect();

        info!(players = self.active.len(), "game started");
        host.broadcast(&ServerMessage::GameStarted {}, None);
        self.send_next_question(host);
    }

    /// Record `answer` for `conn` and resolve the round once every active
    /// player has answered.
    pub fn submit_answer(
        &mut self,
        host: &mut dyn RoundHost,
        conn: ConnectionId,
        answer: String,
    ) -> Result<(), RoomError> {
        if !self.is_active(conn) {
            return Err(RoomError::NotActivePlayer);
        }
        if answer.is_empty() {
            return Err(RoomError::EmptyAnswer);
        }
        if self.has_answered(conn) {
            return Err(RoomError::AlreadyAnswered);
        }

        debug!(player = %self.name_of(conn), "answer recorded");
        self.answers.insert(conn, answer);

        if self.all_answered() {
            self.resolve_round(host);
        }
        Ok(())
    }

    /// Voluntary withdrawal from the running game.
    pub fn surrender(&mut self, host: &mut dyn RoundHost, conn: ConnectionId) -> Result<(), RoomError> {
        if !self.is_active(conn) {
            return Err(RoomError::NotActivePlayer);
        }
        let name = self.name_of(conn);
        self.drop_out(host, conn, &name, false);
        Ok(())
    }

    /// A participant left the room mid-game. Counts as a surrender, without any
    /// notice to the player who left.
    pub fn remove_player(&mut self, host: &mut dyn RoundHost, conn: ConnectionId) {
        let name = self.name_of(conn);
        self.participants.retain(|(c, _)| *c != conn);

        if self.is_active(conn) {
            self.drop_out(host, conn, &name, true);
        }
    }

    /// Drop all game state without notifying anyone.
    pub fn abort(&mut self) {
        self.reset();
    }

    fn all_answered(&self) -> bool {
        !self.active.is_empty() && self.active.iter().all(|conn| self.answers.contains_key(conn))
    }

    fn name_of(&self, conn: ConnectionId) -> String {
        self.participants
            .iter()
            .find(|(c, _)| *c == conn)
            .map(|(_, name)| name.clone())
            .unwrap_or_default()
    }

    fn send_next_question(&mut self, host: &mut dyn RoundHost) {
        self.answers.clear();

        if self.pool.is_empty() {
            self.end_game(host, "No questions available.".to_string());
            return;
        }

        let index = self.rng.random_range(0..self.pool.len());
        self.current = Some(index);

        let msg = ServerMessage::new_question(&self.pool[index]);
        debug!(question = %self.pool[index].id, players = self.active.len(), "sending question");
        for &conn in &self.active {
            host.send_to_member(conn, &msg);
        }
    }

    fn resolve_round(&mut self, host: &mut dyn RoundHost) {
        let Some(question) = self.current_question().cloned() else {
            return;
        };

        let mut eliminated = Vec::new();
        for conn in self.active.clone() {
            let name = self.name_of(conn);
            let answer = self.answers.get(&conn).map(String::as_str).unwrap_or_default();

            let verdict = if question.is_correct(answer) {
                let new_score = self.accounts.score(&name).unwrap_or(0) + 1;
                if let Err(e) = self.accounts.set_score(&name, new_score) {
                    error!(player = %name, error = %e, "failed to persist score");
                }
                ServerMessage::AnswerResult {
                    player_username: name,
                    is_correct: true,
                    new_score: Some(new_score),
                    correct_answer: None,
                }
            } else {
                eliminated.push(conn);
                ServerMessage::AnswerResult {
                    player_username: name,
                    is_correct: false,
                    new_score: None,
                    correct_answer: Some(question.correct_answer.clone()),
                }
            };
            host.send_to_member(conn, &verdict);
        }
        self.answers.clear();

        for conn in eliminated {
            self.active.retain(|c| *c != conn);
            let name = self.name_of(conn);
            info!(player = %name, "player eliminated");

            host.send_to_member(
                conn,
                &ServerMessage::info("You answered wrong and have been eliminated!"),
            );
            host.broadcast(
                &ServerMessage::info(format!("{name} has been eliminated.")),
                Some(conn),
            );
        }

        match self.active.len() {
            0 => self.end_game(host, "Everyone was eliminated! Game over.".to_string()),
            1 => {
                let winner = self.name_of(self.active[0]);
                self.end_game(host, format!("We have a winner: {winner}!"));
            }
            _ => self.send_next_question(host),
        }
    }

    fn drop_out(&mut self, host: &mut dyn RoundHost, conn: ConnectionId, name: &str, silent: bool) {
        self.active.retain(|c| *c != conn);
        self.answers.remove(&conn);
        info!(player = %name, silent, "player dropped out");

        let verb = if silent { "left the game" } else { "surrendered" };
        match self.active.len() {
            0 => self.end_game(host, format!("{name} {verb}. Everyone lost!")),
            1 => {
                let winner = self.name_of(self.active[0]);
                self.end_game(
                    host,
                    format!("{name} {verb}. The last player remaining is {winner}!"),
                );
            }
            _ => {
                let notice = if silent {
                    format!("{name} has left the game.")
                } else {
                    format!("{name} has surrendered and is out of the game.")
                };
                host.broadcast(&ServerMessage::info(notice), None);

                // The remaining players may all have answered already.
                if self.all_answered() {
                    self.resolve_round(host);
                }
            }
        }
    }

    fn end_game(&mut self, host: &mut dyn RoundHost, message: String) {
        info!(%message, "game over");

        let final_scores = self
            .participants
            .iter()
            .map(|(_, name)| PlayerScore {
                username: name.clone(),
                score: self.accounts.score(name).unwrap_or(0),
            })
            .collect();
        host.broadcast(
            &ServerMessage::GameOver {
                message,
                final_scores,
            },
            None,
        );

        for (_, name) in &self.participants {
            if let Err(e) = self.accounts.reset_score(name) {
                error!(player = %name, error = %e, "failed to reset score");
            }
        }

        self.reset();
        host.set_state(RoomState::Lobby);
    }

    fn reset(&mut self) {
        self.current = None;
        self.answers.clear();
        self.active.clear();
        self.participants.clear();
    }
}
