//! A single game room: membership, host role and state.
//!
//! A room is always used under its own lock. Every membership or state change
//! broadcasts a full `room_update` snapshot to all members.

use std::sync::Arc;

use tracing::{debug, info};

use crate::data::CredentialStore;
use crate::error::RoomError;
use crate::models::{Question, RoomId, RoomState};
use crate::protocol::{PlayerScore, ServerMessage};

use super::connection::{ConnectionHandle, ConnectionId};
use super::round::{QuestionRng, RoundEngine, RoundHost};

/// A connection seated in a room, with the name shown to other members.
#[derive(Debug, Clone)]
pub struct Member {
    pub handle: ConnectionHandle,
    pub name: String,
}

/// Membership half of a room. The round engine sees the room through this.
pub struct Roster {
    id: RoomId,
    name: String,
    host: ConnectionId,
    /// In join order; the first entry inherits the host role.
    members: Vec<Member>,
    state: RoomState,
    accounts: Arc<dyn CredentialStore>,
}

impl Roster {
    fn member(&self, conn: ConnectionId) -> Option<&Member> {
        self.members.iter().find(|m| m.handle.id() == conn)
    }

    fn host_name(&self) -> String {
        self.member(self.host)
            .map(|m| m.name.clone())
            .unwrap_or_default()
    }

    fn snapshot(&self) -> ServerMessage {
        ServerMessage::RoomUpdate {
            room_id: self.id,
            room_name: self.name.clone(),
            host_username: self.host_name(),
            state: self.state,
            players: self
                .members
                .iter()
                .map(|m| PlayerScore {
                    username: m.name.clone(),
                    score: self.accounts.score(&m.name).unwrap_or(0),
                })
                .collect(),
        }
    }

    fn broadcast_snapshot(&self) {
        self.broadcast(&self.snapshot(), None);
    }
}

impl RoundHost for Roster {
    fn broadcast(&self, msg: &ServerMessage, excluding: Option<ConnectionId>) {
        for member in &self.members {
            if Some(member.handle.id()) == excluding {
                continue;
            }
            if !member.handle.try_send(msg.clone()) {
                debug!(room = self.id, user = %member.name, "dropped message for closed connection");
            }
        }
    }

    fn send_to_member(&self, conn: ConnectionId, msg: &ServerMessage) {
        if let Some(member) = self.member(conn) {
            member.handle.try_send(msg.clone());
        }
    }

    fn member_name(&self, conn: ConnectionId) -> Option<&str> {
        self.member(conn).map(|m| m.name.as_str())
    }

    fn set_state(&mut self, state: RoomState) {
        if self.state != state {
            debug!(room = self.id, from = ?self.state, to = ?state, "room state changed");
        }
        self.state = state;
        self.broadcast_snapshot();
    }
}

/// A room and the game running in it.
pub struct Room {
    roster: Roster,
    round: RoundEngine,
}

impl Room {
    /// Open a room with `owner` as its only member and host.
    pub fn new(
        id: RoomId,
        name: impl Into<String>,
        owner: ConnectionHandle,
        owner_name: impl Into<String>,
        pool: Arc<[Question]>,
        accounts: Arc<dyn CredentialStore>,
        rng: QuestionRng,
    ) -> Self {
        let host = owner.id();
        let roster = Roster {
            id,
            name: name.into(),
            host,
            members: vec![Member {
                handle: owner,
                name: owner_name.into(),
            }],
            state: RoomState::Lobby,
            accounts: Arc::clone(&accounts),
        };
        let room = Self {
            roster,
            round: RoundEngine::new(pool, accounts, rng),
        };

        info!(room = id, name = %room.roster.name, host = %room.roster.host_name(), "room created");
        room.roster.broadcast_snapshot();
        room
    }

    pub fn id(&self) -> RoomId {
        self.roster.id
    }

    pub fn state(&self) -> RoomState {
        self.roster.state
    }

    pub fn host(&self) -> ConnectionId {
        self.roster.host
    }

    pub fn host_name(&self) -> String {
        self.roster.host_name()
    }

    pub fn host_handle(&self) -> Option<&ConnectionHandle> {
        self.roster.member(self.roster.host).map(|m| &m.handle)
    }

    pub fn members(&self) -> &[Member] {
        &self.roster.members
    }

    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.roster.member(conn).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.members.is_empty()
    }

    pub fn round(&self) -> &RoundEngine {
        &self.round
    }

    /// Seat a new member. Returns `false` if the connection is already here.
    pub fn add_member(&mut self, handle: ConnectionHandle, name: impl Into<String>) -> bool {
        if self.contains(handle.id()) {
            return false;
        }
        let name = name.into();
        info!(room = self.roster.id, user = %name, "joined room");
        self.roster.members.push(Member { handle, name });
        self.roster.broadcast_snapshot();
        true
    }

    /// Remove a member, handing the host role on and surrendering them from a
    /// running game. The room is `Closed` once the last member is gone.
    pub fn remove_member(&mut self, conn: ConnectionId) -> bool {
        let Some(pos) = self.roster.members.iter().position(|m| m.handle.id() == conn) else {
            return false;
        };
        let member = self.roster.members.remove(pos);
        info!(room = self.roster.id, user = %member.name, "left room");

        if self.roster.members.is_empty() {
            self.round.abort();
            self.roster.state = RoomState::Closed;
            return true;
        }

        if self.roster.host == conn {
            self.roster.host = self.roster.members[0].handle.id();
            info!(room = self.roster.id, host = %self.roster.host_name(), "host transferred");
        }

        if self.roster.state == RoomState::InGame {
            self.round.remove_player(&mut self.roster, conn);
        }

        self.roster.broadcast_snapshot();
        true
    }

    /// Host only. Does nothing while a game is already running.
    pub fn start_game(&mut self, conn: ConnectionId) -> Result<(), RoomError> {
        if conn != self.roster.host {
            return Err(RoomError::HostRequired);
        }
        if self.roster.state == RoomState::InGame {
            return Ok(());
        }

        let players: Vec<ConnectionId> = self.roster.members.iter().map(|m| m.handle.id()).collect();
        self.round.start(&mut self.roster, &players);
        Ok(())
    }

    pub fn submit_answer(&mut self, conn: ConnectionId, answer: String) -> Result<(), RoomError> {
        if self.roster.state != RoomState::InGame {
            return Err(RoomError::NoGameInProgress);
        }
        self.round.submit_answer(&mut self.roster, conn, answer)
    }

    pub fn surrender(&mut self, conn: ConnectionId) -> Result<(), RoomError> {
        if self.roster.state != RoomState::InGame {
            return Err(RoomError::NoGameInProgress);
        }
        self.round.surrender(&mut self.roster, conn)
    }
}
