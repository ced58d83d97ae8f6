//! Room directory: owns every room and knows which room each connection is in.
//!
//! Lock order: the directory lock may be held while a room is locked, never the
//! other way round, and the session registry is only consulted with neither held.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::data::CredentialStore;
use crate::error::RoomError;
use crate::models::{Question, RoomId, RoomState};
use crate::protocol::ServerMessage;

use super::connection::{ConnectionHandle, ConnectionId};
use super::room::Room;
use super::round::QuestionRng;
use super::session::SessionRegistry;

/// Shared, individually locked room.
pub type SharedRoom = Arc<Mutex<Room>>;

/// Room-scoped actions forwarded to the caller's current room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAction {
    StartGame,
    SubmitAnswer { answer: String },
    Surrender,
}

#[derive(Default)]
struct DirectoryState {
    rooms: BTreeMap<RoomId, SharedRoom>,
    /// Which room each seated connection is in.
    membership: HashMap<ConnectionId, RoomId>,
    next_id: RoomId,
}

impl DirectoryState {
    /// Take `conn` out of its room, dropping the room once it is empty.
    async fn leave(&mut self, conn: ConnectionId) -> Option<RoomId> {
        let id = self.membership.remove(&conn)?;
        let Some(shared) = self.rooms.get(&id).cloned() else {
            return Some(id);
        };

        let mut room = shared.lock().await;
        room.remove_member(conn);
        if room.is_empty() {
            self.rooms.remove(&id);
            info!(room = id, "room is empty, removed");
        }
        Some(id)
    }
}

pub struct RoomDirectory {
    state: Mutex<DirectoryState>,
    questions: Arc<[Question]>,
    accounts: Arc<dyn CredentialStore>,
    seed: Option<u64>,
}

impl RoomDirectory {
    pub fn new(
        first_room_id: RoomId,
        questions: Arc<[Question]>,
        accounts: Arc<dyn CredentialStore>,
        seed: Option<u64>,
    ) -> Self {
        Self {
            state: Mutex::new(DirectoryState {
                next_id: first_room_id,
                ..Default::default()
            }),
            questions,
            accounts,
            seed,
        }
    }

    fn room_rng(&self, id: RoomId) -> QuestionRng {
        match self.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed.wrapping_add(id))),
            None => Box::new(StdRng::from_os_rng()),
        }
    }

    /// Leave any current room, then open a new one with `owner` as host.
    pub async fn create_room(&self, owner: &ConnectionHandle, identity: &str, name: &str) -> RoomId {
        let mut state = self.state.lock().await;
        state.leave(owner.id()).await;

        let id = state.next_id;
        state.next_id += 1;

        let room = Room::new(
            id,
            name,
            owner.clone(),
            identity,
            Arc::clone(&self.questions),
            Arc::clone(&self.accounts),
            self.room_rng(id),
        );
        state.rooms.insert(id, Arc::new(Mutex::new(room)));
        state.membership.insert(owner.id(), id);
        id
    }

    /// Leave any current room, then join `room_id` if it exists and is in the lobby.
    ///
    /// Joining the room the caller is already in succeeds without change.
    pub async fn join_room(
        &self,
        handle: &ConnectionHandle,
        identity: &str,
        room_id: RoomId,
    ) -> Result<(), RoomError> {
        let conn = handle.id();
        let mut state = self.state.lock().await;
        if state.membership.get(&conn) == Some(&room_id) {
            return Ok(());
        }
        state.leave(conn).await;

        let shared = state.rooms.get(&room_id).cloned().ok_or(RoomError::RoomNotFound)?;
        let mut room = shared.lock().await;
        if room.state() != RoomState::Lobby {
            return Err(RoomError::GameInProgress);
        }

        room.add_member(handle.clone(), identity);
        state.membership.insert(conn, room_id);
        Ok(())
    }

    /// Idempotent. Returns the room that was left, if any.
    pub async fn leave_current_room(&self, conn: ConnectionId) -> Option<RoomId> {
        self.state.lock().await.leave(conn).await
    }

    /// Run a room action in the caller's room. `None` if they are in no room.
    pub async fn route_to_room(
        &self,
        conn: ConnectionId,
        action: RoomAction,
    ) -> Option<Result<(), RoomError>> {
        // Only `conn` itself can take itself out of this room, so the room
        // cannot disappear between releasing the directory and locking it.
        let shared = {
            let state = self.state.lock().await;
            let id = state.membership.get(&conn)?;
            state.rooms.get(id).cloned()?
        };

        let mut room = shared.lock().await;
        let result = match action {
            RoomAction::StartGame => room.start_game(conn),
            RoomAction::SubmitAnswer { answer } => room.submit_answer(conn, answer),
            RoomAction::Surrender => room.surrender(conn),
        };
        Some(result)
    }

    /// Send an invitation for the inviter's room to `target`'s live connection.
    pub async fn invite(
        &self,
        inviter: ConnectionId,
        inviter_name: &str,
        target: &str,
        sessions: &SessionRegistry,
    ) -> Result<RoomId, RoomError> {
        let room_id = self.room_of(inviter).await.ok_or(RoomError::NotInRoom)?;
        let handle = sessions
            .lookup_connection(target)
            .await
            .ok_or_else(|| RoomError::PlayerOffline(target.to_string()))?;

        handle.try_send(ServerMessage::InviteReceived {
            from_user: inviter_name.to_string(),
            room_id,
        });
        debug!(room = room_id, from = %inviter_name, to = %target, "invitation sent");
        Ok(room_id)
    }

    /// Tell the host of `room_id` that `decliner` turned the invitation down.
    /// Returns `false` if the room is gone.
    pub async fn decline_invite(&self, decliner: &str, room_id: RoomId) -> bool {
        let state = self.state.lock().await;
        let Some(shared) = state.rooms.get(&room_id) else {
            return false;
        };

        let room = shared.lock().await;
        if let Some(host) = room.host_handle() {
            host.try_send(ServerMessage::info(format!("{decliner} has declined your invitation.")));
        }
        true
    }

    pub async fn room_of(&self, conn: ConnectionId) -> Option<RoomId> {
        self.state.lock().await.membership.get(&conn).copied()
    }

    pub async fn room(&self, id: RoomId) -> Option<SharedRoom> {
        self.state.lock().await.rooms.get(&id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::data::AccountStore;
    use crate::models::Account;
    use crate::server::connection::{Outbound, Outbox};

    fn directory() -> RoomDirectory {
        let questions: Arc<[Question]> = vec![Question {
            id: "q1".to_string(),
            text: "Capital of France?".to_string(),
            options: BTreeMap::from([
                ("A".to_string(), "Paris".to_string()),
                ("B".to_string(), "Rome".to_string()),
            ]),
            correct_answer: "A".to_string(),
        }]
        .into();
        let accounts = Arc::new(AccountStore::in_memory(
            ["alice", "bob", "carol"]
                .iter()
                .map(|n| Account::new(*n, "pw"))
                .collect(),
        ));
        RoomDirectory::new(100, questions, accounts, Some(42))
    }

    fn drain(rx: &mut Outbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            if let Outbound::Message(msg) = item {
                out.push(msg);
            }
        }
        out
    }

    /// A room is listed exactly when it has members, and every seated
    /// connection is a member of the room it is mapped to.
    async fn assert_consistent(dir: &RoomDirectory) {
        let state = dir.state.lock().await;
        for (id, shared) in &state.rooms {
            let room = shared.lock().await;
            assert!(!room.is_empty(), "room {id} is empty but still listed");
            for member in room.members() {
                assert_eq!(state.membership.get(&member.handle.id()), Some(id));
            }
        }
        for (conn, id) in &state.membership {
            let room = state.rooms.get(id).expect("membership points at a missing room");
            assert!(room.lock().await.contains(*conn));
        }
    }

    #[tokio::test]
    async fn test_room_ids_are_monotonic() {
        let dir = directory();
        let (a, _ra) = ConnectionHandle::new();
        let (b, _rb) = ConnectionHandle::new();

        assert_eq!(dir.create_room(&a, "alice", "one").await, 100);
        assert_eq!(dir.create_room(&b, "bob", "two").await, 101);
        assert_eq!(dir.room_count().await, 2);
        assert_consistent(&dir).await;
    }

    #[tokio::test]
    async fn test_create_room_leaves_previous_room() {
        let dir = directory();
        let (a, _ra) = ConnectionHandle::new();

        let first = dir.create_room(&a, "alice", "one").await;
        let second = dir.create_room(&a, "alice", "two").await;

        assert_ne!(first, second);
        assert!(dir.room(first).await.is_none());
        assert_eq!(dir.room_of(a.id()).await, Some(second));
        assert_consistent(&dir).await;
    }

    #[tokio::test]
    async fn test_join_checks_existence_and_state() {
        let dir = directory();
        let (a, _ra) = ConnectionHandle::new();
        let (b, _rb) = ConnectionHandle::new();
        let (c, _rc) = ConnectionHandle::new();

        assert_eq!(
            dir.join_room(&b, "bob", 999).await,
            Err(RoomError::RoomNotFound)
        );

        let id = dir.create_room(&a, "alice", "r").await;
        dir.join_room(&b, "bob", id).await.unwrap();
        dir.join_room(&b, "bob", id).await.unwrap();
        assert_eq!(
            dir.route_to_room(a.id(), RoomAction::StartGame).await,
            Some(Ok(()))
        );

        assert_eq!(
            dir.join_room(&c, "carol", id).await,
            Err(RoomError::GameInProgress)
        );
        assert_eq!(dir.room_of(c.id()).await, None);

        let room = dir.room(id).await.unwrap();
        assert_eq!(room.lock().await.members().len(), 2);
        assert_consistent(&dir).await;
    }

    #[tokio::test]
    async fn test_failed_join_still_leaves_old_room() {
        let dir = directory();
        let (a, _ra) = ConnectionHandle::new();

        let id = dir.create_room(&a, "alice", "r").await;
        assert!(dir.join_room(&a, "alice", 999).await.is_err());
        assert!(dir.room(id).await.is_none());
        assert_eq!(dir.room_of(a.id()).await, None);
    }

    #[tokio::test]
    async fn test_leave_removes_empty_room_and_is_idempotent() {
        let dir = directory();
        let (a, _ra) = ConnectionHandle::new();
        let (b, _rb) = ConnectionHandle::new();

        let id = dir.create_room(&a, "alice", "r").await;
        dir.join_room(&b, "bob", id).await.unwrap();

        assert_eq!(dir.leave_current_room(a.id()).await, Some(id));
        assert!(dir.room(id).await.is_some());
        assert_consistent(&dir).await;

        assert_eq!(dir.leave_current_room(b.id()).await, Some(id));
        assert!(dir.room(id).await.is_none());
        assert_eq!(dir.leave_current_room(b.id()).await, None);
        assert_eq!(dir.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_route_without_room_is_dropped() {
        let dir = directory();
        let (a, _ra) = ConnectionHandle::new();
        assert_eq!(dir.route_to_room(a.id(), RoomAction::Surrender).await, None);
    }

    #[tokio::test]
    async fn test_route_reaches_round_engine() {
        let dir = directory();
        let (a, mut ra) = ConnectionHandle::new();
        let (b, _rb) = ConnectionHandle::new();

        let id = dir.create_room(&a, "alice", "r").await;
        dir.join_room(&b, "bob", id).await.unwrap();
        assert_eq!(
            dir.route_to_room(b.id(), RoomAction::StartGame).await,
            Some(Err(RoomError::HostRequired))
        );
        dir.route_to_room(a.id(), RoomAction::StartGame).await;
        drain(&mut ra);

        let answer = |s: &str| RoomAction::SubmitAnswer { answer: s.to_string() };
        dir.route_to_room(a.id(), answer("A")).await.unwrap().unwrap();
        dir.route_to_room(b.id(), answer("B")).await.unwrap().unwrap();

        let msgs = drain(&mut ra);
        assert!(msgs.iter().any(|m| matches!(
            m,
            ServerMessage::GameOver { message, .. } if message == "We have a winner: alice!"
        )));
        let room = dir.room(id).await.unwrap();
        assert_eq!(room.lock().await.state(), RoomState::Lobby);
    }

    #[tokio::test]
    async fn test_invite_offline_player_only_tells_inviter() {
        let dir = directory();
        let sessions = SessionRegistry::new();
        let (a, mut ra) = ConnectionHandle::new();
        let (b, mut rb) = ConnectionHandle::new();
        sessions.register("alice", &a).await.unwrap();
        sessions.register("bob", &b).await.unwrap();

        let id = dir.create_room(&a, "alice", "r").await;
        dir.join_room(&b, "bob", id).await.unwrap();
        drain(&mut ra);
        drain(&mut rb);

        let err = dir.invite(a.id(), "alice", "ghost", &sessions).await.unwrap_err();
        assert_eq!(err, RoomError::PlayerOffline("ghost".to_string()));
        assert_eq!(err.to_string(), "Player ghost is not online.");
        assert!(drain(&mut rb).is_empty());
    }

    #[tokio::test]
    async fn test_invite_and_decline() {
        let dir = directory();
        let sessions = SessionRegistry::new();
        let (a, mut ra) = ConnectionHandle::new();
        let (c, mut rc) = ConnectionHandle::new();
        sessions.register("alice", &a).await.unwrap();
        sessions.register("carol", &c).await.unwrap();

        assert_eq!(
            dir.invite(a.id(), "alice", "carol", &sessions).await,
            Err(RoomError::NotInRoom)
        );

        let id = dir.create_room(&a, "alice", "r").await;
        drain(&mut ra);
        assert_eq!(dir.invite(a.id(), "alice", "carol", &sessions).await, Ok(id));
        assert_eq!(
            drain(&mut rc),
            vec![ServerMessage::InviteReceived {
                from_user: "alice".to_string(),
                room_id: id,
            }]
        );

        assert!(dir.decline_invite("carol", id).await);
        assert_eq!(
            drain(&mut ra),
            vec![ServerMessage::info("carol has declined your invitation.")]
        );
        assert!(!dir.decline_invite("carol", 999).await);
    }

    #[tokio::test]
    async fn test_concurrent_joins_keep_membership_consistent() {
        let dir = Arc::new(directory());
        let (host, _rh) = ConnectionHandle::new();
        let first = dir.create_room(&host, "alice", "one").await;
        let (other, _ro) = ConnectionHandle::new();
        let second = dir.create_room(&other, "bob", "two").await;

        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for i in 0..12 {
            let (handle, rx) = ConnectionHandle::new();
            receivers.push(rx);
            let dir = Arc::clone(&dir);
            tasks.push(tokio::spawn(async move {
                let name = format!("p{i}");
                dir.join_room(&handle, &name, first).await.unwrap();
                dir.join_room(&handle, &name, second).await.unwrap();
                if i % 2 == 0 {
                    dir.leave_current_room(handle.id()).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_consistent(&dir).await;
        let room = dir.room(second).await.unwrap();
        assert_eq!(room.lock().await.members().len(), 1 + 6);
        let room = dir.room(first).await.unwrap();
        assert_eq!(room.lock().await.members().len(), 1);
    }
}
