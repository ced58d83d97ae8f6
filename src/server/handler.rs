//! Per-connection message dispatch.
//!
//! A connection starts unauthenticated and may only log in or create an
//! account. After a successful login every action is available until logout
//! or disconnect.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{AuthError, RoomError};
use crate::protocol::{ClientMessage, Envelope, ServerMessage};

use super::connection::ConnectionHandle;
use super::directory::RoomAction;
use super::state::ServerState;

/// What the read loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Disconnect,
}

pub struct ConnectionHandler {
    state: Arc<ServerState>,
    handle: ConnectionHandle,
    identity: Option<String>,
    /// Failed logins over the connection's whole lifetime.
    failed_attempts: u32,
}

impl ConnectionHandler {
    pub fn new(state: Arc<ServerState>, handle: ConnectionHandle) -> Self {
        Self {
            state,
            handle,
            identity: None,
            failed_attempts: 0,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Replies wait for room in the outbound queue, so a peer that stops
    /// reading stalls its own read loop.
    async fn reply(&self, msg: ServerMessage) {
        if !self.handle.send(msg).await {
            debug!(conn = %self.handle.id(), "reply dropped, writer is gone");
        }
    }

    async fn notice(&self, message: impl Into<String>) {
        self.reply(ServerMessage::info(message)).await;
    }

    pub async fn handle_envelope(&mut self, envelope: Envelope) -> Flow {
        let action = envelope.action.clone();
        let msg = match envelope.into_client_message() {
            Ok(msg) => msg,
            Err(e) if ClientMessage::is_known_action(&action) => {
                debug!(conn = %self.handle.id(), action = %action, error = %e, "bad payload");
                self.notice(format!("Invalid payload for {action}.")).await;
                return Flow::Continue;
            }
            Err(_) => {
                self.notice(format!("Unrecognized action: {action}")).await;
                return Flow::Continue;
            }
        };

        match (msg, self.identity.clone()) {
            (ClientMessage::Login { username, password }, None) => {
                return self.login(username, password).await;
            }
            (ClientMessage::CreateAccount { username, password }, _) => {
                self.create_account(&username, &password).await
            }
            (_, None) => self.notice("Please login first.").await,
            (msg, Some(user)) => self.dispatch(msg, &user).await,
        }
        Flow::Continue
    }

    async fn login(&mut self, username: String, password: String) -> Flow {
        // Verify and register under one registry lock so two connections
        // cannot both pass for the same identity.
        let result = {
            let mut sessions = self.state.sessions.lock().await;
            self.state
                .accounts
                .verify(&username, &password)
                .and_then(|account| sessions.register(&username, &self.handle).map(|()| account))
        };

        match result {
            Ok(account) => {
                info!(conn = %self.handle.id(), user = %username, "logged in");
                self.reply(ServerMessage::LoginSuccess {
                    username: username.clone(),
                    score: account.score,
                })
                .await;
                self.identity = Some(username);
                Flow::Continue
            }
            Err(e) if e.is_strike() => self.strike(&username, e).await,
            Err(e) => {
                debug!(conn = %self.handle.id(), user = %username, error = %e, "login rejected");
                self.reply(ServerMessage::LoginFailure {
                    message: e.to_string(),
                })
                .await;
                Flow::Continue
            }
        }
    }

    async fn strike(&mut self, username: &str, reason: AuthError) -> Flow {
        self.failed_attempts += 1;
        let max = self.state.config.max_login_attempts;
        warn!(
            conn = %self.handle.id(),
            user = %username,
            attempt = self.failed_attempts,
            error = %reason,
            "failed login"
        );

        if self.failed_attempts < max {
            let left = max - self.failed_attempts;
            self.reply(ServerMessage::LoginFailure {
                message: format!("{reason} {left} attempts left."),
            })
            .await;
            return Flow::Continue;
        }

        let blocked = match self.state.accounts.block(username) {
            Ok(blocked) => blocked,
            Err(e) => {
                error!(user = %username, error = %e, "failed to persist account block");
                false
            }
        };
        let message = if blocked {
            "Too many failed attempts. Your account is now blocked."
        } else {
            "Too many failed attempts."
        };
        self.reply(ServerMessage::LoginFailure {
            message: message.to_string(),
        })
        .await;
        Flow::Disconnect
    }

    async fn create_account(&self, username: &str, password: &str) {
        let reply = match self.state.accounts.create_account(username, password) {
            Ok(()) => ServerMessage::CreateAccountSuccess {
                message: "Account created successfully. Please log in.".to_string(),
            },
            Err(e) => {
                if let AuthError::Store(inner) = &e {
                    error!(user = %username, error = %inner, "failed to save new account");
                }
                ServerMessage::CreateAccountFailure {
                    message: e.to_string(),
                }
            }
        };
        self.reply(reply).await;
    }

    async fn dispatch(&mut self, msg: ClientMessage, user: &str) {
        let conn = self.handle.id();
        let state = Arc::clone(&self.state);
        let rooms = &state.rooms;

        match msg {
            ClientMessage::Login { .. } => self.notice("You are already logged in.").await,
            ClientMessage::CreateAccount { username, password } => {
                self.create_account(&username, &password).await
            }
            ClientMessage::Logout {} => self.logout().await,
            ClientMessage::CreateRoom { name } => {
                let room_id = rooms.create_room(&self.handle, user, &name).await;
                self.reply(ServerMessage::JoinSuccess { room_id }).await;
            }
            ClientMessage::JoinRoom { room_id } => match rooms.join_room(&self.handle, user, room_id).await {
                Ok(()) => self.reply(ServerMessage::JoinSuccess { room_id }).await,
                Err(e) => self.notice(e.to_string()).await,
            },
            ClientMessage::LeaveRoom {} => match rooms.leave_current_room(conn).await {
                Some(_) => self.reply(ServerMessage::LeaveSuccess {}).await,
                None => self.notice(RoomError::NotInRoom.to_string()).await,
            },
            ClientMessage::InvitePlayer { username } => {
                if let Err(e) = rooms.invite(conn, user, &username, &state.sessions).await {
                    self.notice(e.to_string()).await;
                }
            }
            ClientMessage::DeclineInvite { room_id } => {
                if !rooms.decline_invite(user, room_id).await {
                    debug!(%conn, room = room_id, "declined invitation for a room that is gone");
                }
            }
            ClientMessage::StartGame {} => self.route(RoomAction::StartGame).await,
            ClientMessage::SubmitAnswer { answer, .. } => {
                self.route(RoomAction::SubmitAnswer { answer }).await
            }
            ClientMessage::Surrender {} => self.route(RoomAction::Surrender).await,
        }
    }

    async fn route(&self, action: RoomAction) {
        let conn = self.handle.id();
        match self.state.rooms.route_to_room(conn, action).await {
            Some(Ok(())) => {}
            Some(Err(e)) => self.notice(e.to_string()).await,
            None => debug!(%conn, "room action from a connection in no room dropped"),
        }
    }

    async fn logout(&mut self) {
        let conn = self.handle.id();
        self.state.rooms.leave_current_room(conn).await;
        self.state.sessions.unregister(conn).await;
        if let Some(user) = self.identity.take() {
            info!(%conn, user = %user, "logged out");
        }
        self.reply(ServerMessage::LogoutSuccess {}).await;
    }

    /// Tear down after the read loop ends. Consumes the handler, so it runs
    /// once per connection.
    pub async fn cleanup(self) {
        let conn = self.handle.id();
        let identity = self.identity;

        if let Some(room) = self.state.rooms.leave_current_room(conn).await {
            debug!(%conn, room, "left room on disconnect");
        }
        self.state.sessions.unregister(conn).await;
        self.handle.close();

        match identity {
            Some(user) => info!(%conn, user = %user, "session closed"),
            None => debug!(%conn, "unauthenticated connection closed"),
        }
    }
}
